//! 전송 디스패처
//!
//! - 전송 하나당 전송 태스크 하나 생성
//! - 관찰자 콜백은 전달 스레드 하나에서 순서대로 호출
//! - 동시에 하나의 전송만 허용 (두 번째 시작은 즉시 실패)

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::chunk::FrameCodec;
use crate::observer::{ObserverEvent, PeerAckValidator, TransferObserver};
use crate::transfer::{
    AckGatedTransfer, NotificationGatedTransfer, SharedState, TransferContext, TransferOutcome,
    TransferState,
};
use crate::transport::{EventRoute, EventSink, Transport};
use crate::{Error, Result, TransferConfig};

/// 전달 스레드로 보내는 항목
enum Delivery {
    Event {
        transfer_id: u64,
        observer: Arc<dyn TransferObserver>,
        event: ObserverEvent,
    },
    /// 앞선 항목이 모두 전달되면 신호
    Barrier(oneshot::Sender<()>),
}

/// 전송 하나의 관찰자 이벤트 발신기
#[derive(Clone)]
pub(crate) struct ObserverSink {
    transfer_id: u64,
    observer: Arc<dyn TransferObserver>,
    tx: crossbeam_channel::Sender<Delivery>,
}

impl ObserverSink {
    pub(crate) fn emit(&self, event: ObserverEvent) {
        let delivery = Delivery::Event {
            transfer_id: self.transfer_id,
            observer: self.observer.clone(),
            event,
        };
        if self.tx.send(delivery).is_err() {
            warn!("transfer {} 전달 스레드 종료됨, 이벤트 유실", self.transfer_id);
        }
    }

    /// 지금까지 보낸 이벤트가 모두 전달될 때까지 대기
    pub(crate) async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Delivery::Barrier(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

/// 전달 스레드 본체
fn run_delivery(rx: crossbeam_channel::Receiver<Delivery>) {
    for delivery in rx.iter() {
        match delivery {
            Delivery::Event {
                transfer_id,
                observer,
                event,
            } => {
                let result = catch_unwind(AssertUnwindSafe(|| event.deliver(observer.as_ref())));
                if result.is_err() {
                    warn!("transfer {} 관찰자 콜백 패닉: {:?}", transfer_id, event);
                }
            }
            Delivery::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("관찰자 전달 스레드 종료");
}

/// 활성 전송 표시, 전송 태스크가 끝나면 해제
struct ActiveGuard {
    busy: Arc<AtomicBool>,
    route: EventRoute,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        *self.route.lock() = None;
        self.busy.store(false, Ordering::SeqCst);
    }
}

/// 전송 디스패처
///
/// 전송 계층 하나에 대해 하나씩 만든다. 전역 상태가 없으므로 여러 개를 독립적으로 둘 수 있다.
pub struct TransferDispatcher {
    /// 전송 계층
    transport: Arc<dyn Transport>,

    /// 현재 전송으로의 이벤트 경로
    route: EventRoute,

    /// 전송 중 플래그
    busy: Arc<AtomicBool>,

    /// 관찰자 전달 채널
    delivery_tx: crossbeam_channel::Sender<Delivery>,

    /// 다음 전송 ID
    next_transfer_id: AtomicU64,
}

impl TransferDispatcher {
    /// 새 디스패처 생성 및 전달 스레드 시작
    pub fn new<T: Transport>(transport: T) -> Result<Self> {
        let (delivery_tx, delivery_rx) = crossbeam_channel::unbounded();

        std::thread::Builder::new()
            .name("chunkflow-dispatch".into())
            .spawn(move || run_delivery(delivery_rx))
            .map_err(|e| Error::DispatcherUnavailable(e.to_string()))?;

        Ok(Self {
            transport: Arc::new(transport),
            route: Arc::new(Mutex::new(None)),
            busy: Arc::new(AtomicBool::new(false)),
            delivery_tx,
            next_transfer_id: AtomicU64::new(1),
        })
    }

    /// 전송 계층 콜백에 넘겨줄 이벤트 핸들
    pub fn event_sink(&self) -> EventSink {
        EventSink::new(self.route.clone())
    }

    /// 전송 중 여부
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// write 확인 기반 전송 시작
    pub fn start_ack_gated(
        &self,
        payload: impl Into<Bytes>,
        config: TransferConfig,
        observer: Arc<dyn TransferObserver>,
    ) -> Result<TransferHandle> {
        let prepared = self.prepare(payload.into(), config, observer)?;
        let Prepared { ctx, guard, parts } = prepared;

        let join = tokio::spawn(async move {
            let _guard = guard;
            AckGatedTransfer::new(ctx).run().await
        });

        Ok(parts.into_handle(join))
    }

    /// 피어 알림 확인 기반 전송 시작
    pub fn start_notification_gated(
        &self,
        payload: impl Into<Bytes>,
        config: TransferConfig,
        validator: Arc<dyn PeerAckValidator>,
        observer: Arc<dyn TransferObserver>,
    ) -> Result<TransferHandle> {
        let prepared = self.prepare(payload.into(), config, observer)?;
        let Prepared { ctx, guard, parts } = prepared;

        let join = tokio::spawn(async move {
            let _guard = guard;
            NotificationGatedTransfer::new(ctx, validator).run().await
        });

        Ok(parts.into_handle(join))
    }

    /// 전송 상태 준비
    ///
    /// 설정/페이로드 검증이 먼저이고, 검증이 통과해야 전송 중 플래그를 잡는다.
    fn prepare(
        &self,
        payload: Bytes,
        config: TransferConfig,
        observer: Arc<dyn TransferObserver>,
    ) -> Result<Prepared> {
        config.validate()?;
        let codec = FrameCodec::new(payload, config.auto_framing)?;

        if tokio::runtime::Handle::try_current().is_err() {
            return Err(Error::DispatcherUnavailable("tokio 런타임 없음".into()));
        }

        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("전송 중, 새 전송 거부");
            return Err(Error::AlreadyInProgress);
        }

        let id = self.next_transfer_id.fetch_add(1, Ordering::SeqCst);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        *self.route.lock() = Some(event_tx);

        let guard = ActiveGuard {
            busy: self.busy.clone(),
            route: self.route.clone(),
        };

        let (abort_tx, abort_rx) = watch::channel(false);
        let state: SharedState = Arc::new(RwLock::new(TransferState::Idle));
        let sink = ObserverSink {
            transfer_id: id,
            observer,
            tx: self.delivery_tx.clone(),
        };

        let ctx = TransferContext::new(
            id,
            config,
            codec,
            self.transport.clone(),
            event_rx,
            abort_rx,
            sink.clone(),
            state.clone(),
        );

        Ok(Prepared {
            ctx,
            guard,
            parts: HandleParts {
                id,
                state,
                abort_tx,
                sink,
            },
        })
    }
}

struct Prepared {
    ctx: TransferContext,
    guard: ActiveGuard,
    parts: HandleParts,
}

struct HandleParts {
    id: u64,
    state: SharedState,
    abort_tx: watch::Sender<bool>,
    sink: ObserverSink,
}

impl HandleParts {
    fn into_handle(self, join: JoinHandle<TransferOutcome>) -> TransferHandle {
        TransferHandle {
            id: self.id,
            state: self.state,
            abort_tx: self.abort_tx,
            sink: self.sink,
            join,
        }
    }
}

/// 진행 중인 전송 핸들
pub struct TransferHandle {
    id: u64,
    state: SharedState,
    abort_tx: watch::Sender<bool>,
    sink: ObserverSink,
    join: JoinHandle<TransferOutcome>,
}

impl TransferHandle {
    /// 전송 ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 현재 상태
    pub fn state(&self) -> TransferState {
        self.state.read().clone()
    }

    /// 전송 중단 요청
    ///
    /// 다음 대기 지점에서 바로 `Aborted`로 전이하며 남은 재시도는 하지 않는다.
    pub fn abort(&self) {
        let _ = self.abort_tx.send(true);
    }

    /// 전송 태스크 종료 여부
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// 전송 종료 대기
    ///
    /// 이 전송의 관찰자 콜백이 모두 전달된 뒤에 반환한다.
    pub async fn wait(self) -> TransferOutcome {
        let outcome = match self.join.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("transfer {} 태스크 비정상 종료: {}", self.id, e);
                TransferOutcome::Failed(Error::TaskFailed(e.to_string()))
            }
        };
        self.sink.flush().await;
        outcome
    }
}

impl std::fmt::Debug for TransferHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}
