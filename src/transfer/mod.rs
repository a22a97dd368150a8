//! 청크 전송 상태 머신
//!
//! - ack: 전송 계층의 write 확인만으로 다음 청크 진행
//! - notify: write 확인 + 피어 알림 검증 후 다음 청크 진행
//!
//! 전송 하나당 태스크 하나가 상태를 단독으로 소유한다.
//! 전송 계층 이벤트와 중단 신호는 채널로만 들어오며, 대기는 마감 시각이 있는 수신으로 처리한다.

pub mod ack;
pub mod notify;

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::chunk::{Frame, FrameCodec};
use crate::dispatcher::ObserverSink;
use crate::observer::ObserverEvent;
use crate::retry::RetryClock;
use crate::stats::TransferStats;
use crate::transport::{Transport, TransportEvent};
use crate::{Error, TransferConfig};

pub use ack::AckGatedTransfer;
pub use notify::NotificationGatedTransfer;

/// 전송 상태 (청크 인덱스는 0부터)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Starting,
    SendingChunk(usize),
    AwaitingWriteAck(usize),
    /// 알림 모드 전용
    AwaitingPeerAck(usize),
    Advancing(usize),
    Completed,
    Failed(Error),
    Aborted,
}

impl TransferState {
    /// 종료 상태 여부
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferState::Completed | TransferState::Failed(_) | TransferState::Aborted
        )
    }
}

/// 전송 태스크 외부에서 읽는 상태 슬롯 (쓰기는 전송 태스크만)
pub type SharedState = Arc<RwLock<TransferState>>;

/// 전송 최종 결과
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    Completed(TransferStats),
    Failed(Error),
    Aborted,
}

impl TransferOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TransferOutcome::Completed(_))
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            TransferOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// 청크 하나의 처리 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChunkResult {
    Acked,
    Failed(Error),
    Aborted,
}

/// 마감 시각 있는 대기의 결과
#[derive(Debug)]
pub(crate) enum Wait {
    Event(TransportEvent),
    TimedOut,
    Aborted,
    Closed,
}

/// 중단 신호 대기
///
/// 핸들이 먼저 사라지면 중단 신호는 더 이상 올 수 없으므로 영원히 대기한다.
async fn abort_signal(abort: &mut watch::Receiver<bool>) {
    if abort.wait_for(|aborted| *aborted).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// 전송 태스크가 소유하는 전송별 상태
pub(crate) struct TransferContext {
    pub(crate) id: u64,
    pub(crate) config: TransferConfig,
    pub(crate) codec: FrameCodec,
    pub(crate) transport: Arc<dyn Transport>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    abort: watch::Receiver<bool>,
    observer: ObserverSink,
    state: SharedState,
    pub(crate) stats: TransferStats,
    pub(crate) retry: RetryClock,

    /// 현재 청크에서 수락된 write 수
    sends_for_chunk: u32,
}

impl TransferContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: u64,
        config: TransferConfig,
        codec: FrameCodec,
        transport: Arc<dyn Transport>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
        abort: watch::Receiver<bool>,
        observer: ObserverSink,
        state: SharedState,
    ) -> Self {
        let stats = TransferStats::new(codec.payload_len(), codec.total_chunks());
        let retry = RetryClock::from_config(&config);

        Self {
            id,
            config,
            codec,
            transport,
            events,
            abort,
            observer,
            state,
            stats,
            retry,
            sends_for_chunk: 0,
        }
    }

    pub(crate) fn set_state(&self, state: TransferState) {
        trace!("transfer {} 상태: {:?}", self.id, state);
        *self.state.write() = state;
    }

    pub(crate) fn emit(&self, event: ObserverEvent) {
        self.observer.emit(event);
    }

    pub(crate) fn start(&mut self) {
        self.set_state(TransferState::Starting);
        info!(
            "Transfer {} started: {} bytes, {} chunks, framing={}",
            self.id,
            self.codec.payload_len(),
            self.codec.total_chunks(),
            self.codec.auto_framing()
        );
    }

    /// 청크 진입, 이미 중단됐으면 false
    ///
    /// 진행 콜백은 실제로 송신할 프레임에 대해서만 나간다.
    pub(crate) fn begin_chunk(&mut self, frame: &Frame) -> bool {
        if self.is_aborted() {
            return false;
        }

        self.retry.reset();
        self.sends_for_chunk = 0;
        self.set_state(TransferState::SendingChunk(frame.index - 1));

        debug!(
            "transfer {} 청크 {}/{} 송신 ({} bytes)",
            self.id,
            frame.index,
            frame.total_chunks,
            frame.bytes.len()
        );
        self.emit(ObserverEvent::Progress {
            index: frame.index,
            total_chunks: frame.total_chunks,
            frame: frame.bytes.clone(),
        });
        true
    }

    /// 확인된 청크 기록 후 다음 청크로 진행, 중단되면 false
    pub(crate) async fn advance(&mut self, frame: &Frame) -> bool {
        self.stats.record_ack(frame.payload_len);
        self.retry.reset();
        self.set_state(TransferState::Advancing(frame.index));

        // 마지막 청크 뒤에는 간격을 두지 않음
        if frame.index < frame.total_chunks {
            let delay = self.config.chunk_delay();
            return self.pause(delay).await;
        }
        !self.is_aborted()
    }

    pub(crate) fn is_aborted(&self) -> bool {
        *self.abort.borrow()
    }

    /// 중단 가능한 대기, 중단되면 false
    pub(crate) async fn pause(&mut self, delay: Duration) -> bool {
        if delay.is_zero() {
            return !self.is_aborted();
        }

        tokio::select! {
            biased;
            _ = abort_signal(&mut self.abort) => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// 이벤트, 중단, 마감 중 먼저 오는 것을 대기
    pub(crate) async fn wait_event(&mut self, deadline: Option<Instant>) -> Wait {
        let timer = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = abort_signal(&mut self.abort) => Wait::Aborted,
            event = self.events.recv() => match event {
                Some(event) => Wait::Event(event),
                None => Wait::Closed,
            },
            _ = timer => Wait::TimedOut,
        }
    }

    /// 이전 시도에 대한 늦은 이벤트 폐기
    ///
    /// 확인에는 식별자가 없으므로 가장 최근 write 이후의 이벤트만 유효하다.
    fn drain_stale_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            trace!("transfer {} 이전 시도 이벤트 폐기: {:?}", self.id, event);
        }
    }

    /// 프레임 송신, 수락되면 이번 시도의 마감 시각 반환
    ///
    /// 즉시 거부는 여기서 재시도하며, 재시도가 소진되거나 중단되면 Break.
    pub(crate) async fn transmit(
        &mut self,
        frame: &Frame,
    ) -> ControlFlow<ChunkResult, Option<Instant>> {
        loop {
            if self.is_aborted() {
                return ControlFlow::Break(ChunkResult::Aborted);
            }

            self.drain_stale_events();

            if self.transport.write(&frame.bytes) {
                self.stats.record_send(self.sends_for_chunk > 0);
                self.sends_for_chunk += 1;
                self.set_state(TransferState::AwaitingWriteAck(frame.index - 1));
                return ControlFlow::Continue(self.retry.start_attempt());
            }

            if let Some(result) = self.on_write_rejected(frame).await {
                return ControlFlow::Break(result);
            }
        }
    }

    /// 즉시 거부 처리, 재시도하면 None
    async fn on_write_rejected(&mut self, frame: &Frame) -> Option<ChunkResult> {
        self.stats.write_rejections += 1;

        if !self.retry.can_retry() {
            let attempts = self.retry.attempts();
            warn!(
                "transfer {} 청크 {} 송신 거부, 재시도 소진 ({}회)",
                self.id, frame.index, attempts
            );
            self.emit(ObserverEvent::WriteRejectedFinal {
                index: frame.index,
                attempts,
            });
            return Some(ChunkResult::Failed(Error::WriteRejected {
                chunk: frame.index,
                attempts,
            }));
        }

        let attempt = self.retry.record_retry();
        warn!(
            "transfer {} 청크 {} 송신 거부, 재시도 {}/{}",
            self.id,
            frame.index,
            attempt,
            self.retry.max_retries()
        );
        self.emit(ObserverEvent::WriteRejectedRetry {
            index: frame.index,
            attempt,
            max_retries: self.retry.max_retries(),
        });

        let delay = self.config.inter_attempt_delay();
        if !self.pause(delay).await {
            return Some(ChunkResult::Aborted);
        }
        None
    }

    /// 수락된 write가 확인 없이 끝난 경우 (타임아웃 또는 전달 실패), 재전송하면 None
    ///
    /// 즉시 거부와 달리 시도 간 대기 없이 바로 같은 프레임을 다시 보낸다.
    pub(crate) fn on_unconfirmed(&mut self, frame: &Frame) -> Option<ChunkResult> {
        self.stats.timeouts += 1;
        let since = self.retry.since_last_attempt().unwrap_or_default();

        if !self.retry.can_retry() {
            let attempts = self.retry.attempts();
            warn!(
                "transfer {} 청크 {} 확인 없음 ({:?} 경과), 재시도 소진 ({}회)",
                self.id, frame.index, since, attempts
            );
            self.emit(ObserverEvent::TimeoutFinal {
                index: frame.index,
                attempts,
            });
            return Some(ChunkResult::Failed(Error::AckTimeout {
                chunk: frame.index,
                attempts,
            }));
        }

        let attempt = self.retry.record_retry();
        warn!(
            "transfer {} 청크 {} 확인 없음 ({:?} 경과), 재전송 {}/{}",
            self.id,
            frame.index,
            since,
            attempt,
            self.retry.max_retries()
        );
        self.emit(ObserverEvent::TimeoutRetry {
            index: frame.index,
            attempt,
            max_retries: self.retry.max_retries(),
        });
        None
    }

    /// 종료 상태 전이 및 관찰자 통지
    pub(crate) fn finish(mut self, terminal: ChunkResult) -> TransferOutcome {
        self.stats.finish();

        match terminal {
            ChunkResult::Acked => {
                self.set_state(TransferState::Completed);
                info!("Transfer {} finished: {}", self.id, self.stats.summary());
                self.emit(ObserverEvent::Finished(self.stats.clone()));
                TransferOutcome::Completed(self.stats)
            }
            ChunkResult::Failed(err) => {
                self.set_state(TransferState::Failed(err.clone()));
                warn!("transfer {} 실패: {} ({})", self.id, err, self.stats.summary());
                self.emit(ObserverEvent::Failed(err.clone()));
                TransferOutcome::Failed(err)
            }
            ChunkResult::Aborted => {
                self.set_state(TransferState::Aborted);
                info!("Transfer {} aborted: {}", self.id, self.stats.summary());
                self.emit(ObserverEvent::Aborted);
                TransferOutcome::Aborted
            }
        }
    }
}
