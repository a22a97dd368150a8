//! 전송 계층 추상화
//!
//! 엔진은 연결/탐색/광고 같은 장치 API를 모른다.
//! 프레임 write 한 번과 비동기 이벤트 세 가지만 사용한다.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

/// 프레임 단위 전송 계층
///
/// `write`는 즉시 수락/거부만 알려주고, 실제 전달 확인은 [`EventSink`]로 들어온다.
pub trait Transport: Send + Sync + 'static {
    /// 프레임 송신 시도, 즉시 거부되면 false
    fn write(&self, frame: &[u8]) -> bool;

    /// 피어 알림 채널 구독 (알림 모드 전용)
    fn subscribe(&self) -> bool {
        true
    }

    /// 피어 알림 채널 구독 해제 (알림 모드 전용)
    fn unsubscribe(&self) {}
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn write(&self, frame: &[u8]) -> bool {
        (**self).write(frame)
    }

    fn subscribe(&self) -> bool {
        (**self).subscribe()
    }

    fn unsubscribe(&self) {
        (**self).unsubscribe()
    }
}

/// 전송 계층에서 올라오는 비동기 이벤트
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// 가장 최근에 수락된 write의 전달 확인
    WriteAcknowledged,

    /// 수락된 write가 나중에 전달 실패로 보고됨
    ///
    /// 확인 타임아웃과 같게 취급되어 대기 없이 같은 프레임을 재전송한다.
    WriteFailed,

    /// 피어가 구독 채널로 보낸 알림
    Notification(Bytes),
}

/// 현재 활성 전송으로 이벤트를 보내는 경로
pub(crate) type EventRoute = Arc<Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>>;

/// 전송 계층 콜백용 이벤트 핸들
///
/// I/O 콜백 스레드 어디서든 호출할 수 있다. 활성 전송이 없으면 이벤트는 버려진다.
#[derive(Clone)]
pub struct EventSink {
    route: EventRoute,
}

impl EventSink {
    pub(crate) fn new(route: EventRoute) -> Self {
        Self { route }
    }

    /// write 전달 확인
    pub fn write_acknowledged(&self) -> bool {
        self.deliver(TransportEvent::WriteAcknowledged)
    }

    /// write 전달 실패
    pub fn write_failed(&self) -> bool {
        self.deliver(TransportEvent::WriteFailed)
    }

    /// 피어 알림 수신
    pub fn notification_received(&self, bytes: impl Into<Bytes>) -> bool {
        self.deliver(TransportEvent::Notification(bytes.into()))
    }

    /// 이벤트 전달, 받는 전송이 있었으면 true
    pub fn deliver(&self, event: TransportEvent) -> bool {
        let route = self.route.lock();
        match route.as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => {
                trace!("활성 전송 없음, 이벤트 무시: {:?}", event);
                false
            }
        }
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("active", &self.route.lock().is_some())
            .finish()
    }
}
