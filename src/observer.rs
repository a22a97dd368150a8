//! 전송 관찰자와 피어 확인 검증기

use bytes::Bytes;

use crate::stats::TransferStats;
use crate::Error;

/// 전송 진행 관찰자
///
/// 모든 콜백은 디스패처의 전달 스레드 하나에서 순서대로 호출된다.
/// 전송 제어 로직과 동시에 실행되지 않으므로 콜백 안에서 오래 걸리는 작업은 전달을 지연시킬 뿐이다.
#[allow(unused_variables)]
pub trait TransferObserver: Send + Sync + 'static {
    /// 전송 시작
    fn on_start(&self, total_chunks: usize) {}

    /// 시작 실패 (구독 실패 등), 청크는 하나도 전송되지 않음
    fn on_start_failed(&self, error: &Error) {}

    /// 청크 송신 직전, `index`는 1부터 시작
    fn on_progress(&self, index: usize, total_chunks: usize, frame: &[u8]) {}

    /// 즉시 거부된 write 재시도
    fn on_write_rejected_retry(&self, index: usize, attempt: u32, max_retries: u32) {}

    /// write 거부 재시도 소진
    fn on_write_rejected_final(&self, index: usize, attempts: u32) {}

    /// 확인 타임아웃 재시도
    fn on_timeout_retry(&self, index: usize, attempt: u32, max_retries: u32) {}

    /// 확인 타임아웃 재시도 소진
    fn on_timeout_final(&self, index: usize, attempts: u32) {}

    /// 피어 확인 검증 실패 재시도 (알림 모드 전용)
    fn on_invalid_peer_ack_retry(&self, index: usize, attempt: u32, notification: &[u8]) {}

    /// 피어 확인 검증 실패 재시도 소진 (알림 모드 전용)
    fn on_invalid_peer_ack_final(&self, index: usize, attempts: u32, notification: &[u8]) {}

    /// 전송 실패 (종료 상태)
    fn on_failed(&self, error: &Error) {}

    /// 전송 완료
    fn on_finished(&self, stats: &TransferStats) {}

    /// 외부 중단, 실패가 아니므로 `on_failed`는 호출되지 않음
    fn on_aborted(&self) {}
}

/// 아무것도 하지 않는 관찰자
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TransferObserver for NoopObserver {}

/// 디스패처가 전달하는 관찰자 이벤트
#[derive(Debug, Clone, PartialEq)]
pub enum ObserverEvent {
    Start { total_chunks: usize },
    StartFailed(Error),
    Progress { index: usize, total_chunks: usize, frame: Bytes },
    WriteRejectedRetry { index: usize, attempt: u32, max_retries: u32 },
    WriteRejectedFinal { index: usize, attempts: u32 },
    TimeoutRetry { index: usize, attempt: u32, max_retries: u32 },
    TimeoutFinal { index: usize, attempts: u32 },
    InvalidPeerAckRetry { index: usize, attempt: u32, notification: Bytes },
    InvalidPeerAckFinal { index: usize, attempts: u32, notification: Bytes },
    Failed(Error),
    Finished(TransferStats),
    Aborted,
}

impl ObserverEvent {
    /// 관찰자 콜백 호출
    pub fn deliver(&self, observer: &dyn TransferObserver) {
        match self {
            ObserverEvent::Start { total_chunks } => observer.on_start(*total_chunks),
            ObserverEvent::StartFailed(err) => observer.on_start_failed(err),
            ObserverEvent::Progress {
                index,
                total_chunks,
                frame,
            } => observer.on_progress(*index, *total_chunks, frame),
            ObserverEvent::WriteRejectedRetry {
                index,
                attempt,
                max_retries,
            } => observer.on_write_rejected_retry(*index, *attempt, *max_retries),
            ObserverEvent::WriteRejectedFinal { index, attempts } => {
                observer.on_write_rejected_final(*index, *attempts)
            }
            ObserverEvent::TimeoutRetry {
                index,
                attempt,
                max_retries,
            } => observer.on_timeout_retry(*index, *attempt, *max_retries),
            ObserverEvent::TimeoutFinal { index, attempts } => {
                observer.on_timeout_final(*index, *attempts)
            }
            ObserverEvent::InvalidPeerAckRetry {
                index,
                attempt,
                notification,
            } => observer.on_invalid_peer_ack_retry(*index, *attempt, notification),
            ObserverEvent::InvalidPeerAckFinal {
                index,
                attempts,
                notification,
            } => observer.on_invalid_peer_ack_final(*index, *attempts, notification),
            ObserverEvent::Failed(err) => observer.on_failed(err),
            ObserverEvent::Finished(stats) => observer.on_finished(stats),
            ObserverEvent::Aborted => observer.on_aborted(),
        }
    }
}

/// 피어 알림 검증기
///
/// 클로저 `Fn(notification, expected_frame, index, total_chunks) -> bool`도 그대로 사용할 수 있다.
pub trait PeerAckValidator: Send + Sync + 'static {
    /// `index`는 1부터 시작
    fn is_valid(
        &self,
        notification: &[u8],
        expected_frame: &[u8],
        index: usize,
        total_chunks: usize,
    ) -> bool;
}

impl<F> PeerAckValidator for F
where
    F: Fn(&[u8], &[u8], usize, usize) -> bool + Send + Sync + 'static,
{
    fn is_valid(
        &self,
        notification: &[u8],
        expected_frame: &[u8],
        index: usize,
        total_chunks: usize,
    ) -> bool {
        self(notification, expected_frame, index, total_chunks)
    }
}

/// 피어가 프레임을 그대로 되돌려 보내는 경우의 검증기
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoValidator;

impl PeerAckValidator for EchoValidator {
    fn is_valid(&self, notification: &[u8], expected_frame: &[u8], _: usize, _: usize) -> bool {
        notification == expected_frame
    }
}

/// 피어가 프레임의 CRC32(LE 4바이트)를 보내는 경우의 검증기
#[derive(Debug, Default, Clone, Copy)]
pub struct Crc32Validator;

impl Crc32Validator {
    /// 프레임에 대한 확인 알림 생성 (피어측)
    pub fn ack_for(frame: &[u8]) -> [u8; 4] {
        crc32fast::hash(frame).to_le_bytes()
    }
}

impl PeerAckValidator for Crc32Validator {
    fn is_valid(&self, notification: &[u8], expected_frame: &[u8], _: usize, _: usize) -> bool {
        notification == Self::ack_for(expected_frame)
    }
}
