//! 에러 타입 정의

use thiserror::Error;

/// 청크 전송 엔진 에러 타입
///
/// 송신 거부(`WriteRejected`)와 확인 누락(`AckTimeout`)은 구분된다.
/// 전자는 링크가 프레임을 거부한 경우, 후자는 링크가 받았지만 아무도 확인해주지 않은 경우.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("알림 채널 구독 실패")]
    SubscriptionFailed,

    #[error("이미 전송 중인 작업이 있음")]
    AlreadyInProgress,

    #[error("프레임 오버플로우: {total_chunks} 청크 (최대 {max})")]
    FrameOverflow { total_chunks: usize, max: usize },

    #[error("송신 거부: chunk={chunk}, attempts={attempts}")]
    WriteRejected { chunk: usize, attempts: u32 },

    #[error("확인 타임아웃: chunk={chunk}, attempts={attempts}")]
    AckTimeout { chunk: usize, attempts: u32 },

    #[error("유효하지 않은 피어 확인: chunk={chunk}, attempts={attempts}")]
    InvalidPeerAck { chunk: usize, attempts: u32 },

    #[error("빈 페이로드")]
    EmptyPayload,

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),

    #[error("잘못된 프레임: len={len}")]
    MalformedFrame { len: usize },

    #[error("예상하지 못한 청크: expected {expected}, got {got}")]
    UnexpectedChunk { expected: usize, got: usize },

    #[error("이벤트 채널 종료")]
    ChannelClosed,

    #[error("디스패처 시작 실패: {0}")]
    DispatcherUnavailable(String),

    #[error("전송 태스크 실패: {0}")]
    TaskFailed(String),
}

impl Error {
    /// 재시도 소진으로 인한 청크 단위 실패인지 여부
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(
            self,
            Error::WriteRejected { .. } | Error::AckTimeout { .. } | Error::InvalidPeerAck { .. }
        )
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
