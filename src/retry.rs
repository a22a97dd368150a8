//! 청크 단위 재시도/타임아웃 관리

use std::time::{Duration, Instant};

use tokio::time::Instant as TokioInstant;

use crate::TransferConfig;

/// 청크 하나의 재시도 시계
///
/// 시도마다 독립된 타임아웃을 가지며, 청크가 확인되면 새 청크용으로 리셋된다.
#[derive(Debug, Clone)]
pub struct RetryClock {
    /// 현재 청크에서 소비한 재시도 횟수
    attempts: u32,

    /// 청크당 최대 재시도 횟수
    max_retries: u32,

    /// 시도당 타임아웃 (None이면 무제한)
    timeout: Option<Duration>,

    /// 마지막 시도 시간
    last_attempt_at: Option<Instant>,
}

impl RetryClock {
    pub fn new(max_retries: u32, timeout: Option<Duration>) -> Self {
        Self {
            attempts: 0,
            max_retries,
            timeout,
            last_attempt_at: None,
        }
    }

    pub fn from_config(config: &TransferConfig) -> Self {
        Self::new(config.max_retries_per_chunk, config.per_attempt_timeout())
    }

    /// 새 시도 시작, 이번 시도의 마감 시각 반환
    pub fn start_attempt(&mut self) -> Option<TokioInstant> {
        let now = TokioInstant::now();
        self.last_attempt_at = Some(now.into_std());
        self.timeout.map(|t| now + t)
    }

    /// 재시도 여유가 남았는지
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_retries
    }

    /// 재시도 1회 소비, 소비 후 횟수 반환
    pub fn record_retry(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// 다음 청크용 리셋
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.last_attempt_at = None;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// 마지막 시도 이후 경과 시간
    pub fn since_last_attempt(&self) -> Option<Duration> {
        self.last_attempt_at.map(|t| t.elapsed())
    }
}
