//! 전송 설정

use std::time::Duration;

use crate::{Error, Result};

/// 기본 시도당 타임아웃 (밀리초)
pub const DEFAULT_PER_ATTEMPT_TIMEOUT_MS: u64 = 3000;

/// 기본 청크당 최대 재시도 횟수
pub const DEFAULT_MAX_RETRIES_PER_CHUNK: u32 = 10;

/// 송신 거부 후 재시도 전 대기 (밀리초)
pub const INTER_ATTEMPT_DELAY_MS: u64 = 100;

/// 청크 전송 설정
///
/// 전송이 시작되면 복사되어 전송 태스크가 소유하므로 이후 변경은 반영되지 않는다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    /// 각 프레임에 3바이트 헤더(총 청크 수, 인덱스, 길이) 포함 여부
    pub auto_framing: bool,

    /// 확인된 청크 사이의 전송 간격 (밀리초)
    /// 0이면 바로 다음 청크 전송
    pub chunk_delay_ms: u64,

    /// 시도당 확인 대기 타임아웃 (밀리초)
    /// 0이면 타임아웃 없이 확인 또는 중단까지 대기
    pub per_attempt_timeout_ms: u64,

    /// 청크당 최대 재시도 횟수
    pub max_retries_per_chunk: u32,

    /// 송신 거부 후 재시도 전 대기 (밀리초)
    pub inter_attempt_delay_ms: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            auto_framing: true,
            chunk_delay_ms: 0,
            per_attempt_timeout_ms: DEFAULT_PER_ATTEMPT_TIMEOUT_MS,
            max_retries_per_chunk: DEFAULT_MAX_RETRIES_PER_CHUNK,
            inter_attempt_delay_ms: INTER_ATTEMPT_DELAY_MS,
        }
    }
}

impl TransferConfig {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auto_framing(mut self, enabled: bool) -> Self {
        self.auto_framing = enabled;
        self
    }

    pub fn with_chunk_delay_ms(mut self, ms: u64) -> Self {
        self.chunk_delay_ms = ms;
        self
    }

    pub fn with_per_attempt_timeout_ms(mut self, ms: u64) -> Self {
        self.per_attempt_timeout_ms = ms;
        self
    }

    pub fn with_max_retries_per_chunk(mut self, retries: u32) -> Self {
        self.max_retries_per_chunk = retries;
        self
    }

    pub fn with_inter_attempt_delay_ms(mut self, ms: u64) -> Self {
        self.inter_attempt_delay_ms = ms;
        self
    }

    /// 청크 간 전송 간격
    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }

    /// 시도당 타임아웃 (0이면 None)
    pub fn per_attempt_timeout(&self) -> Option<Duration> {
        match self.per_attempt_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// 재시도 전 대기
    pub fn inter_attempt_delay(&self) -> Duration {
        Duration::from_millis(self.inter_attempt_delay_ms)
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        // 대기 시간은 Instant 연산에서 오버플로우가 나지 않는 범위로 제한
        const MAX_WAIT_MS: u64 = 24 * 60 * 60 * 1000;

        if self.per_attempt_timeout_ms > MAX_WAIT_MS {
            return Err(Error::InvalidConfig(format!(
                "per_attempt_timeout_ms {} > {}",
                self.per_attempt_timeout_ms, MAX_WAIT_MS
            )));
        }
        if self.chunk_delay_ms > MAX_WAIT_MS {
            return Err(Error::InvalidConfig(format!(
                "chunk_delay_ms {} > {}",
                self.chunk_delay_ms, MAX_WAIT_MS
            )));
        }
        if self.inter_attempt_delay_ms > MAX_WAIT_MS {
            return Err(Error::InvalidConfig(format!(
                "inter_attempt_delay_ms {} > {}",
                self.inter_attempt_delay_ms, MAX_WAIT_MS
            )));
        }
        Ok(())
    }

    /// 응답이 빠른 링크용 설정
    pub fn low_latency() -> Self {
        Self {
            auto_framing: true,
            chunk_delay_ms: 0,
            per_attempt_timeout_ms: 500,
            max_retries_per_chunk: 5,
            inter_attempt_delay_ms: INTER_ATTEMPT_DELAY_MS,
        }
    }

    /// 불안정한 링크용 설정
    pub fn unstable_link() -> Self {
        Self {
            auto_framing: true,
            chunk_delay_ms: 20,               // 주변 장치 버퍼 여유
            per_attempt_timeout_ms: 5000,
            max_retries_per_chunk: 20,
            inter_attempt_delay_ms: INTER_ATTEMPT_DELAY_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TransferConfig::default();
        assert!(config.auto_framing);
        assert_eq!(config.chunk_delay_ms, 0);
        assert_eq!(config.per_attempt_timeout_ms, 3000);
        assert_eq!(config.max_retries_per_chunk, 10);
        assert_eq!(config.inter_attempt_delay(), Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_disables_clock() {
        let config = TransferConfig::new().with_per_attempt_timeout_ms(0);
        assert_eq!(config.per_attempt_timeout(), None);
    }

    #[test]
    fn test_validate_rejects_huge_wait() {
        let config = TransferConfig::new().with_chunk_delay_ms(u64::MAX);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }
}
