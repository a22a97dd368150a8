//! 전송 통계

use std::time::{Duration, Instant};

/// 전송 하나의 통계
///
/// 전송 태스크만 갱신하며, 완료 시 관찰자와 호출자에게 복사본이 전달된다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 종료 시간
    pub end_time: Option<Instant>,

    /// 페이로드 크기
    pub payload_bytes: u64,

    /// 총 청크 수
    pub total_chunks: u64,

    /// 확인된 청크 수
    pub acked_chunks: u64,

    /// 확인된 페이로드 바이트 (헤더 제외)
    pub delivered_bytes: u64,

    /// 수락된 write 수 (재전송 포함)
    pub frames_sent: u64,

    /// 재전송된 프레임 수
    pub retransmitted_frames: u64,

    /// 거부된 write 수
    pub write_rejections: u64,

    /// 확인 타임아웃 수
    pub timeouts: u64,

    /// 검증 실패한 피어 확인 수
    pub invalid_peer_acks: u64,
}

impl TransferStats {
    pub fn new(payload_bytes: usize, total_chunks: usize) -> Self {
        Self {
            start_time: Instant::now(),
            end_time: None,
            payload_bytes: payload_bytes as u64,
            total_chunks: total_chunks as u64,
            acked_chunks: 0,
            delivered_bytes: 0,
            frames_sent: 0,
            retransmitted_frames: 0,
            write_rejections: 0,
            timeouts: 0,
            invalid_peer_acks: 0,
        }
    }

    /// 청크 확인 기록
    pub fn record_ack(&mut self, payload_len: usize) {
        self.acked_chunks += 1;
        self.delivered_bytes += payload_len as u64;
    }

    /// 수락된 write 기록
    pub fn record_send(&mut self, is_retransmit: bool) {
        self.frames_sent += 1;
        if is_retransmit {
            self.retransmitted_frames += 1;
        }
    }

    /// 종료 시간 기록
    pub fn finish(&mut self) {
        if self.end_time.is_none() {
            self.end_time = Some(Instant::now());
        }
    }

    /// 경과 시간 (종료 전이면 현재까지)
    pub fn elapsed(&self) -> Duration {
        match self.end_time {
            Some(end) => end.duration_since(self.start_time),
            None => self.start_time.elapsed(),
        }
    }

    /// 실효 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.delivered_bytes as f64 / elapsed
    }

    /// 재전송 비율
    pub fn retransmit_ratio(&self) -> f64 {
        if self.frames_sent == 0 {
            return 0.0;
        }
        self.retransmitted_frames as f64 / self.frames_sent as f64
    }

    /// 진행률 (0.0 ~ 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_chunks == 0 {
            return 0.0;
        }
        self.acked_chunks as f64 / self.total_chunks as f64
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Chunks: {}/{} | Bytes: {}/{} | Throughput: {:.1} B/s | Retransmits: {} | Rejects: {} | Timeouts: {} | Invalid acks: {}",
            self.elapsed().as_secs_f64(),
            self.acked_chunks,
            self.total_chunks,
            self.delivered_bytes,
            self.payload_bytes,
            self.throughput(),
            self.retransmitted_frames,
            self.write_rejections,
            self.timeouts,
            self.invalid_peer_acks,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let mut stats = TransferStats::new(40, 3);
        stats.record_send(false);
        stats.record_ack(17);
        stats.record_send(false);
        stats.record_send(true);
        stats.record_ack(17);

        assert_eq!(stats.frames_sent, 3);
        assert_eq!(stats.retransmitted_frames, 1);
        assert_eq!(stats.delivered_bytes, 34);
        assert!((stats.retransmit_ratio() - 1.0 / 3.0).abs() < 1e-9);
        assert!((stats.progress() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_finish_freezes_elapsed() {
        let mut stats = TransferStats::new(1, 1);
        stats.finish();
        let first = stats.elapsed();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(stats.elapsed(), first);
        assert!(stats.summary().contains("Chunks: 0/1"));
    }
}
