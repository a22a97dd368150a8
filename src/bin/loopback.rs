//! chunkflow 루프백 데모
//!
//! 손실이 있는 가상 링크와 가상 피어를 붙여서 전송 엔진을 돌려본다.
//! - 링크: 일정 확률로 write 즉시 거부
//! - 피어: 일정 확률로 프레임 유실 (확인 없음), 받으면 write 확인 + CRC32 알림
//!
//! 사용법:
//!   cargo run --release --bin chunkflow-loopback -- [OPTIONS]
//!
//! 예시:
//!   # 알림 확인 모드, 10% 유실
//!   cargo run --release --bin chunkflow-loopback -- --mode notify --loss 0.1

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use rand::Rng;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chunkflow::{
    Crc32Validator, EventSink, FrameAssembler, TransferConfig, TransferDispatcher,
    TransferObserver, TransferOutcome, TransferStats, Transport,
};

/// 전송 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Ack,
    Notify,
}

/// 데모 설정
struct DemoConfig {
    size: usize,
    mode: Mode,
    loss: f64,
    reject: f64,
    latency_ms: u64,
    config: TransferConfig,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            size: 1024,
            mode: Mode::Notify,
            loss: 0.05,
            reject: 0.02,
            latency_ms: 2,
            config: TransferConfig::new().with_per_attempt_timeout_ms(200),
        }
    }
}

fn parse_args() -> Result<DemoConfig, String> {
    let args: Vec<String> = std::env::args().collect();
    let mut demo = DemoConfig::default();

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        let need = |name: &str| value.cloned().ok_or_else(|| format!("{} 값 필요", name));

        match args[i].as_str() {
            "--size" | "-s" => {
                demo.size = need("--size")?.parse().map_err(|_| "유효한 숫자 필요")?;
                i += 1;
            }
            "--mode" | "-m" => {
                demo.mode = match need("--mode")?.as_str() {
                    "ack" => Mode::Ack,
                    "notify" => Mode::Notify,
                    other => return Err(format!("알 수 없는 모드: {}", other)),
                };
                i += 1;
            }
            "--loss" => {
                demo.loss = need("--loss")?.parse().map_err(|_| "유효한 비율 필요")?;
                i += 1;
            }
            "--reject" => {
                demo.reject = need("--reject")?.parse().map_err(|_| "유효한 비율 필요")?;
                i += 1;
            }
            "--latency-ms" => {
                demo.latency_ms = need("--latency-ms")?.parse().map_err(|_| "유효한 숫자 필요")?;
                i += 1;
            }
            "--preset" | "-p" => {
                // 이후 옵션은 프리셋 위에 덮어쓴다
                demo.config = match need("--preset")?.as_str() {
                    "default" => TransferConfig::default(),
                    "low-latency" => TransferConfig::low_latency(),
                    "unstable" => TransferConfig::unstable_link(),
                    other => return Err(format!("알 수 없는 프리셋: {}", other)),
                };
                i += 1;
            }
            "--timeout-ms" => {
                demo.config.per_attempt_timeout_ms =
                    need("--timeout-ms")?.parse().map_err(|_| "유효한 숫자 필요")?;
                i += 1;
            }
            "--retries" | "-r" => {
                demo.config.max_retries_per_chunk =
                    need("--retries")?.parse().map_err(|_| "유효한 숫자 필요")?;
                i += 1;
            }
            "--chunk-delay-ms" => {
                demo.config.chunk_delay_ms =
                    need("--chunk-delay-ms")?.parse().map_err(|_| "유효한 숫자 필요")?;
                i += 1;
            }
            "--raw" => {
                demo.config.auto_framing = false;
            }
            "--help" | "-h" => {
                println!(
                    r#"chunkflow loopback - 가상 링크 청크 전송 데모

사용법:
  cargo run --release --bin chunkflow-loopback -- [OPTIONS]

옵션:
  -s, --size <BYTES>        페이로드 크기 (기본: 1024)
  -m, --mode <ack|notify>   흐름 제어 모드 (기본: notify)
  --loss <RATIO>            피어측 프레임 유실률 (기본: 0.05)
  --reject <RATIO>          링크 write 즉시 거부율 (기본: 0.02)
  --latency-ms <MS>         피어 처리 지연 (기본: 2)
  -p, --preset <NAME>       default | low-latency | unstable (다른 전송 옵션보다 먼저)
  --timeout-ms <MS>         시도당 확인 타임아웃 (기본: 200)
  -r, --retries <N>         청크당 최대 재시도 (기본: 10)
  --chunk-delay-ms <MS>     청크 간 간격 (기본: 0)
  --raw                     auto framing 끄기 (ack 모드 권장)
  -h, --help                이 도움말 출력
"#
                );
                std::process::exit(0);
            }
            other => return Err(format!("알 수 없는 옵션: {}", other)),
        }
        i += 1;
    }

    Ok(demo)
}

/// 손실이 있는 가상 링크
struct LossyLink {
    to_peer: crossbeam_channel::Sender<Vec<u8>>,
    reject: f64,
}

impl Transport for LossyLink {
    fn write(&self, frame: &[u8]) -> bool {
        if rand::thread_rng().gen_bool(self.reject) {
            return false;
        }
        self.to_peer.send(frame.to_vec()).is_ok()
    }

    fn subscribe(&self) -> bool {
        info!("peer 알림 구독");
        true
    }

    fn unsubscribe(&self) {
        info!("peer 알림 구독 해제");
    }
}

/// 가상 피어 수신 상태
#[derive(Default)]
struct PeerState {
    assembler: FrameAssembler,
    raw: Vec<u8>,
}

/// 가상 피어 루프
fn run_peer(
    rx: crossbeam_channel::Receiver<Vec<u8>>,
    sink: EventSink,
    state: Arc<Mutex<PeerState>>,
    framed: bool,
    loss: f64,
    latency: Duration,
) {
    let mut rng = rand::thread_rng();
    let mut last_raw: Option<Vec<u8>> = None;

    for frame in rx.iter() {
        thread::sleep(latency);

        if rng.gen_bool(loss) {
            warn!("peer: 프레임 유실 ({} bytes)", frame.len());
            continue;
        }

        {
            let mut state = state.lock();
            if framed {
                if let Err(e) = state.assembler.push(&frame) {
                    warn!("peer: 조립 에러: {}", e);
                }
            } else if last_raw.as_deref() != Some(&frame[..]) {
                // framing 없이는 재전송과 새 청크를 내용으로만 구분
                state.raw.extend_from_slice(&frame);
                last_raw = Some(frame.clone());
            }
        }

        sink.write_acknowledged();
        sink.notification_received(Bytes::copy_from_slice(&Crc32Validator::ack_for(&frame)));
    }
}

/// 로그 관찰자
struct LogObserver;

impl TransferObserver for LogObserver {
    fn on_start(&self, total_chunks: usize) {
        info!("전송 시작: {} chunks", total_chunks);
    }

    fn on_progress(&self, index: usize, total_chunks: usize, frame: &[u8]) {
        info!("청크 {}/{} ({} bytes)", index, total_chunks, frame.len());
    }

    fn on_write_rejected_retry(&self, index: usize, attempt: u32, max_retries: u32) {
        warn!("청크 {} 송신 거부, 재시도 {}/{}", index, attempt, max_retries);
    }

    fn on_timeout_retry(&self, index: usize, attempt: u32, max_retries: u32) {
        warn!("청크 {} 타임아웃, 재전송 {}/{}", index, attempt, max_retries);
    }

    fn on_invalid_peer_ack_retry(&self, index: usize, attempt: u32, _notification: &[u8]) {
        warn!("청크 {} 피어 확인 불일치, 재전송 {}", index, attempt);
    }

    fn on_failed(&self, error: &chunkflow::Error) {
        warn!("전송 실패: {}", error);
    }

    fn on_finished(&self, stats: &TransferStats) {
        info!("전송 완료: {}", stats.summary());
    }

    fn on_aborted(&self) {
        warn!("전송 중단");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let demo = parse_args()?;
    let framed = demo.config.auto_framing;

    info!("chunkflow loopback starting...");
    info!(
        "size={} mode={:?} loss={} reject={} framing={}",
        demo.size, demo.mode, demo.loss, demo.reject, framed
    );

    let payload: Vec<u8> = (0..demo.size).map(|i| (i % 251) as u8).collect();

    let (to_peer, peer_rx) = crossbeam_channel::unbounded();
    let link = LossyLink {
        to_peer,
        reject: demo.reject.clamp(0.0, 1.0),
    };

    let dispatcher = TransferDispatcher::new(link)?;
    let peer_state = Arc::new(Mutex::new(PeerState::default()));

    {
        let sink = dispatcher.event_sink();
        let state = peer_state.clone();
        let loss = demo.loss.clamp(0.0, 1.0);
        let latency = Duration::from_millis(demo.latency_ms);
        thread::Builder::new()
            .name("loopback-peer".into())
            .spawn(move || run_peer(peer_rx, sink, state, framed, loss, latency))?;
    }

    let observer = Arc::new(LogObserver);
    let handle = match demo.mode {
        Mode::Ack => dispatcher.start_ack_gated(payload.clone(), demo.config.clone(), observer)?,
        Mode::Notify => dispatcher.start_notification_gated(
            payload.clone(),
            demo.config.clone(),
            Arc::new(Crc32Validator),
            observer,
        )?,
    };

    let outcome = handle.wait().await;

    let (received, received_chunks) = {
        let mut state = peer_state.lock();
        if framed {
            let assembler = std::mem::take(&mut state.assembler);
            let chunks = assembler.received_chunks();
            (assembler.into_payload().map(|b| b.to_vec()), chunks)
        } else {
            let raw = std::mem::take(&mut state.raw);
            let chunks = chunkflow::chunk_count(raw.len(), false);
            (Some(raw), chunks)
        }
    };

    match outcome {
        TransferOutcome::Completed(stats) => {
            info!("{}", stats.summary());
            info!(
                "진행률 {:.0}% | 재전송 비율 {:.1}%",
                stats.progress() * 100.0,
                stats.retransmit_ratio() * 100.0
            );
            match received {
                Some(data) if data == payload => info!("✅ 페이로드 일치 ({} bytes)", data.len()),
                Some(data) => warn!("❌ 페이로드 불일치: {} / {} bytes", data.len(), payload.len()),
                None => warn!("❌ 피어 조립 미완료 ({} chunks 수신)", received_chunks),
            }
        }
        TransferOutcome::Failed(err) => {
            warn!("❌ 전송 실패: {}", err);
            if err.is_retry_exhausted() {
                warn!("청크 재시도 소진, --loss/--reject를 낮추거나 --retries를 늘려볼 것");
            }
        }
        TransferOutcome::Aborted => warn!("전송 중단됨"),
    }

    Ok(())
}
