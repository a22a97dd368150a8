//! # chunkflow
//!
//! 20바이트 프레임 링크용 대용량 페이로드 청크 전송 엔진
//!
//! ## 핵심 특징
//! - **프레이밍**: 선택적 3바이트 헤더 (총 청크 수, 인덱스, 길이)
//! - **한 번에 한 청크**: 파이프라이닝 없이 확인 후 다음 청크 진행
//! - **두 가지 흐름 제어**: write 확인 기반 / 피어 알림 확인 기반
//! - **청크 단위 재시도**: 송신 거부와 확인 타임아웃을 구분해서 재시도
//! - **순서 보장 콜백**: 관찰자 콜백은 전달 스레드 하나에서 순서대로 호출
//!
//! 연결 수립, 탐색, 암호화, 페이로드 해석은 다루지 않는다.

pub mod chunk;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod observer;
pub mod receiver;
pub mod retry;
pub mod stats;
pub mod transfer;
pub mod transport;

pub use chunk::{build_frame, chunk_count, Frame, FrameCodec, FrameHeader};
pub use config::TransferConfig;
pub use dispatcher::{TransferDispatcher, TransferHandle};
pub use error::{Error, Result};
pub use observer::{
    Crc32Validator, EchoValidator, NoopObserver, ObserverEvent, PeerAckValidator,
    TransferObserver,
};
pub use receiver::{AssembleStatus, FrameAssembler};
pub use retry::RetryClock;
pub use stats::TransferStats;
pub use transfer::{AckGatedTransfer, NotificationGatedTransfer, TransferOutcome, TransferState};
pub use transport::{EventSink, Transport, TransportEvent};

/// 전송 계층 프레임 크기 (바이트)
pub const TRANSPORT_FRAME_SIZE: usize = 20;

/// auto framing 헤더 크기 (바이트)
pub const FRAME_HEADER_SIZE: usize = 3;

/// auto framing 시 최대 청크 수 (헤더 1바이트)
pub const MAX_FRAMED_CHUNKS: usize = 255;
