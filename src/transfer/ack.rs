//! write 확인 기반 전송
//!
//! 전송 계층이 직전 write의 전달을 확인하면 다음 청크로 진행한다.

use std::ops::ControlFlow;

use tracing::trace;

use super::{ChunkResult, TransferContext, TransferOutcome, Wait};
use crate::chunk::Frame;
use crate::observer::ObserverEvent;
use crate::transport::TransportEvent;
use crate::Error;

/// write 확인 기반 전송
pub struct AckGatedTransfer {
    ctx: TransferContext,
}

impl AckGatedTransfer {
    pub(crate) fn new(ctx: TransferContext) -> Self {
        Self { ctx }
    }

    /// 전송 실행 (종료 상태까지)
    pub async fn run(mut self) -> TransferOutcome {
        self.ctx.start();
        self.ctx.emit(ObserverEvent::Start {
            total_chunks: self.ctx.codec.total_chunks(),
        });

        let terminal = self.send_all().await;
        self.ctx.finish(terminal)
    }

    async fn send_all(&mut self) -> ChunkResult {
        let mut index = 0;
        while let Some(frame) = self.ctx.codec.frame(index) {
            if !self.ctx.begin_chunk(&frame) {
                return ChunkResult::Aborted;
            }
            match self.deliver(&frame).await {
                ChunkResult::Acked => {
                    if !self.ctx.advance(&frame).await {
                        return ChunkResult::Aborted;
                    }
                    index += 1;
                }
                other => return other,
            }
        }
        ChunkResult::Acked
    }

    /// 청크 하나를 확인될 때까지 송신
    async fn deliver(&mut self, frame: &Frame) -> ChunkResult {
        let ctx = &mut self.ctx;

        loop {
            let deadline = match ctx.transmit(frame).await {
                ControlFlow::Continue(deadline) => deadline,
                ControlFlow::Break(result) => return result,
            };

            loop {
                match ctx.wait_event(deadline).await {
                    Wait::Event(TransportEvent::WriteAcknowledged) => return ChunkResult::Acked,
                    Wait::Event(TransportEvent::Notification(bytes)) => {
                        trace!(
                            "transfer {} write 확인 모드, 알림 무시 ({} bytes)",
                            ctx.id,
                            bytes.len()
                        );
                    }
                    Wait::Event(TransportEvent::WriteFailed) | Wait::TimedOut => {
                        match ctx.on_unconfirmed(frame) {
                            Some(result) => return result,
                            None => break,
                        }
                    }
                    Wait::Aborted => return ChunkResult::Aborted,
                    Wait::Closed => return ChunkResult::Failed(Error::ChannelClosed),
                }
            }
        }
    }
}
