//! 피어 알림 확인 기반 전송
//!
//! write 확인 뒤 피어 애플리케이션이 보낸 알림을 검증해야 다음 청크로 진행한다.
//! write 확인과 피어 확인은 같은 시도당 타임아웃 안에 모두 도착해야 한다.

use std::ops::ControlFlow;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use super::{ChunkResult, TransferContext, TransferOutcome, TransferState, Wait};
use crate::chunk::Frame;
use crate::observer::{ObserverEvent, PeerAckValidator};
use crate::transport::TransportEvent;
use crate::Error;

/// 피어 알림 확인 기반 전송
pub struct NotificationGatedTransfer {
    ctx: TransferContext,
    validator: Arc<dyn PeerAckValidator>,
}

impl NotificationGatedTransfer {
    pub(crate) fn new(ctx: TransferContext, validator: Arc<dyn PeerAckValidator>) -> Self {
        Self { ctx, validator }
    }

    /// 전송 실행 (종료 상태까지)
    ///
    /// 어떤 경로로 끝나든 구독은 정확히 한 번 해제된다.
    pub async fn run(mut self) -> TransferOutcome {
        self.ctx.start();

        if !self.ctx.transport.subscribe() {
            let err = Error::SubscriptionFailed;
            warn!("transfer {} 알림 구독 실패", self.ctx.id);
            self.ctx.emit(ObserverEvent::StartFailed(err.clone()));
            self.ctx.transport.unsubscribe();
            return self.ctx.finish(ChunkResult::Failed(err));
        }
        debug!("transfer {} 알림 구독 완료", self.ctx.id);

        self.ctx.emit(ObserverEvent::Start {
            total_chunks: self.ctx.codec.total_chunks(),
        });

        let terminal = self.send_all().await;

        self.ctx.transport.unsubscribe();
        debug!("transfer {} 알림 구독 해제", self.ctx.id);

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

    /// 청크 하나를 피어가 확인할 때까지 송신
    async fn deliver(&mut self, frame: &Frame) -> ChunkResult {
        loop {
            let deadline = match self.ctx.transmit(frame).await {
                ControlFlow::Continue(deadline) => deadline,
                ControlFlow::Break(result) => return result,
            };

            let mut write_acked = false;
            // write 확인보다 먼저 도착한 알림
            let mut early_notification: Option<Bytes> = None;

            loop {
                match self.ctx.wait_event(deadline).await {
                    Wait::Event(TransportEvent::WriteAcknowledged) => {
                        if write_acked {
                            trace!("transfer {} 중복 write 확인 무시", self.ctx.id);
                            continue;
                        }
                        write_acked = true;
                        self.ctx
                            .set_state(TransferState::AwaitingPeerAck(frame.index - 1));

                        if let Some(notification) = early_notification.take() {
                            match self.check_peer_ack(frame, notification) {
                                Some(result) => return result,
                                None => break,
                            }
                        }
                    }
                    Wait::Event(TransportEvent::Notification(notification)) => {
                        if !write_acked {
                            trace!(
                                "transfer {} write 확인 전 알림 보류 ({} bytes)",
                                self.ctx.id,
                                notification.len()
                            );
                            early_notification = Some(notification);
                            continue;
                        }
                        match self.check_peer_ack(frame, notification) {
                            Some(result) => return result,
                            None => break,
                        }
                    }
                    Wait::Event(TransportEvent::WriteFailed) | Wait::TimedOut => {
                        match self.ctx.on_unconfirmed(frame) {
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

    /// 피어 알림 검증, 같은 청크를 재전송해야 하면 None
    fn check_peer_ack(&mut self, frame: &Frame, notification: Bytes) -> Option<ChunkResult> {
        if self.validator.is_valid(
            &notification,
            &frame.bytes,
            frame.index,
            frame.total_chunks,
        ) {
            return Some(ChunkResult::Acked);
        }

        let ctx = &mut self.ctx;
        ctx.stats.invalid_peer_acks += 1;

        if !ctx.retry.can_retry() {
            let attempts = ctx.retry.attempts();
            warn!(
                "transfer {} 청크 {} 피어 확인 불일치, 재시도 소진 ({}회)",
                ctx.id, frame.index, attempts
            );
            ctx.emit(ObserverEvent::InvalidPeerAckFinal {
                index: frame.index,
                attempts,
                notification,
            });
            return Some(ChunkResult::Failed(Error::InvalidPeerAck {
                chunk: frame.index,
                attempts,
            }));
        }

        let attempt = ctx.retry.record_retry();
        warn!(
            "transfer {} 청크 {} 피어 확인 불일치, 재전송 {}/{}",
            ctx.id,
            frame.index,
            attempt,
            ctx.retry.max_retries()
        );
        ctx.emit(ObserverEvent::InvalidPeerAckRetry {
            index: frame.index,
            attempt,
            notification,
        });
        None
    }
}
