//! 수신측 프레임 조립 (auto framing 전용)
//!
//! 송신 엔진은 청크를 하나씩만 보내고 재전송은 같은 바이트를 보내므로,
//! 수신측은 순서대로 붙이면서 직전 청크의 중복만 걸러내면 된다.

use bytes::{Bytes, BytesMut};

use crate::chunk::FrameHeader;
use crate::{Error, Result, FRAME_HEADER_SIZE};

/// 프레임 하나 처리 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssembleStatus {
    /// 새 청크 추가됨
    Accepted { index: usize, total_chunks: usize },

    /// 직전 청크 재전송, 무시됨
    Duplicate { index: usize },

    /// 마지막 청크까지 수신 완료
    Complete,
}

/// 청크 조립기
#[derive(Debug, Default)]
pub struct FrameAssembler {
    /// 첫 프레임에서 확정된 전체 청크 수
    total_chunks: Option<usize>,

    /// 마지막으로 받은 청크 인덱스 (1부터, 0이면 없음)
    last_index: usize,

    /// 조립 중인 데이터
    data: BytesMut,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 프레임 추가
    pub fn push(&mut self, frame: &[u8]) -> Result<AssembleStatus> {
        let header = FrameHeader::parse(frame)?;
        let index = header.index as usize;
        let total = header.total_chunks as usize;

        match self.total_chunks {
            Some(expected) if expected != total => {
                return Err(Error::UnexpectedChunk {
                    expected,
                    got: total,
                });
            }
            _ => {}
        }

        if index == self.last_index {
            return Ok(AssembleStatus::Duplicate { index });
        }
        if index != self.last_index + 1 {
            return Err(Error::UnexpectedChunk {
                expected: self.last_index + 1,
                got: index,
            });
        }

        self.total_chunks = Some(total);
        self.last_index = index;
        self.data.extend_from_slice(&frame[FRAME_HEADER_SIZE..]);

        if index == total {
            Ok(AssembleStatus::Complete)
        } else {
            Ok(AssembleStatus::Accepted {
                index,
                total_chunks: total,
            })
        }
    }

    /// 수신 완료 여부
    pub fn is_complete(&self) -> bool {
        matches!(self.total_chunks, Some(total) if total == self.last_index)
    }

    /// 지금까지 받은 청크 수
    pub fn received_chunks(&self) -> usize {
        self.last_index
    }

    /// 조립된 데이터 추출 (완료 전이면 None)
    pub fn into_payload(self) -> Option<Bytes> {
        if self.is_complete() {
            Some(self.data.freeze())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::FrameCodec;

    #[test]
    fn test_assembles_with_duplicates() {
        let data: Vec<u8> = (0..100).collect();
        let codec = FrameCodec::new(Bytes::from(data.clone()), true).unwrap();
        let mut assembler = FrameAssembler::new();

        for frame in codec.frames() {
            let status = assembler.push(&frame.bytes).unwrap();
            // 재전송
            assert_eq!(
                assembler.push(&frame.bytes).unwrap(),
                AssembleStatus::Duplicate { index: frame.index }
            );
            if frame.index == codec.total_chunks() {
                assert_eq!(status, AssembleStatus::Complete);
            }
        }

        assert!(assembler.is_complete());
        assert_eq!(assembler.into_payload().unwrap().as_ref(), &data[..]);
    }

    #[test]
    fn test_rejects_gap() {
        let codec = FrameCodec::new(Bytes::from(vec![7u8; 60]), true).unwrap();
        let mut assembler = FrameAssembler::new();
        let err = assembler.push(&codec.frame(1).unwrap().bytes).unwrap_err();
        assert_eq!(err, Error::UnexpectedChunk { expected: 1, got: 2 });
        assert!(assembler.into_payload().is_none());
    }

    #[test]
    fn test_rejects_total_change() {
        let first = FrameCodec::new(Bytes::from(vec![1u8; 40]), true).unwrap();
        let other = FrameCodec::new(Bytes::from(vec![1u8; 60]), true).unwrap();
        let mut assembler = FrameAssembler::new();
        assembler.push(&first.frame(0).unwrap().bytes).unwrap();
        assert!(assembler.push(&other.frame(1).unwrap().bytes).is_err());
        assert_eq!(assembler.received_chunks(), 1);
    }
}
