//! 청크와 프레임 정의
//!
//! - Chunk: 페이로드를 프레임 하나에 실을 수 있는 크기로 자른 조각
//! - Frame: 전송 계층의 write 한 번에 실리는 바이트 (최대 20 bytes)
//!
//! auto framing 사용 시 프레임 앞에 3바이트 헤더가 붙는다:
//! `[total_chunks, index(1부터), chunk_len]`

use bytes::{BufMut, Bytes, BytesMut};

use crate::{Error, Result, FRAME_HEADER_SIZE, MAX_FRAMED_CHUNKS, TRANSPORT_FRAME_SIZE};

/// 프레임 하나에 실리는 페이로드 크기
pub fn payload_per_frame(auto_framing: bool) -> usize {
    if auto_framing {
        TRANSPORT_FRAME_SIZE - FRAME_HEADER_SIZE
    } else {
        TRANSPORT_FRAME_SIZE
    }
}

/// 총 청크 수 계산
///
/// 나누어 떨어지는 경우 빈 마지막 청크를 만들지 않는다.
pub fn chunk_count(payload_len: usize, auto_framing: bool) -> usize {
    let per_frame = payload_per_frame(auto_framing);
    (payload_len + per_frame - 1) / per_frame
}

/// 0부터 시작하는 `index` 청크의 와이어 프레임 생성
///
/// framing 없이 보내는 경우 마지막 청크가 정확히 20바이트이면 중간 청크와 구분되지 않는다.
/// 수신측은 전체 길이를 별도로 알고 있어야 한다.
pub fn build_frame(
    payload: &[u8],
    index: usize,
    total_chunks: usize,
    auto_framing: bool,
) -> Result<Bytes> {
    if auto_framing && (total_chunks > MAX_FRAMED_CHUNKS || index + 1 > MAX_FRAMED_CHUNKS) {
        return Err(Error::FrameOverflow {
            total_chunks: total_chunks.max(index + 1),
            max: MAX_FRAMED_CHUNKS,
        });
    }

    let per_frame = payload_per_frame(auto_framing);
    let start = index * per_frame;
    if index >= total_chunks || start >= payload.len() {
        return Err(Error::UnexpectedChunk {
            expected: total_chunks,
            got: index + 1,
        });
    }
    let end = (start + per_frame).min(payload.len());
    let data = &payload[start..end];

    if !auto_framing {
        return Ok(Bytes::copy_from_slice(data));
    }

    let header = FrameHeader {
        total_chunks: total_chunks as u8,
        index: (index + 1) as u8,
        chunk_len: data.len() as u8,
    };
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + data.len());
    buf.put_slice(&header.to_bytes());
    buf.put_slice(data);
    Ok(buf.freeze())
}

/// 3바이트 프레임 헤더
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// 전체 청크 수
    pub total_chunks: u8,

    /// 청크 인덱스 (1부터 시작)
    pub index: u8,

    /// 헤더 뒤 페이로드 길이
    pub chunk_len: u8,
}

impl FrameHeader {
    /// 바이트로 직렬화
    pub fn to_bytes(&self) -> [u8; FRAME_HEADER_SIZE] {
        [self.total_chunks, self.index, self.chunk_len]
    }

    /// 프레임에서 헤더 파싱
    ///
    /// 인덱스 범위와 실제 페이로드 길이까지 검증한다.
    pub fn parse(frame: &[u8]) -> Result<Self> {
        if frame.len() < FRAME_HEADER_SIZE || frame.len() > TRANSPORT_FRAME_SIZE {
            return Err(Error::MalformedFrame { len: frame.len() });
        }

        let header = Self {
            total_chunks: frame[0],
            index: frame[1],
            chunk_len: frame[2],
        };

        if header.index == 0
            || header.index > header.total_chunks
            || header.chunk_len as usize != frame.len() - FRAME_HEADER_SIZE
        {
            return Err(Error::MalformedFrame { len: frame.len() });
        }

        Ok(header)
    }
}

/// 전송 단위 프레임
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// 전체 청크 수
    pub total_chunks: usize,

    /// 청크 인덱스 (1부터 시작)
    pub index: usize,

    /// 프레임에 실린 페이로드 길이 (헤더 제외)
    pub payload_len: usize,

    /// 와이어 바이트 (헤더 포함)
    pub bytes: Bytes,
}

/// 페이로드 하나에 대한 프레임 생성기
///
/// 생성 시점에 청크 수와 오버플로우를 검증하므로 이후 프레임 생성은 실패하지 않는다.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    payload: Bytes,
    total_chunks: usize,
    auto_framing: bool,
}

impl FrameCodec {
    pub fn new(payload: Bytes, auto_framing: bool) -> Result<Self> {
        if payload.is_empty() {
            return Err(Error::EmptyPayload);
        }

        let total_chunks = chunk_count(payload.len(), auto_framing);
        if auto_framing && total_chunks > MAX_FRAMED_CHUNKS {
            return Err(Error::FrameOverflow {
                total_chunks,
                max: MAX_FRAMED_CHUNKS,
            });
        }

        Ok(Self {
            payload,
            total_chunks,
            auto_framing,
        })
    }

    pub fn total_chunks(&self) -> usize {
        self.total_chunks
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    pub fn auto_framing(&self) -> bool {
        self.auto_framing
    }

    /// 0부터 시작하는 `index` 프레임 반환, 남은 청크가 없으면 None
    pub fn frame(&self, index: usize) -> Option<Frame> {
        if index >= self.total_chunks {
            return None;
        }

        let bytes = build_frame(&self.payload, index, self.total_chunks, self.auto_framing).ok()?;
        let payload_len = if self.auto_framing {
            bytes.len() - FRAME_HEADER_SIZE
        } else {
            bytes.len()
        };

        Some(Frame {
            total_chunks: self.total_chunks,
            index: index + 1,
            payload_len,
            bytes,
        })
    }

    /// 전체 프레임 순회
    pub fn frames(&self) -> impl Iterator<Item = Frame> + '_ {
        (0..self.total_chunks).filter_map(move |idx| self.frame(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_chunk_count() {
        assert_eq!(chunk_count(1, false), 1);
        assert_eq!(chunk_count(20, false), 1);
        assert_eq!(chunk_count(21, false), 2);
        assert_eq!(chunk_count(40, false), 2);
        assert_eq!(chunk_count(17, true), 1);
        assert_eq!(chunk_count(18, true), 2);
        assert_eq!(chunk_count(40, true), 3);
        assert_eq!(chunk_count(17 * 255, true), 255);
    }

    #[test]
    fn test_raw_frames_reconstruct_payload() {
        for len in 1..=130 {
            let data = pattern(len);
            let codec = FrameCodec::new(Bytes::from(data.clone()), false).unwrap();
            assert_eq!(codec.total_chunks(), (len + 19) / 20);

            let joined: Vec<u8> = codec.frames().flat_map(|f| f.bytes.to_vec()).collect();
            assert_eq!(joined, data, "len={}", len);
        }
    }

    #[test]
    fn test_raw_last_chunk_full_when_divisible() {
        let data = pattern(60);
        let last = build_frame(&data, 2, 3, false).unwrap();
        assert_eq!(last.len(), 20);
        assert_eq!(&last[..], &data[40..60]);
    }

    #[test]
    fn test_framed_frames_reconstruct_payload() {
        for len in [1, 16, 17, 18, 34, 35, 100, 17 * 255] {
            let data = pattern(len);
            let codec = FrameCodec::new(Bytes::from(data.clone()), true).unwrap();
            let expected_total = (len + 16) / 17;

            let mut joined = Vec::new();
            let mut last_index = 0;
            for frame in codec.frames() {
                let header = FrameHeader::parse(&frame.bytes).unwrap();
                assert_eq!(header.total_chunks as usize, expected_total);
                assert!(header.index as usize > last_index);
                last_index = header.index as usize;
                joined.extend_from_slice(&frame.bytes[FRAME_HEADER_SIZE..]);
            }
            assert_eq!(last_index, expected_total);
            assert_eq!(joined, data, "len={}", len);
        }
    }

    #[test]
    fn test_forty_bytes_framed_headers() {
        let data = pattern(40);
        let codec = FrameCodec::new(Bytes::from(data), true).unwrap();
        assert_eq!(codec.total_chunks(), 3);

        let headers: Vec<[u8; 3]> = codec
            .frames()
            .map(|f| [f.bytes[0], f.bytes[1], f.bytes[2]])
            .collect();
        assert_eq!(headers, vec![[3, 1, 17], [3, 2, 17], [3, 3, 6]]);

        let lens: Vec<usize> = codec.frames().map(|f| f.payload_len).collect();
        assert_eq!(lens, vec![17, 17, 6]);
    }

    #[test]
    fn test_framed_last_chunk_full_when_divisible() {
        let data = pattern(34);
        let last = build_frame(&data, 1, 2, true).unwrap();
        assert_eq!(&last[..3], &[2, 2, 17]);
        assert_eq!(last.len(), TRANSPORT_FRAME_SIZE);
    }

    #[test]
    fn test_frame_overflow() {
        let data = pattern(17 * 255 + 1);
        let err = FrameCodec::new(Bytes::from(data.clone()), true).unwrap_err();
        assert_eq!(
            err,
            Error::FrameOverflow {
                total_chunks: 256,
                max: 255
            }
        );
        assert!(matches!(
            build_frame(&data, 255, 256, true),
            Err(Error::FrameOverflow { .. })
        ));

        // framing 없이는 제한 없음
        let codec = FrameCodec::new(Bytes::from(data), false).unwrap();
        assert_eq!(codec.total_chunks(), (17 * 255 + 1 + 19) / 20);
    }

    #[test]
    fn test_empty_payload_rejected() {
        assert_eq!(
            FrameCodec::new(Bytes::new(), true).unwrap_err(),
            Error::EmptyPayload
        );
    }

    #[test]
    fn test_frame_past_end_is_none() {
        let codec = FrameCodec::new(Bytes::from(pattern(10)), true).unwrap();
        assert!(codec.frame(0).is_some());
        assert!(codec.frame(1).is_none());
    }

    #[test]
    fn test_header_parse_rejects_garbage() {
        assert!(FrameHeader::parse(&[1, 1]).is_err());
        assert!(FrameHeader::parse(&[1, 0, 0]).is_err());
        assert!(FrameHeader::parse(&[1, 2, 0]).is_err());
        assert!(FrameHeader::parse(&[1, 1, 5, 0]).is_err());
        assert!(FrameHeader::parse(&[1, 1, 1, 9]).is_ok());
    }
}
