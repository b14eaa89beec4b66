//! RPC 프레임 코덱
//!
//! `[MessageHeader (14 bytes)][bincode payload]`

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::message::{Message, MessageHeader, HEADER_LEN};
use crate::{Error, Result};

/// 기본 최대 페이로드 크기 (64KB)
pub const MAX_FRAME_PAYLOAD: usize = 64 * 1024;

/// RPC 프레임 코덱
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_payload: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            max_payload: MAX_FRAME_PAYLOAD,
        }
    }

    pub fn with_max_payload(max_payload: usize) -> Self {
        Self { max_payload }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder<Message> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        let payload = item.encode_payload()?;
        if payload.len() > self.max_payload {
            return Err(Error::FrameTooLarge {
                len: payload.len(),
                max: self.max_payload,
            });
        }

        let header = MessageHeader::new(item.msg_type(), &payload);
        dst.reserve(HEADER_LEN + payload.len());
        header.encode(dst);
        dst.extend_from_slice(&payload);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let header = MessageHeader::decode(&src[..HEADER_LEN])?;
        let payload_len = header.payload_len as usize;
        if payload_len > self.max_payload {
            return Err(Error::FrameTooLarge {
                len: payload_len,
                max: self.max_payload,
            });
        }

        if src.len() < HEADER_LEN + payload_len {
            src.reserve(HEADER_LEN + payload_len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(payload_len);
        header.verify(&payload)?;

        Message::decode_payload(header.msg_type, &payload).map(Some)
    }
}
