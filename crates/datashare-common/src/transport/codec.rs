use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::protocol::command::status;
use crate::protocol::error::{DataShareError, Result};

/// Largest frame body either side will accept (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Decoded request body: the command id and its parcel payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestFrame {
    pub code: u32,
    pub payload: Bytes,
}

/// Decoded reply body: the stub's status and the reply parcel.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyFrame {
    pub status: i32,
    pub payload: Bytes,
}

impl ReplyFrame {
    pub fn ok(payload: Bytes) -> Self {
        Self { status: status::OK, payload }
    }

    pub fn error(status: i32) -> Self {
        Self { status, payload: Bytes::new() }
    }

    pub fn is_ok(&self) -> bool {
        self.status == status::OK
    }
}

/// Encodes and decodes frame bodies.
///
/// The length prefix is handled by the transports; a body is
///
/// ```text
/// request: [u32 command, big-endian] [parcel bytes]
/// reply:   [i32 status,  big-endian] [parcel bytes]
/// ```
///
/// # Example
///
/// ```
/// use datashare_common::transport::FrameCodec;
///
/// let body = FrameCodec::encode_request(3, b"payload").unwrap();
/// let frame = FrameCodec::decode_request(&body).unwrap();
/// assert_eq!(frame.code, 3);
/// assert_eq!(&frame.payload[..], b"payload");
/// ```
pub struct FrameCodec;

impl FrameCodec {
    pub fn encode_request(code: u32, payload: &[u8]) -> Result<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(4 + payload.len());
        buf.put_u32(code);
        buf.put_slice(payload);
        Self::check_size(buf.len())?;
        Ok(buf.to_vec())
    }

    pub fn decode_request(data: &[u8]) -> Result<RequestFrame> {
        let mut buf = data;
        if buf.remaining() < 4 {
            return Err(DataShareError::corrupt(format!("request frame too short: {} bytes", data.len())));
        }
        let code = buf.get_u32();
        Ok(RequestFrame { code, payload: Bytes::copy_from_slice(buf) })
    }

    pub fn encode_reply(reply: &ReplyFrame) -> Result<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(4 + reply.payload.len());
        buf.put_i32(reply.status);
        buf.put_slice(&reply.payload);
        Self::check_size(buf.len())?;
        Ok(buf.to_vec())
    }

    pub fn decode_reply(data: &[u8]) -> Result<ReplyFrame> {
        let mut buf = data;
        if buf.remaining() < 4 {
            return Err(DataShareError::corrupt(format!("reply frame too short: {} bytes", data.len())));
        }
        let status = buf.get_i32();
        Ok(ReplyFrame { status, payload: Bytes::copy_from_slice(buf) })
    }

    /// Rejects a declared frame length above [`MAX_FRAME_SIZE`].
    pub fn check_size(len: usize) -> Result<()> {
        if len > MAX_FRAME_SIZE {
            return Err(DataShareError::Transport(format!(
                "Message too large: {} bytes (max {} bytes)",
                len, MAX_FRAME_SIZE
            )));
        }
        Ok(())
    }
}
