use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Frame header size: 4 bytes length + 4 bytes request id
pub const FRAME_HEADER_SIZE: usize = 8;
/// Maximum frame payload size (16MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// A single request or reply frame on the wire
///
/// Layout: `u32` payload length (little endian), `u32` request id
/// (little endian), then the JSON-encoded document.
#[derive(Debug, Clone)]
pub struct Frame {
    pub request_id: u32,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(request_id: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            request_id,
            payload: payload.into(),
        }
    }

    /// Encode frame to bytes (header + payload)
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(FRAME_HEADER_SIZE + self.payload.len());
        dst.put_u32_le(self.payload.len() as u32);
        dst.put_u32_le(self.request_id);
        dst.extend_from_slice(&self.payload);
    }

    /// Try to decode a frame from bytes
    ///
    /// Returns `Ok(None)` if not enough data has arrived yet, and an error if
    /// the advertised length exceeds [`MAX_FRAME_SIZE`].
    pub fn decode(src: &mut BytesMut) -> std::io::Result<Option<Self>> {
        if src.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let len = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("frame of {} bytes exceeds maximum of {}", len, MAX_FRAME_SIZE),
            ));
        }

        let total_len = FRAME_HEADER_SIZE + len;
        if src.len() < total_len {
            src.reserve(total_len - src.len());
            return Ok(None);
        }

        let request_id = u32::from_le_bytes([src[4], src[5], src[6], src[7]]);
        src.advance(FRAME_HEADER_SIZE);
        let payload = src.split_to(len).freeze();

        Ok(Some(Self {
            request_id,
            payload,
        }))
    }
}
