use bytes::Bytes;

/// Header is two big-endian u32 fields: width then height.
pub const HEADER_LEN: usize = 8;

/// The remote source never produces an image payload smaller than this;
/// anything shorter is a truncated or corrupt message.
pub const MIN_PAYLOAD_LEN: usize = 100;

/// Smallest byte buffer `decode_frame` will accept.
pub const MIN_FRAME_LEN: usize = HEADER_LEN + MIN_PAYLOAD_LEN;

/// One decoded video frame: remote viewport dimensions plus the
/// JPEG-encoded image bytes. Constructed per inbound binary message and
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub payload: Bytes,
}

impl Frame {
    /// Width/height ratio, used for aspect-preserving layout.
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            0.0
        } else {
            f64::from(self.width) / f64::from(self.height)
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame too small: {len} bytes (minimum {MIN_FRAME_LEN})")]
    TooSmall { len: usize },
}

/// Parse the binary frame wire format:
/// `[width: u32 BE][height: u32 BE][image bytes]`.
///
/// Never panics; undersized buffers are rejected with
/// [`FrameError::TooSmall`] and the caller logs and drops them.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, FrameError> {
    if bytes.len() < MIN_FRAME_LEN {
        return Err(FrameError::TooSmall { len: bytes.len() });
    }
    let width = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let height = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    Ok(Frame {
        width,
        height,
        payload: Bytes::copy_from_slice(&bytes[HEADER_LEN..]),
    })
}
