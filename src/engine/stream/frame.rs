//! Header codec for the daemon's stdout/stderr multiplexing protocol.
//!
//! Each frame is an 8-byte header followed by its payload:
//!
//! ```text
//! +------+---------------+----------------------------+
//! | tag  | 3 x reserved  | payload length (u32, BE)   |
//! +------+---------------+----------------------------+
//! ```
//!
//! [`decode_header`] and [`encode_header`] are pure. [`FrameCodec`] adapts
//! them to `tokio_util::codec` so a `FramedRead` only ever yields complete
//! frames.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::FrameError;

/// Length of a frame header on the wire.
pub const HEADER_LEN: usize = 8;

/// Upper bound on speculative buffer growth for a single pending payload.
const MAX_RESERVE_BYTES: usize = 64 * 1024;

/// Channel a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamType {
    /// Standard input echoed back by the daemon.
    Stdin,
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl StreamType {
    /// Wire tag for this channel.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Stdin => 0,
            Self::Stdout => 1,
            Self::Stderr => 2,
        }
    }

    /// Resolve a wire tag.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::UnknownStreamType`] for tags outside `{0, 1, 2}`.
    pub const fn from_tag(tag: u8) -> Result<Self, FrameError> {
        match tag {
            0 => Ok(Self::Stdin),
            1 => Ok(Self::Stdout),
            2 => Ok(Self::Stderr),
            _ => Err(FrameError::UnknownStreamType { tag }),
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stdin => "stdin",
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        })
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Channel of the payload that follows.
    pub stream: StreamType,
    /// Payload length in bytes.
    pub length: u32,
}

impl FrameHeader {
    fn payload_len(self) -> Result<usize, FrameError> {
        usize::try_from(self.length).map_err(|_| FrameError::PayloadTooLarge {
            length: u64::from(self.length),
        })
    }
}

/// A complete frame: header fields plus the full payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Channel the payload belongs to.
    pub stream: StreamType,
    /// Payload bytes, exactly as long as the header announced.
    pub payload: Bytes,
}

impl Frame {
    /// Build a frame from a channel and payload.
    #[must_use]
    pub fn new(stream: StreamType, payload: impl Into<Bytes>) -> Self {
        Self {
            stream,
            payload: payload.into(),
        }
    }
}

/// Decode a complete 8-byte frame header.
///
/// The reserved bytes are ignored.
///
/// # Errors
///
/// Returns [`FrameError::UnknownStreamType`] when the tag byte is not a known
/// channel.
#[expect(
    clippy::big_endian_bytes,
    reason = "the daemon's frame header carries a big-endian payload length"
)]
pub fn decode_header(bytes: &[u8; HEADER_LEN]) -> Result<FrameHeader, FrameError> {
    let [tag, _, _, _, l0, l1, l2, l3] = *bytes;
    let stream = StreamType::from_tag(tag)?;
    Ok(FrameHeader {
        stream,
        length: u32::from_be_bytes([l0, l1, l2, l3]),
    })
}

/// Encode a frame header with zeroed reserved bytes.
#[must_use]
#[expect(
    clippy::big_endian_bytes,
    reason = "the daemon's frame header carries a big-endian payload length"
)]
pub const fn encode_header(stream: StreamType, length: u32) -> [u8; HEADER_LEN] {
    let [l0, l1, l2, l3] = length.to_be_bytes();
    [stream.tag(), 0, 0, 0, l0, l1, l2, l3]
}

/// `tokio_util` codec yielding whole [`Frame`]s.
///
/// A header is parsed only once all eight bytes are buffered, and a frame is
/// emitted only once its whole payload is buffered. End of input exactly at a
/// header boundary is a clean end of stream.
#[derive(Debug, Default)]
pub struct FrameCodec {
    pending: Option<FrameHeader>,
}

impl FrameCodec {
    /// Create a codec positioned at a header boundary.
    #[must_use]
    pub const fn new() -> Self {
        Self { pending: None }
    }

    fn next_header(&mut self, src: &mut BytesMut) -> Result<Option<FrameHeader>, FrameError> {
        if let Some(header) = self.pending.take() {
            return Ok(Some(header));
        }
        let Some(bytes) = src.first_chunk::<HEADER_LEN>() else {
            return Ok(None);
        };
        let header = decode_header(bytes)?;
        src.advance(HEADER_LEN);
        Ok(Some(header))
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        let Some(header) = self.next_header(src)? else {
            return Ok(None);
        };
        let length = header.payload_len()?;

        if src.len() < length {
            let missing = length.saturating_sub(src.len());
            src.reserve(missing.min(MAX_RESERVE_BYTES));
            self.pending = Some(header);
            return Ok(None);
        }

        let payload = src.split_to(length).freeze();
        Ok(Some(Frame {
            stream: header.stream,
            payload,
        }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }

        match self.pending.take() {
            Some(header) => Err(FrameError::TruncatedPayload {
                expected: header.length,
                received: src.len(),
            }),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::TruncatedHeader {
                available: src.len(),
            }),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        let length =
            u32::try_from(frame.payload.len()).map_err(|_| FrameError::PayloadTooLarge {
                length: u64::try_from(frame.payload.len()).unwrap_or(u64::MAX),
            })?;
        dst.reserve(HEADER_LEN.saturating_add(frame.payload.len()));
        dst.put_slice(&encode_header(frame.stream, length));
        dst.put_slice(&frame.payload);
        Ok(())
    }
}
