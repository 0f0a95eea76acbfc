//! `Transfer-Encoding: chunked` body decoding.
//!
//! Chunk data is yielded as soon as it is buffered rather than once the whole
//! chunk has arrived, so a followed log stream is not held back by the
//! daemon's chunk sizes.

use std::io;

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;

/// Longest chunk-size or trailer line accepted.
const MAX_LINE_BYTES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Size,
    Data { remaining: u64 },
    DataEnd,
    Trailers,
    Done,
}

/// Decoder from a chunked HTTP body to its payload bytes.
#[derive(Debug)]
pub struct ChunkedCodec {
    state: State,
}

impl Default for ChunkedCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedCodec {
    /// A codec positioned before the first chunk-size line.
    #[must_use]
    pub const fn new() -> Self {
        Self { state: State::Size }
    }

    /// Whether the terminating zero-length chunk has been seen.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self.state, State::Done)
    }
}

fn invalid(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("chunked body: {message}"))
}

fn take_line(src: &mut BytesMut) -> io::Result<Option<BytesMut>> {
    let Some(end) = src.windows(2).position(|pair| pair == b"\r\n") else {
        if src.len() > MAX_LINE_BYTES {
            return Err(invalid("line too long"));
        }
        return Ok(None);
    };
    let line = src.split_to(end);
    src.advance(2);
    Ok(Some(line))
}

fn parse_size(line: &[u8]) -> io::Result<u64> {
    let digits = line
        .split(|byte| *byte == b';')
        .next()
        .unwrap_or_default();
    let text = std::str::from_utf8(digits).map_err(|_| invalid("non-ASCII chunk size"))?;
    u64::from_str_radix(text.trim(), 16).map_err(|_| invalid("malformed chunk size"))
}

impl Decoder for ChunkedCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<Bytes>> {
        loop {
            match self.state {
                State::Size => {
                    let Some(line) = take_line(src)? else {
                        return Ok(None);
                    };
                    let size = parse_size(&line)?;
                    self.state = if size == 0 {
                        State::Trailers
                    } else {
                        State::Data { remaining: size }
                    };
                }
                State::Data { remaining } => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let available = usize::try_from(remaining)
                        .map_or(src.len(), |wanted| wanted.min(src.len()));
                    let data = src.split_to(available).freeze();
                    let consumed = u64::try_from(available).unwrap_or(u64::MAX);
                    let left = remaining.saturating_sub(consumed);
                    self.state = if left == 0 {
                        State::DataEnd
                    } else {
                        State::Data { remaining: left }
                    };
                    return Ok(Some(data));
                }
                State::DataEnd => {
                    let Some(terminator) = src.first_chunk::<2>() else {
                        return Ok(None);
                    };
                    if terminator != b"\r\n" {
                        return Err(invalid("missing CRLF after chunk data"));
                    }
                    src.advance(2);
                    self.state = State::Size;
                }
                State::Trailers => {
                    let Some(line) = take_line(src)? else {
                        return Ok(None);
                    };
                    if line.is_empty() {
                        self.state = State::Done;
                    }
                }
                State::Done => {
                    src.clear();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> io::Result<Option<Bytes>> {
        if let Some(data) = self.decode(src)? {
            return Ok(Some(data));
        }
        if self.is_done() {
            Ok(None)
        } else {
            Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "chunked body ended before the final chunk",
            ))
        }
    }
}
