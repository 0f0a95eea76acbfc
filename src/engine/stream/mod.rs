//! Attached-stream engine: framing, duplex sessions, record streams and
//! cancellation.

mod cancel;
mod frame;
mod records;
mod session;

pub use self::cancel::{CancelCause, CancelSignal, CancellationBridge, Guarded};
pub use self::frame::{
    Frame, FrameCodec, FrameHeader, HEADER_LEN, StreamType, decode_header, encode_header,
};
pub use self::records::{JsonRecordCodec, RecordConfig, RecordStream};
pub use self::session::{
    DuplexSession, InputSource, OutputSink, ReadySignal, SessionConfig, StreamMode,
};
