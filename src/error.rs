//! Semantic error types for the podlink library.
//!
//! This module defines the error hierarchy for podlink, following the principle of
//! using semantic error enums (via `thiserror`) for conditions the caller might
//! inspect, retry, or map to an exit status, while reserving opaque errors
//! (`eyre::Report`) for the application boundary.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::engine::StreamType;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be parsed.
    #[error("failed to parse configuration file: {message}")]
    ParseError {
        /// A description of the parse error.
        message: String,
    },

    /// A required configuration value is missing.
    #[error("missing required configuration: {field}")]
    MissingRequired {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// The reason the value is invalid.
        reason: String,
    },

    /// The `OrthoConfig` library returned an error during configuration loading.
    #[error("configuration loading failed: {0}")]
    OrthoConfig(Arc<ortho_config::OrthoError>),
}

/// Errors raised by the CRUD side of the engine client (Bollard).
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Failed to connect to the container engine socket.
    #[error("failed to connect to container engine: {message}")]
    ConnectionFailed {
        /// A description of the connection failure.
        message: String,
    },

    /// The container engine socket was not found.
    #[error("container engine socket not found: {path}")]
    SocketNotFound {
        /// The path where the socket was expected.
        path: PathBuf,
    },

    /// Permission denied when accessing the container engine socket.
    #[error("permission denied accessing container socket: {path}")]
    PermissionDenied {
        /// The path to the socket.
        path: PathBuf,
    },

    /// Failed to execute a command in a container.
    #[error("failed to execute command in container '{container_id}': {message}")]
    ExecFailed {
        /// The ID of the container.
        container_id: String,
        /// A description of the execution failure.
        message: String,
    },
}

/// Violations of the 8-byte multiplexed frame protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The header carried a stream tag outside `{0, 1, 2}`.
    #[error("unknown stream type {tag} in frame header")]
    UnknownStreamType {
        /// The offending tag byte.
        tag: u8,
    },

    /// The connection ended part-way through a frame header.
    #[error("connection closed after {available} of 8 frame header bytes")]
    TruncatedHeader {
        /// Header bytes received before the connection closed.
        available: usize,
    },

    /// The connection ended before the announced payload was complete.
    #[error("connection closed after {received} of {expected} payload bytes")]
    TruncatedPayload {
        /// Payload length announced by the header.
        expected: u32,
        /// Payload bytes received before the connection closed.
        received: usize,
    },

    /// The payload length cannot be represented on this platform.
    #[error("frame payload of {length} bytes exceeds the supported size")]
    PayloadTooLarge {
        /// The announced or attempted payload length.
        length: u64,
    },

    /// The underlying connection failed while frames were being read.
    #[error("frame transport failed: {message}")]
    Io {
        /// A description of the I/O failure.
        message: String,
    },
}

impl From<io::Error> for FrameError {
    fn from(error: io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}

/// Failures of the transport collaborator that opens daemon connections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The daemon socket does not exist.
    #[error("container engine socket not found: {path}")]
    SocketNotFound {
        /// The socket path that was dialled.
        path: PathBuf,
    },

    /// The daemon socket exists but may not be opened.
    #[error("permission denied accessing container socket: {path}")]
    PermissionDenied {
        /// The socket path that was dialled.
        path: PathBuf,
    },

    /// Dialling the endpoint failed for another reason.
    #[error("failed to connect to '{endpoint}': {message}")]
    Connect {
        /// The endpoint that was dialled.
        endpoint: String,
        /// A description of the connection failure.
        message: String,
    },

    /// Dialling the endpoint did not complete in time.
    #[error("connecting to '{endpoint}' timed out after {seconds} seconds")]
    ConnectTimeout {
        /// The endpoint that was dialled.
        endpoint: String,
        /// The timeout duration in seconds.
        seconds: u64,
    },

    /// The endpoint scheme cannot be served by the stream transport.
    #[error("unsupported engine endpoint '{endpoint}': {reason}")]
    UnsupportedEndpoint {
        /// The endpoint as configured.
        endpoint: String,
        /// Why the endpoint is rejected.
        reason: String,
    },

    /// Reading from or writing to the connection failed.
    #[error("connection I/O failed: {message}")]
    Io {
        /// A description of the I/O failure.
        message: String,
    },

    /// The daemon answered with something that is not a valid HTTP response.
    #[error("invalid daemon response: {message}")]
    InvalidResponse {
        /// A description of what was wrong with the response.
        message: String,
    },

    /// The daemon answered with an error status.
    #[error("daemon returned status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Error message reported by the daemon.
        message: String,
    },
}

impl From<io::Error> for TransportError {
    fn from(error: io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}

/// Terminal outcome of an attached stream session or record subscription.
///
/// Exactly one of these is returned per call and reflects the first
/// definitive cause. Nothing here is retried internally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The target resource does not exist or is not running.
    #[error("{}", no_such_resource_message(.id, .message.as_deref()))]
    NoSuchResource {
        /// The resource identifier that was requested.
        id: String,
        /// Daemon-provided detail, when available.
        message: Option<String>,
    },

    /// The request could not be built from the supplied options.
    #[error("invalid stream request field '{field}': {reason}")]
    InvalidRequest {
        /// The offending option.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The multiplexed stream violated the framing protocol.
    #[error("malformed frame: {0}")]
    MalformedFrame(FrameError),

    /// Connecting, reading, or writing the daemon connection failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A caller-provided sink rejected a payload chunk.
    #[error("failed writing {channel} output: {message}")]
    SinkWrite {
        /// The channel whose sink failed.
        channel: StreamType,
        /// A description of the write failure.
        message: String,
    },

    /// A streamed record could not be decoded.
    #[error("failed to decode streamed record: {message}")]
    Decode {
        /// A description of the decode failure.
        message: String,
    },

    /// The caller's cancel token fired.
    #[error("stream cancelled")]
    Cancelled,

    /// The caller's deadline passed.
    #[error("stream deadline exceeded after {millis} ms")]
    DeadlineExceeded {
        /// The configured timeout in milliseconds.
        millis: u64,
    },
}

fn no_such_resource_message(id: &str, message: Option<&str>) -> String {
    message.map_or_else(|| format!("no such resource: {id}"), str::to_owned)
}

impl From<FrameError> for StreamError {
    fn from(error: FrameError) -> Self {
        match error {
            FrameError::Io { message } => Self::Transport(TransportError::Io { message }),
            other => Self::MalformedFrame(other),
        }
    }
}

impl From<io::Error> for StreamError {
    fn from(error: io::Error) -> Self {
        Self::Transport(TransportError::from(error))
    }
}

/// Top-level error type for the podlink library.
///
/// This enum aggregates all domain-specific errors into a single type. At the
/// application boundary (main.rs), these errors are converted to
/// `eyre::Report` for human-readable reporting.
#[derive(Debug, Error)]
pub enum PodlinkError {
    /// An error occurred during configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error occurred during container operations.
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// An attached stream or record subscription failed.
    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// A specialised `Result` type for podlink operations.
pub type Result<T> = std::result::Result<T, PodlinkError>;
