//! Opening raw daemon connections for the stream engine.
//!
//! The stream engine never talks HTTP itself. It hands a [`StreamRequest`] to
//! a [`DaemonTransport`] and receives a [`DaemonConnection`]: an owned byte
//! channel positioned at the start of the response body (or of the raw stream
//! for upgraded requests). Dropping the connection closes it.
//!
//! [`SocketTransport`] dials the configured engine socket. [`MemoryTransport`]
//! serves pre-arranged in-memory connections, which is how the engine is
//! exercised without a daemon.

mod chunked;
mod endpoint;
mod http;
mod memory;

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::error::TransportError;

pub use chunked::ChunkedCodec;
pub use endpoint::Endpoint;
pub use http::SocketTransport;
pub use memory::MemoryTransport;

/// HTTP method of a stream request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
}

impl Method {
    /// Request-line spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// Description of one streamed endpoint call.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    upgrade: bool,
}

impl StreamRequest {
    /// Start a request for `path`, which must begin with `/`.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            upgrade: false,
        }
    }

    /// Shorthand for a `GET` request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// Shorthand for a `POST` request.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    /// Append a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Append `key=1` when `enabled`, and nothing otherwise.
    #[must_use]
    pub fn with_flag(self, key: &str, enabled: bool) -> Self {
        if enabled {
            self.with_query(key, "1")
        } else {
            self
        }
    }

    /// Attach a JSON request body.
    #[must_use]
    pub fn with_json_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Ask the daemon to hijack the connection into a raw stream.
    #[must_use]
    pub const fn upgraded(mut self) -> Self {
        self.upgrade = true;
        self
    }

    /// The request method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// The request path without query.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query parameters in insertion order.
    #[must_use]
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// Looks up the first value for `key`.
    #[must_use]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// The JSON body, if any.
    #[must_use]
    pub const fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    /// Whether the connection should be upgraded.
    #[must_use]
    pub const fn is_upgrade(&self) -> bool {
        self.upgrade
    }

    /// Path plus percent-encoded query string.
    #[must_use]
    pub fn target(&self) -> String {
        let mut target = self.path.clone();
        for (index, (key, value)) in self.query.iter().enumerate() {
            target.push(if index == 0 { '?' } else { '&' });
            push_encoded(&mut target, key);
            target.push('=');
            push_encoded(&mut target, value);
        }
        target
    }
}

fn push_encoded(target: &mut String, component: &str) {
    for byte in component.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            target.push(char::from(byte));
        } else {
            target.push_str(&format!("%{byte:02X}"));
        }
    }
}

/// Byte channel requirements for a daemon connection.
pub trait ConnectionIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ConnectionIo for T {}

/// An open connection to the daemon.
pub struct DaemonConnection {
    io: Box<dyn ConnectionIo>,
}

impl DaemonConnection {
    /// Wrap a bidirectional byte channel.
    #[must_use]
    pub fn new(io: impl ConnectionIo + 'static) -> Self {
        Self { io: Box::new(io) }
    }

    /// Wrap a response body; writes are rejected.
    #[must_use]
    pub fn read_only(body: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self::new(ReadOnly(body))
    }
}

impl std::fmt::Debug for DaemonConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonConnection").finish_non_exhaustive()
    }
}

impl AsyncRead for DaemonConnection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.get_mut().io).poll_read(cx, buf)
    }
}

impl AsyncWrite for DaemonConnection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut *self.get_mut().io).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.get_mut().io).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.get_mut().io).poll_shutdown(cx)
    }
}

struct ReadOnly<R>(R);

impl<R: AsyncRead + Unpin> AsyncRead for ReadOnly<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_read(cx, buf)
    }
}

impl<R: Unpin> AsyncWrite for ReadOnly<R> {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "response body does not accept input",
        )))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Boxed future type returned by [`DaemonTransport::open`].
pub type OpenConnectionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<DaemonConnection, TransportError>> + Send + 'a>>;

/// Source of daemon connections.
///
/// This abstraction keeps the stream engine testable without a live daemon.
pub trait DaemonTransport: Send + Sync {
    /// Send `request` and return the connection positioned at the body.
    fn open<'a>(&'a self, request: &'a StreamRequest) -> OpenConnectionFuture<'a>;
}
