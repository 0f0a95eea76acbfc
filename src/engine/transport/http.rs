//! HTTP/1.1 exchange over a dialled engine socket.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use tracing::debug;

use super::{
    ChunkedCodec, ConnectionIo, DaemonConnection, DaemonTransport, Endpoint, OpenConnectionFuture,
    StreamRequest,
};
use crate::engine::connection::classify_dial_error;
use crate::error::TransportError;

/// Default time allowed for dialling the engine socket.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Largest response head accepted.
const MAX_HEAD_BYTES: usize = 16 * 1024;

/// Most response headers parsed.
const MAX_HEADERS: usize = 64;

/// Largest error body read to extract the daemon's message.
const MAX_ERROR_BODY_BYTES: u64 = 64 * 1024;

const USER_AGENT: &str = concat!("podlink/", env!("CARGO_PKG_VERSION"));

/// Dials the engine socket once per request.
#[derive(Debug, Clone)]
pub struct SocketTransport {
    endpoint: Endpoint,
    connect_timeout: Duration,
}

impl SocketTransport {
    /// Create a transport for `endpoint` with the default connect timeout.
    #[must_use]
    pub const fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    /// Parse `socket` and create a transport for it.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::UnsupportedEndpoint`] when `socket` cannot be
    /// served.
    pub fn from_socket(socket: &str) -> Result<Self, TransportError> {
        Endpoint::parse(socket).map(Self::new)
    }

    /// Override the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// The endpoint this transport dials.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn dial(&self) -> Result<Box<dyn ConnectionIo>, TransportError> {
        let attempt = async {
            match &self.endpoint {
                #[cfg(unix)]
                Endpoint::Unix(path) => tokio::net::UnixStream::connect(path)
                    .await
                    .map(|stream| Box::new(stream) as Box<dyn ConnectionIo>),
                #[cfg(not(unix))]
                Endpoint::Unix(_) => Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "unix sockets are not available on this platform",
                )),
                Endpoint::Tcp { host, port } => {
                    tokio::net::TcpStream::connect((host.as_str(), *port))
                        .await
                        .map(|stream| Box::new(stream) as Box<dyn ConnectionIo>)
                }
            }
        };

        match tokio::time::timeout(self.connect_timeout, attempt).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(error)) => Err(classify_dial_error(&self.endpoint, &error)),
            Err(_) => Err(TransportError::ConnectTimeout {
                endpoint: self.endpoint.to_string(),
                seconds: self.connect_timeout.as_secs(),
            }),
        }
    }
}

impl DaemonTransport for SocketTransport {
    fn open<'a>(&'a self, request: &'a StreamRequest) -> OpenConnectionFuture<'a> {
        Box::pin(async move {
            let stream = self.dial().await?;
            debug!(endpoint = %self.endpoint, path = request.path(), "dialled engine");
            exchange(stream, request, &self.endpoint.host_header()).await
        })
    }
}

/// Write `request` to `stream`, read the response head and return the body.
///
/// # Errors
///
/// Returns [`TransportError::Status`] for error statuses and
/// [`TransportError::InvalidResponse`] for anything that is not a usable
/// HTTP response.
pub(crate) async fn exchange<S>(
    mut stream: S,
    request: &StreamRequest,
    host: &str,
) -> Result<DaemonConnection, TransportError>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    stream.write_all(&render_request(request, host)?).await?;
    stream.flush().await?;

    let (head, leftover) = read_head(&mut stream).await?;
    debug!(status = head.status, upgrade = request.is_upgrade(), "daemon responded");
    let body = Prefixed {
        prefix: leftover,
        inner: stream,
    };

    if request.is_upgrade() && matches!(head.status, 101 | 200) {
        return Ok(DaemonConnection::new(body));
    }
    if head.status >= 400 {
        let message = read_error_message(body_reader(&head, body)).await;
        return Err(TransportError::Status {
            status: head.status,
            message,
        });
    }
    if (200..300).contains(&head.status) {
        return Ok(DaemonConnection::read_only(body_reader(&head, body)));
    }
    Err(TransportError::InvalidResponse {
        message: format!("unexpected status {}", head.status),
    })
}

/// Serialise the request line, headers and body.
fn render_request(request: &StreamRequest, host: &str) -> Result<Vec<u8>, TransportError> {
    let body = request
        .body()
        .map(serde_json::to_vec)
        .transpose()
        .map_err(|error| TransportError::InvalidResponse {
            message: format!("request body is not serialisable: {error}"),
        })?;

    let mut head = format!(
        "{} {} HTTP/1.1\r\nHost: {host}\r\nUser-Agent: {USER_AGENT}\r\n",
        request.method().as_str(),
        request.target(),
    );
    if request.is_upgrade() {
        head.push_str("Connection: Upgrade\r\nUpgrade: tcp\r\n");
    } else {
        head.push_str("Connection: close\r\n");
    }
    if let Some(bytes) = &body {
        head.push_str("Content-Type: application/json\r\n");
        head.push_str(&format!("Content-Length: {}\r\n", bytes.len()));
    }
    head.push_str("\r\n");

    let mut rendered = head.into_bytes();
    if let Some(bytes) = body {
        rendered.extend_from_slice(&bytes);
    }
    Ok(rendered)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ResponseHead {
    status: u16,
    content_length: Option<u64>,
    chunked: bool,
}

fn invalid_response(message: impl Into<String>) -> TransportError {
    TransportError::InvalidResponse {
        message: message.into(),
    }
}

/// Try to parse a complete head from `buffer`, returning its length.
fn parse_head(buffer: &[u8]) -> Result<Option<(usize, ResponseHead)>, TransportError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut response = httparse::Response::new(&mut headers);
    let length = match response.parse(buffer) {
        Ok(httparse::Status::Complete(length)) => length,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(error) => return Err(invalid_response(error.to_string())),
    };

    let status = response
        .code
        .ok_or_else(|| invalid_response("missing status code"))?;
    let chunked = header_value(response.headers, "transfer-encoding")
        .is_some_and(|value| value.to_ascii_lowercase().contains("chunked"));
    let content_length = header_value(response.headers, "content-length")
        .map(|value| {
            value
                .parse::<u64>()
                .map_err(|_| invalid_response(format!("invalid content-length '{value}'")))
        })
        .transpose()?;

    Ok(Some((
        length,
        ResponseHead {
            status,
            content_length,
            chunked,
        },
    )))
}

fn header_value<'h>(headers: &'h [httparse::Header<'_>], name: &str) -> Option<&'h str> {
    headers
        .iter()
        .find(|candidate| candidate.name.eq_ignore_ascii_case(name))
        .and_then(|found| std::str::from_utf8(found.value).ok())
        .map(str::trim)
}

async fn read_head<S: AsyncRead + Unpin>(
    stream: &mut S,
) -> Result<(ResponseHead, Bytes), TransportError> {
    let mut buffer = BytesMut::with_capacity(1024);
    loop {
        if let Some((length, head)) = parse_head(&buffer)? {
            buffer.advance(length);
            return Ok((head, buffer.freeze()));
        }
        if buffer.len() >= MAX_HEAD_BYTES {
            return Err(invalid_response("response head too large"));
        }
        if stream.read_buf(&mut buffer).await? == 0 {
            return Err(invalid_response(
                "connection closed before the response head was complete",
            ));
        }
    }
}

type BodyReader = Box<dyn AsyncRead + Send + Unpin>;

fn body_reader<S>(head: &ResponseHead, body: Prefixed<S>) -> BodyReader
where
    S: AsyncRead + Send + Unpin + 'static,
{
    if head.chunked {
        Box::new(StreamReader::new(FramedRead::new(body, ChunkedCodec::new())))
    } else if let Some(length) = head.content_length {
        Box::new(body.take(length))
    } else {
        Box::new(body)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

async fn read_error_message(body: BodyReader) -> String {
    let mut raw = Vec::new();
    if let Err(error) = body.take(MAX_ERROR_BODY_BYTES).read_to_end(&mut raw).await {
        debug!(%error, "failed reading daemon error body");
    }
    serde_json::from_slice::<ErrorBody>(&raw).map_or_else(
        |_| String::from_utf8_lossy(&raw).trim().to_owned(),
        |parsed| parsed.message,
    )
}

/// A stream whose first bytes were already read while parsing the head.
struct Prefixed<S> {
    prefix: Bytes,
    inner: S,
}

impl<S: AsyncRead + Unpin> AsyncRead for Prefixed<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.prefix.is_empty() {
            return Pin::new(&mut this.inner).poll_read(cx, buf);
        }
        let count = this.prefix.len().min(buf.remaining());
        buf.put_slice(&this.prefix.split_to(count));
        Poll::Ready(Ok(()))
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Prefixed<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
