//! Maps caller cancellation onto forced closure of a daemon connection.
//!
//! Both halves of a split connection are wrapped in [`Guarded`]. Each guarded
//! half polls its own wait future alongside the underlying I/O. When the
//! caller's token fires or the deadline passes, the first cause is recorded,
//! every guarded half drops its inner half and all further reads and writes
//! fail with [`io::ErrorKind::ConnectionAborted`]. The session loops observe
//! that as an ordinary I/O error, and [`CancellationBridge::outcome`] turns it
//! back into the recorded cause.

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::StreamError;

/// Caller-side stop signal: a cancellation token plus an optional timeout.
///
/// The timeout is measured from the moment a session or subscription starts.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    token: CancellationToken,
    timeout: Option<Duration>,
}

impl CancelSignal {
    /// A signal that only fires when [`Self::cancel`] is called.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing token, typically a child of an application-wide one.
    #[must_use]
    pub const fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            timeout: None,
        }
    }

    /// Add a deadline relative to the start of the call.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The underlying token.
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The configured timeout, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Fire the signal.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

/// Why a bridge forced its connection closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// The token fired.
    Cancelled,
    /// The deadline passed.
    DeadlineExceeded {
        /// The timeout that elapsed.
        after: Duration,
    },
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("cancelled"),
            Self::DeadlineExceeded { after } => write!(f, "deadline of {after:?} exceeded"),
        }
    }
}

impl From<CancelCause> for StreamError {
    fn from(cause: CancelCause) -> Self {
        match cause {
            CancelCause::Cancelled => Self::Cancelled,
            CancelCause::DeadlineExceeded { after } => Self::DeadlineExceeded {
                millis: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
            },
        }
    }
}

struct BridgeState {
    token: CancellationToken,
    deadline: Option<(Instant, Duration)>,
    close: CancellationToken,
    cause: OnceLock<CancelCause>,
}

impl BridgeState {
    fn record(&self, cause: CancelCause) {
        if self.cause.set(cause).is_ok() {
            debug!(%cause, "closing daemon connection");
        }
        self.close.cancel();
    }
}

/// Resolves once the bridge closes, recording the cause if it was external.
#[expect(
    clippy::integer_division_remainder_used,
    reason = "false positive triggered inside tokio::select! expansion"
)]
async fn closed(state: Arc<BridgeState>) {
    let cause = tokio::select! {
        biased;
        () = state.close.cancelled() => None,
        () = state.token.cancelled() => Some(CancelCause::Cancelled),
        after = deadline_elapsed(state.deadline) => Some(CancelCause::DeadlineExceeded { after }),
    };
    if let Some(found) = cause {
        state.record(found);
    }
}

async fn deadline_elapsed(deadline: Option<(Instant, Duration)>) -> Duration {
    match deadline {
        Some((at, after)) => {
            sleep_until(at).await;
            after
        }
        None => std::future::pending().await,
    }
}

/// Shared closure state for one session or subscription.
///
/// Cloning yields another handle onto the same state.
#[derive(Clone)]
pub struct CancellationBridge {
    state: Arc<BridgeState>,
}

impl fmt::Debug for CancellationBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationBridge")
            .field("closed", &self.state.close.is_cancelled())
            .field("cause", &self.state.cause.get())
            .finish_non_exhaustive()
    }
}

impl CancellationBridge {
    /// Arm a bridge for `signal`; the deadline, if any, starts now.
    #[must_use]
    pub fn new(signal: &CancelSignal) -> Self {
        let deadline = signal
            .timeout()
            .map(|after| (Instant::now() + after, after));
        Self {
            state: Arc::new(BridgeState {
                token: signal.token().clone(),
                deadline,
                close: CancellationToken::new(),
                cause: OnceLock::new(),
            }),
        }
    }

    /// Wrap one connection half so that it is dropped when the bridge closes.
    #[must_use]
    pub fn guard<H>(&self, half: H) -> Guarded<H> {
        Guarded {
            inner: Some(half),
            closed: Box::pin(closed(Arc::clone(&self.state))),
        }
    }

    /// Close every guarded half. Idempotent.
    pub fn close(&self) {
        self.state.close.cancel();
    }

    /// Returns whether the bridge has closed for any reason.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.close.is_cancelled()
    }

    /// The recorded cancellation cause, if the caller gave up.
    #[must_use]
    pub fn cause(&self) -> Option<CancelCause> {
        if let Some(cause) = self.state.cause.get() {
            return Some(*cause);
        }
        self.state
            .token
            .is_cancelled()
            .then_some(CancelCause::Cancelled)
    }

    /// Replace a failure with the cancellation cause when one was recorded.
    ///
    /// # Errors
    ///
    /// Returns the cancellation error when the caller gave up, otherwise
    /// whatever `result` carried.
    pub fn outcome<T>(&self, result: Result<T, StreamError>) -> Result<T, StreamError> {
        result.map_err(|error| self.cause().map_or(error, StreamError::from))
    }

    /// Run `future` unless the signal fires first.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Cancelled`] or [`StreamError::DeadlineExceeded`]
    /// when the signal wins.
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "false positive triggered inside tokio::select! expansion"
    )]
    pub async fn race<F: Future>(&self, future: F) -> Result<F::Output, StreamError> {
        tokio::select! {
            biased;
            output = future => Ok(output),
            () = closed(Arc::clone(&self.state)) => {
                Err(StreamError::from(self.cause().unwrap_or(CancelCause::Cancelled)))
            }
        }
    }
}

fn aborted() -> io::Error {
    io::Error::new(
        io::ErrorKind::ConnectionAborted,
        "connection closed by cancellation",
    )
}

/// A connection half that is dropped once its bridge closes.
pub struct Guarded<H> {
    inner: Option<H>,
    closed: Pin<Box<dyn Future<Output = ()> + Send>>,
}

impl<H> Guarded<H> {
    /// Polls the close future while the inner half is still held. Returns the
    /// half when it is still usable.
    fn live(&mut self, cx: &mut Context<'_>) -> Option<&mut H> {
        if self.inner.is_some() && self.closed.as_mut().poll(cx).is_ready() {
            self.inner = None;
        }
        self.inner.as_mut()
    }
}

impl<H: AsyncRead + Unpin> AsyncRead for Guarded<H> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut().live(cx) {
            Some(inner) => Pin::new(inner).poll_read(cx, buf),
            None => Poll::Ready(Err(aborted())),
        }
    }
}

impl<H: AsyncWrite + Unpin> AsyncWrite for Guarded<H> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut().live(cx) {
            Some(inner) => Pin::new(inner).poll_write(cx, buf),
            None => Poll::Ready(Err(aborted())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().live(cx) {
            Some(inner) => Pin::new(inner).poll_flush(cx),
            None => Poll::Ready(Err(aborted())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().live(cx) {
            Some(inner) => Pin::new(inner).poll_shutdown(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}
