//! Duplex attach sessions.
//!
//! A session owns one daemon connection for the duration of [`DuplexSession::run`]:
//! the caller's task runs the read loop, an optional spawned task forwards
//! input, and a [`CancellationBridge`] tears both down when the caller gives
//! up. The connection is dropped on every exit path and never reused.

use std::fmt;
use std::io;
use std::pin::Pin;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::codec::{BytesCodec, FramedRead};
use tracing::{debug, trace};

use super::cancel::{CancelSignal, CancellationBridge, Guarded};
use super::frame::{Frame, FrameCodec, StreamType};
use crate::engine::transport::{DaemonConnection, DaemonTransport, StreamRequest};
use crate::error::StreamError;

/// Owned byte source forwarded to the daemon.
pub type InputSource = Pin<Box<dyn AsyncRead + Send>>;

/// Borrowed destination for one output channel.
pub type OutputSink<'a> = &'a mut (dyn AsyncWrite + Send + Unpin);

/// How the daemon lays out the response stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// One undifferentiated byte stream, as sent for TTY sessions.
    Raw,
    /// Multiplexed 8-byte-header frames carrying stdout and stderr.
    Framed,
}

impl StreamMode {
    /// Raw for TTY sessions, framed otherwise.
    #[must_use]
    pub const fn for_tty(tty: bool) -> Self {
        if tty { Self::Raw } else { Self::Framed }
    }
}

/// One-shot notification that the session is ready for traffic.
#[derive(Debug)]
pub struct ReadySignal(oneshot::Sender<()>);

impl ReadySignal {
    /// Wrap an existing sender.
    #[must_use]
    pub const fn new(sender: oneshot::Sender<()>) -> Self {
        Self(sender)
    }

    /// A signal and the receiver that observes it.
    #[must_use]
    pub fn channel() -> (Self, oneshot::Receiver<()>) {
        let (sender, receiver) = oneshot::channel();
        (Self(sender), receiver)
    }

    fn fire(self) {
        if self.0.send(()).is_err() {
            debug!("readiness receiver dropped before the session became ready");
        }
    }
}

/// Inputs, outputs and control for one session.
pub struct SessionConfig<'a> {
    mode: StreamMode,
    input: Option<InputSource>,
    output: Option<OutputSink<'a>>,
    error: Option<OutputSink<'a>>,
    ready: Vec<ReadySignal>,
    cancel: CancelSignal,
}

impl fmt::Debug for SessionConfig<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("mode", &self.mode)
            .field("input", &self.input.is_some())
            .field("output", &self.output.is_some())
            .field("error", &self.error.is_some())
            .field("ready", &self.ready.len())
            .field("cancel", &self.cancel)
            .finish()
    }
}

impl<'a> SessionConfig<'a> {
    /// A session in `mode` with no input, no sinks and a manual signal.
    #[must_use]
    pub fn new(mode: StreamMode) -> Self {
        Self {
            mode,
            input: None,
            output: None,
            error: None,
            ready: Vec::new(),
            cancel: CancelSignal::new(),
        }
    }

    /// Forward `input` to the daemon until it reaches end of input.
    #[must_use]
    pub fn with_input(mut self, input: impl AsyncRead + Send + 'static) -> Self {
        self.input = Some(Box::pin(input));
        self
    }

    /// Deliver stdout (or the whole raw stream) to `sink`.
    #[must_use]
    pub fn with_output(mut self, sink: OutputSink<'a>) -> Self {
        self.output = Some(sink);
        self
    }

    /// Deliver stderr to `sink`. Ignored in raw mode.
    #[must_use]
    pub fn with_error(mut self, sink: OutputSink<'a>) -> Self {
        self.error = Some(sink);
        self
    }

    /// Fire `ready` once the connection is open and input is armed.
    ///
    /// Signals accumulate; every one added fires.
    #[must_use]
    pub fn with_ready(mut self, ready: ReadySignal) -> Self {
        self.ready.push(ready);
        self
    }

    /// Replace the stop signal.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// The configured stream layout.
    #[must_use]
    pub const fn mode(&self) -> StreamMode {
        self.mode
    }
}

/// Routes payloads to the caller's sinks.
struct Demux<'a> {
    output: Option<OutputSink<'a>>,
    error: Option<OutputSink<'a>>,
}

impl Demux<'_> {
    const fn is_empty(&self) -> bool {
        self.output.is_none() && self.error.is_none()
    }

    async fn pump<R>(&mut self, reader: R, mode: StreamMode) -> Result<(), StreamError>
    where
        R: AsyncRead + Unpin,
    {
        match mode {
            StreamMode::Raw => self.pump_raw(reader).await,
            StreamMode::Framed => self.pump_framed(reader).await,
        }
    }

    async fn pump_raw<R: AsyncRead + Unpin>(&mut self, reader: R) -> Result<(), StreamError> {
        let mut chunks = FramedRead::new(reader, BytesCodec::new());
        while let Some(chunk) = chunks.next().await {
            let bytes = chunk?;
            deliver(self.output.as_deref_mut(), StreamType::Stdout, &bytes).await?;
        }
        Ok(())
    }

    async fn pump_framed<R: AsyncRead + Unpin>(&mut self, reader: R) -> Result<(), StreamError> {
        let mut frames = FramedRead::new(reader, FrameCodec::new());
        while let Some(decoded) = frames.next().await {
            let Frame { stream, payload } = decoded?;
            trace!(%stream, length = payload.len(), "routing frame");
            match stream {
                StreamType::Stdout => {
                    deliver(self.output.as_deref_mut(), stream, &payload).await?;
                }
                StreamType::Stderr => {
                    deliver(self.error.as_deref_mut(), stream, &payload).await?;
                }
                StreamType::Stdin => {}
            }
        }
        Ok(())
    }
}

async fn deliver<W>(
    sink: Option<&mut W>,
    channel: StreamType,
    payload: &[u8],
) -> Result<(), StreamError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let Some(writer) = sink else {
        return Ok(());
    };
    if payload.is_empty() {
        return Ok(());
    }
    let failed = |error: io::Error| StreamError::SinkWrite {
        channel,
        message: error.to_string(),
    };
    writer.write_all(payload).await.map_err(failed)?;
    writer.flush().await.map_err(failed)
}

type GuardedWriter = Guarded<WriteHalf<DaemonConnection>>;

enum Ended {
    Output(Result<(), StreamError>),
    Input(Result<(), JoinError>),
}

/// The spawned write loop.
struct InputForwarder {
    task: Option<JoinHandle<()>>,
}

impl InputForwarder {
    fn spawn(input: InputSource, writer: GuardedWriter) -> Self {
        Self {
            task: Some(tokio::spawn(forward_input(input, writer))),
        }
    }

    /// Run `read_loop`, ending early once input is exhausted.
    ///
    /// Input that stopped because the bridge closed reports the recorded
    /// cause rather than success.
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "false positive triggered inside tokio::select! expansion"
    )]
    async fn race_input<F>(
        &mut self,
        bridge: &CancellationBridge,
        read_loop: F,
    ) -> Result<(), StreamError>
    where
        F: std::future::Future<Output = Result<(), StreamError>>,
    {
        let Some(task) = self.task.as_mut() else {
            return read_loop.await;
        };
        let ended = tokio::select! {
            result = read_loop => Ended::Output(result),
            joined = task => Ended::Input(joined),
        };
        match ended {
            Ended::Output(result) => result,
            Ended::Input(joined) => {
                self.task = None;
                if let Err(error) = joined {
                    debug!(%error, "input task failed");
                }
                bridge.cause().map_or(Ok(()), |cause| Err(StreamError::from(cause)))
            }
        }
    }

    async fn stop(mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        task.abort();
        match task.await {
            Ok(()) => {}
            Err(error) if error.is_cancelled() => trace!("input task aborted"),
            Err(error) => debug!(%error, "input task failed"),
        }
    }
}

async fn forward_input(mut input: InputSource, mut writer: GuardedWriter) {
    match copy_then_close(&mut input, &mut writer).await {
        Ok(bytes) => debug!(bytes, "input reached end of input"),
        Err(error) => debug!(%error, "input forwarding stopped"),
    }
}

async fn copy_then_close(input: &mut InputSource, writer: &mut GuardedWriter) -> io::Result<u64> {
    let copied = tokio::io::copy(input, writer).await?;
    writer.flush().await?;
    writer.shutdown().await?;
    Ok(copied)
}

/// Runs attach, logs and exec-start streams.
#[derive(Debug, Clone, Copy)]
pub struct DuplexSession;

impl DuplexSession {
    /// Open `request` and pump the stream until the remote closes, an
    /// unrecoverable error occurs, or the signal fires.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Transport`] when the connection cannot be
    /// opened or fails, [`StreamError::MalformedFrame`] when framed output
    /// violates the protocol, [`StreamError::SinkWrite`] when a sink rejects
    /// a payload, and [`StreamError::Cancelled`] or
    /// [`StreamError::DeadlineExceeded`] when the caller gives up.
    pub async fn run<T>(
        transport: &T,
        request: &StreamRequest,
        config: SessionConfig<'_>,
    ) -> Result<(), StreamError>
    where
        T: DaemonTransport + ?Sized,
    {
        let SessionConfig {
            mode,
            input,
            output,
            error,
            ready,
            cancel,
        } = config;
        let bridge = CancellationBridge::new(&cancel);
        let demux = Demux { output, error };
        debug!(path = request.path(), ?mode, input = input.is_some(), "starting session");

        let result = match bridge.race(transport.open(request)).await {
            Ok(Ok(connection)) => drive(&bridge, connection, mode, input, demux, ready).await,
            Ok(Err(failure)) => Err(StreamError::from(failure)),
            Err(cancelled) => Err(cancelled),
        };
        bridge.close();

        let outcome = bridge.outcome(result);
        match &outcome {
            Ok(()) => debug!(path = request.path(), "session finished"),
            Err(failure) => debug!(path = request.path(), %failure, "session ended"),
        }
        outcome
    }
}

async fn drive(
    bridge: &CancellationBridge,
    connection: DaemonConnection,
    mode: StreamMode,
    input: Option<InputSource>,
    mut demux: Demux<'_>,
    ready: Vec<ReadySignal>,
) -> Result<(), StreamError> {
    let (read_half, write_half) = tokio::io::split(connection);
    let reader: Guarded<ReadHalf<DaemonConnection>> = bridge.guard(read_half);
    let mut forwarder = input.map(|source| InputForwarder::spawn(source, bridge.guard(write_half)));

    for signal in ready {
        signal.fire();
    }

    let input_only = demux.is_empty();
    let result = match forwarder.as_mut() {
        Some(active) if input_only => {
            active
                .race_input(bridge, demux.pump(reader, mode))
                .await
        }
        _ => demux.pump(reader, mode).await,
    };

    if let Some(active) = forwarder {
        active.stop().await;
    }
    result
}
