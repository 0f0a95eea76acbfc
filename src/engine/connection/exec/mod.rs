//! Container exec lifecycle with attached/detached modes and terminal handling.
//!
//! Exec instances are created, inspected and resized through Bollard behind a
//! small trait seam so the lifecycle can be unit-tested without a live daemon.
//! Attached output does not go through Bollard: the exec is started on an
//! upgraded `POST /exec/{id}/start` connection driven by a
//! [`DuplexSession`](crate::engine::DuplexSession), so it shares framing,
//! cancellation and readiness with container attach.

mod attached;
mod terminal;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bollard::exec::{CreateExecOptions, CreateExecResults, ResizeExecOptions, StartExecOptions};
use bollard::{Docker, errors::Error as BollardError};
use tokio::io::AsyncRead;
use tokio::time::sleep;
use tracing::debug;

use self::attached::AttachedExec;
use self::terminal::{SystemTerminalSizeProvider, TerminalSizeProvider};
use super::EngineConnector;
use crate::engine::stream::{
    CancelSignal, InputSource, OutputSink, ReadySignal, SessionConfig, StreamMode,
};
use crate::engine::transport::DaemonTransport;
use crate::error::{ConfigError, ContainerError, PodlinkError};

pub(super) const EXEC_INSPECT_POLL_INTERVAL_MS: u64 = 100;

/// Boxed future type returned by [`ContainerExecClient::create_exec`].
pub type CreateExecFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CreateExecResults, BollardError>> + Send + 'a>>;

/// Boxed future type returned by [`ContainerExecClient::start_exec`].
pub type StartExecFuture<'a> = Pin<
    Box<dyn Future<Output = Result<bollard::exec::StartExecResults, BollardError>> + Send + 'a>,
>;

/// Boxed future type returned by [`ContainerExecClient::inspect_exec`].
pub type InspectExecFuture<'a> = Pin<
    Box<
        dyn Future<Output = Result<bollard::models::ExecInspectResponse, BollardError>> + Send + 'a,
    >,
>;

/// Boxed future type returned by [`ContainerExecClient::resize_exec`].
pub type ResizeExecFuture<'a> = Pin<Box<dyn Future<Output = Result<(), BollardError>> + Send + 'a>>;

/// Request/response exec calls delegated to the engine API client.
///
/// `start_exec` is only used for detached execs; attached execs are started
/// on a stream connection instead.
pub trait ContainerExecClient {
    /// Create an exec session in a running container.
    fn create_exec(
        &self,
        container_id: &str,
        options: CreateExecOptions<String>,
    ) -> CreateExecFuture<'_>;

    /// Start a previously created exec session without attaching.
    fn start_exec(&self, exec_id: &str, options: Option<StartExecOptions>) -> StartExecFuture<'_>;

    /// Inspect an exec session for running status and exit code.
    fn inspect_exec(&self, exec_id: &str) -> InspectExecFuture<'_>;

    /// Resize a running exec pseudo-terminal.
    fn resize_exec(&self, exec_id: &str, options: ResizeExecOptions) -> ResizeExecFuture<'_>;
}

impl ContainerExecClient for Docker {
    fn create_exec(
        &self,
        container_id: &str,
        options: CreateExecOptions<String>,
    ) -> CreateExecFuture<'_> {
        let container_id_owned = String::from(container_id);
        Box::pin(async move { Self::create_exec(self, &container_id_owned, options).await })
    }

    fn start_exec(&self, exec_id: &str, options: Option<StartExecOptions>) -> StartExecFuture<'_> {
        let exec_id_owned = String::from(exec_id);
        Box::pin(async move { Self::start_exec(self, &exec_id_owned, options).await })
    }

    fn inspect_exec(&self, exec_id: &str) -> InspectExecFuture<'_> {
        let exec_id_owned = String::from(exec_id);
        Box::pin(async move { Self::inspect_exec(self, &exec_id_owned).await })
    }

    fn resize_exec(&self, exec_id: &str, options: ResizeExecOptions) -> ResizeExecFuture<'_> {
        let exec_id_owned = String::from(exec_id);
        Box::pin(async move { Self::resize_exec(self, &exec_id_owned, options).await })
    }
}

/// Execution mode for container commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Stream the exec's stdio through a duplex session.
    Attached,
    /// Start without stream attachment and wait for exit.
    Detached,
}

impl ExecMode {
    #[must_use]
    const fn is_attached(self) -> bool {
        matches!(self, Self::Attached)
    }
}

/// Parameters required to run a command in a running container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    container_id: String,
    command: Vec<String>,
    env: Option<Vec<String>>,
    mode: ExecMode,
    tty: bool,
}

impl ExecRequest {
    /// Create a new command execution request.
    ///
    /// TTY allocation defaults to off; see [`Self::with_tty`].
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequired` when `container_id` or `command`
    /// is empty, and `ConfigError::InvalidValue` when the executable is blank.
    pub fn new(
        container_id: impl Into<String>,
        command: Vec<String>,
        mode: ExecMode,
    ) -> Result<Self, PodlinkError> {
        let container_id_value = container_id.into();
        let id = String::from(validate_required_field("container", &container_id_value)?);
        let validated_command = validate_command(command)?;

        Ok(Self {
            container_id: id,
            command: validated_command,
            env: None,
            mode,
            tty: false,
        })
    }

    /// Set environment variables in `KEY=value` form.
    #[must_use]
    pub fn with_env(mut self, env: Option<Vec<String>>) -> Self {
        self.env = env.filter(|entries| !entries.is_empty());
        self
    }

    /// Control pseudo-terminal allocation for attached mode.
    ///
    /// Detached mode always forces `tty = false`.
    #[must_use]
    pub const fn with_tty(mut self, tty: bool) -> Self {
        self.tty = self.mode.is_attached() && tty;
        self
    }

    /// Return target container identifier.
    #[must_use]
    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Return command argv entries.
    #[must_use]
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Return configured environment variables.
    #[must_use]
    pub fn env(&self) -> Option<&[String]> {
        self.env.as_deref()
    }

    /// Return execution mode.
    #[must_use]
    pub const fn mode(&self) -> ExecMode {
        self.mode
    }

    /// Return pseudo-terminal allocation mode.
    #[must_use]
    pub const fn tty(&self) -> bool {
        self.tty
    }

    /// Stream layout the daemon uses for this exec's output.
    #[must_use]
    pub const fn stream_mode(&self) -> StreamMode {
        StreamMode::for_tty(self.tty)
    }
}

/// Local stdio wiring for an attached exec. Ignored in detached mode.
#[derive(Default)]
pub struct ExecStdio<'a> {
    input: Option<InputSource>,
    output: Option<OutputSink<'a>>,
    error: Option<OutputSink<'a>>,
    ready: Option<ReadySignal>,
    cancel: CancelSignal,
}

impl fmt::Debug for ExecStdio<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecStdio")
            .field("input", &self.input.is_some())
            .field("output", &self.output.is_some())
            .field("error", &self.error.is_some())
            .field("ready", &self.ready.is_some())
            .field("cancel", &self.cancel)
            .finish()
    }
}

impl<'a> ExecStdio<'a> {
    /// No input, no sinks, manual cancellation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward `input` to the exec's stdin.
    #[must_use]
    pub fn with_input(mut self, input: impl AsyncRead + Send + 'static) -> Self {
        self.input = Some(Box::pin(input));
        self
    }

    /// Deliver the exec's stdout (or merged TTY output) to `sink`.
    #[must_use]
    pub fn with_output(mut self, sink: OutputSink<'a>) -> Self {
        self.output = Some(sink);
        self
    }

    /// Deliver the exec's stderr to `sink`.
    #[must_use]
    pub fn with_error(mut self, sink: OutputSink<'a>) -> Self {
        self.error = Some(sink);
        self
    }

    /// Fire `ready` once the exec's stream is live.
    #[must_use]
    pub fn with_ready(mut self, ready: ReadySignal) -> Self {
        self.ready = Some(ready);
        self
    }

    /// Stop the attached stream when `cancel` fires.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    fn into_session(self, mode: StreamMode) -> SessionConfig<'a> {
        let Self {
            input,
            output,
            error,
            ready,
            cancel,
        } = self;
        let mut config = SessionConfig::new(mode).with_cancel(cancel);
        if let Some(source) = input {
            config = config.with_input(source);
        }
        if let Some(sink) = output {
            config = config.with_output(sink);
        }
        if let Some(sink) = error {
            config = config.with_error(sink);
        }
        if let Some(signal) = ready {
            config = config.with_ready(signal);
        }
        config
    }
}

/// Outcome of a container command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    exec_id: String,
    exit_code: i64,
}

impl ExecResult {
    /// Return daemon-assigned exec identifier.
    #[must_use]
    pub fn exec_id(&self) -> &str {
        &self.exec_id
    }

    /// Return command exit code captured from exec inspect.
    #[must_use]
    pub const fn exit_code(&self) -> i64 {
        self.exit_code
    }
}

impl EngineConnector {
    /// Execute a command in a running container.
    ///
    /// The exec is created through `client`. Attached execs are then started
    /// on a stream opened through `transport` and pumped to `stdio` until the
    /// daemon closes the stream; detached execs are started through `client`.
    /// Either way the exit code is read back with exec inspect.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::ExecFailed` when a lifecycle call fails,
    /// `StreamError` variants when the attached stream fails or is cancelled,
    /// and `ConfigError` variants when the request is invalid.
    pub async fn exec_async<C, T>(
        client: &C,
        transport: &T,
        request: &ExecRequest,
        stdio: ExecStdio<'_>,
    ) -> Result<ExecResult, PodlinkError>
    where
        C: ContainerExecClient,
        T: DaemonTransport + ?Sized,
    {
        Self::exec_with_terminal_size_provider(
            client,
            transport,
            request,
            stdio,
            &SystemTerminalSizeProvider,
        )
        .await
    }

    async fn exec_with_terminal_size_provider<C, T, P>(
        client: &C,
        transport: &T,
        request: &ExecRequest,
        stdio: ExecStdio<'_>,
        size_provider: &P,
    ) -> Result<ExecResult, PodlinkError>
    where
        C: ContainerExecClient,
        T: DaemonTransport + ?Sized,
        P: TerminalSizeProvider,
    {
        let create_result = client
            .create_exec(request.container_id(), build_create_exec_options(request))
            .await
            .map_err(|error| {
                exec_failed(
                    request.container_id(),
                    format!("create exec failed: {error}"),
                )
            })?;
        let exec_id = create_result.id;
        debug!(container = request.container_id(), %exec_id, mode = ?request.mode(), "exec created");

        match request.mode() {
            ExecMode::Attached => {
                let session = stdio.into_session(request.stream_mode());
                AttachedExec {
                    client,
                    request,
                    exec_id: &exec_id,
                    size_provider,
                }
                .run(transport, session)
                .await?;
            }
            ExecMode::Detached => start_detached(client, request, &exec_id).await?,
        }

        let exit_code = wait_for_exit_code_async(client, request.container_id(), &exec_id).await?;
        debug!(%exec_id, exit_code, "exec finished");
        Ok(ExecResult { exec_id, exit_code })
    }
}

async fn start_detached<C: ContainerExecClient>(
    client: &C,
    request: &ExecRequest,
    exec_id: &str,
) -> Result<(), PodlinkError> {
    let options = StartExecOptions {
        detach: true,
        tty: false,
        output_capacity: None,
    };
    let started = client
        .start_exec(exec_id, Some(options))
        .await
        .map_err(|error| {
            exec_failed(
                request.container_id(),
                format!("start exec failed: {error}"),
            )
        })?;

    match started {
        bollard::exec::StartExecResults::Detached => Ok(()),
        bollard::exec::StartExecResults::Attached { .. } => Err(exec_failed(
            request.container_id(),
            "daemon returned attached start result for detached mode",
        )),
    }
}

pub(super) async fn wait_for_exit_code_async<C: ContainerExecClient>(
    client: &C,
    container_id: &str,
    exec_id: &str,
) -> Result<i64, PodlinkError> {
    loop {
        let inspect = client
            .inspect_exec(exec_id)
            .await
            .map_err(|error| exec_failed(container_id, format!("inspect exec failed: {error}")))?;

        if inspect.running.unwrap_or(false) {
            sleep(Duration::from_millis(EXEC_INSPECT_POLL_INTERVAL_MS)).await;
            continue;
        }

        return inspect.exit_code.ok_or_else(|| {
            exec_failed(
                container_id,
                format!("exec session '{exec_id}' completed without an exit code"),
            )
        });
    }
}

fn build_create_exec_options(request: &ExecRequest) -> CreateExecOptions<String> {
    let attached = request.mode().is_attached();
    CreateExecOptions::<String> {
        attach_stdin: Some(attached),
        attach_stdout: Some(attached),
        attach_stderr: Some(attached),
        tty: Some(request.tty()),
        env: request.env().map(<[String]>::to_vec),
        cmd: Some(request.command().to_vec()),
        ..CreateExecOptions::default()
    }
}

fn validate_command(command: Vec<String>) -> Result<Vec<String>, PodlinkError> {
    let Some(executable) = command.first() else {
        return Err(PodlinkError::from(ConfigError::MissingRequired {
            field: String::from("command"),
        }));
    };

    if executable.trim().is_empty() {
        return Err(PodlinkError::from(ConfigError::InvalidValue {
            field: String::from("command"),
            reason: String::from("command executable must not be empty"),
        }));
    }

    Ok(command)
}

fn validate_required_field<'a>(field: &str, value: &'a str) -> Result<&'a str, PodlinkError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(PodlinkError::from(ConfigError::MissingRequired {
            field: String::from(field),
        }));
    }

    Ok(trimmed)
}

pub(super) fn exec_failed(container_id: &str, message: impl Into<String>) -> PodlinkError {
    PodlinkError::from(ContainerError::ExecFailed {
        container_id: String::from(container_id),
        message: message.into(),
    })
}
