//! Container command execution orchestration.
//!
//! [`exec`] connects to the engine resolved from configuration; [`exec_with_client`]
//! takes already-built clients so the flow can run against test doubles.
//! Terminal detection (whether stdin/stdout are TTYs) is the caller's
//! responsibility.

use super::{CommandOutcome, checked_resource_id, resource_error, socket_transport};
use crate::config::AppConfig;
use crate::engine::{
    ContainerExecClient, DaemonTransport, EngineConnector, ExecMode, ExecRequest, ExecStdio,
    SocketResolver,
};
use crate::error::{PodlinkError, Result as PodlinkResult};

/// Parameters for executing a command in a running container.
pub struct ExecParams<'a, E: mockable::Env> {
    /// Application configuration (engine socket and stream timeouts).
    pub config: &'a AppConfig,
    /// Target container identifier or name.
    pub container: &'a str,
    /// Command argv to execute.
    pub command: Vec<String>,
    /// Environment entries for the command in `KEY=value` form.
    pub command_env: Vec<String>,
    /// Attached or detached execution mode.
    pub mode: ExecMode,
    /// Whether to allocate a pseudo-terminal (only effective in attached
    /// mode).
    pub tty: bool,
    /// Local stdio for attached mode.
    pub stdio: ExecStdio<'a>,
    /// Environment variable provider for socket resolution.
    pub env: &'a E,
}

/// Parameters for executing a command through existing clients.
///
/// The clients may be borrowed for less time than the local stdio.
pub struct ExecWithClientParams<'a, 's, C, T: ?Sized> {
    /// Engine API client for the exec lifecycle calls.
    pub client: &'a C,
    /// Stream transport for the attached start.
    pub transport: &'a T,
    /// Target container identifier or name.
    pub container: &'a str,
    /// Command argv to execute.
    pub command: Vec<String>,
    /// Environment entries for the command in `KEY=value` form.
    pub command_env: Vec<String>,
    /// Attached or detached execution mode.
    pub mode: ExecMode,
    /// Whether to allocate a pseudo-terminal.
    pub tty: bool,
    /// Local stdio for attached mode.
    pub stdio: ExecStdio<'s>,
}

/// Execute a command in a running container.
///
/// Resolves the engine socket, connects both clients, and returns the
/// command outcome.
///
/// # Errors
///
/// Returns `PodlinkError` variants:
/// - `ContainerError::ConnectionFailed` / `SocketNotFound` /
///   `PermissionDenied` if the engine connection fails.
/// - `ContainerError::ExecFailed` if an exec lifecycle call fails.
/// - `StreamError` variants if the attached stream fails or is cancelled.
/// - `ConfigError::MissingRequired` if required fields are empty.
pub async fn exec<E: mockable::Env>(params: ExecParams<'_, E>) -> PodlinkResult<CommandOutcome> {
    let ExecParams {
        config,
        container,
        command,
        command_env,
        mode,
        tty,
        stdio,
        env,
    } = params;

    let resolver = SocketResolver::new(env);
    let docker =
        EngineConnector::connect_with_fallback(config.engine_socket.as_deref(), &resolver)?;
    let transport = socket_transport(config, env)?;

    exec_with_client(ExecWithClientParams {
        client: &docker,
        transport: &transport,
        container,
        command,
        command_env,
        mode,
        tty,
        stdio,
    })
    .await
}

/// Execute a command through caller-supplied clients.
///
/// # Errors
///
/// Returns the same errors as [`exec`], minus connection failures.
pub async fn exec_with_client<C, T>(
    params: ExecWithClientParams<'_, '_, C, T>,
) -> PodlinkResult<CommandOutcome>
where
    C: ContainerExecClient,
    T: DaemonTransport + ?Sized,
{
    let ExecWithClientParams {
        client,
        transport,
        container,
        command,
        command_env,
        mode,
        tty,
        stdio,
    } = params;

    let id = checked_resource_id(container)?;
    let request = ExecRequest::new(id, command, mode)?
        .with_tty(tty)
        .with_env(Some(command_env));
    let result = EngineConnector::exec_async(client, transport, &request, stdio)
        .await
        .map_err(|error| match error {
            PodlinkError::Stream(stream) => PodlinkError::Stream(resource_error(id, stream)),
            other => other,
        })?;

    Ok(CommandOutcome::from_exit_code(result.exit_code()))
}
