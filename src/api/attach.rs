//! Attaching to a running container's stdio.

use tracing::info;

use super::{checked_resource_id, resource_error};
use crate::engine::{DaemonTransport, DuplexSession, SessionConfig, StreamRequest};
use crate::error::StreamError;

/// Which channels to attach and whether to replay earlier output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachOptions {
    /// Forward input to the container's stdin.
    pub stdin: bool,
    /// Receive the container's stdout.
    pub stdout: bool,
    /// Receive the container's stderr.
    pub stderr: bool,
    /// Replay output produced before the attach.
    pub logs: bool,
}

impl Default for AttachOptions {
    fn default() -> Self {
        Self {
            stdin: false,
            stdout: true,
            stderr: true,
            logs: false,
        }
    }
}

/// Upgraded `POST /containers/{id}/attach` request.
///
/// # Errors
///
/// Returns the errors of [`checked_resource_id`](super::checked_resource_id).
pub fn attach_request(container: &str, options: &AttachOptions) -> Result<StreamRequest, StreamError> {
    let id = checked_resource_id(container)?;
    Ok(StreamRequest::post(format!("/containers/{id}/attach"))
        .with_flag("stdin", options.stdin)
        .with_flag("stdout", options.stdout)
        .with_flag("stderr", options.stderr)
        .with_flag("stream", true)
        .with_flag("logs", options.logs)
        .upgraded())
}

/// Attach to `container` and pump its streams through `config` until the
/// container closes them.
///
/// # Errors
///
/// Returns [`StreamError::NoSuchResource`] when the container is missing or
/// not running, and the errors of [`DuplexSession::run`] otherwise.
pub async fn attach<T>(
    transport: &T,
    container: &str,
    options: &AttachOptions,
    config: SessionConfig<'_>,
) -> Result<(), StreamError>
where
    T: DaemonTransport + ?Sized,
{
    let request = attach_request(container, options)?;
    info!(container, mode = ?config.mode(), "attaching");
    DuplexSession::run(transport, &request, config)
        .await
        .map_err(|error| resource_error(container, error))
}
