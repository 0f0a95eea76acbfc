//! Orchestration API for podlink commands.
//!
//! This module provides the library-facing calls behind each podlink
//! command: [`attach`], [`logs`], [`stream_stats`], [`stream_events`] and
//! [`exec`]. Each one validates its target, builds the daemon request, and
//! drives the stream engine over a caller-supplied transport. They do not
//! print to stdout/stderr or call `std::process::exit`; the CLI adapter owns
//! local stdio and exit codes.
//!
//! Daemon `404`/`409` answers are reported as
//! [`StreamError::NoSuchResource`] so callers can tell a missing or stopped
//! container from a broken connection.

mod attach;
mod events;
mod exec;
mod logs;
mod stats;

pub use attach::{AttachOptions, attach, attach_request};
pub use events::{EventsOptions, events_request, stream_events};
pub use exec::{ExecParams, ExecWithClientParams, exec, exec_with_client};
pub use logs::{LogsOptions, logs, logs_request};
pub use stats::{stats_request, stream_stats};

use crate::config::AppConfig;
use crate::engine::{EngineConnector, SocketResolver, SocketTransport};
use crate::error::{PodlinkError, StreamError, TransportError};

/// Outcome of a podlink command.
///
/// Commands return either outright success or a command-specific exit code
/// that the CLI adapter maps to a process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command completed successfully (exit code 0).
    Success,
    /// The command completed but the underlying process exited with a
    /// non-zero code.
    CommandExit {
        /// The exit code reported by the container engine.
        code: i64,
    },
}

impl CommandOutcome {
    /// Map an exec exit code to an outcome.
    #[must_use]
    pub const fn from_exit_code(code: i64) -> Self {
        if code == 0 {
            Self::Success
        } else {
            Self::CommandExit { code }
        }
    }
}

/// Checks that `id` can be placed in a request path.
///
/// # Errors
///
/// Returns [`StreamError::NoSuchResource`] for an empty id and
/// [`StreamError::InvalidRequest`] when it contains characters outside
/// `[A-Za-z0-9_.-]`.
pub fn checked_resource_id(id: &str) -> Result<&str, StreamError> {
    if id.is_empty() {
        return Err(StreamError::NoSuchResource {
            id: String::new(),
            message: None,
        });
    }
    if let Some(invalid) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
    {
        return Err(StreamError::InvalidRequest {
            field: String::from("id"),
            reason: format!("'{id}' contains '{invalid}'"),
        });
    }
    Ok(id)
}

/// Rewrite daemon "not found" and "conflict" answers about `id`.
pub(crate) fn resource_error(id: &str, error: StreamError) -> StreamError {
    match error {
        StreamError::Transport(TransportError::Status {
            status: 404 | 409,
            message,
        }) => StreamError::NoSuchResource {
            id: String::from(id),
            message: Some(message).filter(|text| !text.is_empty()),
        },
        other => other,
    }
}

/// Stream transport for the engine socket resolved from `config` and `env`.
///
/// # Errors
///
/// Returns `TransportError::UnsupportedEndpoint` when the resolved socket
/// cannot carry attached streams (named pipes and TLS endpoints).
pub fn socket_transport<E: mockable::Env>(
    config: &AppConfig,
    env: &E,
) -> Result<SocketTransport, PodlinkError> {
    let resolver = SocketResolver::new(env);
    let socket = EngineConnector::resolve_socket(config.engine_socket.as_deref(), &resolver);
    let transport = SocketTransport::from_socket(&socket).map_err(StreamError::from)?;
    Ok(transport.with_connect_timeout(config.stream.connect_timeout()))
}
