//! Container log retrieval.

use super::{checked_resource_id, resource_error};
use crate::engine::{DaemonTransport, DuplexSession, SessionConfig, StreamRequest};
use crate::error::StreamError;

const TAIL_ALL: &str = "all";

/// Log selection for [`logs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogsOptions {
    /// Keep the stream open for new output.
    pub follow: bool,
    /// Include stdout.
    pub stdout: bool,
    /// Include stderr.
    pub stderr: bool,
    /// Prefix entries with their timestamp.
    pub timestamps: bool,
    /// Unix seconds; `0` means unbounded.
    pub since: i64,
    /// Unix seconds; `0` means unbounded.
    pub until: i64,
    /// Lines from the end to include. `None` means every line.
    pub tail: Option<String>,
}

impl Default for LogsOptions {
    fn default() -> Self {
        Self {
            follow: false,
            stdout: true,
            stderr: true,
            timestamps: false,
            since: 0,
            until: 0,
            tail: None,
        }
    }
}

/// `GET /containers/{id}/logs` request.
///
/// # Errors
///
/// Returns the errors of [`checked_resource_id`](super::checked_resource_id),
/// or [`StreamError::InvalidRequest`] when `tail` is neither `all` nor a
/// line count.
pub fn logs_request(container: &str, options: &LogsOptions) -> Result<StreamRequest, StreamError> {
    let id = checked_resource_id(container)?;
    let tail = options.tail.as_deref().unwrap_or(TAIL_ALL);
    if tail != TAIL_ALL && tail.parse::<u64>().is_err() {
        return Err(StreamError::InvalidRequest {
            field: String::from("tail"),
            reason: format!("expected 'all' or a line count, got '{tail}'"),
        });
    }

    let mut request = StreamRequest::get(format!("/containers/{id}/logs"))
        .with_flag("follow", options.follow)
        .with_flag("stdout", options.stdout)
        .with_flag("stderr", options.stderr)
        .with_flag("timestamps", options.timestamps);
    if options.since != 0 {
        request = request.with_query("since", options.since.to_string());
    }
    if options.until != 0 {
        request = request.with_query("until", options.until.to_string());
    }
    Ok(request.with_query("tail", tail))
}

/// Copy `container`'s logs into the sinks of `config`.
///
/// Use [`StreamMode::Raw`](crate::engine::StreamMode::Raw) for containers
/// created with a TTY.
///
/// # Errors
///
/// Returns [`StreamError::NoSuchResource`] when the container is missing,
/// and the errors of [`DuplexSession::run`] otherwise.
pub async fn logs<T>(
    transport: &T,
    container: &str,
    options: &LogsOptions,
    config: SessionConfig<'_>,
) -> Result<(), StreamError>
where
    T: DaemonTransport + ?Sized,
{
    let request = logs_request(container, options)?;
    DuplexSession::run(transport, &request, config)
        .await
        .map_err(|error| resource_error(container, error))
}
