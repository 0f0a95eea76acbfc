//! Container resource-usage snapshots.

use serde::de::DeserializeOwned;

use super::{checked_resource_id, resource_error};
use crate::engine::{DaemonTransport, RecordConfig, RecordStream, StreamRequest};
use crate::error::StreamError;

/// `GET /containers/{id}/stats` request; `stream = false` asks for one
/// snapshot.
///
/// # Errors
///
/// Returns the errors of [`checked_resource_id`](super::checked_resource_id).
pub fn stats_request(container: &str, stream: bool) -> Result<StreamRequest, StreamError> {
    let id = checked_resource_id(container)?;
    Ok(StreamRequest::get(format!("/containers/{id}/stats")).with_query(
        "stream",
        if stream { "1" } else { "0" },
    ))
}

/// Decode `container`'s stats snapshots onto `config.sink`.
///
/// # Errors
///
/// Returns [`StreamError::NoSuchResource`] when the container is missing,
/// and the errors of [`RecordStream::run`] otherwise.
pub async fn stream_stats<R, T>(
    transport: &T,
    container: &str,
    stream: bool,
    config: RecordConfig<R>,
) -> Result<(), StreamError>
where
    R: DeserializeOwned + Send,
    T: DaemonTransport + ?Sized,
{
    let request = stats_request(container, stream)?;
    RecordStream::run(transport, &request, config)
        .await
        .map_err(|error| resource_error(container, error))
}
