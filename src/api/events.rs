//! Daemon event subscription.

use serde::de::DeserializeOwned;

use crate::engine::{DaemonTransport, RecordConfig, RecordStream, StreamRequest};
use crate::error::StreamError;

/// Time bounds for [`stream_events`], in Unix seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventsOptions {
    /// Replay events from this time.
    pub since: Option<i64>,
    /// Stop once this time is reached.
    pub until: Option<i64>,
}

/// `GET /events` request.
#[must_use]
pub fn events_request(options: &EventsOptions) -> StreamRequest {
    let mut request = StreamRequest::get("/events");
    if let Some(since) = options.since {
        request = request.with_query("since", since.to_string());
    }
    if let Some(until) = options.until {
        request = request.with_query("until", until.to_string());
    }
    request
}

/// Decode daemon events onto `config.sink` until the daemon ends the stream
/// or the subscription is stopped.
///
/// # Errors
///
/// Returns the errors of [`RecordStream::run`].
pub async fn stream_events<R, T>(
    transport: &T,
    options: &EventsOptions,
    config: RecordConfig<R>,
) -> Result<(), StreamError>
where
    R: DeserializeOwned + Send,
    T: DaemonTransport + ?Sized,
{
    RecordStream::run(transport, &events_request(options), config).await
}
