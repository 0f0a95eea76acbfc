//! In-memory transport serving pre-arranged connections.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::io::{DuplexStream, duplex};

use super::{DaemonConnection, DaemonTransport, OpenConnectionFuture, StreamRequest};
use crate::error::TransportError;

/// Buffer size of each in-memory connection.
const DUPLEX_CAPACITY: usize = 64 * 1024;

enum Prepared {
    Connection(DuplexStream),
    Failure(TransportError),
    Unanswered,
}

/// Transport whose connections are in-memory pipes set up in advance.
///
/// Each call to [`DaemonTransport::open`] consumes the next prepared outcome
/// in order and records the request it was given. The far end of every pipe
/// is returned to the caller, who plays the daemon.
#[derive(Default)]
pub struct MemoryTransport {
    prepared: Mutex<VecDeque<Prepared>>,
    requests: Mutex<Vec<StreamRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryTransport {
    /// A transport with nothing prepared.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepare a live connection and return the daemon's end of it.
    #[must_use]
    pub fn push_connection(&self) -> DuplexStream {
        let (client, daemon) = duplex(DUPLEX_CAPACITY);
        lock(&self.prepared).push_back(Prepared::Connection(client));
        daemon
    }

    /// Prepare a failed open.
    pub fn push_failure(&self, error: TransportError) {
        lock(&self.prepared).push_back(Prepared::Failure(error));
    }

    /// Prepare an open that never completes.
    pub fn push_unanswered(&self) {
        lock(&self.prepared).push_back(Prepared::Unanswered);
    }

    /// Requests received so far, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<StreamRequest> {
        lock(&self.requests).clone()
    }
}

impl DaemonTransport for MemoryTransport {
    fn open<'a>(&'a self, request: &'a StreamRequest) -> OpenConnectionFuture<'a> {
        lock(&self.requests).push(request.clone());
        let next = lock(&self.prepared).pop_front();
        Box::pin(async move {
            match next {
                Some(Prepared::Connection(stream)) => Ok(DaemonConnection::new(stream)),
                Some(Prepared::Failure(error)) => Err(error),
                Some(Prepared::Unanswered) => std::future::pending().await,
                None => Err(TransportError::Connect {
                    endpoint: String::from("memory"),
                    message: String::from("no connection prepared"),
                }),
            }
        })
    }
}
