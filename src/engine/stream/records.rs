//! Streaming decoder for consecutive JSON records.
//!
//! Stats and events endpoints answer with an unbounded sequence of JSON
//! documents, optionally separated by whitespace. [`JsonRecordCodec`] splits
//! them as they arrive and [`RecordStream`] forwards each one, in wire order,
//! to an `mpsc` channel.

use std::marker::PhantomData;

use bytes::{Buf, BytesMut};
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, FramedRead};
use tracing::{debug, trace};

use super::cancel::{CancelSignal, CancellationBridge};
use crate::engine::transport::{DaemonTransport, StreamRequest};
use crate::error::StreamError;

/// Decoder yielding one `T` per complete JSON value.
pub struct JsonRecordCodec<T> {
    marker: PhantomData<fn() -> T>,
}

impl<T> JsonRecordCodec<T> {
    /// A codec with an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            marker: PhantomData,
        }
    }
}

impl<T> Default for JsonRecordCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for JsonRecordCodec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRecordCodec").finish()
    }
}

fn skip_whitespace(src: &mut BytesMut) {
    let leading = src
        .iter()
        .take_while(|byte| byte.is_ascii_whitespace())
        .count();
    src.advance(leading);
}

impl<T: DeserializeOwned> Decoder for JsonRecordCodec<T> {
    type Item = T;
    type Error = StreamError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<T>, StreamError> {
        skip_whitespace(src);
        if src.is_empty() {
            return Ok(None);
        }

        let mut values = serde_json::Deserializer::from_slice(src).into_iter::<T>();
        match values.next() {
            Some(Ok(value)) => {
                let consumed = values.byte_offset();
                src.advance(consumed);
                Ok(Some(value))
            }
            Some(Err(error)) if error.is_eof() => Ok(None),
            Some(Err(error)) => Err(StreamError::Decode {
                message: error.to_string(),
            }),
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<T>, StreamError> {
        if let Some(value) = self.decode(src)? {
            return Ok(Some(value));
        }
        if src.is_empty() {
            Ok(None)
        } else {
            Err(StreamError::Decode {
                message: format!(
                    "stream ended inside a record ({} bytes pending)",
                    src.len()
                ),
            })
        }
    }
}

/// Where decoded records go and when to stop.
#[derive(Debug)]
pub struct RecordConfig<T> {
    /// Receives each record in wire order.
    pub sink: mpsc::Sender<T>,
    /// Stops the subscription.
    pub cancel: CancelSignal,
}

impl<T> RecordConfig<T> {
    /// Deliver to `sink` with a signal that only fires manually.
    #[must_use]
    pub fn new(sink: mpsc::Sender<T>) -> Self {
        Self {
            sink,
            cancel: CancelSignal::new(),
        }
    }

    /// Replace the stop signal.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }
}

/// One record subscription over a long-lived connection.
#[derive(Debug, Clone, Copy)]
pub struct RecordStream;

impl RecordStream {
    /// Open `request` and forward every decoded record to `config.sink`.
    ///
    /// Returns `Ok(())` on remote end-of-stream or when the receiver is
    /// dropped. The sender is dropped on return, so the receiver always
    /// observes end-of-stream.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Decode`] for malformed or truncated records,
    /// [`StreamError::Transport`] for connection failures, and
    /// [`StreamError::Cancelled`] or [`StreamError::DeadlineExceeded`] when
    /// the signal fires.
    pub async fn run<T, D>(
        transport: &D,
        request: &StreamRequest,
        config: RecordConfig<T>,
    ) -> Result<(), StreamError>
    where
        T: DeserializeOwned + Send,
        D: DaemonTransport + ?Sized,
    {
        let RecordConfig { sink, cancel } = config;
        let bridge = CancellationBridge::new(&cancel);
        debug!(path = request.path(), "subscribing to records");

        let result = match bridge.race(transport.open(request)).await {
            Ok(Ok(connection)) => forward(&bridge, bridge.guard(connection), &sink).await,
            Ok(Err(error)) => Err(StreamError::from(error)),
            Err(cancelled) => Err(cancelled),
        };
        drop(sink);
        bridge.close();

        let outcome = bridge.outcome(result);
        debug!(path = request.path(), ok = outcome.is_ok(), "record subscription ended");
        outcome
    }
}

async fn forward<T, R>(
    bridge: &CancellationBridge,
    connection: R,
    sink: &mpsc::Sender<T>,
) -> Result<(), StreamError>
where
    T: DeserializeOwned + Send,
    R: tokio::io::AsyncRead + Unpin,
{
    let mut records = FramedRead::new(connection, JsonRecordCodec::<T>::new());
    let mut delivered: u64 = 0;
    while let Some(record) = records.next().await {
        let value = record?;
        if bridge.race(sink.send(value)).await?.is_err() {
            debug!(delivered, "record receiver dropped; stopping");
            return Ok(());
        }
        delivered = delivered.saturating_add(1);
        trace!(delivered, "record delivered");
    }
    Ok(())
}
