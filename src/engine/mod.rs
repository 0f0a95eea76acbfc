//! Container engine connection and attached streams.
//!
//! The socket endpoint is resolved through a priority-based fallback chain:
//!
//! 1. CLI argument (`--engine-socket`)
//! 2. Config file (`engine_socket` in TOML)
//! 3. `PODLINK_ENGINE_SOCKET` environment variable
//! 4. `DOCKER_HOST` environment variable
//! 5. `CONTAINER_HOST` environment variable
//! 6. `PODMAN_HOST` environment variable
//! 7. Platform default (`/var/run/docker.sock` on Unix)
//!
//! The resolved socket backs two clients: Bollard for request/response calls
//! and a [`SocketTransport`] for the long-lived streams driven by
//! [`DuplexSession`] and [`RecordStream`].

mod connection;
pub mod stream;
pub mod transport;

pub use connection::EngineConnector;
pub use connection::SocketResolver;
pub use connection::exec::{
    ContainerExecClient, CreateExecFuture, ExecMode, ExecRequest, ExecResult, ExecStdio,
    InspectExecFuture, ResizeExecFuture, StartExecFuture,
};
pub use stream::{
    CancelCause, CancelSignal, CancellationBridge, DuplexSession, Frame, FrameCodec,
    FrameHeader, InputSource, JsonRecordCodec, OutputSink, ReadySignal, RecordConfig,
    RecordStream, SessionConfig, StreamMode, StreamType,
};
pub use transport::{
    DaemonConnection, DaemonTransport, Endpoint, MemoryTransport, SocketTransport, StreamRequest,
};
