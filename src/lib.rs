//! Attached-stream client for Docker and Podman daemons.
//!
//! `podlink` opens long-lived, upgraded connections to a container daemon and
//! drives the byte streams behind `attach`, `logs`, `exec` and the
//! continuous JSON feeds behind `stats` and `events`. Request/response calls
//! are delegated to Bollard; the stream side is implemented here.
//!
//! # Architecture
//!
//! A [`engine::DuplexSession`] owns one connection for one call. The caller's
//! task runs the read loop, which demultiplexes the 8-byte framing protocol
//! into stdout and stderr sinks or copies TTY output verbatim. A spawned task
//! forwards stdin. Both halves of the connection sit behind a
//! [`engine::CancellationBridge`], so a cancel token or deadline closes the
//! connection and both loops unblock promptly.
//!
//! # Modules
//!
//! - [`api`]: Library-facing attach, logs, stats, events and exec calls
//! - [`config`]: Configuration system with layered precedence (CLI > env > file > defaults)
//! - [`engine`]: Socket resolution, transport, framing and stream sessions
//! - [`error`]: Semantic error types for the application

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
