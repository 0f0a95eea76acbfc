//! Configuration system for podlink.
//!
//! This module provides the configuration structures and CLI definitions for the
//! podlink application. Configuration loading and precedence merging is handled by
//! the `ortho_config` crate. Precedence: CLI flags override environment
//! variables, which override configuration files, which override defaults.
//!
//! The configuration file is expected at `~/.config/podlink/config.toml` by default.
//!
//! # Example Configuration
//!
//! ```toml
//! engine_socket = "unix:///run/user/1000/podman/podman.sock"
//!
//! [stream]
//! connect_timeout_secs = 10
//! session_timeout_secs = 0
//! record_buffer = 64
//!
//! [log]
//! format = "json"
//! ```

mod cli;
mod loader;
mod types;


pub use cli::{
    AttachArgs, Cli, Commands, EventsArgs, ExecArgs, LogsArgs, StatsArgs, TimeWindow,
};
pub use loader::{env_var_names, load_config};
pub use types::{AppConfig, LogConfig, LogFormat, StreamConfig};
