//! Configuration data types for podlink.

use std::time::Duration;

use clap::ValueEnum;
use ortho_config::{OrthoConfig, OrthoResult, PostMergeContext, PostMergeHook};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Output format for diagnostic logs written to stderr.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single-line records.
    #[default]
    Text,
    /// One JSON object per record.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// The log record format.
    pub format: LogFormat,
}

/// Timeouts and buffering for attached streams.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Seconds allowed for dialling the engine socket.
    pub connect_timeout_secs: u64,

    /// Seconds after which a stream is abandoned. `0` disables the deadline.
    pub session_timeout_secs: u64,

    /// Capacity of the channel carrying decoded stats and event records.
    pub record_buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            session_timeout_secs: 0,
            record_buffer: 64,
        }
    }
}

impl StreamConfig {
    /// Dial timeout as a [`Duration`].
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Stream deadline, if one is configured.
    #[must_use]
    pub const fn session_timeout(&self) -> Option<Duration> {
        match self.session_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Checks that the values can drive a stream.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when the connect timeout or the
    /// record buffer is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: String::from("stream.connect_timeout_secs"),
                reason: String::from("must be at least one second"),
            });
        }
        if self.record_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                field: String::from("stream.record_buffer"),
                reason: String::from("must hold at least one record"),
            });
        }
        Ok(())
    }
}

/// Root application configuration.
///
/// This structure is loaded from configuration files, environment variables,
/// and command-line arguments with layered precedence. The precedence order
/// (lowest to highest) is: defaults, configuration file, environment variables,
/// command-line arguments.
///
/// Configuration files are discovered in this order:
/// 1. Path specified via `PODLINK_CONFIG_PATH` environment variable
/// 2. `.podlink.toml` in the current working directory
/// 3. `.podlink.toml` in the home directory
/// 4. `~/.config/podlink/config.toml` (XDG default)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(
    prefix = "PODLINK",
    post_merge_hook,
    discovery(
        app_name = "podlink",
        env_var = "PODLINK_CONFIG_PATH",
        config_file_name = "config.toml",
        dotfile_name = ".podlink.toml",
        config_cli_long = "config",
        config_cli_visible = true,
    )
)]
pub struct AppConfig {
    /// The container engine socket path or URL.
    pub engine_socket: Option<String>,

    /// Stream timeouts and buffering.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub stream: StreamConfig,

    /// Logging configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub log: LogConfig,
}

impl PostMergeHook for AppConfig {
    fn post_merge(&mut self, _ctx: &PostMergeContext) -> OrthoResult<()> {
        // An empty socket string means "not configured".
        if self.engine_socket.as_deref().is_some_and(str::is_empty) {
            self.engine_socket = None;
        }
        Ok(())
    }
}
