//! Command-line argument definitions for podlink.

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

use super::LogFormat;

/// Command-line interface for podlink.
#[derive(Debug, Parser)]
#[command(name = "podlink")]
#[command(
    author,
    version,
    about = "Attach to container streams on a Docker or Podman engine"
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file.
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Container engine socket path or URL.
    #[arg(long, global = true)]
    pub engine_socket: Option<String>,

    /// Format of diagnostic logs on stderr.
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Attach local stdio to a running container.
    Attach(AttachArgs),

    /// Print a container's logs.
    Logs(LogsArgs),

    /// Stream resource usage snapshots for a container as JSON lines.
    Stats(StatsArgs),

    /// Stream daemon events as JSON lines.
    Events(EventsArgs),

    /// Execute a command in a running container.
    Exec(ExecArgs),
}

/// Arguments for the `attach` subcommand.
#[derive(Debug, Parser)]
pub struct AttachArgs {
    /// Container ID or name.
    #[arg(required = true)]
    pub container: String,

    /// Do not forward local stdin.
    #[arg(long)]
    pub no_stdin: bool,

    /// The container has a TTY, so output is one raw stream.
    #[arg(long)]
    pub raw: bool,

    /// Replay existing output before streaming.
    #[arg(long)]
    pub logs: bool,
}

/// Arguments for the `logs` subcommand.
#[derive(Debug, Parser)]
pub struct LogsArgs {
    /// Container ID or name.
    #[arg(required = true)]
    pub container: String,

    /// Keep streaming new output.
    #[arg(long, short = 'f')]
    pub follow: bool,

    /// Prefix each line with its timestamp.
    #[arg(long, short = 't')]
    pub timestamps: bool,

    /// Number of lines to show from the end, or `all`.
    #[arg(long)]
    pub tail: Option<String>,

    /// The container has a TTY, so output is one raw stream.
    #[arg(long)]
    pub raw: bool,

    /// Time bounds for the returned entries.
    #[command(flatten)]
    pub window: TimeWindow,
}

/// Arguments for the `stats` subcommand.
#[derive(Debug, Parser)]
pub struct StatsArgs {
    /// Container ID or name.
    #[arg(required = true)]
    pub container: String,

    /// Print one snapshot and exit.
    #[arg(long)]
    pub no_stream: bool,
}

/// Arguments for the `events` subcommand.
#[derive(Debug, Parser)]
pub struct EventsArgs {
    /// Time bounds for the returned events.
    #[command(flatten)]
    pub window: TimeWindow,
}

/// Unix-second bounds shared by `logs` and `events`.
#[derive(Debug, Clone, Copy, Default, Args)]
pub struct TimeWindow {
    /// Only include entries at or after this Unix timestamp.
    #[arg(long)]
    pub since: Option<i64>,

    /// Only include entries before this Unix timestamp.
    #[arg(long)]
    pub until: Option<i64>,
}

/// Arguments for the `exec` subcommand.
#[derive(Debug, Parser)]
pub struct ExecArgs {
    /// Container ID or name.
    #[arg(required = true)]
    pub container: String,

    /// Allocate a pseudo-terminal.
    #[arg(long, short = 't')]
    pub tty: bool,

    /// Start the command and wait without streaming its output.
    #[arg(long, short = 'd', conflicts_with = "tty")]
    pub detach: bool,

    /// Environment variables in `KEY=value` form.
    #[arg(long = "env", short = 'e')]
    pub env: Vec<String>,

    /// Command to execute.
    #[arg(required = true, trailing_var_arg = true)]
    pub command: Vec<String>,
}
