//! `podlink` application entry point.
//!
//! The binary attaches local stdio to container streams on a Docker or
//! Podman engine. It uses `eyre` for opaque error handling at the application
//! boundary, converting domain-specific errors into human-readable reports.
//!
//! Configuration is loaded with layered precedence via `OrthoConfig`:
//! 1. Application defaults
//! 2. Configuration file (`~/.config/podlink/config.toml` or path from `PODLINK_CONFIG_PATH`)
//! 3. Environment variables (`PODLINK_*`)
//! 4. Command-line arguments

use std::io::IsTerminal;
use std::process::ExitCode;

use clap::Parser;
use eyre::{Report, Result as EyreResult, WrapErr};
use mockable::DefaultEnv;
use podlink::api::{
    self, AttachOptions, CommandOutcome, EventsOptions, ExecParams, LogsOptions,
};
use podlink::config::{
    AppConfig, AttachArgs, Cli, Commands, EventsArgs, ExecArgs, LogFormat, LogsArgs, StatsArgs,
    load_config,
};
use podlink::engine::{CancelSignal, ExecMode, ExecStdio, RecordConfig, SessionConfig, StreamMode};
use podlink::error::{PodlinkError, Result as PodlinkResult, StreamError};
use serde_json::Value;
use tokio::io::{AsyncWriteExt, stdin, stdout};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::{EnvFilter, fmt};

/// Exit code reported when the user interrupts a stream.
const INTERRUPTED_EXIT_CODE: u8 = 130;

/// Application entry point.
///
/// Loads configuration, installs the log subscriber, and runs the selected
/// subcommand on a multi-threaded Tokio runtime.
fn main() -> EyreResult<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(&cli).map_err(Report::from)?;
    init_tracing(config.log.format)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .wrap_err("failed to start the async runtime")?;
    let outcome = runtime.block_on(run(&cli, &config));
    // Local stdin reads run on a blocking thread that cannot be interrupted.
    runtime.shutdown_background();

    match outcome {
        Ok(finished) => Ok(exit_code(finished)),
        Err(PodlinkError::Stream(StreamError::Cancelled)) => {
            Ok(ExitCode::from(INTERRUPTED_EXIT_CODE))
        }
        Err(error) => Err(Report::from(error)),
    }
}

fn init_tracing(format: LogFormat) -> EyreResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);

    match format {
        LogFormat::Text => subscriber.try_init(),
        LogFormat::Json => subscriber.json().try_init(),
    }
    .map_err(|error| eyre::eyre!("failed to initialise logging: {error}"))
}

fn exit_code(outcome: CommandOutcome) -> ExitCode {
    match outcome {
        CommandOutcome::Success => ExitCode::SUCCESS,
        CommandOutcome::CommandExit { code } => {
            ExitCode::from(u8::try_from(code).unwrap_or(u8::MAX))
        }
    }
}

/// Execute the CLI command, returning domain-specific errors.
///
/// Keeps semantic errors inside the run loop so the CLI boundary owns
/// conversion to `eyre::Report`.
async fn run(cli: &Cli, config: &AppConfig) -> PodlinkResult<CommandOutcome> {
    let env = DefaultEnv::new();
    let cancel = interrupt_signal(config);

    match &cli.command {
        Commands::Attach(args) => attach_container(config, &env, args, cancel).await,
        Commands::Logs(args) => print_logs(config, &env, args, cancel).await,
        Commands::Stats(args) => print_stats(config, &env, args, cancel).await,
        Commands::Events(args) => print_events(config, &env, args, cancel).await,
        Commands::Exec(args) => exec_in_container(config, &env, args, cancel).await,
    }
}

/// Stop signal fired by Ctrl-C and bounded by the configured session timeout.
fn interrupt_signal(config: &AppConfig) -> CancelSignal {
    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                debug!("interrupt received");
                interrupt.cancel();
            }
            Err(error) => warn!(%error, "cannot listen for interrupts"),
        }
    });

    let signal = CancelSignal::from_token(token);
    match config.stream.session_timeout() {
        Some(timeout) => signal.with_timeout(timeout),
        None => signal,
    }
}

async fn attach_container(
    config: &AppConfig,
    env: &DefaultEnv,
    args: &AttachArgs,
    cancel: CancelSignal,
) -> PodlinkResult<CommandOutcome> {
    let transport = api::socket_transport(config, env)?;
    let options = AttachOptions {
        stdin: !args.no_stdin,
        logs: args.logs,
        ..AttachOptions::default()
    };
    let mut out = stdout();
    let mut err = tokio::io::stderr();
    let mut session = SessionConfig::new(stream_mode(args.raw))
        .with_output(&mut out)
        .with_error(&mut err)
        .with_cancel(cancel);
    if options.stdin {
        session = session.with_input(stdin());
    }

    api::attach(&transport, &args.container, &options, session).await?;
    Ok(CommandOutcome::Success)
}

async fn print_logs(
    config: &AppConfig,
    env: &DefaultEnv,
    args: &LogsArgs,
    cancel: CancelSignal,
) -> PodlinkResult<CommandOutcome> {
    let transport = api::socket_transport(config, env)?;
    let options = LogsOptions {
        follow: args.follow,
        timestamps: args.timestamps,
        since: args.window.since.unwrap_or(0),
        until: args.window.until.unwrap_or(0),
        tail: args.tail.clone(),
        ..LogsOptions::default()
    };
    let mut out = stdout();
    let mut err = tokio::io::stderr();
    let session = SessionConfig::new(stream_mode(args.raw))
        .with_output(&mut out)
        .with_error(&mut err)
        .with_cancel(cancel);

    api::logs(&transport, &args.container, &options, session).await?;
    Ok(CommandOutcome::Success)
}

async fn print_stats(
    config: &AppConfig,
    env: &DefaultEnv,
    args: &StatsArgs,
    cancel: CancelSignal,
) -> PodlinkResult<CommandOutcome> {
    let transport = api::socket_transport(config, env)?;
    let (sender, receiver) = mpsc::channel(config.stream.record_buffer);
    let records = RecordConfig::new(sender).with_cancel(cancel);

    let (streamed, ()) = tokio::join!(
        api::stream_stats(&transport, &args.container, !args.no_stream, records),
        print_records(receiver),
    );
    streamed?;
    Ok(CommandOutcome::Success)
}

async fn print_events(
    config: &AppConfig,
    env: &DefaultEnv,
    args: &EventsArgs,
    cancel: CancelSignal,
) -> PodlinkResult<CommandOutcome> {
    let transport = api::socket_transport(config, env)?;
    let options = EventsOptions {
        since: args.window.since,
        until: args.window.until,
    };
    let (sender, receiver) = mpsc::channel(config.stream.record_buffer);
    let records = RecordConfig::new(sender).with_cancel(cancel);

    let (streamed, ()) = tokio::join!(
        api::stream_events(&transport, &options, records),
        print_records(receiver),
    );
    streamed?;
    Ok(CommandOutcome::Success)
}

/// Write each record to stdout as one JSON line.
///
/// Dropping the receiver on a write failure ends the subscription.
async fn print_records(mut receiver: mpsc::Receiver<Value>) {
    let mut out = stdout();
    while let Some(record) = receiver.recv().await {
        let mut line = record.to_string();
        line.push('\n');
        if let Err(error) = out.write_all(line.as_bytes()).await {
            warn!(%error, "stdout closed; stopping");
            return;
        }
        if let Err(error) = out.flush().await {
            warn!(%error, "stdout closed; stopping");
            return;
        }
    }
}

async fn exec_in_container(
    config: &AppConfig,
    env: &DefaultEnv,
    args: &ExecArgs,
    cancel: CancelSignal,
) -> PodlinkResult<CommandOutcome> {
    let mode = if args.detach {
        ExecMode::Detached
    } else {
        ExecMode::Attached
    };
    let tty = args.tty && std::io::stdin().is_terminal() && std::io::stdout().is_terminal();
    if args.tty && !tty {
        debug!("local stdio is not a terminal; running without a pseudo-terminal");
    }

    let mut out = stdout();
    let mut err = tokio::io::stderr();
    let stdio = ExecStdio::new()
        .with_input(stdin())
        .with_output(&mut out)
        .with_error(&mut err)
        .with_cancel(cancel);

    api::exec(ExecParams {
        config,
        container: &args.container,
        command: args.command.clone(),
        command_env: args.env.clone(),
        mode,
        tty,
        stdio,
        env,
    })
    .await
}

const fn stream_mode(raw: bool) -> StreamMode {
    if raw { StreamMode::Raw } else { StreamMode::Framed }
}
