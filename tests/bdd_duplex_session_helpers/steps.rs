//! Given/When steps for duplex session scenarios.

use std::time::Duration;

use podlink::engine::stream::encode_header;
use podlink::engine::{
    CancelSignal, DuplexSession, MemoryTransport, SessionConfig, StreamMode, StreamRequest,
    StreamType,
};
use rstest_bdd_macros::{given, when};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::state::{DuplexSessionState, SessionOutcome};

pub type StepResult<T> = Result<T, String>;

fn append_wire(state: &DuplexSessionState, bytes: &[u8]) {
    let mut wire = state.wire.get().unwrap_or_default();
    wire.extend_from_slice(bytes);
    state.wire.set(wire);
}

fn append_frame(state: &DuplexSessionState, stream: StreamType, payload: &[u8]) -> StepResult<()> {
    let length = u32::try_from(payload.len()).map_err(|error| error.to_string())?;
    append_wire(state, &encode_header(stream, length));
    append_wire(state, payload);
    Ok(())
}

#[given("the daemon sends {text} on stdout")]
fn daemon_sends_on_stdout(duplex_session_state: &DuplexSessionState, text: String) -> StepResult<()> {
    append_frame(duplex_session_state, StreamType::Stdout, text.as_bytes())
}

#[given("the daemon sends {text} on stderr")]
fn daemon_sends_on_stderr(duplex_session_state: &DuplexSessionState, text: String) -> StepResult<()> {
    append_frame(duplex_session_state, StreamType::Stderr, text.as_bytes())
}

#[given("the daemon sends a frame tagged {tag}")]
fn daemon_sends_frame_tagged(duplex_session_state: &DuplexSessionState, tag: u8) {
    append_wire(duplex_session_state, &[tag, 0, 0, 0, 0, 0, 0, 1, b'x']);
}

#[given("the daemon announces {expected} payload bytes but sends {text}")]
fn daemon_truncates_payload(
    duplex_session_state: &DuplexSessionState,
    expected: u32,
    text: String,
) {
    append_wire(
        duplex_session_state,
        &encode_header(StreamType::Stdout, expected),
    );
    append_wire(duplex_session_state, text.as_bytes());
}

#[given("the daemon sends raw output {text}")]
fn daemon_sends_raw_output(duplex_session_state: &DuplexSessionState, text: String) {
    append_wire(duplex_session_state, text.as_bytes());
}

#[given("the daemon keeps the stream open")]
fn daemon_keeps_stream_open(duplex_session_state: &DuplexSessionState) {
    duplex_session_state.hold_open.set(true);
}

#[given("local input {text}")]
fn local_input(duplex_session_state: &DuplexSessionState, text: String) {
    duplex_session_state.input.set(text.into_bytes());
}

#[given("the caller cancels after {millis} milliseconds")]
fn caller_cancels_after(duplex_session_state: &DuplexSessionState, millis: u64) {
    duplex_session_state.cancel_after_ms.set(millis);
}

#[given("a session timeout of {millis} milliseconds")]
fn session_timeout_of(duplex_session_state: &DuplexSessionState, millis: u64) {
    duplex_session_state.timeout_ms.set(millis);
}

#[when("the session runs in {mode} mode")]
fn session_runs_in_mode(duplex_session_state: &DuplexSessionState, mode: String) -> StepResult<()> {
    let mode = match mode.as_str() {
        "framed" => StreamMode::Framed,
        "raw" => StreamMode::Raw,
        other => return Err(format!("unknown stream mode '{other}'")),
    };
    let wire = duplex_session_state.wire.get().unwrap_or_default();
    let input = duplex_session_state.input.get();
    let hold_open = duplex_session_state.hold_open.get().unwrap_or(false) || input.is_some();
    let cancel_after = duplex_session_state.cancel_after_ms.get();
    let timeout = duplex_session_state.timeout_ms.get();

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|error| format!("failed to create runtime: {error}"))?;
    let outcome = runtime.block_on(async move {
        let transport = MemoryTransport::new();
        let mut daemon = transport.push_connection();
        let daemon_task = tokio::spawn(async move {
            let mut received = Vec::new();
            if daemon.write_all(&wire).await.is_err() {
                return received;
            }
            if hold_open {
                // Ends once the client shuts down its side or drops the connection.
                let _ = daemon.read_to_end(&mut received).await;
            }
            received
        });

        let mut signal = CancelSignal::new();
        if let Some(millis) = timeout {
            signal = signal.with_timeout(Duration::from_millis(millis));
        }
        if let Some(millis) = cancel_after {
            let trigger = signal.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(millis)).await;
                trigger.cancel();
            });
        }

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut config = SessionConfig::new(mode)
            .with_output(&mut stdout)
            .with_error(&mut stderr)
            .with_cancel(signal);
        if let Some(bytes) = input {
            config = config.with_input(std::io::Cursor::new(bytes));
        }
        let request = StreamRequest::post("/containers/bdd/attach").upgraded();
        let result = DuplexSession::run(&transport, &request, config).await;
        let daemon_received = daemon_task.await.unwrap_or_default();

        SessionOutcome {
            result,
            stdout,
            stderr,
            daemon_received,
        }
    });

    duplex_session_state.outcome.set(outcome);
    Ok(())
}
