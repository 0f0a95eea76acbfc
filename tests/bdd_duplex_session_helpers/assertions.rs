//! Then-step assertions for duplex session scenarios.

use podlink::error::{FrameError, StreamError};
use rstest_bdd_macros::then;

use super::state::{DuplexSessionState, SessionOutcome};
use super::steps::StepResult;

fn recorded(state: &DuplexSessionState) -> StepResult<SessionOutcome> {
    state
        .outcome
        .get()
        .ok_or_else(|| String::from("session outcome should be recorded"))
}

fn expect_error(state: &DuplexSessionState) -> StepResult<StreamError> {
    match recorded(state)?.result {
        Ok(()) => Err(String::from("expected the session to fail")),
        Err(error) => Ok(error),
    }
}

#[then("the session ends cleanly")]
fn session_ends_cleanly(duplex_session_state: &DuplexSessionState) -> StepResult<()> {
    recorded(duplex_session_state)?
        .result
        .map_err(|error| format!("expected success, got: {error}"))
}

#[then("stdout received {text}")]
fn stdout_received(duplex_session_state: &DuplexSessionState, text: String) -> StepResult<()> {
    let stdout = recorded(duplex_session_state)?.stdout;
    if stdout == text.as_bytes() {
        Ok(())
    } else {
        Err(format!(
            "expected stdout '{text}', got '{}'",
            String::from_utf8_lossy(&stdout)
        ))
    }
}

#[then("stderr received {text}")]
fn stderr_received(duplex_session_state: &DuplexSessionState, text: String) -> StepResult<()> {
    let stderr = recorded(duplex_session_state)?.stderr;
    if stderr == text.as_bytes() {
        Ok(())
    } else {
        Err(format!(
            "expected stderr '{text}', got '{}'",
            String::from_utf8_lossy(&stderr)
        ))
    }
}

#[then("stderr stays empty")]
fn stderr_received_nothing(duplex_session_state: &DuplexSessionState) -> StepResult<()> {
    let stderr = recorded(duplex_session_state)?.stderr;
    if stderr.is_empty() {
        Ok(())
    } else {
        Err(format!("expected no stderr, got {} bytes", stderr.len()))
    }
}

#[then("the daemon received {text}")]
fn daemon_received(duplex_session_state: &DuplexSessionState, text: String) -> StepResult<()> {
    let received = recorded(duplex_session_state)?.daemon_received;
    if received == text.as_bytes() {
        Ok(())
    } else {
        Err(format!(
            "expected the daemon to receive '{text}', got '{}'",
            String::from_utf8_lossy(&received)
        ))
    }
}

#[then("the session fails with unknown stream type {tag}")]
fn fails_with_unknown_stream_type(
    duplex_session_state: &DuplexSessionState,
    tag: u8,
) -> StepResult<()> {
    match expect_error(duplex_session_state)? {
        StreamError::MalformedFrame(FrameError::UnknownStreamType { tag: actual }) if actual == tag => {
            Ok(())
        }
        other => Err(format!("expected unknown stream type {tag}, got: {other}")),
    }
}

#[then("the session fails with a truncated payload")]
fn fails_with_truncated_payload(duplex_session_state: &DuplexSessionState) -> StepResult<()> {
    match expect_error(duplex_session_state)? {
        StreamError::MalformedFrame(FrameError::TruncatedPayload { .. }) => Ok(()),
        other => Err(format!("expected a truncated payload, got: {other}")),
    }
}

#[then("the session is cancelled")]
fn session_is_cancelled(duplex_session_state: &DuplexSessionState) -> StepResult<()> {
    match expect_error(duplex_session_state)? {
        StreamError::Cancelled => Ok(()),
        other => Err(format!("expected cancellation, got: {other}")),
    }
}

#[then("the session exceeds its deadline")]
fn session_exceeds_deadline(duplex_session_state: &DuplexSessionState) -> StepResult<()> {
    match expect_error(duplex_session_state)? {
        StreamError::DeadlineExceeded { .. } => Ok(()),
        other => Err(format!("expected a deadline error, got: {other}")),
    }
}
