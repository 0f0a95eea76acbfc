//! Then-step assertions for record stream scenarios.

use podlink::error::StreamError;
use rstest_bdd_macros::then;

use super::state::{RecordStreamState, SubscriptionOutcome};
use super::steps::StepResult;

fn recorded(state: &RecordStreamState) -> StepResult<SubscriptionOutcome> {
    state
        .outcome
        .get()
        .ok_or_else(|| String::from("subscription outcome should be recorded"))
}

#[then("the subscriber received records {ids}")]
fn subscriber_received_records(record_stream_state: &RecordStreamState, ids: String) -> StepResult<()> {
    let expected: Vec<u64> = ids
        .split(',')
        .map(|id| id.trim().parse::<u64>().map_err(|error| error.to_string()))
        .collect::<Result<_, _>>()?;
    let actual = recorded(record_stream_state)?.ids;
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected records {expected:?}, got {actual:?}"))
    }
}

#[then("the subscription ends cleanly")]
fn subscription_ends_cleanly(record_stream_state: &RecordStreamState) -> StepResult<()> {
    recorded(record_stream_state)?
        .result
        .map_err(|error| format!("expected success, got: {error}"))
}

#[then("the subscription fails to decode a record")]
fn subscription_fails_to_decode(record_stream_state: &RecordStreamState) -> StepResult<()> {
    match recorded(record_stream_state)?.result {
        Err(StreamError::Decode { .. }) => Ok(()),
        Err(other) => Err(format!("expected a decode error, got: {other}")),
        Ok(()) => Err(String::from("expected a decode error, got success")),
    }
}

#[then("the subscription is cancelled")]
fn subscription_is_cancelled(record_stream_state: &RecordStreamState) -> StepResult<()> {
    match recorded(record_stream_state)?.result {
        Err(StreamError::Cancelled) => Ok(()),
        Err(other) => Err(format!("expected cancellation, got: {other}")),
        Ok(()) => Err(String::from("expected cancellation, got success")),
    }
}
