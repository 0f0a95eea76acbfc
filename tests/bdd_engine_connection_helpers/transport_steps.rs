//! Steps building and dialling stream transports for resolved sockets.

use podlink::engine::{DaemonTransport, SocketTransport, StreamRequest};
use podlink::error::TransportError;
use rstest_bdd_macros::{then, when};

use super::{EngineConnectionState, StepResult, TransportOutcome, resolved_socket};

#[when("a stream transport is built for the resolved socket")]
fn stream_transport_is_built(engine_connection_state: &EngineConnectionState) -> StepResult<()> {
    let socket = resolved_socket(engine_connection_state)?;
    let outcome = match SocketTransport::from_socket(&socket) {
        Ok(transport) => TransportOutcome::Accepted(transport.endpoint().to_string()),
        Err(error) => TransportOutcome::Failed(error),
    };
    engine_connection_state.transport_outcome.set(outcome);
    Ok(())
}

#[when("the engine is dialled at the resolved socket")]
fn resolved_socket_is_dialled(engine_connection_state: &EngineConnectionState) -> StepResult<()> {
    let socket = resolved_socket(engine_connection_state)?;
    let transport = SocketTransport::from_socket(&socket).map_err(|_| "socket should parse")?;
    let runtime = tokio::runtime::Runtime::new().map_err(|_| "failed to create runtime")?;
    let request = StreamRequest::get("/events");
    let outcome = match runtime.block_on(transport.open(&request)) {
        Ok(_) => TransportOutcome::Accepted(transport.endpoint().to_string()),
        Err(error) => TransportOutcome::Failed(error),
    };
    engine_connection_state.transport_outcome.set(outcome);
    Ok(())
}

fn outcome(state: &EngineConnectionState) -> StepResult<TransportOutcome> {
    state
        .transport_outcome
        .get()
        .ok_or("transport outcome should be recorded")
}

#[then("the transport dials {endpoint}")]
fn the_transport_dials(
    engine_connection_state: &EngineConnectionState,
    endpoint: String,
) -> StepResult<()> {
    match outcome(engine_connection_state)? {
        TransportOutcome::Accepted(actual) => {
            assert_eq!(actual, endpoint);
            Ok(())
        }
        TransportOutcome::Failed(_) => Err("expected the endpoint to be accepted"),
    }
}

#[then("the endpoint is rejected as unsupported")]
fn endpoint_is_rejected(engine_connection_state: &EngineConnectionState) -> StepResult<()> {
    match outcome(engine_connection_state)? {
        TransportOutcome::Failed(TransportError::UnsupportedEndpoint { .. }) => Ok(()),
        _ => Err("expected an unsupported endpoint error"),
    }
}

#[then("the dial reports a missing socket")]
fn dial_reports_missing_socket(engine_connection_state: &EngineConnectionState) -> StepResult<()> {
    match outcome(engine_connection_state)? {
        TransportOutcome::Failed(TransportError::SocketNotFound { .. }) => Ok(()),
        _ => Err("expected a socket-not-found error"),
    }
}
