//! Behavioural test helpers for container engine connection.
//!
//! This module provides step definitions and state management for BDD tests
//! covering socket resolution and stream transport endpoints.

mod transport_steps;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use mockable::MockEnv;
use podlink::engine::{EngineConnector, SocketResolver};
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::{ScenarioState, given, then, when};

// Re-export step definitions so they are visible to rstest-bdd macros.
#[expect(
    unused_imports,
    reason = "rstest-bdd discovers step functions via attributes, not runtime usage"
)]
pub use transport_steps::*;

/// Step result type for BDD tests, using a static string for errors.
pub(crate) type StepResult<T> = Result<T, &'static str>;

/// Thread-safe environment variable storage for BDD tests.
type EnvVars = Arc<Mutex<HashMap<String, String>>>;

/// Outcome of building or dialling a stream transport.
#[derive(Clone, Debug)]
pub enum TransportOutcome {
    /// The endpoint was accepted, rendered in canonical form.
    Accepted(String),
    /// The endpoint was rejected or the dial failed.
    Failed(podlink::error::TransportError),
}

/// State shared across engine connection test scenarios.
#[derive(Default, ScenarioState)]
pub struct EngineConnectionState {
    /// The environment variables to mock.
    env_vars: Slot<EnvVars>,
    /// The configured socket from configuration (CLI, config file, `PODLINK_ENGINE_SOCKET`).
    config_socket: Slot<Option<String>>,
    /// The resolved socket endpoint.
    resolved_socket: Slot<String>,
    /// The result of building or dialling a transport.
    pub(crate) transport_outcome: Slot<TransportOutcome>,
}

/// Fixture providing a fresh engine connection state.
#[fixture]
pub fn engine_connection_state() -> EngineConnectionState {
    let state = EngineConnectionState::default();
    state.env_vars.set(Arc::new(Mutex::new(HashMap::new())));
    state
}

fn set_env_var(state: &EngineConnectionState, key: &str, value: &str) -> StepResult<()> {
    let env_vars = state.env_vars.get().ok_or("env_vars should be initialised")?;
    let mut vars = env_vars.lock().map_err(|_| "mutex poisoned")?;
    vars.insert(String::from(key), String::from(value));
    Ok(())
}

/// Creates a `MockEnv` answering from a snapshot of the scenario's variables.
///
/// All "Given" steps complete before the "When" step takes the snapshot.
fn create_mock_env(state: &EngineConnectionState) -> StepResult<MockEnv> {
    let env_vars = state.env_vars.get().ok_or("env_vars should be initialised")?;
    let vars = env_vars.lock().map_err(|_| "mutex poisoned")?.clone();

    let mut mock = MockEnv::new();
    mock.expect_string()
        .returning(move |key| vars.get(key).cloned());
    Ok(mock)
}

/// The socket this scenario resolved.
pub(crate) fn resolved_socket(state: &EngineConnectionState) -> StepResult<String> {
    state
        .resolved_socket
        .get()
        .ok_or("resolved socket should be set")
}

// Given step definitions

#[given("no engine socket is configured")]
fn no_engine_socket_configured(engine_connection_state: &EngineConnectionState) {
    engine_connection_state.config_socket.set(None);
}

#[given("engine socket is configured as {socket}")]
fn engine_socket_configured_as(engine_connection_state: &EngineConnectionState, socket: String) {
    engine_connection_state.config_socket.set(Some(socket));
}

#[given("{name} is set to {value}")]
fn env_var_is_set_to(
    engine_connection_state: &EngineConnectionState,
    name: String,
    value: String,
) -> StepResult<()> {
    set_env_var(engine_connection_state, &name, &value)
}

#[given("{name} is empty")]
fn env_var_is_empty(
    engine_connection_state: &EngineConnectionState,
    name: String,
) -> StepResult<()> {
    set_env_var(engine_connection_state, &name, "")
}

// When step definitions

#[when("the socket is resolved")]
fn the_socket_is_resolved(engine_connection_state: &EngineConnectionState) -> StepResult<()> {
    let env = create_mock_env(engine_connection_state)?;
    let resolver = SocketResolver::new(&env);
    let config_socket = engine_connection_state.config_socket.get().flatten();
    let socket = EngineConnector::resolve_socket(config_socket.as_deref(), &resolver);
    engine_connection_state.resolved_socket.set(socket);
    Ok(())
}

// Then step definitions

#[then("the resolved socket is {expected}")]
fn the_resolved_socket_is(
    engine_connection_state: &EngineConnectionState,
    expected: String,
) -> StepResult<()> {
    let resolved = resolved_socket(engine_connection_state)?;
    assert_eq!(
        resolved, expected,
        "Expected resolved socket to be '{expected}', but got '{resolved}'"
    );
    Ok(())
}

#[then("the socket resolves to the platform default")]
fn the_socket_resolves_to_platform_default(
    engine_connection_state: &EngineConnectionState,
) -> StepResult<()> {
    let resolved = resolved_socket(engine_connection_state)?;
    let default = SocketResolver::<MockEnv>::default_socket();
    assert_eq!(
        resolved, default,
        "Expected resolved socket to be platform default '{default}', but got '{resolved}'"
    );
    Ok(())
}
