//! Scenario state for duplex session behavioural tests.

use podlink::error::StreamError;
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;

/// What the local side observed once the session returned.
#[derive(Debug, Clone)]
pub(crate) struct SessionOutcome {
    pub(crate) result: Result<(), StreamError>,
    pub(crate) stdout: Vec<u8>,
    pub(crate) stderr: Vec<u8>,
    pub(crate) daemon_received: Vec<u8>,
}

#[derive(Default, ScenarioState)]
pub(crate) struct DuplexSessionState {
    /// Bytes the daemon writes as soon as the connection opens.
    pub(crate) wire: Slot<Vec<u8>>,
    /// Keep the daemon end open until the client closes it.
    pub(crate) hold_open: Slot<bool>,
    /// Local input forwarded to the daemon.
    pub(crate) input: Slot<Vec<u8>>,
    /// Cancel the session after this many milliseconds.
    pub(crate) cancel_after_ms: Slot<u64>,
    /// Session deadline in milliseconds.
    pub(crate) timeout_ms: Slot<u64>,
    pub(crate) outcome: Slot<SessionOutcome>,
}

#[fixture]
pub(crate) fn duplex_session_state() -> DuplexSessionState {
    let state = DuplexSessionState::default();
    state.wire.set(Vec::new());
    state.hold_open.set(false);
    state
}
