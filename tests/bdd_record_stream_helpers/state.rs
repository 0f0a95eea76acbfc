//! Scenario state for record stream behavioural tests.

use podlink::error::StreamError;
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;

#[derive(Debug, Clone)]
pub(crate) struct SubscriptionOutcome {
    pub(crate) result: Result<(), StreamError>,
    pub(crate) ids: Vec<u64>,
}

#[derive(Default, ScenarioState)]
pub(crate) struct RecordStreamState {
    /// Chunks the daemon writes, one write per entry.
    pub(crate) chunks: Slot<Vec<String>>,
    pub(crate) hold_open: Slot<bool>,
    /// Drop the receiver after this many records.
    pub(crate) take: Slot<usize>,
    pub(crate) cancel_after_ms: Slot<u64>,
    pub(crate) outcome: Slot<SubscriptionOutcome>,
}

#[fixture]
pub(crate) fn record_stream_state() -> RecordStreamState {
    let state = RecordStreamState::default();
    state.chunks.set(Vec::new());
    state.hold_open.set(false);
    state
}
