// self
use crate::obs::{FlowKind, FlowOutcome};

/// Counter incremented once per flow attempt, success, and failure.
pub const FLOW_COUNTER: &str = "oauth2_session_flow_total";

/// Bumps [`FLOW_COUNTER`] on the global recorder; a no-op unless the `metrics` feature is on.
#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!(FLOW_COUNTER, "flow" => kind.as_str(), "outcome" => outcome.as_str())
		.increment(1);
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recording_without_an_installed_recorder_is_harmless() {
		for kind in [FlowKind::Authorize, FlowKind::Callback, FlowKind::Sweep] {
			record_flow_outcome(kind, FlowOutcome::Attempt);
		}
	}
}
