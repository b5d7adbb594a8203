//! Shared helpers for flow implementations (random tokens, outcome recording).

// crates.io
use rand::{Rng, distr::Alphanumeric};
// self
use crate::{
	_prelude::*,
	obs::{self, FlowKind, FlowOutcome},
};

/// Draws an alphanumeric token from the thread-local CSPRNG.
pub(crate) fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}

/// Records the terminal outcome of a flow and hands the result back.
pub(crate) fn finish<T>(kind: FlowKind, result: Result<T>) -> Result<T> {
	match &result {
		Ok(_) => obs::record_flow_outcome(kind, FlowOutcome::Success),
		Err(_) => obs::record_flow_outcome(kind, FlowOutcome::Failure),
	}

	result
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn random_strings_are_alphanumeric_and_distinct() {
		let a = random_string(32);
		let b = random_string(32);

		assert_eq!(a.len(), 32);
		assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
		assert_ne!(a, b);
	}

	#[test]
	fn finish_passes_results_through() {
		assert_eq!(finish(FlowKind::Authorize, Ok::<_, Error>(7)).ok(), Some(7));
		assert!(finish::<()>(FlowKind::Callback, Err(Error::SessionNotFound)).is_err());
	}
}
