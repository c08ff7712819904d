// self
use crate::{obs::ExchangeOutcome, sequencer::OperationKind, state::AuthPhase};

/// Counts one exchange label on `session_coordinator_exchange_total` (when enabled).
pub fn record_exchange_outcome(kind: OperationKind, outcome: ExchangeOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"session_coordinator_exchange_total",
			"kind" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Counts a phase change on `session_coordinator_phase_transitions_total`; self-transitions are
/// not counted.
pub fn record_phase_change(from: AuthPhase, to: AuthPhase) {
	if from == to {
		return;
	}

	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"session_coordinator_phase_transitions_total",
			"from" => from.as_str(),
			"to" => to.as_str()
		)
		.increment(1);
	}
}
