//! Optional observability helpers for session exchanges.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit one `session_coordinator.exchange` span per attempt with the
//!   `kind`, `request_id`, `mode` and (once settled) `outcome` fields.
//! - Enable `metrics` to increment `session_coordinator_exchange_total` for every attempt and
//!   settlement, labeled by `kind` + `outcome`, and
//!   `session_coordinator_phase_transitions_total`, labeled by `from` + `to`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::{_prelude::*, exchange::ExchangeError};

/// Outcome labels recorded for each exchange attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExchangeOutcome {
	/// Attempt passed the staleness check and went out.
	Attempt,
	/// Entitlement confirmed.
	Success,
	/// Classified failure other than a timeout.
	Failure,
	/// Attempt hit the exchange timeout.
	Timeout,
	/// Attempt was cancelled by a newer attempt of the same lane.
	Aborted,
	/// Attempt settled after being superseded; its result was discarded.
	Stale,
}
impl ExchangeOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ExchangeOutcome::Attempt => "attempt",
			ExchangeOutcome::Success => "success",
			ExchangeOutcome::Failure => "failure",
			ExchangeOutcome::Timeout => "timeout",
			ExchangeOutcome::Aborted => "aborted",
			ExchangeOutcome::Stale => "stale",
		}
	}

	/// Maps a settled exchange result onto its label.
	pub fn of<T>(result: &Result<T, ExchangeError>) -> Self {
		match result {
			Ok(_) => ExchangeOutcome::Success,
			Err(ExchangeError::TimedOut { .. }) => ExchangeOutcome::Timeout,
			Err(ExchangeError::Aborted) => ExchangeOutcome::Aborted,
			Err(_) => ExchangeOutcome::Failure,
		}
	}
}
impl Display for ExchangeOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn settled_results_map_to_labels() {
		assert_eq!(ExchangeOutcome::of(&Ok::<_, ExchangeError>(())), ExchangeOutcome::Success);
		assert_eq!(
			ExchangeOutcome::of::<()>(&Err(ExchangeError::TimedOut { after: Duration::from_secs(1) })),
			ExchangeOutcome::Timeout
		);
		assert_eq!(ExchangeOutcome::of::<()>(&Err(ExchangeError::Aborted)), ExchangeOutcome::Aborted);
		assert_eq!(
			ExchangeOutcome::of::<()>(&Err(ExchangeError::Gateway { status: Some(502), message: "down".into() })),
			ExchangeOutcome::Failure
		);
	}
}
