// self
use crate::{
	_prelude::*,
	obs::{self, ExchangeOutcome},
	sequencer::{OperationKind, RequestId},
};

/// Future returned by [`ExchangeSpan::instrument`]; plain `F` when tracing is off.
#[cfg(feature = "tracing")]
pub type InstrumentedExchange<F> = tracing::instrument::Instrumented<F>;
/// Future returned by [`ExchangeSpan::instrument`]; plain `F` when tracing is off.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedExchange<F> = F;

/// Span covering one exchange attempt from start to settlement.
///
/// The `outcome` field stays empty until [`ExchangeSpan::record`] sees a terminal label, so an
/// attempt that never settles is visible as such in collected traces.
#[derive(Clone, Debug)]
pub struct ExchangeSpan {
	kind: OperationKind,
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl ExchangeSpan {
	/// Opens the span for attempt `request_id` on the `kind` lane.
	pub fn new(kind: OperationKind, request_id: RequestId, background: bool) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"session_coordinator.exchange",
				kind = kind.as_str(),
				request_id = request_id.get(),
				mode = if background { "background" } else { "blocking" },
				outcome = tracing::field::Empty,
			);

			Self { kind, span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (request_id, background);

			Self { kind }
		}
	}

	/// Lane the attempt runs on.
	pub fn kind(&self) -> OperationKind {
		self.kind
	}

	/// Counts `outcome` and, for terminal labels, stamps it on the span.
	pub fn record(&self, outcome: ExchangeOutcome) {
		obs::record_exchange_outcome(self.kind, outcome);

		#[cfg(feature = "tracing")]
		{
			if outcome != ExchangeOutcome::Attempt {
				self.span.record("outcome", outcome.as_str());
			}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedExchange<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::sequencer::Sequencer;

	#[tokio::test]
	async fn span_records_through_an_instrumented_attempt() {
		let request_id = Sequencer::new(OperationKind::Manual).start();
		let span = ExchangeSpan::new(OperationKind::Manual, request_id, false);
		let recorder = span.clone();
		let tier = span
			.instrument(async move {
				recorder.record(ExchangeOutcome::Attempt);
				recorder.record(ExchangeOutcome::Success);

				"premium"
			})
			.await;

		assert_eq!(tier, "premium");
		assert_eq!(span.kind(), OperationKind::Manual);
	}
}
