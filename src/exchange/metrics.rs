// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for session exchange attempts.
#[derive(Debug, Default)]
pub struct ExchangeMetrics {
	attempts: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
	timeouts: AtomicU64,
	aborted: AtomicU64,
	stale: AtomicU64,
}
impl ExchangeMetrics {
	/// Returns the total number of exchange attempts that reached the transport.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of successful exchanges.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of classified failures, timeouts included.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Returns the number of attempts that hit the exchange timeout.
	pub fn timeouts(&self) -> u64 {
		self.timeouts.load(Ordering::Relaxed)
	}

	/// Returns the number of attempts cancelled by a newer one.
	pub fn aborted(&self) -> u64 {
		self.aborted.load(Ordering::Relaxed)
	}

	/// Returns the number of settled attempts whose results were discarded as stale.
	pub fn stale_discards(&self) -> u64 {
		self.stale.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_timeout(&self) {
		self.timeouts.fetch_add(1, Ordering::Relaxed);
		self.failure.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_aborted(&self) {
		self.aborted.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_stale(&self) {
		self.stale.fetch_add(1, Ordering::Relaxed);
	}
}
