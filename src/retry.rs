//! Retry/backoff controller for transient exchange failures.
//!
//! One [`RetryController`] serves the passive sync. Each identity-change sequence may queue at
//! most [`RetryPolicy::max_retries`] delayed attempts; [`RetryController::cancel_all`] drops
//! everything queued and opens a new sequence, which is what sign-out and every new identity
//! event do.

// std
use std::sync::atomic::{AtomicUsize, Ordering};
// crates.io
use rand::Rng;
// self
use crate::{_prelude::*, config::millis, error::ConfigError};

/// Growth of the delay between consecutive retries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
	/// Every retry waits [`RetryPolicy::delay`].
	Fixed,
	/// Retry `n` waits `delay * factor^(n - 1)`, capped at `max_delay`.
	Exponential {
		/// Growth factor, at least `1.0`.
		factor: f64,
		/// Upper bound of a single delay.
		#[serde(rename = "maxDelayMs", with = "millis")]
		max_delay: Duration,
	},
}

/// Retry budget and pacing for transient failures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
	/// Maximum delayed re-attempts per identity sequence.
	pub max_retries: u32,
	/// Base delay before a re-attempt.
	#[serde(rename = "delayMs", with = "millis")]
	pub delay: Duration,
	/// Delay growth.
	pub backoff: Backoff,
	/// Extra random delay as a fraction of the computed delay (`0.0..=1.0`).
	pub jitter: f64,
}
impl RetryPolicy {
	const DEFAULT_DELAY: Duration = Duration::from_secs(2);
	const DEFAULT_MAX_RETRIES: u32 = 2;

	/// Overrides the retry budget.
	pub fn with_max_retries(mut self, max_retries: u32) -> Self {
		self.max_retries = max_retries;

		self
	}

	/// Overrides the base delay.
	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = delay;

		self
	}

	/// Switches to exponential growth.
	pub fn with_exponential_backoff(mut self, factor: f64, max_delay: Duration) -> Self {
		self.backoff = Backoff::Exponential { factor, max_delay };

		self
	}

	/// Overrides the jitter ratio.
	pub fn with_jitter(mut self, jitter: f64) -> Self {
		self.jitter = jitter;

		self
	}

	/// Delay before retry `attempt` (1-based), without jitter.
	pub fn delay_for(&self, attempt: u32) -> Duration {
		match &self.backoff {
			Backoff::Fixed => self.delay,
			Backoff::Exponential { factor, max_delay } => {
				let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
				let scaled = self.delay.as_secs_f64() * factor.powi(exponent);

				Duration::try_from_secs_f64(scaled).unwrap_or(*max_delay).min(*max_delay)
			},
		}
	}

	/// Delay before retry `attempt` with jitter applied.
	pub fn jittered_delay_for(&self, attempt: u32) -> Duration {
		let base = self.delay_for(attempt);

		if self.jitter <= 0.0 || base.is_zero() {
			return base;
		}

		let extra = base.mul_f64(self.jitter * rand::rng().random_range(0.0..=1.0));

		base + extra
	}

	/// Longest single delay this policy can produce, jitter included.
	pub fn max_delay(&self) -> Duration {
		(1..=self.max_retries.max(1))
			.map(|attempt| self.delay_for(attempt))
			.max()
			.unwrap_or(self.delay)
			.mul_f64(1.0 + self.jitter.max(0.0))
	}

	/// Validates the policy.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if !(0.0..=1.0).contains(&self.jitter) {
			return Err(ConfigError::InvalidJitter { ratio: self.jitter });
		}
		if let Backoff::Exponential { factor, max_delay } = &self.backoff {
			if factor.is_nan() || *factor < 1.0 {
				return Err(ConfigError::InvalidBackoffFactor { factor: *factor });
			}
			if max_delay.is_zero() {
				return Err(ConfigError::ZeroDuration { field: "retry.max_delay" });
			}
		}

		Ok(())
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: Self::DEFAULT_MAX_RETRIES,
			delay: Self::DEFAULT_DELAY,
			backoff: Backoff::Fixed,
			jitter: 0.0,
		}
	}
}

#[derive(Debug)]
struct Sequence {
	scheduled: u32,
	signal: CancellationToken,
}

/// Schedules bounded, cancellable delayed re-attempts on the tokio runtime.
#[derive(Debug)]
pub struct RetryController {
	policy: RetryPolicy,
	sequence: Mutex<Sequence>,
	pending: Arc<AtomicUsize>,
}
impl RetryController {
	/// Creates a controller for `policy`.
	pub fn new(policy: RetryPolicy) -> Self {
		Self {
			policy,
			sequence: Mutex::new(Sequence { scheduled: 0, signal: CancellationToken::new() }),
			pending: Default::default(),
		}
	}

	/// Policy in use.
	pub fn policy(&self) -> &RetryPolicy {
		&self.policy
	}

	/// Queues `task` after the policy delay for the next attempt of the current sequence.
	///
	/// Returns the chosen delay, or `None` once the sequence has used its budget.
	pub fn schedule<F, Fut>(&self, task: F) -> Option<Duration>
	where
		F: 'static + Send + FnOnce() -> Fut,
		Fut: 'static + Send + Future<Output = ()>,
	{
		let mut sequence = self.sequence.lock();

		if sequence.scheduled >= self.policy.max_retries {
			return None;
		}

		sequence.scheduled += 1;

		let delay = self.policy.jittered_delay_for(sequence.scheduled);

		self.spawn(sequence.signal.clone(), delay, task);

		Some(delay)
	}

	/// Cancels every queued attempt and starts a new sequence with a fresh budget.
	pub fn cancel_all(&self) {
		let mut sequence = self.sequence.lock();

		sequence.signal.cancel();
		sequence.signal = CancellationToken::new();
		sequence.scheduled = 0;
	}

	/// Attempts queued in the current sequence so far.
	pub fn scheduled(&self) -> u32 {
		self.sequence.lock().scheduled
	}

	/// Attempts still waiting for their delay to elapse.
	pub fn pending(&self) -> usize {
		self.pending.load(Ordering::SeqCst)
	}

	fn spawn<F, Fut>(&self, signal: CancellationToken, delay: Duration, task: F)
	where
		F: 'static + Send + FnOnce() -> Fut,
		Fut: 'static + Send + Future<Output = ()>,
	{
		let pending = PendingGuard::new(self.pending.clone());

		tokio::spawn(async move {
			let sleep = tokio::time::sleep(delay);

			tokio::select! {
				biased;
				_ = signal.cancelled() => {},
				_ = sleep => {
					drop(pending);
					task().await;
				},
			}
		});
	}
}

struct PendingGuard(Arc<AtomicUsize>);
impl PendingGuard {
	fn new(counter: Arc<AtomicUsize>) -> Self {
		counter.fetch_add(1, Ordering::SeqCst);

		Self(counter)
	}
}
impl Drop for PendingGuard {
	fn drop(&mut self) {
		self.0.fetch_sub(1, Ordering::SeqCst);
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::AtomicU32;
	// self
	use super::*;

	fn counting_task(counter: &Arc<AtomicU32>) -> impl 'static + Send + FnOnce() -> std::future::Ready<()> {
		let counter = counter.clone();

		move || {
			counter.fetch_add(1, Ordering::SeqCst);

			std::future::ready(())
		}
	}

	#[test]
	fn fixed_and_exponential_delays() {
		let fixed = RetryPolicy::default().with_delay(Duration::from_millis(500));

		assert_eq!(fixed.delay_for(1), Duration::from_millis(500));
		assert_eq!(fixed.delay_for(5), Duration::from_millis(500));

		let exponential = RetryPolicy::default()
			.with_max_retries(5)
			.with_delay(Duration::from_millis(100))
			.with_exponential_backoff(2.0, Duration::from_millis(350));

		assert_eq!(exponential.delay_for(1), Duration::from_millis(100));
		assert_eq!(exponential.delay_for(2), Duration::from_millis(200));
		assert_eq!(exponential.delay_for(3), Duration::from_millis(350));
		assert_eq!(exponential.max_delay(), Duration::from_millis(350));
	}

	#[test]
	fn jitter_stays_within_ratio() {
		let policy = RetryPolicy::default().with_delay(Duration::from_secs(1)).with_jitter(0.5);

		for attempt in 1..=20 {
			let delay = policy.jittered_delay_for(attempt);

			assert!(delay >= Duration::from_secs(1) && delay <= Duration::from_millis(1_500));
		}
		assert_eq!(policy.max_delay(), Duration::from_millis(1_500));
	}

	#[test]
	fn validation_rejects_bad_knobs() {
		assert!(matches!(
			RetryPolicy::default().with_jitter(1.5).validate(),
			Err(ConfigError::InvalidJitter { .. })
		));
		assert!(matches!(
			RetryPolicy::default().with_exponential_backoff(0.5, Duration::from_secs(1)).validate(),
			Err(ConfigError::InvalidBackoffFactor { .. })
		));
		assert!(RetryPolicy::default().validate().is_ok());
	}

	#[tokio::test(start_paused = true)]
	async fn scheduled_task_runs_after_delay() {
		let controller = RetryController::new(RetryPolicy::default().with_delay(Duration::from_secs(2)));
		let counter = Arc::new(AtomicU32::new(0));

		assert_eq!(controller.schedule(counting_task(&counter)), Some(Duration::from_secs(2)));
		assert_eq!(controller.pending(), 1);

		tokio::time::sleep(Duration::from_millis(1_999)).await;

		assert_eq!(counter.load(Ordering::SeqCst), 0);

		tokio::time::sleep(Duration::from_millis(2)).await;

		assert_eq!(counter.load(Ordering::SeqCst), 1);
		assert_eq!(controller.pending(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn budget_is_per_sequence() {
		let controller = RetryController::new(RetryPolicy::default().with_max_retries(2));
		let counter = Arc::new(AtomicU32::new(0));

		assert!(controller.schedule(counting_task(&counter)).is_some());
		assert!(controller.schedule(counting_task(&counter)).is_some());
		assert!(controller.schedule(counting_task(&counter)).is_none());

		controller.cancel_all();

		assert_eq!(controller.scheduled(), 0);
		assert!(controller.schedule(counting_task(&counter)).is_some());

		tokio::time::sleep(Duration::from_secs(10)).await;

		assert_eq!(counter.load(Ordering::SeqCst), 1, "Only the post-cancel attempt may run.");
	}

	#[tokio::test(start_paused = true)]
	async fn cancel_all_drops_pending_attempts() {
		let controller = RetryController::new(RetryPolicy::default());
		let counter = Arc::new(AtomicU32::new(0));

		controller.schedule(counting_task(&counter));
		controller.cancel_all();
		tokio::time::sleep(Duration::from_secs(30)).await;

		assert_eq!(counter.load(Ordering::SeqCst), 0);
		assert_eq!(controller.pending(), 0);
	}
}
