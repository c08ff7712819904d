//! Coordinator policy knobs.
//!
//! Retry counts and timeouts are deployment policy, not invariants: the state machine only
//! relies on them being finite. Durations are expressed in integer milliseconds on the wire.

// self
use crate::{_prelude::*, error::ConfigError, retry::RetryPolicy};

/// Policy constants for one coordinator instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoordinatorConfig {
	/// Hard timeout of a single exchange attempt (credential fetch and exchange call each).
	#[serde(rename = "exchangeTimeoutMs", with = "millis")]
	pub exchange_timeout: Duration,
	/// Retry budget and pacing for transient failures.
	pub retry: RetryPolicy,
	/// How long the phase may stay `Exchanging` before the UI offers a manual retry.
	#[serde(rename = "stuckGraceMs", with = "millis")]
	pub stuck_grace: Duration,
	/// Window during which a successful refresh is reused instead of repeated.
	#[serde(rename = "refreshDebounceMs", with = "millis")]
	pub refresh_debounce: Duration,
}
impl CoordinatorConfig {
	const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(8);
	const DEFAULT_REFRESH_DEBOUNCE: Duration = Duration::from_secs(5);
	const DEFAULT_STUCK_GRACE: Duration = Duration::from_secs(10);

	/// Parses and validates a JSON configuration document.
	pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
		let mut de = serde_json::Deserializer::from_str(raw);
		let config: Self = serde_path_to_error::deserialize(&mut de)
			.map_err(|source| ConfigError::Parse { source })?;

		config.validate()?;

		Ok(config)
	}

	/// Overrides the exchange timeout.
	pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
		self.exchange_timeout = timeout;

		self
	}

	/// Overrides the retry policy.
	pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	/// Overrides the stuck grace period.
	pub fn with_stuck_grace(mut self, grace: Duration) -> Self {
		self.stuck_grace = grace;

		self
	}

	/// Overrides the refresh debounce window.
	pub fn with_refresh_debounce(mut self, window: Duration) -> Self {
		self.refresh_debounce = window;

		self
	}

	/// Validates every knob.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.exchange_timeout.is_zero() {
			return Err(ConfigError::ZeroDuration { field: "exchange_timeout" });
		}
		if self.stuck_grace.is_zero() {
			return Err(ConfigError::ZeroDuration { field: "stuck_grace" });
		}

		self.retry.validate()
	}

	/// Upper bound on the time the phase can stay `Exchanging` after an identity event.
	///
	/// Every attempt is bounded twice by [`Self::exchange_timeout`] (credential fetch, then
	/// exchange call) and separated by at most [`RetryPolicy::max_delay`].
	pub fn convergence_bound(&self) -> Duration {
		let attempts = self.retry.max_retries.saturating_add(1);

		(self.exchange_timeout * 2).saturating_mul(attempts).saturating_add(
			self.retry.max_delay().saturating_mul(self.retry.max_retries),
		)
	}
}
impl Default for CoordinatorConfig {
	fn default() -> Self {
		Self {
			exchange_timeout: Self::DEFAULT_EXCHANGE_TIMEOUT,
			retry: RetryPolicy::default(),
			stuck_grace: Self::DEFAULT_STUCK_GRACE,
			refresh_debounce: Self::DEFAULT_REFRESH_DEBOUNCE,
		}
	}
}

/// Serde adapter encoding [`Duration`] as integer milliseconds.
pub(crate) mod millis {
	// self
	use crate::_prelude::*;

	pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		u64::deserialize(deserializer).map(Duration::from_millis)
	}
}
