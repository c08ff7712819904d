//! Session notification channel.
//!
//! API-calling components that hit a stale-credential failure report it through
//! [`NotificationChannel::notify_expired`] instead of refreshing on their own. Concurrent
//! reports coalesce into a single refresh: callers queue on one async gate, and whoever finds
//! that a refresh completed while it waited returns that outcome instead of starting another.
//! Successful refreshes are additionally reused for a short debounce window.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use tokio::{sync::broadcast, time::Instant};
// self
use crate::{
	_prelude::*,
	auth::{Entitlement, Tier},
};

const SIGNAL_CAPACITY: usize = 32;

type RefreshedCallback = Arc<dyn Fn(Tier) + Send + Sync>;
type FailedCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Context of the request that observed an expired session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExpiredContext {
	/// Free-form label of the failing call site.
	pub source: String,
	/// HTTP status of the failing request, if any.
	pub status: Option<u16>,
}
impl ExpiredContext {
	/// Creates a context for `source`.
	pub fn new(source: impl Into<String>) -> Self {
		Self { source: source.into(), status: None }
	}

	/// Attaches the failing request's HTTP status.
	pub fn with_status(mut self, status: u16) -> Self {
		self.status = Some(status);

		self
	}
}

/// Result of a coalesced refresh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
	/// The session was refreshed at `tier`.
	Refreshed {
		/// Confirmed tier.
		tier: Tier,
	},
	/// The refresh failed.
	Failed {
		/// Failure summary.
		reason: String,
	},
}
impl RefreshOutcome {
	/// Returns `true` for [`RefreshOutcome::Refreshed`].
	pub fn is_refreshed(&self) -> bool {
		matches!(self, Self::Refreshed { .. })
	}
}

/// Broadcast payloads observable through [`NotificationChannel::subscribe`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionSignal {
	/// A component observed an expired session.
	Expired(ExpiredContext),
	/// The session was refreshed.
	Refreshed {
		/// Confirmed tier.
		tier: Tier,
	},
	/// A refresh attempt failed.
	RefreshFailed {
		/// Failure summary.
		reason: String,
	},
}

/// Handle returned by listener registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Default)]
struct Flight {
	generation: u64,
	/// Bumped whenever recorded outcomes stop describing the current principal.
	epoch: u64,
	last_success: Option<Instant>,
	last_outcome: Option<RefreshOutcome>,
}

#[derive(Default)]
struct Listeners {
	refreshed: Vec<(ListenerId, RefreshedCallback)>,
	failed: Vec<(ListenerId, FailedCallback)>,
}

/// Best-effort broadcast of session refresh outcomes with single-flight refreshes.
pub struct NotificationChannel {
	sender: broadcast::Sender<SessionSignal>,
	gate: AsyncMutex<()>,
	flight: Mutex<Flight>,
	listeners: RwLock<Listeners>,
	next_listener: AtomicU64,
	debounce: Duration,
}
impl NotificationChannel {
	/// Creates a channel reusing successful refreshes for `debounce`.
	pub fn new(debounce: Duration) -> Self {
		let (sender, _) = broadcast::channel(SIGNAL_CAPACITY);

		Self {
			sender,
			gate: AsyncMutex::new(()),
			flight: Default::default(),
			listeners: Default::default(),
			next_listener: AtomicU64::new(1),
			debounce,
		}
	}

	/// Reports an expired session and waits for the coalesced refresh outcome.
	///
	/// `refresh` runs only when no refresh completed while this caller waited for the gate and
	/// no successful refresh falls inside the debounce window.
	pub async fn notify_expired<F, Fut>(&self, context: ExpiredContext, refresh: F) -> RefreshOutcome
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<Entitlement>>,
	{
		obs_event!(debug, source = %context.source, status = context.status, "Session expiry reported.");

		let _ = self.sender.send(SessionSignal::Expired(context));
		let (observed, epoch) = {
			let flight = self.flight.lock();

			(flight.generation, flight.epoch)
		};
		let _gate = self.gate.lock().await;

		if let Some(outcome) = self.coalesced(observed, epoch) {
			return outcome;
		}

		let epoch = self.flight.lock().epoch;
		let outcome = match refresh().await {
			Ok(entitlement) => RefreshOutcome::Refreshed { tier: entitlement.tier },
			Err(e) => RefreshOutcome::Failed { reason: e.to_string() },
		};

		{
			let mut flight = self.flight.lock();

			flight.generation += 1;

			if flight.epoch == epoch {
				flight.last_outcome = Some(outcome.clone());
				flight.last_success = outcome.is_refreshed().then(Instant::now);
			}
		}

		self.publish(&outcome);

		outcome
	}

	/// Registers a callback for successful refreshes.
	pub fn on_refreshed<F>(&self, callback: F) -> ListenerId
	where
		F: 'static + Send + Sync + Fn(Tier),
	{
		let id = self.next_id();

		self.listeners.write().refreshed.push((id, Arc::new(callback)));

		id
	}

	/// Registers a callback for failed refreshes.
	pub fn on_refresh_failed<F>(&self, callback: F) -> ListenerId
	where
		F: 'static + Send + Sync + Fn(&str),
	{
		let id = self.next_id();

		self.listeners.write().failed.push((id, Arc::new(callback)));

		id
	}

	/// Removes a callback; returns `false` when `id` is unknown.
	pub fn remove_listener(&self, id: ListenerId) -> bool {
		let mut listeners = self.listeners.write();
		let before = listeners.refreshed.len() + listeners.failed.len();

		listeners.refreshed.retain(|(listener, _)| *listener != id);
		listeners.failed.retain(|(listener, _)| *listener != id);

		before != listeners.refreshed.len() + listeners.failed.len()
	}

	/// Subscribes to every signal published after this call.
	pub fn subscribe(&self) -> broadcast::Receiver<SessionSignal> {
		self.sender.subscribe()
	}

	/// Announces a successful refresh performed outside [`Self::notify_expired`].
	pub fn publish_refreshed(&self, tier: Tier) {
		self.publish(&RefreshOutcome::Refreshed { tier });
	}

	/// Announces a failed refresh performed outside [`Self::notify_expired`].
	pub fn publish_refresh_failed(&self, reason: impl Into<String>) {
		self.publish(&RefreshOutcome::Failed { reason: reason.into() });
	}

	/// Drops recorded refresh outcomes so later reports refresh again.
	///
	/// Called when the principal changes or signs out; a refresh still in flight completes
	/// for its own caller but is not reused.
	pub fn forget(&self) {
		let mut flight = self.flight.lock();

		flight.epoch += 1;
		flight.last_success = None;
		flight.last_outcome = None;
	}

	fn coalesced(&self, observed: u64, epoch: u64) -> Option<RefreshOutcome> {
		let flight = self.flight.lock();

		if flight.epoch != epoch {
			return None;
		}
		if flight.generation != observed {
			return flight.last_outcome.clone();
		}

		match (flight.last_success, &flight.last_outcome) {
			(Some(at), Some(outcome)) if at.elapsed() < self.debounce => Some(outcome.clone()),
			_ => None,
		}
	}

	fn publish(&self, outcome: &RefreshOutcome) {
		match outcome {
			RefreshOutcome::Refreshed { tier } => {
				let callbacks = self
					.listeners
					.read()
					.refreshed
					.iter()
					.map(|(_, cb)| cb.clone())
					.collect::<Vec<_>>();

				let _ = self.sender.send(SessionSignal::Refreshed { tier: *tier });

				callbacks.iter().for_each(|cb| cb(*tier));
			},
			RefreshOutcome::Failed { reason } => {
				let callbacks = self
					.listeners
					.read()
					.failed
					.iter()
					.map(|(_, cb)| cb.clone())
					.collect::<Vec<_>>();

				let _ = self.sender.send(SessionSignal::RefreshFailed { reason: reason.clone() });

				callbacks.iter().for_each(|cb| cb(reason));
			},
		}
	}

	fn next_id(&self) -> ListenerId {
		ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed))
	}
}
impl Debug for NotificationChannel {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("NotificationChannel")
			.field("debounce", &self.debounce)
			.field("receivers", &self.sender.receiver_count())
			.finish()
	}
}
