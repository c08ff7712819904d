//! Public façade over the session state machine.
//!
//! [`Coordinator`] owns the state behind one mutex. Every mutation goes through
//! [`reducer::reduce`] while that mutex is held, and the effects a transition returns run in
//! order before the lock is released. Exchanges themselves run on spawned tokio tasks and
//! re-enter through the same path when they settle, so the state never observes a partially
//! applied result.
//!
//! Methods that start work (`identity_changed`, `sign_in`, `force_refresh`, ...) must be
//! called from within a tokio runtime.

// crates.io
use tokio::{
	sync::{mpsc, watch},
	task::JoinHandle,
	time::Instant,
};
// self
use crate::{
	_prelude::*,
	auth::{Entitlement, Identity, Tier},
	channel::{ExpiredContext, NotificationChannel, RefreshOutcome},
	config::CoordinatorConfig,
	error::ConfigError,
	exchange::{self, ExchangeClient, ExchangeError, ExchangeMetrics},
	http::ExchangeTransport,
	identity::{IdentityError, IdentityProvider},
	obs::{self, ExchangeOutcome, ExchangeSpan},
	reducer::{self, Disposition, Effect, Event},
	retry::RetryController,
	sequencer::{OperationKind, RequestId, Sequencer},
	state::{AuthPhase, CoordinatorState},
	store::CredentialStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestExchangeTransport;

type ExchangeHandle = JoinHandle<Result<Entitlement, ExchangeError>>;

#[cfg(feature = "reqwest")]
/// Coordinator specialized for the crate's reqwest transport.
pub type ReqwestCoordinator<P> = Coordinator<P, ReqwestExchangeTransport>;

/// Cheaply cloneable handle to one coordinator instance.
pub struct Coordinator<P, T>
where
	P: ?Sized + IdentityProvider,
	T: ?Sized + ExchangeTransport,
{
	shared: Arc<Shared<P, T>>,
}
impl<P, T> Coordinator<P, T>
where
	P: ?Sized + IdentityProvider,
	T: ?Sized + ExchangeTransport,
{
	/// Creates a coordinator exchanging through `transport` and persisting into `store`.
	pub fn new(
		config: CoordinatorConfig,
		provider: impl Into<Arc<P>>,
		transport: impl Into<Arc<T>>,
		store: Arc<dyn CredentialStore>,
	) -> Result<Self, ConfigError> {
		let exchange = ExchangeClient::new(transport, store, config.exchange_timeout);

		Self::with_exchange_client(config, provider, exchange)
	}

	/// Creates a coordinator around a preconfigured [`ExchangeClient`] (custom classifier or
	/// timeout).
	pub fn with_exchange_client(
		config: CoordinatorConfig,
		provider: impl Into<Arc<P>>,
		exchange: ExchangeClient<T>,
	) -> Result<Self, ConfigError> {
		config.validate()?;

		let (watch, _) = watch::channel(CoordinatorState::default());
		let shared = Shared {
			provider: provider.into(),
			store: exchange.store().clone(),
			exchange,
			passive: Sequencer::new(OperationKind::Sync),
			manual: Sequencer::new(OperationKind::Manual),
			retries: RetryController::new(config.retry.clone()),
			channel: NotificationChannel::new(config.refresh_debounce),
			core: Mutex::new(Core { state: CoordinatorState::default(), phase_since: Instant::now() }),
			watch,
			config,
		};

		Ok(Self { shared: Arc::new(shared) })
	}

	/// Applies an identity-provider report.
	///
	/// The identity becomes visible immediately; the session exchange (blocking or background,
	/// depending on whether a stored session exists for this principal) runs afterwards.
	pub fn identity_changed(&self, identity: Option<Identity>) {
		obs_event!(
			info,
			identity = %identity.as_ref().map(Identity::fingerprint).unwrap_or_default(),
			"Identity change reported."
		);

		let stored = identity.as_ref().and_then(|identity| self.stored_entitlement(identity));
		let mut core = self.shared.core.lock();
		let request_id = self.shared.passive.start();

		self.dispatch(&mut core, Event::IdentityChanged { identity, stored, request_id });
	}

	/// Feeds identity-provider events from `events` until the sender side closes.
	pub fn listen(&self, mut events: mpsc::UnboundedReceiver<Option<Identity>>) -> JoinHandle<()> {
		let this = self.clone();

		tokio::spawn(async move {
			while let Some(identity) = events.recv().await {
				this.identity_changed(identity);
			}
		})
	}

	/// Runs the provider's sign-in flow and applies the resulting identity.
	pub async fn sign_in(&self) -> Result<Identity> {
		let identity = self.shared.provider.sign_in().await?;

		self.identity_changed(Some(identity.clone()));

		Ok(identity)
	}

	/// Signs out locally, then with the provider.
	///
	/// Local state, queued retries, in-flight exchanges, and the stored credential are cleared
	/// before the provider is contacted, so a failing provider cannot keep the session alive.
	pub async fn sign_out(&self) -> Result<()> {
		{
			let mut core = self.shared.core.lock();

			self.dispatch(&mut core, Event::SignOut);
		}

		self.shared.provider.sign_out().await?;

		Ok(())
	}

	/// Manual user-triggered retry; announces the outcome on the notification channel.
	pub async fn retry(&self) -> Result<Entitlement> {
		let result = self.force_refresh().await;

		match &result {
			Ok(entitlement) => self.shared.channel.publish_refreshed(entitlement.tier),
			Err(e) => self.shared.channel.publish_refresh_failed(e.to_string()),
		}

		result
	}

	/// Re-exchanges the session on the manual lane with a freshly minted credential.
	///
	/// The attempt runs on its own task, so dropping the returned future does not leave the
	/// phase parked in `Exchanging`.
	pub async fn force_refresh(&self) -> Result<Entitlement> {
		let handle = {
			let mut core = self.shared.core.lock();

			if core.state.identity.is_none() {
				return Err(Error::NotSignedIn);
			}

			let request_id = self.shared.manual.start();

			self.dispatch(&mut core, Event::ManualRetryRequested { request_id }).manual
		};
		let Some(handle) = handle else {
			return Err(Error::NotSignedIn);
		};
		let entitlement = handle.await.unwrap_or(Err(ExchangeError::Aborted))?;

		Ok(entitlement)
	}

	/// Reports an expired session from any API-calling component.
	///
	/// Concurrent reports share one manual refresh; see [`NotificationChannel::notify_expired`].
	pub async fn notify_expired(&self, context: ExpiredContext) -> RefreshOutcome {
		self.shared.channel.notify_expired(context, || self.force_refresh()).await
	}

	/// Cancels the in-flight passive sync and its queued retries, restoring the prior phase.
	pub fn abort_sync(&self) {
		let mut core = self.shared.core.lock();
		let Some(request_id) = core.state.active_request_id else {
			return;
		};

		self.shared.passive.cancel();
		self.dispatch(&mut core, Event::Aborted { kind: OperationKind::Sync, request_id });
	}

	/// Snapshot of the current state.
	pub fn state(&self) -> CoordinatorState {
		self.shared.core.lock().state.clone()
	}

	/// Identity present and session established.
	pub fn is_authenticated(&self) -> bool {
		self.shared.core.lock().state.is_authenticated()
	}

	/// Tier can be trusted by consumers.
	pub fn tier_ready(&self) -> bool {
		self.shared.core.lock().state.tier_ready()
	}

	/// Current tier.
	pub fn tier(&self) -> Tier {
		self.shared.core.lock().state.tier()
	}

	/// The phase has been `Exchanging` for longer than the configured grace period.
	pub fn is_stuck(&self) -> bool {
		let core = self.shared.core.lock();

		core.state.phase == AuthPhase::Exchanging
			&& core.phase_since.elapsed() >= self.shared.config.stuck_grace
	}

	/// Receives a state snapshot after every applied transition.
	pub fn subscribe(&self) -> watch::Receiver<CoordinatorState> {
		self.shared.watch.subscribe()
	}

	/// Session notification channel.
	pub fn channel(&self) -> &NotificationChannel {
		&self.shared.channel
	}

	/// Exchange attempt counters.
	pub fn metrics(&self) -> &Arc<ExchangeMetrics> {
		self.shared.exchange.metrics()
	}

	/// Configuration in use.
	pub fn config(&self) -> &CoordinatorConfig {
		&self.shared.config
	}

	fn stored_entitlement(&self, identity: &Identity) -> Option<Entitlement> {
		match self.shared.store.session_for(identity) {
			Ok(session) => session.map(|session| session.entitlement),
			Err(e) => {
				obs_event!(warn, error = %e, "Stored session lookup failed; exchanging from scratch.");

				None
			},
		}
	}

	fn dispatch(&self, core: &mut Core, event: Event) -> Dispatched {
		let before = core.state.phase;
		let transition = reducer::reduce(&mut core.state, event, self.shared.retries.policy());

		if core.state.phase != before {
			core.phase_since = Instant::now();

			obs::record_phase_change(before, core.state.phase);
			obs_event!(debug, from = %before, to = %core.state.phase, "Phase changed.");
		}

		let mut manual = None;

		for effect in transition.effects {
			if let Some(handle) = self.run_effect(core, effect) {
				manual = Some(handle);
			}
		}

		if transition.disposition == Disposition::Applied {
			self.shared.watch.send_replace(core.state.clone());
		}

		Dispatched { disposition: transition.disposition, manual }
	}

	fn dispatch_locked(&self, event: Event) -> Disposition {
		let mut core = self.shared.core.lock();

		self.dispatch(&mut core, event).disposition
	}

	fn run_effect(&self, core: &mut Core, effect: Effect) -> Option<ExchangeHandle> {
		match effect {
			Effect::StartExchange { kind, request_id, background, force_credential } => {
				let identity = core.state.identity.clone()?;
				let span = ExchangeSpan::new(kind, request_id, background);
				let job = ExchangeJob {
					kind,
					request_id,
					identity,
					force_credential,
					signal: self.sequencer(kind).signal(),
					span: span.clone(),
				};
				let this = self.clone();
				let handle = tokio::spawn(span.instrument(async move { this.run_exchange(job).await }));

				match kind {
					OperationKind::Sync => None,
					OperationKind::Manual => Some(handle),
				}
			},
			Effect::ScheduleRetry { after, attempt } => {
				let this = self.clone();

				match self.shared.retries.schedule(move || async move { this.fire_retry(after) }) {
					Some(delay) => {
						obs_event!(info, attempt, ?delay, "Transient exchange failure; retry queued.");
					},
					None => {
						obs_event!(warn, attempt, "Retry budget refused another attempt.");

						self.dispatch(core, Event::RetryRefused { superseded: after });
					},
				}

				None
			},
			Effect::CancelRetries => {
				self.shared.retries.cancel_all();

				None
			},
			Effect::CancelInFlight(kind) => {
				self.sequencer(kind).cancel();

				None
			},
			Effect::ClearCredential => {
				if let Err(e) = self.shared.store.clear() {
					obs_event!(warn, error = %e, "Failed to clear the stored session credential.");
				}

				None
			},
			Effect::ForgetRefreshes => {
				self.shared.channel.forget();

				None
			},
		}
	}

	fn fire_retry(&self, after: RequestId) {
		let mut core = self.shared.core.lock();

		if !core.state.awaiting_retry(after) {
			return;
		}

		let request_id = self.shared.passive.start();

		self.dispatch(&mut core, Event::RetryFired { superseded: after, request_id });
	}

	async fn run_exchange(self, job: ExchangeJob) -> Result<Entitlement, ExchangeError> {
		let kind = job.kind;
		let request_id = job.request_id;

		if self.dispatch_locked(Event::ExchangeStarted { kind, request_id }) != Disposition::Applied {
			self.discard(&job.span);

			return Err(ExchangeError::Aborted);
		}

		job.span.record(ExchangeOutcome::Attempt);

		let result = self.attempt(&job).await;

		// Superseded on this lane; the reducer would discard the result too.
		if self.sequencer(kind).is_stale(request_id) {
			self.discard(&job.span);

			return Err(ExchangeError::Aborted);
		}

		let event = match &result {
			Ok(entitlement) =>
				Event::ExchangeSucceeded { kind, request_id, entitlement: entitlement.clone() },
			Err(ExchangeError::Aborted) => Event::Aborted { kind, request_id },
			Err(e) => Event::ExchangeFailed {
				kind,
				request_id,
				class: e.class().unwrap_or(exchange::FailureClass::Other),
			},
		};

		if self.dispatch_locked(event) == Disposition::Stale {
			self.discard(&job.span);

			return Err(ExchangeError::Aborted);
		}

		job.span.record(ExchangeOutcome::of(&result));

		if let Err(e) = &result {
			obs_event!(info, %request_id, error = %e, "Session exchange settled with a failure.");
		}

		result
	}

	async fn attempt(&self, job: &ExchangeJob) -> Result<Entitlement, ExchangeError> {
		let credential = exchange::bounded(self.shared.config.exchange_timeout, &job.signal, async {
			self.shared.provider.credential(job.force_credential).await.map_err(credential_failure)
		})
		.await?;

		self.shared.exchange.exchange(&job.identity, credential, &job.signal).await
	}

	fn discard(&self, span: &ExchangeSpan) {
		self.shared.exchange.metrics().record_stale();

		span.record(ExchangeOutcome::Stale);
		obs_event!(debug, kind = span.kind().as_str(), "Discarded a superseded exchange result.");
	}

	fn sequencer(&self, kind: OperationKind) -> &Sequencer {
		match kind {
			OperationKind::Sync => &self.shared.passive,
			OperationKind::Manual => &self.shared.manual,
		}
	}
}
#[cfg(feature = "reqwest")]
impl<P> Coordinator<P, ReqwestExchangeTransport>
where
	P: ?Sized + IdentityProvider,
{
	/// Creates a coordinator posting to `endpoint` with a dedicated reqwest client.
	pub fn with_endpoint(
		config: CoordinatorConfig,
		provider: impl Into<Arc<P>>,
		endpoint: Url,
		store: Arc<dyn CredentialStore>,
	) -> Result<Self, ConfigError> {
		let transport = ReqwestExchangeTransport::new(endpoint)?;

		Self::new(config, provider, transport, store)
	}
}
impl<P, T> Clone for Coordinator<P, T>
where
	P: ?Sized + IdentityProvider,
	T: ?Sized + ExchangeTransport,
{
	fn clone(&self) -> Self {
		Self { shared: self.shared.clone() }
	}
}
impl<P, T> Debug for Coordinator<P, T>
where
	P: ?Sized + IdentityProvider,
	T: ?Sized + ExchangeTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let core = self.shared.core.lock();

		f.debug_struct("Coordinator")
			.field("phase", &core.state.phase)
			.field("tier", &core.state.tier())
			.field("exchange", &self.shared.exchange)
			.finish()
	}
}

struct Shared<P, T>
where
	P: ?Sized + IdentityProvider,
	T: ?Sized + ExchangeTransport,
{
	config: CoordinatorConfig,
	provider: Arc<P>,
	exchange: ExchangeClient<T>,
	store: Arc<dyn CredentialStore>,
	passive: Sequencer,
	manual: Sequencer,
	retries: RetryController,
	channel: NotificationChannel,
	core: Mutex<Core>,
	watch: watch::Sender<CoordinatorState>,
}

struct Core {
	state: CoordinatorState,
	phase_since: Instant,
}

struct Dispatched {
	disposition: Disposition,
	manual: Option<ExchangeHandle>,
}

struct ExchangeJob {
	kind: OperationKind,
	request_id: RequestId,
	identity: Identity,
	force_credential: bool,
	signal: CancellationToken,
	span: ExchangeSpan,
}

fn credential_failure(err: IdentityError) -> ExchangeError {
	match err {
		IdentityError::Cancelled => ExchangeError::Aborted,
		IdentityError::SignedOut =>
			ExchangeError::Unauthorized { status: None, message: err.to_string() },
		IdentityError::Provider { message } => ExchangeError::Other { status: None, message },
	}
}
