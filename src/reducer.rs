//! Single-writer state machine.
//!
//! [`reduce`] is the only code that mutates [`CoordinatorState`]. It is a pure, synchronous
//! function: it never performs I/O and never awaits. Anything the outside world must do as a
//! consequence of a transition (start an exchange, queue a retry, clear the stored credential)
//! is returned as an [`Effect`] for the façade to execute in order.
//!
//! Every completion event carries the [`RequestId`] of the attempt that produced it; events
//! whose id is no longer the latest of their lane resolve to [`Disposition::Stale`] and leave
//! the state untouched.

// self
use crate::{
	auth::{Entitlement, Identity},
	exchange::FailureClass,
	retry::RetryPolicy,
	sequencer::{OperationKind, RequestId},
	state::{AuthPhase, CoordinatorState},
};

/// Typed inputs of the state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
	/// The identity provider reported a principal (or its absence).
	IdentityChanged {
		/// New principal.
		identity: Option<Identity>,
		/// Entitlement of a stored session issued to the same principal.
		stored: Option<Entitlement>,
		/// Passive-sync attempt opened for this event.
		request_id: RequestId,
	},
	/// An attempt is about to call the exchange endpoint.
	ExchangeStarted {
		/// Lane of the attempt.
		kind: OperationKind,
		/// Attempt id.
		request_id: RequestId,
	},
	/// The exchange returned an entitlement.
	ExchangeSucceeded {
		/// Lane of the attempt.
		kind: OperationKind,
		/// Attempt id.
		request_id: RequestId,
		/// Confirmed entitlement.
		entitlement: Entitlement,
	},
	/// The exchange failed with a classified error.
	ExchangeFailed {
		/// Lane of the attempt.
		kind: OperationKind,
		/// Attempt id.
		request_id: RequestId,
		/// Failure class.
		class: FailureClass,
	},
	/// A queued retry elapsed and opened a new passive attempt.
	RetryFired {
		/// Failed attempt the retry replaces.
		superseded: RequestId,
		/// Attempt id of the retry.
		request_id: RequestId,
	},
	/// The retry controller refused to queue another attempt.
	RetryRefused {
		/// Failed attempt that asked for the retry.
		superseded: RequestId,
	},
	/// The user asked for an explicit refresh.
	ManualRetryRequested {
		/// Manual attempt id.
		request_id: RequestId,
	},
	/// An attempt observed its cancellation signal.
	Aborted {
		/// Lane of the attempt.
		kind: OperationKind,
		/// Attempt id.
		request_id: RequestId,
	},
	/// Explicit sign-out.
	SignOut,
}

/// Side effects requested by a transition, in execution order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
	/// Run an exchange attempt.
	StartExchange {
		/// Lane of the attempt.
		kind: OperationKind,
		/// Attempt id.
		request_id: RequestId,
		/// The phase does not wait on this attempt.
		background: bool,
		/// Ask the identity provider for a freshly minted credential.
		force_credential: bool,
	},
	/// Queue a delayed passive re-attempt replacing `after`.
	ScheduleRetry {
		/// Failed attempt.
		after: RequestId,
		/// 1-based retry number within the current sequence.
		attempt: u32,
	},
	/// Drop every queued retry.
	CancelRetries,
	/// Cancel the in-flight attempt of a lane.
	CancelInFlight(OperationKind),
	/// Remove the persisted session credential.
	ClearCredential,
	/// Stop reusing refresh outcomes recorded for the previous principal.
	ForgetRefreshes,
}

/// How an event was handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
	/// The state may have changed and effects must run.
	Applied,
	/// The event belongs to a superseded attempt and was discarded.
	Stale,
	/// The event does not apply in the current state.
	Ignored,
}

/// Result of one [`reduce`] call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
	/// How the event was handled.
	pub disposition: Disposition,
	/// Effects to execute, in order.
	pub effects: Vec<Effect>,
}
impl Transition {
	fn applied(effects: Vec<Effect>) -> Self {
		Self { disposition: Disposition::Applied, effects }
	}

	fn stale() -> Self {
		Self { disposition: Disposition::Stale, effects: Vec::new() }
	}

	fn ignored() -> Self {
		Self { disposition: Disposition::Ignored, effects: Vec::new() }
	}

	/// Returns `true` when the event took effect.
	pub fn is_applied(&self) -> bool {
		self.disposition == Disposition::Applied
	}
}

/// Applies `event` to `state` and returns the effects the caller must run.
pub fn reduce(state: &mut CoordinatorState, event: Event, policy: &RetryPolicy) -> Transition {
	match event {
		Event::IdentityChanged { identity, stored, request_id } =>
			identity_changed(state, identity, stored, request_id),
		Event::ExchangeStarted { kind, request_id } =>
			if state.is_stale(kind, request_id) {
				Transition::stale()
			} else {
				Transition::applied(Vec::new())
			},
		Event::ExchangeSucceeded { kind, request_id, entitlement } =>
			exchange_succeeded(state, kind, request_id, entitlement),
		Event::ExchangeFailed { kind, request_id, class } =>
			exchange_failed(state, kind, request_id, class, policy),
		Event::RetryFired { superseded, request_id } => {
			if !state.awaiting_retry(superseded) {
				return Transition::stale();
			}

			state.active_request_id = Some(request_id);

			Transition::applied(vec![Effect::StartExchange {
				kind: OperationKind::Sync,
				request_id,
				background: false,
				force_credential: false,
			}])
		},
		Event::RetryRefused { superseded } => {
			if !state.awaiting_retry(superseded) {
				return Transition::stale();
			}

			state.phase = exhausted_phase(state.last_failure);

			Transition::applied(Vec::new())
		},
		Event::ManualRetryRequested { request_id } => manual_retry_requested(state, request_id),
		Event::Aborted { kind, request_id } => aborted(state, kind, request_id),
		Event::SignOut => sign_out(state),
	}
}

fn identity_changed(
	state: &mut CoordinatorState,
	identity: Option<Identity>,
	stored: Option<Entitlement>,
	request_id: RequestId,
) -> Transition {
	let switched = match (&state.identity, &identity) {
		(Some(previous), Some(next)) => !previous.same_principal(next),
		(None, None) => false,
		_ => true,
	};
	let mut effects = vec![Effect::CancelRetries];

	state.initialized = true;
	state.active_request_id = Some(request_id);
	state.retry_count = 0;
	state.other_retry_spent = false;

	if switched {
		reset_entitlement(state);

		state.manual_request_id = None;
		state.last_failure = None;

		effects.push(Effect::CancelInFlight(OperationKind::Manual));
		effects.push(Effect::ForgetRefreshes);
	}

	let Some(identity) = identity else {
		state.identity = None;
		state.phase = AuthPhase::Idle;

		return Transition::applied(effects);
	};

	state.identity = Some(identity);

	match stored {
		Some(entitlement) => {
			state.phase = AuthPhase::Established;
			state.entitlement = entitlement;
			state.entitlement_confirmed = true;

			effects.push(Effect::StartExchange {
				kind: OperationKind::Sync,
				request_id,
				background: true,
				force_credential: false,
			});
		},
		None => {
			enter_exchanging(state);
			effects.push(Effect::StartExchange {
				kind: OperationKind::Sync,
				request_id,
				background: false,
				force_credential: false,
			});
		},
	}

	Transition::applied(effects)
}

fn exchange_succeeded(
	state: &mut CoordinatorState,
	kind: OperationKind,
	request_id: RequestId,
	entitlement: Entitlement,
) -> Transition {
	if state.is_stale(kind, request_id) {
		return Transition::stale();
	}

	state.phase = AuthPhase::Established;
	state.entitlement = entitlement;
	state.entitlement_confirmed = true;
	state.retry_count = 0;
	state.other_retry_spent = false;
	state.last_failure = None;

	match kind {
		OperationKind::Sync => Transition::applied(Vec::new()),
		// A confirmed manual result supersedes whatever the passive lane still has in flight.
		OperationKind::Manual => {
			state.manual_request_id = None;
			state.active_request_id = None;

			Transition::applied(vec![
				Effect::CancelRetries,
				Effect::CancelInFlight(OperationKind::Sync),
			])
		},
	}
}

fn exchange_failed(
	state: &mut CoordinatorState,
	kind: OperationKind,
	request_id: RequestId,
	class: FailureClass,
	policy: &RetryPolicy,
) -> Transition {
	if state.is_stale(kind, request_id) {
		return Transition::stale();
	}

	state.last_failure = Some(class);

	match class {
		FailureClass::AuthFailure => downgrade_to_guest(state),
		FailureClass::Timeout if state.holds_confirmed_top_tier() => {
			if state.phase == AuthPhase::Exchanging {
				state.phase = AuthPhase::Established;
			}

			Transition::applied(Vec::new())
		},
		FailureClass::Timeout => downgrade_to_guest(state),
		// Background refresh of an established session.
		FailureClass::RetryableGateway | FailureClass::Other
			if state.phase != AuthPhase::Exchanging =>
			Transition::applied(Vec::new()),
		FailureClass::RetryableGateway => match kind {
			OperationKind::Sync => retry_or_settle(state, request_id, policy),
			// The backend answered the manual attempt, so a passive attempt still hanging
			// must not later time the session out.
			OperationKind::Manual => {
				state.phase = AuthPhase::Established;
				state.manual_request_id = None;
				state.active_request_id = None;

				Transition::applied(vec![
					Effect::CancelRetries,
					Effect::CancelInFlight(OperationKind::Sync),
				])
			},
		},
		FailureClass::Other => match kind {
			OperationKind::Sync if !state.other_retry_spent => {
				state.other_retry_spent = true;

				retry_or_settle(state, request_id, policy)
			},
			_ => {
				state.phase = AuthPhase::Error;

				Transition::applied(Vec::new())
			},
		},
	}
}

fn retry_or_settle(
	state: &mut CoordinatorState,
	request_id: RequestId,
	policy: &RetryPolicy,
) -> Transition {
	if state.retry_count < policy.max_retries {
		state.retry_count += 1;

		return Transition::applied(vec![Effect::ScheduleRetry {
			after: request_id,
			attempt: state.retry_count,
		}]);
	}

	state.phase = exhausted_phase(state.last_failure);

	Transition::applied(Vec::new())
}

fn manual_retry_requested(state: &mut CoordinatorState, request_id: RequestId) -> Transition {
	if state.identity.is_none() {
		return Transition::ignored();
	}

	enter_exchanging(state);

	state.retry_count = 0;
	state.other_retry_spent = false;
	state.manual_request_id = Some(request_id);

	Transition::applied(vec![
		Effect::CancelRetries,
		Effect::StartExchange {
			kind: OperationKind::Manual,
			request_id,
			background: false,
			force_credential: true,
		},
	])
}

fn aborted(state: &mut CoordinatorState, kind: OperationKind, request_id: RequestId) -> Transition {
	if state.is_stale(kind, request_id) {
		return Transition::stale();
	}
	if state.phase != AuthPhase::Exchanging {
		return Transition::ignored();
	}

	state.phase = state.resume_phase;

	match kind {
		OperationKind::Sync => Transition::applied(vec![Effect::CancelRetries]),
		OperationKind::Manual => Transition::applied(Vec::new()),
	}
}

fn sign_out(state: &mut CoordinatorState) -> Transition {
	state.identity = None;
	state.phase = AuthPhase::Idle;
	state.active_request_id = None;
	state.manual_request_id = None;
	state.retry_count = 0;
	state.other_retry_spent = false;
	state.last_failure = None;

	reset_entitlement(state);

	Transition::applied(vec![
		Effect::CancelRetries,
		Effect::CancelInFlight(OperationKind::Sync),
		Effect::CancelInFlight(OperationKind::Manual),
		Effect::ClearCredential,
		Effect::ForgetRefreshes,
	])
}

fn downgrade_to_guest(state: &mut CoordinatorState) -> Transition {
	obs_event!(
		info,
		failure = state.last_failure.map(FailureClass::as_str),
		"Authoritative exchange failure; continuing as guest."
	);

	state.identity = None;
	state.phase = AuthPhase::Idle;
	state.active_request_id = None;
	state.manual_request_id = None;
	state.retry_count = 0;
	state.other_retry_spent = false;

	reset_entitlement(state);

	Transition::applied(vec![
		Effect::ClearCredential,
		Effect::CancelRetries,
		Effect::CancelInFlight(OperationKind::Sync),
		Effect::CancelInFlight(OperationKind::Manual),
		Effect::ForgetRefreshes,
	])
}

fn enter_exchanging(state: &mut CoordinatorState) {
	if state.phase != AuthPhase::Exchanging {
		state.resume_phase = state.phase;
	}

	state.phase = AuthPhase::Exchanging;
}

fn reset_entitlement(state: &mut CoordinatorState) {
	state.entitlement = Entitlement::default();
	state.entitlement_confirmed = false;
}

fn exhausted_phase(last_failure: Option<FailureClass>) -> AuthPhase {
	match last_failure {
		Some(FailureClass::Other) => AuthPhase::Error,
		_ => AuthPhase::Established,
	}
}
