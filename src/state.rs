//! Coordinator state aggregate. Only [`reducer::reduce`](crate::reducer::reduce) mutates it.

// self
use crate::{
	_prelude::*,
	auth::{Entitlement, Identity, Tier},
	exchange::FailureClass,
	sequencer::{OperationKind, RequestId},
};

/// Coarse authentication phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
	/// No identity, nothing to exchange.
	#[default]
	Idle,
	/// A session exchange is in flight or a retry is queued.
	Exchanging,
	/// An exchange succeeded for the current identity, or retries were exhausted without a
	/// downgrade.
	Established,
	/// A non-retryable failure occurred and has not been resolved.
	Error,
}
impl AuthPhase {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			AuthPhase::Idle => "idle",
			AuthPhase::Exchanging => "exchanging",
			AuthPhase::Established => "established",
			AuthPhase::Error => "error",
		}
	}
}
impl Display for AuthPhase {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Single aggregate describing who is signed in and at what tier.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CoordinatorState {
	/// Signed-in principal, updated synchronously on every identity event.
	pub identity: Option<Identity>,
	/// `true` once the identity provider reported its first state; never reset.
	pub initialized: bool,
	/// Current phase.
	pub phase: AuthPhase,
	/// Most recent passive-sync attempt.
	pub active_request_id: Option<RequestId>,
	/// Most recent manual refresh attempt.
	pub manual_request_id: Option<RequestId>,
	/// Retries spent in the current identity sequence.
	pub retry_count: u32,
	/// Last confirmed entitlement, or the lowest-tier default.
	pub entitlement: Entitlement,
	/// Whether [`Self::entitlement`] was confirmed by a successful exchange.
	pub entitlement_confirmed: bool,
	/// Class of the most recent non-stale failure.
	pub last_failure: Option<FailureClass>,
	pub(crate) resume_phase: AuthPhase,
	pub(crate) other_retry_spent: bool,
}
impl CoordinatorState {
	/// Identity present and session established.
	pub fn is_authenticated(&self) -> bool {
		self.identity.is_some() && self.phase == AuthPhase::Established
	}

	/// Tier can be trusted by consumers: initialized and no exchange pending.
	pub fn tier_ready(&self) -> bool {
		self.initialized && self.phase != AuthPhase::Exchanging
	}

	/// Current tier.
	pub fn tier(&self) -> Tier {
		self.entitlement.tier
	}

	/// Confirmed at the platform's highest tier; transient failures must not lower it.
	pub fn holds_confirmed_top_tier(&self) -> bool {
		self.entitlement_confirmed && self.entitlement.tier.is_highest()
	}

	/// Latest attempt id recorded for `kind`.
	pub fn request_id(&self, kind: OperationKind) -> Option<RequestId> {
		match kind {
			OperationKind::Sync => self.active_request_id,
			OperationKind::Manual => self.manual_request_id,
		}
	}

	/// Returns `true` when `id` is no longer the latest attempt of `kind`.
	pub fn is_stale(&self, kind: OperationKind, id: RequestId) -> bool {
		self.request_id(kind) != Some(id)
	}

	/// Returns `true` while a queued retry superseding `id` may still fire.
	pub fn awaiting_retry(&self, id: RequestId) -> bool {
		self.phase == AuthPhase::Exchanging && self.active_request_id == Some(id)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::UserId;

	#[test]
	fn defaults_are_conservative() {
		let state = CoordinatorState::default();

		assert_eq!(state.phase, AuthPhase::Idle);
		assert!(!state.initialized);
		assert!(!state.is_authenticated());
		assert!(!state.tier_ready());
		assert_eq!(state.tier(), Tier::Free);
		assert!(!state.entitlement_confirmed);
	}

	#[test]
	fn derived_flags_follow_phase() {
		let mut state = CoordinatorState {
			identity: Some(Identity::new(UserId::new("uid").expect("User fixture should be valid."))),
			initialized: true,
			phase: AuthPhase::Exchanging,
			..Default::default()
		};

		assert!(!state.tier_ready());
		assert!(!state.is_authenticated());

		state.phase = AuthPhase::Established;

		assert!(state.tier_ready());
		assert!(state.is_authenticated());
	}
}
