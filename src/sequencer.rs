//! Request ids and cancellation handles for every asynchronous operation kind.
//!
//! Each [`Sequencer`] tracks the latest attempt of one [`OperationKind`]. Starting a new
//! attempt cancels the previous attempt's [`CancellationToken`] and issues a fresh
//! [`RequestId`]. Ids come from one process-wide counter, so they are unique and increasing
//! across sequencers.
//!
//! The façade records every started id in [`CoordinatorState`](crate::state::CoordinatorState)
//! under the same lock, so an id this module reports stale is stale to the reducer as well.
//! The converse does not hold: sign-out or a manual success clears ids in the state without
//! starting anything here.

// std
use std::{
	mem,
	sync::atomic::{AtomicU64, Ordering},
};
// self
use crate::_prelude::*;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of one exchange attempt.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);
impl RequestId {
	fn next() -> Self {
		Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
	}

	/// Raw numeric value.
	pub const fn get(self) -> u64 {
		self.0
	}
}
impl Debug for RequestId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "RequestId(#{})", self.0)
	}
}
impl Display for RequestId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "#{}", self.0)
	}
}

/// Logical operation kinds; each owns a separate [`Sequencer`] so one never cancels the other.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
	/// Passive, identity-driven session sync (including its scheduled retries).
	Sync,
	/// Explicit user-triggered retry or forced refresh.
	Manual,
}
impl OperationKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OperationKind::Sync => "sync",
			OperationKind::Manual => "manual",
		}
	}
}
impl Display for OperationKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Issues increasing request ids and cancellation handles for one operation kind.
#[derive(Debug)]
struct Slot {
	current: Option<RequestId>,
	signal: CancellationToken,
}

/// Issues increasing request ids and cancellation handles for one operation kind.
#[derive(Debug)]
pub struct Sequencer {
	kind: OperationKind,
	slot: Mutex<Slot>,
}
impl Sequencer {
	/// Creates a sequencer with no attempt started yet.
	pub fn new(kind: OperationKind) -> Self {
		Self { kind, slot: Mutex::new(Slot { current: None, signal: CancellationToken::new() }) }
	}

	/// Starts a new attempt, cancelling the previous one, and returns its id.
	pub fn start(&self) -> RequestId {
		let id = RequestId::next();
		let previous = {
			let mut slot = self.slot.lock();

			slot.current = Some(id);

			mem::replace(&mut slot.signal, CancellationToken::new())
		};

		previous.cancel();
		obs_event!(debug, kind = self.kind.as_str(), request_id = id.get(), "Attempt started.");

		id
	}

	/// Returns `true` iff a newer attempt started after `id`.
	pub fn is_stale(&self, id: RequestId) -> bool {
		self.slot.lock().current != Some(id)
	}

	/// Cancellation handle of the most recent attempt.
	pub fn signal(&self) -> CancellationToken {
		self.slot.lock().signal.clone()
	}

	/// Cancels the most recent attempt without starting a new one.
	pub fn cancel(&self) {
		self.slot.lock().signal.cancel();
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn ids_increase_and_mark_predecessors_stale() {
		let sequencer = Sequencer::new(OperationKind::Sync);
		let first = sequencer.start();
		let second = sequencer.start();

		assert!(second > first);
		assert!(sequencer.is_stale(first));
		assert!(!sequencer.is_stale(second));
		assert_eq!(second.to_string(), format!("#{}", second.get()));
	}

	#[test]
	fn start_cancels_previous_signal_only() {
		let sequencer = Sequencer::new(OperationKind::Sync);

		sequencer.start();

		let first_signal = sequencer.signal();

		sequencer.start();

		let second_signal = sequencer.signal();

		assert!(first_signal.is_cancelled());
		assert!(!second_signal.is_cancelled());
	}

	#[test]
	fn kinds_do_not_cross_cancel() {
		let sync = Sequencer::new(OperationKind::Sync);
		let manual = Sequencer::new(OperationKind::Manual);
		let sync_id = sync.start();
		let sync_signal = sync.signal();
		let manual_id = manual.start();

		assert_ne!(sync_id, manual_id, "Ids are unique across sequencers.");
		assert!(!sync.is_stale(sync_id));
		assert!(!sync_signal.is_cancelled());
		assert!(!manual.signal().is_cancelled());
	}

	#[test]
	fn cancel_keeps_the_current_id() {
		let sequencer = Sequencer::new(OperationKind::Manual);
		let id = sequencer.start();
		let signal = sequencer.signal();

		sequencer.cancel();

		assert!(signal.is_cancelled());
		assert!(!sequencer.is_stale(id));

		sequencer.start();

		assert!(!sequencer.signal().is_cancelled());
	}

	#[test]
	fn fresh_sequencer_treats_everything_as_stale() {
		let sequencer = Sequencer::new(OperationKind::Sync);
		let foreign = Sequencer::new(OperationKind::Sync).start();

		assert!(sequencer.is_stale(foreign));
	}
}
