//! Thread-safe in-memory [`CredentialStore`] for tests and single-process hosts.

// self
use crate::{
	_prelude::*,
	store::{CredentialStore, StoreError, StoredSession},
};

/// Storage backend that keeps the session in-process; cloning shares the same slot.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<RwLock<Option<StoredSession>>>);
impl MemoryStore {
	/// Creates a store pre-seeded with `session`, simulating a reload with a live credential.
	pub fn with_session(session: StoredSession) -> Self {
		Self(Arc::new(RwLock::new(Some(session))))
	}
}
impl CredentialStore for MemoryStore {
	fn get(&self) -> Result<Option<StoredSession>, StoreError> {
		Ok(self.0.read().clone())
	}

	fn set(&self, session: StoredSession) -> Result<(), StoreError> {
		*self.0.write() = Some(session);

		Ok(())
	}

	fn clear(&self) -> Result<(), StoreError> {
		self.0.write().take();

		Ok(())
	}
}
