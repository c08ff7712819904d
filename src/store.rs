//! Storage contract and built-in stores for the persisted session credential.
//!
//! The store holds at most one [`StoredSession`]. It is written only by the exchange client
//! after a successful exchange and cleared only on sign-out or an authoritative rejection.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{Entitlement, Identity, Secret, UserId},
};

/// Synchronous get/set/clear primitives for the session credential.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Returns the persisted session, if any.
	fn get(&self) -> Result<Option<StoredSession>, StoreError>;

	/// Persists or replaces the session.
	fn set(&self, session: StoredSession) -> Result<(), StoreError>;

	/// Removes the persisted session.
	fn clear(&self) -> Result<(), StoreError>;
}
impl dyn CredentialStore {
	/// Returns the persisted session only when it was issued to `identity`.
	pub fn session_for(&self, identity: &Identity) -> Result<Option<StoredSession>, StoreError> {
		Ok(self.get()?.filter(|session| session.uid == identity.uid))
	}
}

/// Application session issued by the exchange endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
	/// Principal the session was issued to.
	pub uid: UserId,
	/// Opaque session credential.
	pub credential: Secret,
	/// Entitlement confirmed by the exchange that issued the credential.
	pub entitlement: Entitlement,
	/// Issue instant.
	#[serde(with = "time::serde::timestamp")]
	pub issued_at: OffsetDateTime,
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
