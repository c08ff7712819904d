//! File-backed [`CredentialStore`] so a reload can restore the confirmed session.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	store::{CredentialStore, StoreError, StoredSession},
};

/// Persists the session to a JSON file after each mutation.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<Option<StoredSession>>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<Option<StoredSession>, StoreError> {
		if !path.exists() {
			return Ok(None);
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(None);
		}

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &Option<StoredSession>) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(contents).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize session snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl CredentialStore for FileStore {
	fn get(&self) -> Result<Option<StoredSession>, StoreError> {
		Ok(self.inner.read().clone())
	}

	fn set(&self, session: StoredSession) -> Result<(), StoreError> {
		let mut guard = self.inner.write();
		let next = Some(session);

		self.persist_locked(&next)?;
		*guard = next;

		Ok(())
	}

	fn clear(&self) -> Result<(), StoreError> {
		let mut guard = self.inner.write();

		self.persist_locked(&None)?;
		guard.take();

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use tempfile::TempDir;
	// self
	use super::*;
	use crate::auth::{Entitlement, Secret, Tier, UserId};

	fn session() -> StoredSession {
		StoredSession {
			uid: UserId::new("uid-file").expect("User fixture should be valid."),
			credential: Secret::new("persisted"),
			entitlement: Entitlement::new(Tier::Premium).with_status("active"),
			issued_at: OffsetDateTime::UNIX_EPOCH,
		}
	}

	#[test]
	fn reopen_restores_the_session() {
		let dir = TempDir::new().expect("Temporary directory should be created.");
		let path = dir.path().join("nested").join("session.json");
		let store = FileStore::open(&path).expect("Opening a fresh store should succeed.");

		assert_eq!(store.get().expect("Empty lookup should succeed."), None);

		store.set(session()).expect("Persisting the session should succeed.");

		let reopened = FileStore::open(&path).expect("Reopening the store should succeed.");

		assert_eq!(reopened.get().expect("Lookup should succeed."), Some(session()));
	}

	#[test]
	fn clear_survives_reopen() {
		let dir = TempDir::new().expect("Temporary directory should be created.");
		let path = dir.path().join("session.json");
		let store = FileStore::open(&path).expect("Opening a fresh store should succeed.");

		store.set(session()).expect("Persisting the session should succeed.");
		store.clear().expect("Clearing the session should succeed.");

		let reopened = FileStore::open(&path).expect("Reopening the store should succeed.");

		assert_eq!(reopened.get().expect("Lookup should succeed."), None);
		assert!(!path.with_extension("tmp").exists(), "Temp file should be renamed away.");
	}

	#[test]
	fn corrupt_file_reports_serialization_error() {
		let dir = TempDir::new().expect("Temporary directory should be created.");
		let path = dir.path().join("session.json");

		fs::write(&path, b"{not json").expect("Fixture write should succeed.");

		let err = FileStore::open(&path).expect_err("Corrupt snapshots should be rejected.");

		assert!(matches!(err, StoreError::Serialization { .. }));
	}
}
