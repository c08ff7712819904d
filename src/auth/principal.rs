//! Signed-in principal as reported by the identity provider.

// crates.io
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, auth::UserId};

/// Opaque reference to the signed-in principal.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
	/// Identity-provider uid.
	pub uid: UserId,
	/// Verified email, when the provider shares one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	/// Display name, when the provider shares one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub display_name: Option<String>,
}
impl Identity {
	/// Creates an identity with no profile hints.
	pub fn new(uid: UserId) -> Self {
		Self { uid, email: None, display_name: None }
	}

	/// Attaches an email hint.
	pub fn with_email(mut self, email: impl Into<String>) -> Self {
		self.email = Some(email.into());

		self
	}

	/// Attaches a display-name hint.
	pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
		self.display_name = Some(name.into());

		self
	}

	/// Returns `true` when both identities refer to the same principal.
	pub fn same_principal(&self, other: &Identity) -> bool {
		self.uid == other.uid
	}

	/// Short, log-safe fingerprint of the uid (first 8 bytes of its SHA-256 digest).
	pub fn fingerprint(&self) -> String {
		let digest = Sha256::digest(self.uid.as_bytes());

		digest.iter().take(8).map(|byte| format!("{byte:02x}")).collect()
	}
}
impl Debug for Identity {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Identity")
			.field("fingerprint", &self.fingerprint())
			.field("email_set", &self.email.is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn identity(uid: &str) -> Identity {
		Identity::new(UserId::new(uid).expect("User fixture should be valid."))
	}

	#[test]
	fn fingerprint_is_stable_and_short() {
		let alice = identity("alice").with_email("alice@example.com");

		assert_eq!(alice.fingerprint().len(), 16);
		assert_eq!(alice.fingerprint(), identity("alice").fingerprint());
		assert_ne!(alice.fingerprint(), identity("bob").fingerprint());
	}

	#[test]
	fn debug_hides_profile_hints() {
		let rendered = format!("{:?}", identity("alice").with_email("alice@example.com"));

		assert!(!rendered.contains("alice@example.com"));
		assert!(rendered.contains("email_set: true"));
	}

	#[test]
	fn same_principal_ignores_hints() {
		assert!(identity("alice").same_principal(&identity("alice").with_display_name("A")));
		assert!(!identity("alice").same_principal(&identity("bob")));
	}
}
