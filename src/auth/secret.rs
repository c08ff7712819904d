//! Opaque credentials: identity-provider tokens and backend session credentials.

// crates.io
use serde::{Deserializer, de::Unexpected};
// self
use crate::_prelude::*;

/// Credential whose value never reaches a formatter.
///
/// Decoding rejects blank strings, so a backend answering `200` with an empty
/// `sessionCredential` fails the exchange instead of persisting a session nobody can use.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Secret(String);
impl Secret {
	/// Wraps a credential value.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the raw value for the wire. Never log it.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Byte length; safe to log.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` for an empty credential.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl AsRef<str> for Secret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Secret").field("len", &self.len()).finish_non_exhaustive()
	}
}
impl Display for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}
impl<'de> Deserialize<'de> for Secret {
	fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = String::deserialize(deserializer)?;

		if value.trim().is_empty() {
			return Err(serde::de::Error::invalid_value(
				Unexpected::Str(&value),
				&"a non-blank credential",
			));
		}

		Ok(Self(value))
	}
}
