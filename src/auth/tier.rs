//! Subscription tiers and the entitlement snapshot returned by the session exchange.

// self
use crate::_prelude::*;

/// Access level resolved from the subscription state, ordered from lowest to highest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
	/// Lowest tier; the conservative default before any exchange confirms otherwise.
	#[default]
	Free,
	/// Paid tier.
	Premium,
}
impl Tier {
	/// Platform's highest tier.
	pub const HIGHEST: Tier = Tier::Premium;

	/// Returns `true` for the platform's highest tier.
	pub const fn is_highest(self) -> bool {
		matches!(self, Tier::Premium)
	}

	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Tier::Free => "free",
			Tier::Premium => "premium",
		}
	}
}
impl Display for Tier {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Tier plus subscription metadata as reported by the backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entitlement {
	/// Resolved access tier.
	pub tier: Tier,
	/// Backend subscription status (`active`, `trialing`, `past_due`, ...).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<String>,
	/// Instant the current subscription period renews or lapses.
	#[serde(default, with = "time::serde::timestamp::option", skip_serializing_if = "Option::is_none")]
	pub renews_at: Option<OffsetDateTime>,
}
impl Entitlement {
	/// Creates a snapshot for the provided tier without subscription metadata.
	pub fn new(tier: Tier) -> Self {
		Self { tier, status: None, renews_at: None }
	}

	/// Attaches the backend subscription status.
	pub fn with_status(mut self, status: impl Into<String>) -> Self {
		self.status = Some(status.into());

		self
	}

	/// Attaches the renewal instant.
	pub fn with_renews_at(mut self, instant: OffsetDateTime) -> Self {
		self.renews_at = Some(instant);

		self
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn tiers_are_ordered_and_default_to_free() {
		assert!(Tier::Free < Tier::Premium);
		assert_eq!(Tier::default(), Tier::Free);
		assert!(Tier::HIGHEST.is_highest());
		assert!(!Tier::Free.is_highest());
	}

	#[test]
	fn entitlement_wire_format_uses_camel_case_and_unix_seconds() {
		let entitlement = Entitlement::new(Tier::Premium)
			.with_status("active")
			.with_renews_at(macros::datetime!(2026-01-01 00:00 UTC));
		let payload =
			serde_json::to_string(&entitlement).expect("Entitlement should serialize to JSON.");

		assert_eq!(payload, "{\"tier\":\"premium\",\"status\":\"active\",\"renewsAt\":1767225600}");

		let minimal: Entitlement = serde_json::from_str("{\"tier\":\"free\"}")
			.expect("Entitlement without metadata should deserialize.");

		assert_eq!(minimal, Entitlement::default());
	}
}
