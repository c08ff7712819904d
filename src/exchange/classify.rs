//! Failure classification for the session exchange.
//!
//! Classification decides whether the state machine retries, gives up without a downgrade, or
//! drops to guest mode, so a warming-up backend must never be mistaken for a rejected
//! credential.

// self
use crate::_prelude::*;

/// Retry-ability class of a failed exchange attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
	/// Gateway/5xx/network failure: the backend is unavailable but the identity is still valid.
	RetryableGateway,
	/// The identity credential itself was rejected (401/403).
	AuthFailure,
	/// The attempt hit the exchange timeout.
	Timeout,
	/// Anything else; retried once, then terminal.
	Other,
}
impl FailureClass {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FailureClass::RetryableGateway => "retryable_gateway",
			FailureClass::AuthFailure => "auth_failure",
			FailureClass::Timeout => "timeout",
			FailureClass::Other => "other",
		}
	}
}
impl Display for FailureClass {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Hook that maps a failed exchange response into a [`FailureClass`].
///
/// Deployments whose backend speaks a different error vocabulary override this; the default
/// covers the usual status codes and error-code strings.
pub trait FailureClassifier
where
	Self: Send + Sync,
{
	/// Classifies a failed attempt.
	fn classify(&self, ctx: &FailureContext) -> FailureClass;
}

/// Primitive data describing a failed exchange attempt.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FailureContext {
	/// HTTP status code returned by the endpoint, when available.
	pub http_status: Option<u16>,
	/// Backend-supplied `error` code.
	pub error_code: Option<String>,
	/// Backend-supplied human-readable `message`.
	pub message: Option<String>,
	/// Preview of the response body for non-JSON payloads.
	pub body_preview: Option<String>,
	/// Indicates whether the failure originated from the network/transport layer.
	pub network_error: bool,
}
impl FailureContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Convenience constructor for transport-level/network failures.
	pub fn network_failure() -> Self {
		Self { network_error: true, ..Self::default() }
	}

	/// Adds an HTTP status code.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the backend error code.
	pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
		self.error_code = Some(code.into());

		self
	}

	/// Adds the backend message.
	pub fn with_message(mut self, message: impl Into<String>) -> Self {
		self.message = Some(message.into());

		self
	}

	/// Adds a truncated body preview.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		self.body_preview = Some(truncate_preview(body.into()));

		self
	}

	/// Best human-readable summary of the failure.
	pub fn summary(&self) -> String {
		self.message
			.clone()
			.or_else(|| self.error_code.clone())
			.or_else(|| self.body_preview.clone())
			.or_else(|| self.network_error.then(|| "network failure".to_owned()))
			.unwrap_or_else(|| "no details".to_owned())
	}
}

/// Default classifier: the HTTP status decides first (401/403 auth, 429/5xx gateway); error
/// codes and body hints only classify statuses that do not. Network failures are always
/// treated as gateway failures.
#[derive(Debug, Default)]
pub struct DefaultFailureClassifier;
impl FailureClassifier for DefaultFailureClassifier {
	fn classify(&self, ctx: &FailureContext) -> FailureClass {
		if ctx.network_error {
			return FailureClass::RetryableGateway;
		}
		// A warming backend may answer 5xx with an auth-looking code; the status wins.
		if let Some(class) = classify_status(ctx.http_status) {
			return class;
		}
		if let Some(class) = ctx.error_code.as_deref().and_then(match_error_code) {
			return class;
		}

		classify_body(ctx.body_preview.as_deref()).unwrap_or(FailureClass::Other)
	}
}

fn truncate_preview(body: String) -> String {
	if body.chars().count() <= FailureContext::BODY_PREVIEW_LIMIT {
		return body;
	}

	let mut buf: String = body.chars().take(FailureContext::BODY_PREVIEW_LIMIT).collect();

	buf.push('…');

	buf
}

fn match_error_code(value: &str) -> Option<FailureClass> {
	const AUTH: [&str; 5] =
		["unauthenticated", "permission_denied", "invalid_token", "token_expired", "id_token_revoked"];
	const GATEWAY: [&str; 4] =
		["unavailable", "backend_starting", "deadline_exceeded", "resource_exhausted"];

	if AUTH.iter().any(|code| value.eq_ignore_ascii_case(code)) {
		Some(FailureClass::AuthFailure)
	} else if GATEWAY.iter().any(|code| value.eq_ignore_ascii_case(code)) {
		Some(FailureClass::RetryableGateway)
	} else {
		None
	}
}

fn classify_body(body: Option<&str>) -> Option<FailureClass> {
	let lowered = body?.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("bad gateway")
			|| text.contains("service unavailable")
			|| text.contains("gateway timeout") =>
			Some(FailureClass::RetryableGateway),
		_ => None,
	}
}

fn classify_status(status: Option<u16>) -> Option<FailureClass> {
	match status? {
		401 | 403 => Some(FailureClass::AuthFailure),
		429 => Some(FailureClass::RetryableGateway),
		code if code >= 500 => Some(FailureClass::RetryableGateway),
		_ => None,
	}
}
