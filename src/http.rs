//! Transport primitives for the session exchange call.
//!
//! [`ExchangeTransport`] is the coordinator's only dependency on an HTTP stack. It returns the
//! raw status and body so [`ExchangeClient`](crate::exchange::ExchangeClient) can classify
//! failures consistently regardless of the client in use.

// crates.io
#[cfg(feature = "reqwest")] use reqwest::{header::CONTENT_TYPE, redirect::Policy};
// self
use crate::{
	_prelude::*,
	auth::{Identity, Secret},
	error::TransportError,
};
#[cfg(feature = "reqwest")] use crate::error::ConfigError;

/// Boxed future returned by [`ExchangeTransport::post_exchange`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ExchangeReply, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP transports capable of calling the exchange endpoint.
///
/// Implementations must be `Send + Sync + 'static` so one transport can be shared by the
/// passive sync, retries, and manual refreshes at once. Non-2xx responses are returned as
/// [`ExchangeReply`] values, not errors; only failures that produced no response at all
/// belong in [`TransportError`].
pub trait ExchangeTransport
where
	Self: 'static + Send + Sync,
{
	/// Posts `request` to the exchange endpoint.
	fn post_exchange<'a>(&'a self, request: &'a ExchangeRequest) -> TransportFuture<'a>;
}

/// Body of the session exchange call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRequest {
	/// Identity credential minted by the identity provider.
	pub id_token: Secret,
	/// Profile hint: email.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	/// Profile hint: display name.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub display_name: Option<String>,
}
impl ExchangeRequest {
	/// Builds a request carrying `id_token` and the identity's profile hints.
	pub fn new(identity: &Identity, id_token: Secret) -> Self {
		Self {
			id_token,
			email: identity.email.clone(),
			display_name: identity.display_name.clone(),
		}
	}
}

/// Raw response returned by the exchange endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExchangeReply {
	/// HTTP status code.
	pub status: u16,
	/// Response body bytes.
	pub body: Vec<u8>,
}
impl ExchangeReply {
	/// Creates a reply from a status and body.
	pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
		Self { status, body: body.into() }
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

/// Reqwest-backed transport posting JSON to a fixed exchange endpoint.
///
/// Redirects are not followed; the endpoint answers directly or fails.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestExchangeTransport {
	client: ReqwestClient,
	endpoint: Url,
}
#[cfg(feature = "reqwest")]
impl ReqwestExchangeTransport {
	/// Builds a transport with a dedicated client for `endpoint`.
	pub fn new(endpoint: Url) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder().redirect(Policy::none()).build()?;

		Self::with_client(client, endpoint)
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient, endpoint: Url) -> Result<Self, ConfigError> {
		if !matches!(endpoint.scheme(), "http" | "https") {
			return Err(ConfigError::InvalidEndpoint { endpoint: endpoint.to_string() });
		}

		Ok(Self { client, endpoint })
	}

	/// Exchange endpoint this transport posts to.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}
}
#[cfg(feature = "reqwest")]
impl ExchangeTransport for ReqwestExchangeTransport {
	fn post_exchange<'a>(&'a self, request: &'a ExchangeRequest) -> TransportFuture<'a> {
		Box::pin(async move {
			let body = serde_json::to_vec(request).map_err(TransportError::network)?;
			let response = self
				.client
				.post(self.endpoint.clone())
				.bearer_auth(request.id_token.expose())
				.header(CONTENT_TYPE, "application/json")
				.body(body)
				.send()
				.await?;
			let status = response.status().as_u16();
			let body = response.bytes().await?.to_vec();

			Ok(ExchangeReply { status, body })
		})
	}
}
