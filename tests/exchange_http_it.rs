#![cfg(feature = "reqwest")]

mod common;

// std
use std::{sync::Arc, time::Duration};
// crates.io
use httpmock::prelude::*;
use serde_json::json;
use tokio_util::sync::CancellationToken;
// self
use common::{PREMIUM, StaticProvider};
use session_coordinator::{
	auth::{Secret, Tier},
	config::CoordinatorConfig,
	coordinator::ReqwestCoordinator,
	exchange::{ExchangeClient, ExchangeError, FailureClass},
	http::ReqwestExchangeTransport,
	state::AuthPhase,
	store::{CredentialStore, MemoryStore},
	url::Url,
};

fn client_for(
	server: &MockServer,
	store: Arc<MemoryStore>,
) -> color_eyre::Result<ExchangeClient<ReqwestExchangeTransport>> {
	let transport = ReqwestExchangeTransport::new(Url::parse(&server.url("/session"))?)?;

	Ok(ExchangeClient::new(transport, store, Duration::from_secs(5)))
}

#[tokio::test]
async fn exchange_posts_credential_and_profile_hints() -> color_eyre::Result<()> {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/session")
				.header("authorization", "Bearer id-token-http")
				.json_body(json!({
					"idToken": "id-token-http",
					"email": "uid-http@example.com"
				}));
			then.status(200).header("content-type", "application/json").body(PREMIUM);
		})
		.await;
	let store = Arc::new(MemoryStore::default());
	let client = client_for(&server, store.clone())?;
	let identity = common::identity("uid-http");
	let entitlement = client
		.exchange(&identity, Secret::new("id-token-http"), &CancellationToken::new())
		.await?;

	mock.assert_async().await;

	assert_eq!(entitlement.tier, Tier::Premium);
	assert_eq!(
		store.get()?.map(|session| session.credential.expose().to_owned()),
		Some("sess-premium".to_owned())
	);

	Ok(())
}

#[tokio::test]
async fn http_statuses_are_classified() {
	let cases = [
		(503, "", Some(FailureClass::RetryableGateway)),
		(429, "{\"error\":\"resource_exhausted\"}", Some(FailureClass::RetryableGateway)),
		(403, "{\"error\":\"permission_denied\",\"message\":\"revoked\"}", Some(FailureClass::AuthFailure)),
		(200, "{\"sessionCredential\":\"s\"}", Some(FailureClass::Other)),
		(404, "not here", Some(FailureClass::Other)),
	];

	for (status, body, expected) in cases {
		let server = MockServer::start_async().await;

		server
			.mock_async(|when, then| {
				when.method(POST).path("/session");
				then.status(status).body(body);
			})
			.await;

		let store = Arc::new(MemoryStore::default());
		let client = client_for(&server, store.clone()).expect("Client fixture should build.");
		let err = client
			.exchange(&common::identity("uid-status"), Secret::new("id-token"), &CancellationToken::new())
			.await
			.expect_err("Scripted status should fail the exchange.");

		assert_eq!(err.class(), expected, "status {status}: {err}");
		assert!(store.get().expect("Lookup should succeed.").is_none());

		if status == 503 {
			assert!(matches!(err, ExchangeError::Gateway { status: Some(503), .. }));
		}
	}
}

#[tokio::test]
async fn coordinator_establishes_over_http() -> color_eyre::Result<()> {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/session");
			then.status(200).header("content-type", "application/json").body(PREMIUM);
		})
		.await;

	let provider = StaticProvider::new("uid-e2e");
	let store = Arc::new(MemoryStore::default());
	let coordinator: ReqwestCoordinator<StaticProvider> = ReqwestCoordinator::with_endpoint(
		CoordinatorConfig::default(),
		provider.clone(),
		Url::parse(&server.url("/session"))?,
		store.clone(),
	)?;

	coordinator.identity_changed(Some(provider.identity()));

	let mut states = coordinator.subscribe();
	let state = tokio::time::timeout(
		Duration::from_secs(10),
		states.wait_for(|state| state.phase != AuthPhase::Exchanging),
	)
	.await??
	.clone();

	assert_eq!(state.phase, AuthPhase::Established);
	assert_eq!(state.tier(), Tier::Premium);
	assert!(store.get()?.is_some());

	Ok(())
}
