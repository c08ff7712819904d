//! Demonstrates a full session lifecycle against a mocked exchange endpoint: sign-in, the
//! blocking exchange, a shared refresh triggered by two expired API calls, and sign-out.

// std
use std::{sync::Arc, time::Duration};
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use url::Url;
// self
use session_coordinator::{
	auth::{Identity, Secret, UserId},
	channel::ExpiredContext,
	config::CoordinatorConfig,
	coordinator::ReqwestCoordinator,
	identity::{IdentityFuture, IdentityProvider},
	state::AuthPhase,
	store::{CredentialStore, MemoryStore},
};

/// Provider that is always signed in as the same demo principal.
#[derive(Debug)]
struct DemoProvider(Identity);
impl IdentityProvider for DemoProvider {
	fn sign_in(&self) -> IdentityFuture<'_, Identity> {
		Box::pin(async move { Ok(self.0.clone()) })
	}

	fn sign_out(&self) -> IdentityFuture<'_, ()> {
		Box::pin(async { Ok(()) })
	}

	fn credential(&self, force_refresh: bool) -> IdentityFuture<'_, Secret> {
		Box::pin(async move {
			Ok(Secret::new(if force_refresh { "demo-id-token-fresh" } else { "demo-id-token" }))
		})
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let exchange_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/session");
			then.status(200).header("content-type", "application/json").body(
				"{\"sessionCredential\":\"demo-session\",\"entitlement\":{\"tier\":\"premium\",\"status\":\"active\"}}",
			);
		})
		.await;
	let store = Arc::new(MemoryStore::default());
	let provider = Arc::new(DemoProvider(
		Identity::new(UserId::new("demo-user")?).with_email("demo@example.com"),
	));
	let coordinator: ReqwestCoordinator<DemoProvider> = ReqwestCoordinator::with_endpoint(
		CoordinatorConfig::default().with_refresh_debounce(Duration::from_millis(200)),
		provider,
		Url::parse(&server.url("/session"))?,
		store.clone(),
	)?;
	let mut states = coordinator.subscribe();

	coordinator.channel().on_refreshed(|tier| println!("Refreshed listener saw tier `{tier}`."));

	let identity = coordinator.sign_in().await?;

	println!("Signed in as {}.", identity.uid);

	let state = states.wait_for(|state| state.phase != AuthPhase::Exchanging).await?.clone();

	println!("Phase `{}` with tier `{}`.", state.phase, state.tier());

	let (first, second) = tokio::join!(
		coordinator.notify_expired(ExpiredContext::new("billing-api").with_status(401)),
		coordinator.notify_expired(ExpiredContext::new("profile-api").with_status(401)),
	);

	println!("Expired calls resolved to {first:?} and {second:?}.");
	println!("Exchange endpoint served {} request(s).", exchange_mock.hits_async().await);

	coordinator.sign_out().await?;

	println!(
		"Signed out; phase `{}`, stored credential present: {}.",
		coordinator.state().phase,
		store.get()?.is_some()
	);

	Ok(())
}
