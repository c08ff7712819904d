//! Scripted collaborators shared by the coordinator integration tests.

#![allow(dead_code)]

// std
use std::{
	collections::VecDeque,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
// crates.io
use parking_lot::Mutex;
// self
use session_coordinator::{
	auth::{Identity, Secret, UserId},
	error::TransportError,
	http::{ExchangeReply, ExchangeRequest, ExchangeTransport, TransportFuture},
	identity::{IdentityFuture, IdentityProvider},
};

pub const PREMIUM: &str =
	"{\"sessionCredential\":\"sess-premium\",\"entitlement\":{\"tier\":\"premium\",\"status\":\"active\"}}";
pub const FREE: &str = "{\"sessionCredential\":\"sess-free\",\"entitlement\":{\"tier\":\"free\"}}";

/// One scripted exchange response.
#[derive(Clone, Debug)]
pub enum Step {
	Reply(u16, &'static str),
	/// Replies after `delay`.
	Delayed(Duration, u16, &'static str),
	Network,
	/// Never settles.
	Hang,
}

/// Transport replaying [`Step`]s in order; the last step repeats once the script runs out.
#[derive(Debug)]
pub struct ScriptedTransport {
	steps: Mutex<VecDeque<Step>>,
	last: Mutex<Step>,
	calls: AtomicUsize,
	tokens: Mutex<Vec<String>>,
}
impl ScriptedTransport {
	pub fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
		let steps = steps.into_iter().collect::<VecDeque<_>>();
		let last = steps.back().cloned().unwrap_or(Step::Hang);

		Arc::new(Self {
			steps: Mutex::new(steps),
			last: Mutex::new(last),
			calls: AtomicUsize::new(0),
			tokens: Mutex::new(Vec::new()),
		})
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	/// Identity credentials presented so far.
	pub fn tokens(&self) -> Vec<String> {
		self.tokens.lock().clone()
	}

	/// Appends steps after the current script.
	pub fn push(&self, step: Step) {
		*self.last.lock() = step.clone();
		self.steps.lock().push_back(step);
	}

	fn next_step(&self) -> Step {
		self.steps.lock().pop_front().unwrap_or_else(|| self.last.lock().clone())
	}
}
impl ExchangeTransport for ScriptedTransport {
	fn post_exchange<'a>(&'a self, request: &'a ExchangeRequest) -> TransportFuture<'a> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		self.tokens.lock().push(request.id_token.expose().to_owned());

		let step = self.next_step();

		Box::pin(async move {
			match step {
				Step::Reply(status, body) => Ok(ExchangeReply::new(status, body)),
				Step::Delayed(delay, status, body) => {
					tokio::time::sleep(delay).await;

					Ok(ExchangeReply::new(status, body))
				},
				Step::Network => Err(TransportError::Io(std::io::Error::other("connection reset"))),
				Step::Hang => std::future::pending().await,
			}
		})
	}
}

/// Identity provider with a fixed principal and counting credential mints.
#[derive(Debug)]
pub struct StaticProvider {
	identity: Identity,
	mints: AtomicUsize,
	forced: AtomicUsize,
	sign_outs: AtomicUsize,
}
impl StaticProvider {
	pub fn new(uid: &str) -> Arc<Self> {
		Arc::new(Self {
			identity: identity(uid),
			mints: AtomicUsize::new(0),
			forced: AtomicUsize::new(0),
			sign_outs: AtomicUsize::new(0),
		})
	}

	pub fn identity(&self) -> Identity {
		self.identity.clone()
	}

	pub fn forced_mints(&self) -> usize {
		self.forced.load(Ordering::SeqCst)
	}

	pub fn sign_outs(&self) -> usize {
		self.sign_outs.load(Ordering::SeqCst)
	}
}
impl IdentityProvider for StaticProvider {
	fn sign_in(&self) -> IdentityFuture<'_, Identity> {
		Box::pin(async move { Ok(self.identity.clone()) })
	}

	fn sign_out(&self) -> IdentityFuture<'_, ()> {
		self.sign_outs.fetch_add(1, Ordering::SeqCst);

		Box::pin(async { Ok(()) })
	}

	fn credential(&self, force_refresh: bool) -> IdentityFuture<'_, Secret> {
		let n = self.mints.fetch_add(1, Ordering::SeqCst);

		if force_refresh {
			self.forced.fetch_add(1, Ordering::SeqCst);
		}

		Box::pin(async move { Ok(Secret::new(format!("id-token-{n}"))) })
	}
}

pub fn identity(uid: &str) -> Identity {
	Identity::new(UserId::new(uid).expect("User fixture should be valid."))
		.with_email(format!("{uid}@example.com"))
}

/// Lets spawned exchange tasks run to their next suspension point.
pub async fn settle() {
	for _ in 0..16 {
		tokio::task::yield_now().await;
	}
}
