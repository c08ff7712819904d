//! Session exchange client: trades an identity credential for an application session plus an
//! entitlement snapshot.
//!
//! [`ExchangeClient::exchange`] bounds every attempt by the configured timeout and by the
//! attempt's cancellation signal, classifies failures through a [`FailureClassifier`], and on
//! success persists the issued [`StoredSession`]. It never touches coordinator state; the
//! façade turns its result into a reducer event.

pub mod classify;

mod metrics;

pub use classify::*;
pub use metrics::ExchangeMetrics;

// self
use crate::{
	_prelude::*,
	auth::{Entitlement, Identity, Secret},
	http::{ExchangeReply, ExchangeRequest, ExchangeTransport},
	store::{CredentialStore, StoredSession},
};

/// Classified failure of one exchange attempt.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ExchangeError {
	/// Backend unavailable (gateway, 5xx, network); the identity is still valid.
	#[error("Exchange endpoint is unavailable: {message}.")]
	Gateway {
		/// HTTP status code, when a response was received.
		status: Option<u16>,
		/// Failure summary.
		message: String,
	},
	/// The identity credential was rejected.
	#[error("Exchange endpoint rejected the identity credential: {message}.")]
	Unauthorized {
		/// HTTP status code, when a response was received.
		status: Option<u16>,
		/// Failure summary.
		message: String,
	},
	/// The attempt did not settle within the exchange timeout.
	#[error("Session exchange timed out after {}ms.", after.as_millis())]
	TimedOut {
		/// Timeout that elapsed.
		after: Duration,
	},
	/// The attempt was cancelled because a newer one of the same kind started.
	#[error("Session exchange was aborted.")]
	Aborted,
	/// Any other failure (malformed response, unexpected status, provider hiccup).
	#[error("Session exchange failed: {message}.")]
	Other {
		/// HTTP status code, when a response was received.
		status: Option<u16>,
		/// Failure summary.
		message: String,
	},
}
impl ExchangeError {
	/// Builds the error variant matching `class`.
	pub fn classified(class: FailureClass, status: Option<u16>, message: impl Into<String>) -> Self {
		let message = message.into();

		match class {
			FailureClass::RetryableGateway => Self::Gateway { status, message },
			FailureClass::AuthFailure => Self::Unauthorized { status, message },
			FailureClass::Timeout => Self::TimedOut { after: Duration::ZERO },
			FailureClass::Other => Self::Other { status, message },
		}
	}

	/// Failure class driving the state machine; `None` for aborted attempts.
	pub fn class(&self) -> Option<FailureClass> {
		match self {
			Self::Gateway { .. } => Some(FailureClass::RetryableGateway),
			Self::Unauthorized { .. } => Some(FailureClass::AuthFailure),
			Self::TimedOut { .. } => Some(FailureClass::Timeout),
			Self::Aborted => None,
			Self::Other { .. } => Some(FailureClass::Other),
		}
	}
}

/// Wraps the single outbound "exchange identity credential for session" call.
pub struct ExchangeClient<T>
where
	T: ?Sized + ExchangeTransport,
{
	transport: Arc<T>,
	store: Arc<dyn CredentialStore>,
	classifier: Arc<dyn FailureClassifier>,
	timeout: Duration,
	metrics: Arc<ExchangeMetrics>,
}
impl<T> ExchangeClient<T>
where
	T: ?Sized + ExchangeTransport,
{
	/// Creates a client using the default classifier.
	pub fn new(transport: impl Into<Arc<T>>, store: Arc<dyn CredentialStore>, timeout: Duration) -> Self {
		Self {
			transport: transport.into(),
			store,
			classifier: Arc::new(DefaultFailureClassifier),
			timeout,
			metrics: Default::default(),
		}
	}

	/// Replaces the failure classifier.
	pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
		self.classifier = classifier;

		self
	}

	/// Hard timeout applied to every attempt.
	pub fn timeout(&self) -> Duration {
		self.timeout
	}

	/// Store receiving issued sessions.
	pub fn store(&self) -> &Arc<dyn CredentialStore> {
		&self.store
	}

	/// Shared attempt counters.
	pub fn metrics(&self) -> &Arc<ExchangeMetrics> {
		&self.metrics
	}

	/// Performs one exchange attempt for `identity`.
	///
	/// The attempt resolves to [`ExchangeError::TimedOut`] once the timeout elapses and to
	/// [`ExchangeError::Aborted`] as soon as `signal` fires. The issued session is persisted
	/// only when the signal is still live after the response arrives, so a superseded attempt
	/// never overwrites the credential of the attempt that replaced it.
	pub async fn exchange(
		&self,
		identity: &Identity,
		id_token: Secret,
		signal: &CancellationToken,
	) -> Result<Entitlement, ExchangeError> {
		self.metrics.record_attempt();

		let request = ExchangeRequest::new(identity, id_token);
		let result = bounded(self.timeout, signal, self.send(&request)).await;
		let result = match result {
			Ok(_) if signal.is_cancelled() => Err(ExchangeError::Aborted),
			Ok((credential, entitlement)) => {
				self.persist(identity, credential, &entitlement);

				Ok(entitlement)
			},
			Err(err) => Err(err),
		};

		match &result {
			Ok(_) => self.metrics.record_success(),
			Err(ExchangeError::Aborted) => self.metrics.record_aborted(),
			Err(ExchangeError::TimedOut { .. }) => self.metrics.record_timeout(),
			Err(_) => self.metrics.record_failure(),
		}

		result
	}

	async fn send(&self, request: &ExchangeRequest) -> Result<(Secret, Entitlement), ExchangeError> {
		let reply = match self.transport.post_exchange(request).await {
			Ok(reply) => reply,
			Err(err) => {
				let ctx = FailureContext::network_failure().with_message(err.to_string());

				return Err(self.classify(&ctx));
			},
		};

		if reply.is_success() {
			parse_session(&reply)
		} else {
			Err(self.classify(&failure_context(&reply)))
		}
	}

	fn classify(&self, ctx: &FailureContext) -> ExchangeError {
		ExchangeError::classified(self.classifier.classify(ctx), ctx.http_status, ctx.summary())
	}

	fn persist(&self, identity: &Identity, credential: Secret, entitlement: &Entitlement) {
		let session = StoredSession {
			uid: identity.uid.clone(),
			credential,
			entitlement: entitlement.clone(),
			issued_at: OffsetDateTime::now_utc(),
		};

		if let Err(err) = self.store.set(session) {
			obs_event!(warn, error = %err, "Failed to persist the exchanged session credential.");
		}
	}
}
impl<T> Debug for ExchangeClient<T>
where
	T: ?Sized + ExchangeTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ExchangeClient").field("timeout", &self.timeout).finish()
	}
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionBody {
	session_credential: Secret,
	entitlement: Entitlement,
}

#[derive(Default, Deserialize)]
struct ErrorBody {
	#[serde(default)]
	error: Option<String>,
	#[serde(default)]
	message: Option<String>,
}

/// Races `fut` against the timeout and the cancellation signal; cancellation wins ties.
pub(crate) async fn bounded<F, V>(
	limit: Duration,
	signal: &CancellationToken,
	fut: F,
) -> Result<V, ExchangeError>
where
	F: Future<Output = Result<V, ExchangeError>>,
{
	tokio::select! {
		biased;
		_ = signal.cancelled() => Err(ExchangeError::Aborted),
		outcome = tokio::time::timeout(limit, fut) =>
			outcome.unwrap_or_else(|_| Err(ExchangeError::TimedOut { after: limit })),
	}
}

fn parse_session(reply: &ExchangeReply) -> Result<(Secret, Entitlement), ExchangeError> {
	let mut de = serde_json::Deserializer::from_slice(&reply.body);
	let body: SessionBody = serde_path_to_error::deserialize(&mut de).map_err(|e| {
		ExchangeError::Other {
			status: Some(reply.status),
			message: format!("malformed exchange response at `{}`: {}", e.path(), e.inner()),
		}
	})?;

	Ok((body.session_credential, body.entitlement))
}

fn failure_context(reply: &ExchangeReply) -> FailureContext {
	let mut ctx = FailureContext::default().with_http_status(reply.status);

	match serde_json::from_slice::<ErrorBody>(&reply.body) {
		Ok(ErrorBody { error, message }) => {
			ctx.error_code = error;
			ctx.message = message;
		},
		Err(_) if !reply.body.is_empty() =>
			ctx = ctx.with_body_preview(String::from_utf8_lossy(&reply.body).into_owned()),
		Err(_) => {},
	}

	ctx
}
