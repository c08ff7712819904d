//! Coordinator-level error types shared across the exchange client, stores, and façade.

// self
use crate::_prelude::*;

/// Coordinator-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical coordinator error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Session exchange failed with a classified outcome.
	#[error(transparent)]
	Exchange(#[from] crate::exchange::ExchangeError),
	/// Identity provider failed to sign in, sign out, or mint a credential.
	#[error(transparent)]
	Identity(#[from] crate::identity::IdentityError),

	/// The requested action needs a signed-in identity.
	#[error("No identity is signed in.")]
	NotSignedIn,
}

/// Configuration and validation failures raised by the coordinator.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Exchange endpoint uses a scheme other than `http` or `https`.
	#[error("Exchange endpoint `{endpoint}` must use http or https.")]
	InvalidEndpoint {
		/// Rejected endpoint.
		endpoint: String,
	},
	/// A duration knob that must be positive was zero.
	#[error("The {field} duration must be positive.")]
	ZeroDuration {
		/// Offending configuration field.
		field: &'static str,
	},
	/// Exponential backoff factor is below one.
	#[error("Backoff factor must be at least 1.0, got {factor}.")]
	InvalidBackoffFactor {
		/// Rejected factor.
		factor: f64,
	},
	/// Jitter ratio lies outside `0.0..=1.0`.
	#[error("Jitter ratio must lie within 0.0..=1.0, got {ratio}.")]
	InvalidJitter {
		/// Rejected ratio.
		ratio: f64,
	},
	/// Configuration document could not be parsed.
	#[error("Configuration is malformed.")]
	Parse {
		/// Structured parsing failure, including the offending path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the exchange endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the exchange endpoint.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
