//! Identity-provider boundary: sign-in/sign-out and credential minting.
//!
//! The popup/redirect mechanics live outside this crate. Providers report identity changes by
//! calling [`Coordinator::identity_changed`](crate::coordinator::Coordinator::identity_changed)
//! directly or through the channel handed to
//! [`Coordinator::listen`](crate::coordinator::Coordinator::listen).

// self
use crate::{
	_prelude::*,
	auth::{Identity, Secret},
};

/// Boxed future returned by [`IdentityProvider`] operations.
pub type IdentityFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, IdentityError>> + 'a + Send>>;

/// External authentication service consumed by the coordinator.
pub trait IdentityProvider
where
	Self: 'static + Send + Sync,
{
	/// Runs the interactive sign-in flow and returns the signed-in principal.
	fn sign_in(&self) -> IdentityFuture<'_, Identity>;

	/// Signs the principal out of the provider.
	fn sign_out(&self) -> IdentityFuture<'_, ()>;

	/// Returns an identity credential, minting a fresh one when `force_refresh` is set.
	fn credential(&self, force_refresh: bool) -> IdentityFuture<'_, Secret>;
}

/// Failures reported by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum IdentityError {
	/// The user dismissed the sign-in flow.
	#[error("Sign-in was cancelled by the user.")]
	Cancelled,
	/// No principal is signed in with the provider.
	#[error("The identity provider has no signed-in principal.")]
	SignedOut,
	/// Provider-side failure.
	#[error("Identity provider failure: {message}.")]
	Provider {
		/// Provider-supplied message.
		message: String,
	},
}
