//! Client-side session coordinator: reconciles identity-provider sign-in, the backend session
//! exchange, and subscription tier resolution into one convergent, non-oscillating state.
//!
//! All state mutation funnels through [`reducer::reduce`], a pure transition function over
//! [`state::CoordinatorState`]. The [`coordinator::Coordinator`] façade wires identity events,
//! [`sequencer::Sequencer`] request ids and cancellation handles, the
//! [`retry::RetryController`], and the [`channel::NotificationChannel`] around it.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

#[macro_use]
mod macros;

pub mod auth;
pub mod channel;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod exchange;
pub mod http;
pub mod identity;
pub mod obs;
pub mod reducer;
pub mod retry;
pub mod sequencer;
pub mod state;
pub mod store;

mod _prelude {
	pub use std::{
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use tokio_util::sync::CancellationToken;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
