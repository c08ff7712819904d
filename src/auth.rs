//! Auth-domain identifiers, identities, secrets, and entitlement models.

pub mod id;
pub mod principal;
pub mod secret;
pub mod tier;

pub use id::*;
pub use principal::*;
pub use secret::*;
pub use tier::*;
