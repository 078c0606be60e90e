//! Auth-domain identifiers, access tokens, and credential models.

pub mod credential;
pub mod id;
pub mod secret;

pub use credential::*;
pub use id::*;
pub use secret::*;
