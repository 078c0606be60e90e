//! Credential and user profile models held by the credential store.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, UserId},
};

/// Profile of the authenticated user as returned by the auth endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
	/// Backend identifier.
	pub id: UserId,
	/// Display name.
	pub name: String,
	/// Login email.
	pub email: String,
	/// Optional role label (`USER`, `ADMIN`, ...).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub role: Option<String>,
}
impl UserProfile {
	/// Creates a profile without a role.
	pub fn new(id: UserId, name: impl Into<String>, email: impl Into<String>) -> Self {
		Self { id, name: name.into(), email: email.into(), role: None }
	}

	/// Attaches a role label.
	pub fn with_role(mut self, role: impl Into<String>) -> Self {
		self.role = Some(role.into());

		self
	}
}

/// Access token and user profile, always stored and cleared as a pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credential {
	/// Bearer token attached to outgoing calls.
	pub token: AccessToken,
	/// Profile of the user the token was issued for.
	pub user: UserProfile,
}
impl Credential {
	/// Pairs a token with its user.
	pub fn new(token: AccessToken, user: UserProfile) -> Self {
		Self { token, user }
	}
}
