//! Wire payloads exchanged with the auth endpoints.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, UserProfile},
};

/// Body of a login call.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
	/// Login email.
	pub email: String,
	/// Plain-text password; only ever serialized into the request body.
	pub password: String,
}
impl LoginRequest {
	/// Builds a login body.
	pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
		Self { email: email.into(), password: password.into() }
	}
}
impl Debug for LoginRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoginRequest")
			.field("email", &self.email)
			.field("password", &"<redacted>")
			.finish()
	}
}

/// Body of a registration call.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
	/// Display name.
	pub name: String,
	/// Login email.
	pub email: String,
	/// Plain-text password; only ever serialized into the request body.
	pub password: String,
}
impl RegisterRequest {
	/// Builds a registration body.
	pub fn new(
		name: impl Into<String>,
		email: impl Into<String>,
		password: impl Into<String>,
	) -> Self {
		Self { name: name.into(), email: email.into(), password: password.into() }
	}
}
impl Debug for RegisterRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RegisterRequest")
			.field("name", &self.name)
			.field("email", &self.email)
			.field("password", &"<redacted>")
			.finish()
	}
}

/// Successful login or registration answer.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SessionGrant {
	/// Fresh access token.
	pub token: AccessToken,
	/// Profile of the authenticated user.
	pub user: UserProfile,
}
