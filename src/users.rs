//! Typed access to the backend's `/users` resource.

// self
use crate::{
	_prelude::*,
	auth::{UserId, UserProfile},
	client::ApiClient,
	http::{ApiRequest, HttpTransport},
};

/// Payload used to create or update a user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
	/// Display name.
	pub name: String,
	/// Contact email.
	pub email: String,
}
impl NewUser {
	/// Builds a payload.
	pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
		Self { name: name.into(), email: email.into() }
	}
}

/// CRUD operations over `/users`, sent through the authenticated pipeline.
///
/// Non-success statuses surface as [`Error::Status`] carrying the backend's message, so a
/// `409` on a duplicate email or a `429` from the rate limiter reaches the caller as-is.
pub struct UserDirectory<C>
where
	C: HttpTransport,
{
	client: ApiClient<C>,
	base_path: String,
}
impl<C> UserDirectory<C>
where
	C: HttpTransport,
{
	/// Creates a directory rooted at `/users`.
	pub fn new(client: ApiClient<C>) -> Self {
		Self::with_base_path(client, "/users")
	}

	/// Creates a directory rooted at a custom path.
	pub fn with_base_path(client: ApiClient<C>, base_path: impl Into<String>) -> Self {
		Self { client, base_path: base_path.into() }
	}

	/// Lists every user.
	pub async fn list(&self) -> Result<Vec<UserProfile>> {
		self.client.send_json(ApiRequest::get(&self.base_path)).await
	}

	/// Fetches one user.
	pub async fn get(&self, id: &UserId) -> Result<UserProfile> {
		self.client.send_json(ApiRequest::get(self.item_path(id))).await
	}

	/// Creates a user and returns the stored profile.
	pub async fn create(&self, user: &NewUser) -> Result<UserProfile> {
		self.client.send_json(ApiRequest::post(&self.base_path).json(user)?).await
	}

	/// Replaces a user's name and email.
	pub async fn update(&self, id: &UserId, user: &NewUser) -> Result<UserProfile> {
		self.client.send_json(ApiRequest::put(self.item_path(id)).json(user)?).await
	}

	/// Deletes a user.
	pub async fn delete(&self, id: &UserId) -> Result<()> {
		self.client.send(ApiRequest::delete(self.item_path(id))).await?.error_for_status()?;

		Ok(())
	}

	fn item_path(&self, id: &UserId) -> String {
		format!("{}/{id}", self.base_path.trim_end_matches('/'))
	}
}

impl<C> Clone for UserDirectory<C>
where
	C: HttpTransport,
{
	fn clone(&self) -> Self {
		Self { client: self.client.clone(), base_path: self.base_path.clone() }
	}
}
impl<C> Debug for UserDirectory<C>
where
	C: HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("UserDirectory")
			.field("client", &self.client)
			.field("base_path", &self.base_path)
			.finish()
	}
}
