//! Client configuration: backend location, auth endpoint paths, and call bounds.

// self
use crate::{_prelude::*, error::ConfigError};

/// Paths of the auth endpoints, relative to [`ClientConfig::base_url`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthEndpoints {
	/// Credential exchange, `POST`, answers `{ token, user }`.
	pub login: String,
	/// Account creation, `POST`, answers `{ token, user }`.
	pub register: String,
	/// Best-effort server-side revoke, `POST`.
	pub logout: String,
	/// Access token refresh, `POST`, answers `{ token }`.
	pub refresh: String,
	/// "Who am I" check used to validate a hydrated session, `GET`.
	pub me: String,
}
impl AuthEndpoints {
	/// Whether `path` targets the refresh endpoint (query strings and trailing slashes ignored).
	pub fn is_refresh(&self, path: &str) -> bool {
		fn normalize(path: &str) -> &str {
			let path = path.split('?').next().unwrap_or(path);

			path.trim_end_matches('/')
		}

		normalize(path) == normalize(&self.refresh)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		for (endpoint, path) in [
			("login", &self.login),
			("register", &self.register),
			("logout", &self.logout),
			("refresh", &self.refresh),
			("me", &self.me),
		] {
			if !path.starts_with('/') {
				return Err(ConfigError::InvalidEndpoint { endpoint, path: path.clone() });
			}
		}

		Ok(())
	}
}
impl Default for AuthEndpoints {
	fn default() -> Self {
		Self {
			login: "/auth/login".into(),
			register: "/auth/register".into(),
			logout: "/auth/logout".into(),
			refresh: "/auth/refresh".into(),
			me: "/users/me".into(),
		}
	}
}

/// Settings shared by the pipeline, the refresh coordinator, and the orchestrator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
	/// Prefix every request path is appended to (for example `http://localhost:8080/api`).
	pub base_url: Url,
	/// Auth endpoint paths.
	#[serde(default)]
	pub endpoints: AuthEndpoints,
	/// Bound applied by the default transport to every call.
	#[serde(default = "ClientConfig::default_request_timeout")]
	pub request_timeout: StdDuration,
	/// Bound applied to each refresh call; elapsing counts as a refresh failure.
	#[serde(default = "ClientConfig::default_refresh_timeout")]
	pub refresh_timeout: StdDuration,
	/// Bound applied to the best-effort server logout.
	#[serde(default = "ClientConfig::default_logout_timeout")]
	pub logout_timeout: StdDuration,
}
impl ClientConfig {
	const DEFAULT_LOGOUT_TIMEOUT: StdDuration = StdDuration::from_secs(5);
	const DEFAULT_REFRESH_TIMEOUT: StdDuration = StdDuration::from_secs(10);
	const DEFAULT_REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(10);

	/// Creates a configuration with default endpoints and timeouts.
	pub fn new(base_url: Url) -> Self {
		Self {
			base_url,
			endpoints: AuthEndpoints::default(),
			request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
			refresh_timeout: Self::DEFAULT_REFRESH_TIMEOUT,
			logout_timeout: Self::DEFAULT_LOGOUT_TIMEOUT,
		}
	}

	/// Overrides the auth endpoint paths.
	pub fn with_endpoints(mut self, endpoints: AuthEndpoints) -> Self {
		self.endpoints = endpoints;

		self
	}

	/// Overrides the per-call transport timeout (defaults to 10 seconds).
	pub fn with_request_timeout(mut self, timeout: StdDuration) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Overrides the refresh timeout (defaults to 10 seconds).
	pub fn with_refresh_timeout(mut self, timeout: StdDuration) -> Self {
		self.refresh_timeout = timeout;

		self
	}

	/// Overrides the logout timeout (defaults to 5 seconds).
	pub fn with_logout_timeout(mut self, timeout: StdDuration) -> Self {
		self.logout_timeout = timeout;

		self
	}

	/// Checks the configuration before any component is built from it.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.base_url.cannot_be_a_base() {
			return Err(ConfigError::InvalidBaseUrl { url: self.base_url.to_string() });
		}

		self.endpoints.validate()?;

		for (timeout, value) in [
			("request", self.request_timeout),
			("refresh", self.refresh_timeout),
			("logout", self.logout_timeout),
		] {
			if value.is_zero() {
				return Err(ConfigError::ZeroTimeout { timeout });
			}
		}

		Ok(())
	}

	fn default_request_timeout() -> StdDuration {
		Self::DEFAULT_REQUEST_TIMEOUT
	}

	fn default_refresh_timeout() -> StdDuration {
		Self::DEFAULT_REFRESH_TIMEOUT
	}

	fn default_logout_timeout() -> StdDuration {
		Self::DEFAULT_LOGOUT_TIMEOUT
	}
}
