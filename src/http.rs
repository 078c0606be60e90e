//! Transport primitives for decorated API calls.
//!
//! The module exposes [`ApiRequest`] and [`ApiResponse`] as transport-neutral call
//! descriptions alongside the [`HttpTransport`] seam. Implementations only move bytes:
//! they must return `Ok` for every HTTP status (including 401) so the pipeline can run
//! the refresh protocol, and reserve `Err` for calls that never produced a response.

pub use ::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};

// self
use crate::{_prelude::*, auth::CorrelationId, error::ConfigError};

/// Header carrying the per-call tracing identifier.
pub const CORRELATION_ID: HeaderName = HeaderName::from_static("x-correlation-id");

/// Boxed future returned by [`HttpTransport::execute`].
pub type TransportFuture<'a, E> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, E>> + 'a + Send>>;

/// Abstraction over HTTP stacks able to execute decorated calls.
///
/// The pipeline owns the transport behind an `Arc` and shares it between ordinary calls,
/// resubmissions, and refresh calls. Implementations must be `Send + Sync + 'static` and
/// resolve relative [`ApiRequest::path`] values against whatever base URL they were
/// configured with.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted when no response could be obtained.
	type TransportError: 'static + Send + Sync + StdError;

	/// Sends `request` and returns the response, whatever its status.
	fn execute(&self, request: ApiRequest) -> TransportFuture<'_, Self::TransportError>;
}

/// Transport-neutral description of one outgoing call.
///
/// Values are cheap to clone so a refresh-triggered resubmission can reuse the method,
/// target, and body of the original call verbatim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Path relative to the configured base URL, starting with `/`.
	pub path: String,
	/// Query parameters appended in order.
	pub query: Vec<(String, String)>,
	/// Request headers.
	pub headers: HeaderMap,
	/// Optional request body.
	pub body: Option<Vec<u8>>,
}
impl ApiRequest {
	/// Creates a call for the provided method and path.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			query: Vec::new(),
			headers: HeaderMap::new(),
			body: None,
		}
	}

	/// Creates a `GET` call.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::GET, path)
	}

	/// Creates a `POST` call.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::POST, path)
	}

	/// Creates a `PUT` call.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::PUT, path)
	}

	/// Creates a `DELETE` call.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::DELETE, path)
	}

	/// Serializes `body` as JSON and sets the matching content type.
	pub fn json<T>(mut self, body: &T) -> Result<Self>
	where
		T: ?Sized + Serialize,
	{
		let bytes = serde_json::to_vec(body).map_err(Error::Encode)?;

		self.headers
			.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
		self.body = Some(bytes);

		Ok(self)
	}

	/// Sets (or replaces) a header.
	pub fn header(mut self, name: HeaderName, value: impl AsRef<str>) -> Result<Self> {
		let value = HeaderValue::from_str(value.as_ref())
			.map_err(|_| ConfigError::InvalidHeader { name: name.to_string() })?;

		self.headers.insert(name, value);

		Ok(self)
	}

	/// Appends a query parameter.
	pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((key.into(), value.into()));

		self
	}

	/// Pins the correlation identifier instead of letting the decorator generate one.
	pub fn correlation_id(mut self, id: &CorrelationId) -> Self {
		// Validated identifiers never contain bytes that HTTP forbids.
		if let Ok(value) = HeaderValue::from_str(id) {
			self.headers.insert(CORRELATION_ID, value);
		}

		self
	}

	/// Returns the correlation identifier currently attached, if any.
	pub fn correlation(&self) -> Option<&str> {
		self.headers.get(&CORRELATION_ID).and_then(|value| value.to_str().ok())
	}

	/// Returns the `Authorization` header currently attached, if any.
	pub fn authorization(&self) -> Option<&str> {
		self.headers.get(header::AUTHORIZATION).and_then(|value| value.to_str().ok())
	}
}

/// Response returned by an [`HttpTransport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl ApiResponse {
	/// Creates a response with an empty header map.
	pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
		Self { status, headers: HeaderMap::new(), body: body.into() }
	}

	/// Whether the status is in the 2xx range.
	pub fn is_success(&self) -> bool {
		self.status.is_success()
	}

	/// Whether the status is `401 Unauthorized`.
	pub fn is_unauthorized(&self) -> bool {
		self.status == StatusCode::UNAUTHORIZED
	}

	/// Decodes the body as JSON, reporting the failing path on error.
	pub fn json<T>(&self) -> Result<T>
	where
		T: for<'de> Deserialize<'de>,
	{
		let mut deserializer = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut deserializer).map_err(|source| {
			Error::MalformedResponse { source, status: self.status.as_u16() }
		})
	}

	/// Extracts a human-readable message from a JSON error body.
	///
	/// Looks at `message`, then the problem-details `detail` and `title` members.
	pub fn error_message(&self) -> Option<String> {
		let value = serde_json::from_slice::<serde_json::Value>(&self.body).ok()?;

		["message", "detail", "title"].into_iter().find_map(|key| {
			value.get(key).and_then(serde_json::Value::as_str).map(str::to_owned)
		})
	}

	/// Converts non-success statuses into [`Error::Status`].
	pub fn error_for_status(self) -> Result<Self> {
		if self.is_success() {
			return Ok(self);
		}

		let message = self
			.error_message()
			.or_else(|| self.status.canonical_reason().map(str::to_owned))
			.unwrap_or_else(|| "Request failed".into());

		Err(Error::Status { status: self.status.as_u16(), message })
	}
}

/// Default transport backed by a shared [`ReqwestClient`].
///
/// Relative request paths are appended to the base URL's path, so a base of
/// `http://localhost:8080/api` sends `/auth/login` to `http://localhost:8080/api/auth/login`.
/// The client built by [`ReqwestTransport::new`] keeps a cookie store so the refresh
/// credential issued as an HTTP-only cookie travels with `/auth/refresh` calls.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
	client: ReqwestClient,
	base_url: Url,
}
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds a cookie-aware client bounded by `request_timeout`.
	pub fn new(base_url: Url, request_timeout: StdDuration) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder().cookie_store(true).timeout(request_timeout).build()?;

		Ok(Self { client, base_url })
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient, base_url: Url) -> Self {
		Self { client, base_url }
	}

	/// Base URL every request path is appended to.
	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	fn resolve(&self, request: &ApiRequest) -> Url {
		let mut url = self.base_url.clone();
		let path = format!("{}{}", self.base_url.path().trim_end_matches('/'), request.path);

		url.set_path(&path);

		if !request.query.is_empty() {
			url.query_pairs_mut().extend_pairs(request.query.iter());
		}

		url
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.client
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	type TransportError = ReqwestError;

	fn execute(&self, request: ApiRequest) -> TransportFuture<'_, Self::TransportError> {
		let url = self.resolve(&request);

		Box::pin(async move {
			let mut builder = self.client.request(request.method, url).headers(request.headers);

			if let Some(body) = request.body {
				builder = builder.body(body);
			}

			let response = builder.send().await?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body = response.bytes().await?.to_vec();

			Ok(ApiResponse { status, headers, body })
		})
	}
}
