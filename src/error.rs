//! Session-level error types shared by the pipeline, the refresh protocol, and the store.

// self
use crate::_prelude::*;

/// Session-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
///
/// `login`/`register` report rejected credentials as [`Error::InvalidCredentials`] values
/// instead of panicking or hiding them; callers match on the variant. The refresh-side
/// variants ([`Error::RefreshExhausted`], [`Error::SessionInvalid`]) are produced
/// internally and drive the transition to an anonymous session; the call that tripped
/// them still receives its original response.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Durable slot failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// No response was received (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Login or registration was rejected by the backend.
	#[error("Credentials were rejected ({status}): {message}.")]
	InvalidCredentials {
		/// HTTP status returned by the auth endpoint.
		status: u16,
		/// Backend-supplied message, or a generic fallback.
		message: String,
	},
	/// The refresh call failed, or a resubmitted call was rejected again.
	#[error("Access token refresh was exhausted: {reason}.")]
	RefreshExhausted {
		/// Human-readable failure summary.
		reason: String,
	},
	/// A hydrated session could not be verified by the backend.
	#[error("Session could not be validated: {reason}.")]
	SessionInvalid {
		/// Human-readable failure summary.
		reason: String,
	},
	/// Backend answered with a non-success status that callers must handle themselves.
	#[error("Request failed with status {status}: {message}.")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Backend-supplied message, or the canonical reason phrase.
		message: String,
	},
	/// Response body could not be decoded into the expected shape.
	#[error("Response body with status {status} is malformed.")]
	MalformedResponse {
		/// Structured parsing failure including the JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code of the response.
		status: u16,
	},
	/// Request body could not be encoded as JSON.
	#[error("Request body could not be encoded.")]
	Encode(#[source] serde_json::Error),
	/// The call was cancelled through its [`CancelHandle`](crate::client::CancelHandle).
	#[error("Call was cancelled.")]
	Cancelled,
}
impl Error {
	/// Returns the HTTP status carried by the error, when one was received.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::InvalidCredentials { status, .. }
			| Self::Status { status, .. }
			| Self::MalformedResponse { status, .. } => Some(*status),
			_ => None,
		}
	}

	/// Whether the failure happened before any response was received.
	pub fn is_network_failure(&self) -> bool {
		matches!(self, Self::Transport(_))
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Endpoint paths must be absolute (`/auth/login`).
	#[error("The {endpoint} endpoint must start with `/`: {path}.")]
	InvalidEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Offending path.
		path: String,
	},
	/// Base URL cannot carry request paths.
	#[error("Base URL cannot be used as a request prefix: {url}.")]
	InvalidBaseUrl {
		/// Offending URL.
		url: String,
	},
	/// A timeout was configured as zero.
	#[error("The {timeout} timeout must be greater than zero.")]
	ZeroTimeout {
		/// Which timeout failed validation.
		timeout: &'static str,
	},
	/// Header value contains bytes that HTTP forbids.
	#[error("Header `{name}` has an invalid value.")]
	InvalidHeader {
		/// Header name.
		name: String,
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

/// Transport-level failures (network, IO, timeouts).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {path}.")]
	Network {
		/// Request path that failed.
		path: String,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The call did not complete in time.
	#[error("Call to {path} timed out after {elapsed:?}.")]
	Timeout {
		/// Request path that timed out.
		path: String,
		/// Configured bound that elapsed.
		elapsed: StdDuration,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during transport.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(
		path: impl Into<String>,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { path: path.into(), source: Box::new(src) }
	}
}
