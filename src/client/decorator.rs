//! Per-call header decoration.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, CorrelationId, Credential},
	http::{ApiRequest, CORRELATION_ID, HeaderValue, header},
	obs,
};

/// Stateless decorator attaching the bearer credential and a correlation id.
///
/// The decorator never blocks and never reads the store itself; the pipeline passes the
/// credential it read for this call.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestDecorator;
impl RequestDecorator {
	/// Attaches `Authorization: Bearer <token>` when a credential is present and a fresh
	/// correlation id unless the call already carries one.
	///
	/// A caller-supplied `Authorization` header is replaced when a credential exists and
	/// kept as-is for anonymous calls.
	pub fn decorate(&self, mut request: ApiRequest, credential: Option<&Credential>) -> ApiRequest {
		if let Some(credential) = credential {
			Self::attach_bearer(&mut request, &credential.token);
		}
		if !request.headers.contains_key(&CORRELATION_ID) {
			let id = CorrelationId::generate();

			request = request.correlation_id(&id);
		}

		request
	}

	/// Clones an already decorated call, swapping only its bearer token.
	pub fn reauthorize(&self, original: &ApiRequest, token: &AccessToken) -> ApiRequest {
		let mut request = original.clone();

		Self::attach_bearer(&mut request, token);

		request
	}

	fn attach_bearer(request: &mut ApiRequest, token: &AccessToken) {
		match HeaderValue::from_str(&token.bearer()) {
			Ok(mut value) => {
				value.set_sensitive(true);
				request.headers.insert(header::AUTHORIZATION, value);
			},
			Err(_) => {
				request.headers.remove(header::AUTHORIZATION);
				obs::warn_absorbed("decorate", &"access token is not a valid header value");
			},
		}
	}
}
