//! The interceptor pipeline every outgoing call runs through.
//!
//! [`ApiClient::send`] decorates the call with the current credential and a correlation
//! id, hands it to the transport, and on `401 Unauthorized` asks the
//! [`RefreshCoordinator`] whether to resubmit. A resubmission is the decorated original
//! with its `Authorization` header replaced and nothing else touched. Every other status
//! is returned to the caller untouched.

pub mod decorator;
pub mod refresh;

pub use decorator::*;
pub use refresh::*;

// crates.io
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	broadcast::AuthStateBroadcaster,
	config::ClientConfig,
	error::TransportError,
	http::{ApiRequest, ApiResponse, HttpTransport},
	store::CredentialStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

#[cfg(feature = "reqwest")]
/// Client specialized for the crate's default reqwest transport.
pub type ReqwestApiClient = ApiClient<ReqwestTransport>;

/// Whether a call's `401` may trigger the refresh protocol.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RefreshPolicy {
	/// Run the refresh-and-resubmit protocol on `401`.
	#[default]
	Recover,
	/// Return `401` to the caller like any other status.
	PassThrough,
}

/// Per-call options.
#[derive(Clone, Debug, Default)]
pub struct CallOptions {
	/// Cancellation hook for this call.
	pub cancel: Option<CancelHandle>,
	/// Refresh behavior on `401`.
	pub refresh: RefreshPolicy,
}
impl CallOptions {
	/// Default options: refresh recovery enabled, no cancellation hook.
	pub fn new() -> Self {
		Self::default()
	}

	/// Attaches a cancellation hook.
	pub fn with_cancel(mut self, handle: CancelHandle) -> Self {
		self.cancel = Some(handle);

		self
	}

	/// Disables refresh recovery; used for the auth endpoints themselves.
	pub fn without_refresh(mut self) -> Self {
		self.refresh = RefreshPolicy::PassThrough;

		self
	}
}

/// Cancellation hook for a single call.
///
/// Cancelling drops the call's pending transport future, or its place in the refresh
/// waiter queue, and the call resolves with [`Error::Cancelled`]. Other calls waiting on
/// the same refresh are unaffected, and an in-flight refresh is never aborted by a waiter.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle(CancellationToken);
impl CancelHandle {
	/// Creates an armed handle.
	pub fn new() -> Self {
		Self::default()
	}

	/// Cancels the call; idempotent.
	pub fn cancel(&self) {
		self.0.cancel();
	}

	/// Whether [`cancel`](Self::cancel) was called.
	pub fn is_cancelled(&self) -> bool {
		self.0.is_cancelled()
	}
}

/// Which attempt of a logical call is on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attempt {
	/// The call as the caller issued it.
	Original,
	/// The single refresh-triggered resubmission.
	Resubmitted,
}

/// Immutable retry bookkeeping threaded through one logical call.
///
/// A fresh context is created per call and replaced (never mutated in place) when the
/// call is resubmitted, so concurrent calls cannot see each other's retry state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallContext {
	/// Attempt currently on the wire.
	pub attempt: Attempt,
	/// Credential store revision the token on the wire was read at.
	pub observed_revision: u64,
}
impl CallContext {
	/// Context for an original call decorated at `revision`.
	pub fn original(revision: u64) -> Self {
		Self { attempt: Attempt::Original, observed_revision: revision }
	}

	/// Context for the resubmission of this call, carrying a token read at `revision`.
	pub fn resubmitted(self, revision: u64) -> Self {
		Self { attempt: Attempt::Resubmitted, observed_revision: revision }
	}

	/// Whether this context belongs to a resubmission.
	pub fn is_resubmission(&self) -> bool {
		self.attempt == Attempt::Resubmitted
	}
}

/// Authenticated API client: decoration, transport, and refresh recovery.
pub struct ApiClient<C>
where
	C: HttpTransport,
{
	transport: Arc<C>,
	store: Arc<CredentialStore>,
	broadcaster: Arc<AuthStateBroadcaster>,
	config: Arc<ClientConfig>,
	decorator: RequestDecorator,
	refresher: Arc<RefreshCoordinator<C>>,
}
impl<C> ApiClient<C>
where
	C: HttpTransport,
{
	/// Creates a client over a caller-provided transport.
	///
	/// The store and broadcaster are the process-wide instances; pass the same ones to
	/// every component built at startup.
	pub fn with_transport(
		config: ClientConfig,
		transport: impl Into<Arc<C>>,
		store: Arc<CredentialStore>,
		broadcaster: Arc<AuthStateBroadcaster>,
	) -> Result<Self> {
		config.validate()?;

		let transport = transport.into();
		let config = Arc::new(config);
		let refresher = Arc::new(RefreshCoordinator::new(
			transport.clone(),
			store.clone(),
			broadcaster.clone(),
			&config,
		));

		Ok(Self {
			transport,
			store,
			broadcaster,
			config,
			decorator: RequestDecorator,
			refresher,
		})
	}

	/// Process-wide credential store.
	pub fn store(&self) -> &Arc<CredentialStore> {
		&self.store
	}

	/// Process-wide invalidation broadcaster.
	pub fn broadcaster(&self) -> &Arc<AuthStateBroadcaster> {
		&self.broadcaster
	}

	/// Configuration the client was built with.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Refresh coordinator shared by every clone of this client.
	pub fn refresher(&self) -> &RefreshCoordinator<C> {
		&self.refresher
	}

	/// Decorates `request` with the credential held right now.
	pub fn decorate(&self, request: ApiRequest) -> ApiRequest {
		self.decorator.decorate(request, self.store.get().as_ref())
	}

	/// Sends `request` with default [`CallOptions`].
	pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
		self.send_with(request, CallOptions::default()).await
	}

	/// Sends `request`, running the refresh protocol on `401` unless disabled.
	///
	/// Returns `Ok` for every HTTP status. When recovery fails the caller receives the
	/// original `401` response and the session has already been invalidated.
	pub async fn send_with(&self, request: ApiRequest, options: CallOptions) -> Result<ApiResponse> {
		let cancel = options.cancel.as_ref();
		let snapshot = self.store.snapshot();
		let mut outgoing = self.decorator.decorate(request, snapshot.credential.as_ref());
		let mut context = CallContext::original(snapshot.revision);

		loop {
			let response = self.dispatch(outgoing.clone(), cancel).await?;

			if !response.is_unauthorized() || options.refresh == RefreshPolicy::PassThrough {
				return Ok(response);
			}

			match self.refresher.handle_unauthorized(&outgoing, context, cancel).await? {
				Recovery::Resubmit { token, revision } => {
					outgoing = self.decorator.reauthorize(&outgoing, &token);
					context = context.resubmitted(revision);
				},
				Recovery::GiveUp => return Ok(response),
			}
		}
	}

	/// Sends `request`, fails on non-success statuses, and decodes the JSON body.
	pub async fn send_json<T>(&self, request: ApiRequest) -> Result<T>
	where
		T: for<'de> Deserialize<'de>,
	{
		self.send(request).await?.error_for_status()?.json()
	}

	/// Hands an already decorated call to the transport.
	pub(crate) async fn dispatch(
		&self,
		request: ApiRequest,
		cancel: Option<&CancelHandle>,
	) -> Result<ApiResponse> {
		let path = request.path.clone();
		let outcome = cancellable(cancel, self.transport.execute(request)).await?;

		outcome.map_err(|e| TransportError::network(path, e).into())
	}
}
#[cfg(feature = "reqwest")]
impl ApiClient<ReqwestTransport> {
	/// Creates a client that provisions its own cookie-aware reqwest transport.
	pub fn new(
		config: ClientConfig,
		store: Arc<CredentialStore>,
		broadcaster: Arc<AuthStateBroadcaster>,
	) -> Result<Self> {
		config.validate()?;

		let transport = ReqwestTransport::new(config.base_url.clone(), config.request_timeout)?;

		Self::with_transport(config, transport, store, broadcaster)
	}
}
impl<C> Clone for ApiClient<C>
where
	C: HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			store: self.store.clone(),
			broadcaster: self.broadcaster.clone(),
			config: self.config.clone(),
			decorator: self.decorator,
			refresher: self.refresher.clone(),
		}
	}
}
impl<C> Debug for ApiClient<C>
where
	C: HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiClient")
			.field("base_url", &self.config.base_url.as_str())
			.field("store", &self.store)
			.finish()
	}
}

/// Races `fut` against the optional cancellation hook.
pub(crate) async fn cancellable<F>(cancel: Option<&CancelHandle>, fut: F) -> Result<F::Output>
where
	F: Future,
{
	match cancel {
		Some(handle) => tokio::select! {
			biased;
			_ = handle.0.cancelled() => Err(Error::Cancelled),
			output = fut => Ok(output),
		},
		None => Ok(fut.await),
	}
}
