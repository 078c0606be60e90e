//! Session state machine and the auth flows that drive it.
//!
//! [`SessionOrchestrator`] owns the application's belief about whether it holds a valid
//! credential. It is the only component that establishes a credential (login, register)
//! and, together with the refresh coordinator, the only one that ends it. The presentation
//! layer reads [`SessionOrchestrator::state`] and reacts to broadcaster events; it never
//! touches the credential store directly.

pub mod payload;

pub use payload::*;

// self
use crate::{
	_prelude::*,
	auth::UserProfile,
	broadcast::{SessionInvalidated, SubscriptionId},
	client::{ApiClient, CallOptions},
	http::{ApiRequest, ApiResponse, HttpTransport},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// What the client currently believes about its session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
	/// Process just started; durable state has not been verified yet.
	Hydrating,
	/// No credential is held.
	Anonymous,
	/// A credential is held and was either just issued or verified by the backend.
	Authenticated,
}
impl SessionState {
	/// Returns a stable label for logs and UI bindings.
	pub const fn as_str(self) -> &'static str {
		match self {
			SessionState::Hydrating => "hydrating",
			SessionState::Anonymous => "anonymous",
			SessionState::Authenticated => "authenticated",
		}
	}
}
impl Display for SessionState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Session established by a successful login or registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
	/// Authenticated user.
	pub user: UserProfile,
	/// Instant the credential was stored.
	pub established_at: OffsetDateTime,
}

/// Owner of the session state machine.
///
/// Subscribes to the client's broadcaster on construction so invalidations raised by
/// the refresh protocol move it to [`SessionState::Anonymous`], and detaches on drop.
pub struct SessionOrchestrator<C>
where
	C: HttpTransport,
{
	client: ApiClient<C>,
	state: Arc<RwLock<SessionState>>,
	subscription: SubscriptionId,
}
impl<C> SessionOrchestrator<C>
where
	C: HttpTransport,
{
	/// Creates an orchestrator in [`SessionState::Hydrating`]; call
	/// [`start`](Self::start) once to leave it.
	pub fn new(client: ApiClient<C>) -> Self {
		let state = Arc::new(RwLock::new(SessionState::Hydrating));
		let subscription = client.broadcaster().subscribe({
			let state = Arc::downgrade(&state);

			move |_: &SessionInvalidated| {
				if let Some(state) = state.upgrade() {
					*state.write() = SessionState::Anonymous;
				}
			}
		});

		Self { client, state, subscription }
	}

	/// Current session state.
	pub fn state(&self) -> SessionState {
		*self.state.read()
	}

	/// Profile of the authenticated user, if any.
	pub fn current_user(&self) -> Option<UserProfile> {
		self.client.store().get().map(|credential| credential.user)
	}

	/// Client the orchestrator sends its calls through.
	pub fn client(&self) -> &ApiClient<C> {
		&self.client
	}

	/// Leaves [`SessionState::Hydrating`].
	///
	/// With a hydrated credential the session is verified via
	/// [`validate_session`](Self::validate_session); without one the state becomes
	/// anonymous. Later calls return the current state without side effects.
	pub async fn start(&self) -> SessionState {
		if self.state() != SessionState::Hydrating {
			return self.state();
		}
		if self.client.store().is_authenticated() {
			return self.validate_session().await;
		}

		self.transition(SessionState::Anonymous)
	}

	/// Exchanges credentials for a session.
	///
	/// Rejections come back as [`Error::InvalidCredentials`] and leave any existing
	/// session untouched.
	pub async fn login(&self, request: &LoginRequest) -> Result<Session> {
		let path = self.client.config().endpoints.login.clone();

		self.authenticate(FlowKind::Login, path, request, "Login failed").await
	}

	/// Creates an account and starts a session for it; symmetric to [`login`](Self::login).
	pub async fn register(&self, request: &RegisterRequest) -> Result<Session> {
		let path = self.client.config().endpoints.register.clone();

		self.authenticate(FlowKind::Register, path, request, "Registration failed").await
	}

	/// Ends the session locally, then asks the backend to revoke it.
	///
	/// Local state is cleared and the invalidation broadcast before the server call is
	/// awaited; that call is bounded by the configured logout timeout and its outcome only
	/// reaches the logs.
	pub async fn logout(&self) {
		const KIND: FlowKind = FlowKind::Logout;

		let span = FlowSpan::new(KIND, "logout");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let revoked = span
			.instrument(async {
				let config = self.client.config();
				let request = self.client.decorate(ApiRequest::post(&config.endpoints.logout));

				self.end_session("logout");

				match tokio::time::timeout(config.logout_timeout, self.client.dispatch(request, None))
					.await
				{
					Ok(Ok(response)) if response.is_success() => true,
					Ok(Ok(response)) => {
						obs::warn_absorbed("logout", &response.status);

						false
					},
					Ok(Err(e)) => {
						obs::warn_absorbed("logout", &e);

						false
					},
					Err(_) => {
						obs::warn_absorbed("logout", &"server logout timed out");

						false
					},
				}
			})
			.await;

		obs::record_flow_outcome(
			KIND,
			if revoked { FlowOutcome::Success } else { FlowOutcome::Failure },
		);
	}

	/// Asks the backend whether the held credential is still valid.
	///
	/// Goes through the full pipeline, so an expired token gets one refresh attempt. Any
	/// failure clears the credential and both durable slots and ends in
	/// [`SessionState::Anonymous`].
	pub async fn validate_session(&self) -> SessionState {
		const KIND: FlowKind = FlowKind::ValidateSession;

		let span = FlowSpan::new(KIND, "validate_session");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let verdict: Result<()> = span
			.instrument(async {
				if !self.client.store().is_authenticated() {
					return Err(Error::SessionInvalid { reason: "No credential is held.".into() });
				}

				let path = self.client.config().endpoints.me.clone();
				let response = self
					.client
					.send(ApiRequest::get(path))
					.await
					.and_then(ApiResponse::error_for_status)
					.map_err(|e| Error::SessionInvalid { reason: e.to_string() })?;

				response
					.json::<UserProfile>()
					.map_err(|e| Error::SessionInvalid { reason: e.to_string() })?;

				if self.client.store().is_authenticated() {
					Ok(())
				} else {
					Err(Error::SessionInvalid {
						reason: "The session ended while it was being verified.".into(),
					})
				}
			})
			.await;

		match verdict {
			Ok(()) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Success);

				self.transition(SessionState::Authenticated)
			},
			Err(e) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
				obs::warn_absorbed("validate_session", &e);

				if self.client.store().is_authenticated() {
					self.end_session("validate_session");
				}

				self.transition(SessionState::Anonymous)
			},
		}
	}

	async fn authenticate<B>(
		&self,
		kind: FlowKind,
		path: String,
		body: &B,
		fallback: &'static str,
	) -> Result<Session>
	where
		B: ?Sized + Serialize,
	{
		let span = FlowSpan::new(kind, "authenticate");

		obs::record_flow_outcome(kind, FlowOutcome::Attempt);

		let result: Result<Session> = span
			.instrument(async {
				let request = ApiRequest::post(path).json(body)?;
				let response =
					self.client.send_with(request, CallOptions::new().without_refresh()).await?;

				if !response.is_success() {
					return Err(rejection(&response, fallback));
				}

				let grant = response.json::<SessionGrant>()?;

				Ok(self.establish(grant))
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(kind, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(kind, FlowOutcome::Failure),
		}

		result
	}

	fn establish(&self, grant: SessionGrant) -> Session {
		let session = Session { user: grant.user.clone(), established_at: OffsetDateTime::now_utc() };

		self.client.store().set(grant.token, grant.user);
		self.transition(SessionState::Authenticated);

		session
	}

	fn end_session(&self, stage: &'static str) {
		obs::record_invalidation(stage, true);
		self.client.store().clear();
		self.transition(SessionState::Anonymous);
		self.client.broadcaster().publish();
	}

	fn transition(&self, next: SessionState) -> SessionState {
		let mut state = self.state.write();

		if *state != next {
			obs::note(next.as_str(), "session state changed");
		}

		*state = next;

		next
	}
}
impl<C> Drop for SessionOrchestrator<C>
where
	C: HttpTransport,
{
	fn drop(&mut self) {
		self.client.broadcaster().unsubscribe(self.subscription);
	}
}
impl<C> Debug for SessionOrchestrator<C>
where
	C: HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionOrchestrator").field("state", &self.state()).finish()
	}
}

fn rejection(response: &ApiResponse, fallback: &str) -> Error {
	let status = response.status.as_u16();
	let message = response.error_message().unwrap_or_else(|| fallback.into());

	if response.status.is_client_error() {
		Error::InvalidCredentials { status, message }
	} else {
		Error::Status { status, message }
	}
}
