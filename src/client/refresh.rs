//! Single-flight access token refresh with revision-checked coalescing.
//!
//! Every call records the credential store revision it was decorated at. When a call
//! comes back `401`, [`RefreshCoordinator::handle_unauthorized`] acquires the coordinator's
//! guard and compares that revision with the store's:
//!
//! - revision moved and a credential is present: someone refreshed (or logged in) while
//!   this call was in flight, so it resubmits with the current token;
//! - revision moved and the store is empty: the session ended, the call gives up;
//! - revision unchanged: this call leads a refresh, bounded by the configured timeout.
//!
//! Waiters queue on the guard, so a refresh that fails invalidates the session before
//! any waiter observes the store, and every waiter then gives up together. A `401` from
//! the refresh endpoint itself or from a resubmission is terminal and never re-enters the
//! guard.
//!
//! Every outcome is applied against the revision it was decided at. A refresh that
//! finishes after a new login neither overwrites nor clears that login; its callers
//! resubmit with the newer token instead.

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, Credential, UserProfile},
	broadcast::AuthStateBroadcaster,
	client::{CallContext, CancelHandle, RequestDecorator, cancellable},
	config::{AuthEndpoints, ClientConfig},
	error::TransportError,
	http::{ApiRequest, HttpTransport},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::{CredentialSnapshot, CredentialStore},
};

/// What the pipeline should do with a call that came back `401`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recovery {
	/// Resubmit the call once with this token.
	Resubmit {
		/// Token to put on the resubmission.
		token: AccessToken,
		/// Store revision the token was current at.
		revision: u64,
	},
	/// Return the original `401` to the caller; the session has been invalidated (or the
	/// call was anonymous to begin with).
	GiveUp,
}
impl Recovery {
	fn resume(snapshot: CredentialSnapshot) -> Self {
		match snapshot.credential {
			Some(credential) =>
				Recovery::Resubmit { token: credential.token, revision: snapshot.revision },
			None => Recovery::GiveUp,
		}
	}
}

#[derive(Debug, Deserialize)]
struct RefreshGrant {
	token: String,
	#[serde(default)]
	user: Option<UserProfile>,
}

/// Serializes refresh attempts and resolves `401` responses into a [`Recovery`].
pub struct RefreshCoordinator<C>
where
	C: HttpTransport,
{
	transport: Arc<C>,
	store: Arc<CredentialStore>,
	broadcaster: Arc<AuthStateBroadcaster>,
	endpoints: AuthEndpoints,
	timeout: StdDuration,
	decorator: RequestDecorator,
	guard: AsyncMutex<()>,
	metrics: RefreshMetrics,
}
impl<C> RefreshCoordinator<C>
where
	C: HttpTransport,
{
	pub(crate) fn new(
		transport: Arc<C>,
		store: Arc<CredentialStore>,
		broadcaster: Arc<AuthStateBroadcaster>,
		config: &ClientConfig,
	) -> Self {
		Self {
			transport,
			store,
			broadcaster,
			endpoints: config.endpoints.clone(),
			timeout: config.refresh_timeout,
			decorator: RequestDecorator,
			guard: AsyncMutex::new(()),
			metrics: RefreshMetrics::default(),
		}
	}

	/// Counters describing refresh activity.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	/// Decides how to recover `request`, which came back `401` under `context`.
	///
	/// Only [`Error::Cancelled`] is returned as an error; every refresh failure is
	/// absorbed into [`Recovery::GiveUp`] after the session has been invalidated, unless
	/// a newer session replaced it meanwhile, in which case the call follows that one.
	pub async fn handle_unauthorized(
		&self,
		request: &ApiRequest,
		context: CallContext,
		cancel: Option<&CancelHandle>,
	) -> Result<Recovery> {
		if self.endpoints.is_refresh(&request.path) {
			self.invalidate(context.observed_revision, "refresh_rejected");

			return Ok(Recovery::GiveUp);
		}
		if context.is_resubmission() {
			self.invalidate(context.observed_revision, "resubmission_rejected");

			return Ok(Recovery::GiveUp);
		}

		let _singleflight = cancellable(cancel, self.guard.lock()).await?;
		let snapshot = self.store.snapshot();

		if snapshot.revision != context.observed_revision {
			self.metrics.record_coalesced();

			return Ok(Recovery::resume(snapshot));
		}

		let Some(current) = snapshot.credential else {
			// Anonymous call; nothing to refresh and no session to end.
			return Ok(Recovery::GiveUp);
		};

		match self.refresh_locked(&current, snapshot.revision).await {
			Ok(Some(renewed)) => Ok(Recovery::resume(renewed)),
			// Superseded by a login while in flight; follow the newer session.
			Ok(None) => Ok(Recovery::resume(self.store.snapshot())),
			Err(e) => {
				obs::warn_absorbed("refresh", &e);

				if self.invalidate(snapshot.revision, "refresh_failed") {
					Ok(Recovery::GiveUp)
				} else {
					Ok(Recovery::resume(self.store.snapshot()))
				}
			},
		}
	}

	/// Refreshes the held credential right away, outside any failing call.
	///
	/// Shares the single-flight guard with `401` recovery. A failure invalidates the
	/// session and is returned as [`Error::RefreshExhausted`].
	pub async fn refresh_now(&self) -> Result<AccessToken> {
		let _singleflight = self.guard.lock().await;
		let snapshot = self.store.snapshot();
		let current = snapshot.credential.ok_or_else(|| Error::RefreshExhausted {
			reason: "No credential is held, so there is nothing to refresh.".into(),
		})?;

		match self.refresh_locked(&current, snapshot.revision).await {
			Ok(Some(CredentialSnapshot { credential: Some(renewed), .. })) => Ok(renewed.token),
			Ok(_) => Err(Error::RefreshExhausted {
				reason: "The session changed while the refresh was in flight.".into(),
			}),
			Err(e) => {
				self.invalidate(snapshot.revision, "refresh_failed");

				Err(Error::RefreshExhausted { reason: e.to_string() })
			},
		}
	}

	/// Performs the refresh call; the caller must hold the guard.
	///
	/// The new token is stored only while the store is still at `revision`; `Ok(None)`
	/// means another writer moved it on and the exchange result was discarded.
	async fn refresh_locked(
		&self,
		current: &Credential,
		revision: u64,
	) -> Result<Option<CredentialSnapshot>> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "refresh_access_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.metrics.record_attempt();

		let result: Result<Option<CredentialSnapshot>> = span
			.instrument(async move {
				let path = self.endpoints.refresh.clone();
				let request = self.decorator.decorate(ApiRequest::post(&path), Some(current));
				let response =
					match tokio::time::timeout(self.timeout, self.transport.execute(request)).await {
						Ok(Ok(response)) => response,
						Ok(Err(e)) => return Err(TransportError::network(path, e).into()),
						Err(_) => {
							return Err(TransportError::Timeout { path, elapsed: self.timeout }.into());
						},
					};

				if !response.is_success() {
					return Err(Error::RefreshExhausted {
						reason: format!("Refresh endpoint answered {}.", response.status),
					});
				}

				let grant = response.json::<RefreshGrant>()?;
				let renewed =
					self.store.replace_token(revision, AccessToken::new(grant.token), grant.user);

				if renewed.is_none() {
					obs::note("refresh_superseded", "refresh result discarded");
				}

				Ok(renewed)
			})
			.await;

		match &result {
			Ok(_) => {
				self.metrics.record_success();
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
			},
			Err(_) => {
				self.metrics.record_failure();
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			},
		}

		result
	}

	/// Ends the session if the store is still at `revision`; returns whether it did.
	fn invalidate(&self, revision: u64, stage: &'static str) -> bool {
		let applied = self.store.clear_if(revision);

		obs::record_invalidation(stage, applied);

		if !applied {
			obs::note(stage, "invalidation skipped; session moved on");

			return false;
		}

		self.broadcaster.publish();
		obs::note(stage, "session invalidated");

		true
	}
}
impl<C> Debug for RefreshCoordinator<C>
where
	C: HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshCoordinator")
			.field("refresh", &self.endpoints.refresh)
			.field("timeout", &self.timeout)
			.field("metrics", &self.metrics)
			.finish()
	}
}
