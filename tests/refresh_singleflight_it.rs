// std
use std::{
	collections::HashSet,
	io::Error as IoError,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
// crates.io
use parking_lot::Mutex;
// self
use bearer_session::{
	auth::{AccessToken, UserId, UserProfile},
	broadcast::{AuthStateBroadcaster, SessionInvalidated},
	client::{ApiClient, CallOptions, CancelHandle},
	config::ClientConfig,
	error::Error,
	http::{ApiRequest, ApiResponse, HttpTransport, StatusCode, TransportFuture},
	session::{LoginRequest, SessionOrchestrator, SessionState},
	store::{CredentialStore, DurableSlots, MemorySlots, Slot},
	url::Url,
};

/// How the scripted backend answers `/auth/refresh`.
#[derive(Clone)]
enum RefreshScript {
	Issue(&'static str),
	Reject,
	Hang,
}

/// Token the scripted backend hands out on `/auth/login`.
const LOGIN_TOKEN: &str = "T9";

/// In-process backend: accepts its seed token plus every token it issues, and records
/// every call it receives.
struct ScriptedTransport {
	valid: Mutex<HashSet<String>>,
	refresh: RefreshScript,
	refresh_delay: Duration,
	refresh_calls: AtomicUsize,
	log: Mutex<Vec<ApiRequest>>,
}
impl ScriptedTransport {
	fn new(valid: &str, refresh: RefreshScript, refresh_delay: Duration) -> Arc<Self> {
		Arc::new(Self {
			valid: Mutex::new(HashSet::from([valid.to_owned()])),
			refresh,
			refresh_delay,
			refresh_calls: AtomicUsize::new(0),
			log: Mutex::new(Vec::new()),
		})
	}

	fn refresh_calls(&self) -> usize {
		self.refresh_calls.load(Ordering::SeqCst)
	}

	fn calls_to(&self, path: &str) -> Vec<ApiRequest> {
		self.log.lock().iter().filter(|request| request.path == path).cloned().collect()
	}
}
impl HttpTransport for ScriptedTransport {
	type TransportError = IoError;

	fn execute(&self, request: ApiRequest) -> TransportFuture<'_, Self::TransportError> {
		Box::pin(async move {
			self.log.lock().push(request.clone());

			if request.path == "/auth/refresh" {
				self.refresh_calls.fetch_add(1, Ordering::SeqCst);
				tokio::time::sleep(self.refresh_delay).await;

				return Ok(match &self.refresh {
					RefreshScript::Issue(token) => {
						self.valid.lock().insert((*token).into());

						ApiResponse::new(StatusCode::OK, format!(r#"{{"token":"{token}"}}"#))
					},
					RefreshScript::Reject => ApiResponse::new(
						StatusCode::UNAUTHORIZED,
						r#"{"message":"Refresh token expired"}"#,
					),
					RefreshScript::Hang => {
						tokio::time::sleep(Duration::from_secs(3_600)).await;

						ApiResponse::new(StatusCode::GATEWAY_TIMEOUT, "")
					},
				});
			}
			if request.path == "/auth/login" {
				self.valid.lock().insert(LOGIN_TOKEN.into());

				return Ok(ApiResponse::new(
					StatusCode::OK,
					format!(
						r#"{{"token":"{LOGIN_TOKEN}","user":{{"id":"u2","name":"Grace","email":"grace@x.com"}}}}"#
					),
				));
			}
			if request.path == "/always-401" {
				return Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, ""));
			}

			let accepted = request
				.authorization()
				.and_then(|value| value.strip_prefix("Bearer "))
				.is_some_and(|token| self.valid.lock().contains(token));
			let status = if accepted { StatusCode::OK } else { StatusCode::UNAUTHORIZED };

			Ok(ApiResponse::new(status, "[]"))
		})
	}
}

struct Harness {
	client: ApiClient<ScriptedTransport>,
	transport: Arc<ScriptedTransport>,
	store: Arc<CredentialStore>,
	slots: Arc<MemorySlots>,
	invalidations: Arc<AtomicUsize>,
}

fn user() -> UserProfile {
	UserProfile::new(UserId::new("u1").expect("User fixture should be valid."), "Ada", "ada@x.com")
}

fn harness(transport: Arc<ScriptedTransport>, held: Option<&str>, config: ClientConfig) -> Harness {
	let slots = Arc::new(MemorySlots::default());

	if let Some(token) = held {
		let profile = serde_json::to_string(&user()).expect("Profile fixture should serialize.");

		slots.save(Slot::AccessToken, token).expect("Seeding the token slot should succeed.");
		slots.save(Slot::UserProfile, &profile).expect("Seeding the user slot should succeed.");
	}

	let durable: Arc<dyn DurableSlots> = slots.clone();
	let store = Arc::new(CredentialStore::hydrate(durable));
	let broadcaster = Arc::new(AuthStateBroadcaster::default());
	let invalidations = Arc::new(AtomicUsize::new(0));

	broadcaster.subscribe({
		let invalidations = invalidations.clone();

		move |_: &SessionInvalidated| {
			invalidations.fetch_add(1, Ordering::SeqCst);
		}
	});

	let client: ApiClient<ScriptedTransport> =
		ApiClient::with_transport(config, transport.clone(), store.clone(), broadcaster)
			.expect("Scripted client configuration should be valid.");

	Harness { client, transport, store, slots, invalidations }
}

fn config() -> ClientConfig {
	ClientConfig::new(Url::parse("http://backend.test/api").expect("Base URL should parse."))
}

fn held_token(store: &CredentialStore) -> Option<String> {
	store.get().map(|credential| credential.token.expose().to_owned())
}

#[tokio::test]
async fn expired_token_triggers_one_refresh_and_one_resubmission() {
	let transport = ScriptedTransport::new("T2", RefreshScript::Issue("T2"), Duration::ZERO);
	let h = harness(transport, Some("T1"), config());
	let request = ApiRequest::put("/users/1")
		.json(&serde_json::json!({ "name": "Ada" }))
		.expect("JSON body should encode.");
	let response = h.client.send(request).await.expect("Call should produce a response.");

	assert_eq!(response.status, StatusCode::OK);
	assert_eq!(h.transport.refresh_calls(), 1);
	assert_eq!(held_token(&h.store).as_deref(), Some("T2"));
	assert_eq!(
		h.slots.load(Slot::AccessToken).expect("Slot read should succeed.").as_deref(),
		Some("T2")
	);

	let calls = h.transport.calls_to("/users/1");

	assert_eq!(calls.len(), 2);
	assert_eq!(calls[0].authorization(), Some("Bearer T1"));
	assert_eq!(calls[1].authorization(), Some("Bearer T2"));
	assert_eq!(calls[0].method, calls[1].method);
	assert_eq!(calls[0].body, calls[1].body);
	assert_eq!(calls[0].correlation(), calls[1].correlation());
	assert_eq!(h.client.refresher().metrics().successes(), 1);
	assert_eq!(h.invalidations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unauthorized_refresh_endpoint_is_terminal() {
	let transport = ScriptedTransport::new("T1", RefreshScript::Reject, Duration::ZERO);
	let h = harness(transport, Some("T1"), config());
	let response = h
		.client
		.send(ApiRequest::post("/auth/refresh"))
		.await
		.expect("Call should produce a response.");

	assert_eq!(response.status, StatusCode::UNAUTHORIZED);
	assert_eq!(h.transport.refresh_calls(), 1, "No refresh may follow a refresh rejection.");
	assert!(h.store.get().is_none());
	assert_eq!(h.invalidations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn second_unauthorized_answer_is_terminal() {
	let transport = ScriptedTransport::new("T1", RefreshScript::Issue("T2"), Duration::ZERO);
	let h = harness(transport, Some("T1"), config());
	let response = h
		.client
		.send(ApiRequest::get("/always-401"))
		.await
		.expect("Call should produce a response.");

	assert_eq!(response.status, StatusCode::UNAUTHORIZED);
	assert_eq!(h.transport.calls_to("/always-401").len(), 2);
	assert_eq!(h.transport.refresh_calls(), 1);
	assert!(h.store.get().is_none());
	assert_eq!(h.slots.load(Slot::UserProfile).expect("Slot read should succeed."), None);
	assert_eq!(h.invalidations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_unauthorized_calls_share_one_refresh() {
	let transport =
		ScriptedTransport::new("T2", RefreshScript::Issue("T2"), Duration::from_millis(50));
	let h = harness(transport, Some("T1"), config());
	let (a, b, c) = tokio::join!(
		h.client.send(ApiRequest::get("/users")),
		h.client.send(ApiRequest::get("/users")),
		h.client.send(ApiRequest::get("/users/me")),
	);

	for response in [a, b, c] {
		assert_eq!(response.expect("Call should produce a response.").status, StatusCode::OK);
	}

	assert_eq!(h.transport.refresh_calls(), 1);
	assert_eq!(h.client.refresher().metrics().coalesced(), 2);
	assert_eq!(held_token(&h.store).as_deref(), Some("T2"));

	let resubmitted = h
		.transport
		.calls_to("/users")
		.into_iter()
		.filter(|request| request.authorization() == Some("Bearer T2"))
		.count();

	assert_eq!(resubmitted, 2);
}

#[tokio::test]
async fn failed_refresh_fails_every_waiter_together() {
	let transport = ScriptedTransport::new("T1", RefreshScript::Reject, Duration::from_millis(50));
	let h = harness(transport, Some("stale"), config());
	let (a, b) = tokio::join!(
		h.client.send(ApiRequest::get("/users")),
		h.client.send(ApiRequest::get("/users")),
	);

	assert_eq!(a.expect("Call should produce a response.").status, StatusCode::UNAUTHORIZED);
	assert_eq!(b.expect("Call should produce a response.").status, StatusCode::UNAUTHORIZED);
	assert_eq!(h.transport.refresh_calls(), 1);
	assert_eq!(h.transport.calls_to("/users").len(), 2, "Nobody may resubmit after a failure.");
	assert!(h.store.get().is_none());
	assert_eq!(h.invalidations.load(Ordering::SeqCst), 1);
	assert_eq!(h.client.refresher().metrics().failures(), 1);
}

#[tokio::test]
async fn cancelled_waiter_leaves_the_others_untouched() {
	let transport =
		ScriptedTransport::new("T2", RefreshScript::Issue("T2"), Duration::from_millis(100));
	let h = harness(transport, Some("T1"), config());
	let handle = CancelHandle::new();
	let (a, b, c, ()) = tokio::join!(
		h.client.send(ApiRequest::get("/users")),
		h.client.send_with(ApiRequest::get("/users"), CallOptions::new().with_cancel(handle.clone())),
		h.client.send(ApiRequest::get("/users")),
		async {
			tokio::time::sleep(Duration::from_millis(20)).await;
			handle.cancel();
		},
	);

	assert_eq!(a.expect("Leader should succeed.").status, StatusCode::OK);
	assert!(matches!(b, Err(Error::Cancelled)));
	assert_eq!(c.expect("Remaining waiter should succeed.").status, StatusCode::OK);
	assert_eq!(h.transport.refresh_calls(), 1);
	assert_eq!(held_token(&h.store).as_deref(), Some("T2"));
}

#[tokio::test]
async fn refresh_timeout_counts_as_failure() {
	let transport = ScriptedTransport::new("T1", RefreshScript::Hang, Duration::ZERO);
	let h = harness(
		transport,
		Some("stale"),
		config().with_refresh_timeout(Duration::from_millis(50)),
	);
	let response = h
		.client
		.send(ApiRequest::get("/users"))
		.await
		.expect("Call should produce a response.");

	assert_eq!(response.status, StatusCode::UNAUTHORIZED);
	assert!(h.store.get().is_none());
	assert_eq!(h.invalidations.load(Ordering::SeqCst), 1);
	assert_eq!(h.client.refresher().metrics().failures(), 1);
}

#[tokio::test]
async fn anonymous_unauthorized_calls_pass_through() {
	let transport = ScriptedTransport::new("T1", RefreshScript::Issue("T2"), Duration::ZERO);
	let h = harness(transport, None, config());
	let response = h
		.client
		.send(ApiRequest::get("/users"))
		.await
		.expect("Call should produce a response.");

	assert_eq!(response.status, StatusCode::UNAUTHORIZED);
	assert_eq!(h.transport.refresh_calls(), 0);
	assert_eq!(h.invalidations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn disabled_recovery_returns_unauthorized_untouched() {
	let transport = ScriptedTransport::new("T2", RefreshScript::Issue("T2"), Duration::ZERO);
	let h = harness(transport, Some("T1"), config());
	let response = h
		.client
		.send_with(ApiRequest::get("/users"), CallOptions::new().without_refresh())
		.await
		.expect("Call should produce a response.");

	assert_eq!(response.status, StatusCode::UNAUTHORIZED);
	assert_eq!(h.transport.refresh_calls(), 0);
	assert_eq!(held_token(&h.store).as_deref(), Some("T1"));
}

#[tokio::test]
async fn manual_refresh_rotates_and_failures_invalidate() {
	let transport = ScriptedTransport::new("T1", RefreshScript::Issue("T2"), Duration::ZERO);
	let h = harness(transport, Some("T1"), config());
	let token: AccessToken =
		h.client.refresher().refresh_now().await.expect("Manual refresh should succeed.");

	assert_eq!(token.expose(), "T2");
	assert_eq!(held_token(&h.store).as_deref(), Some("T2"));

	let transport = ScriptedTransport::new("T1", RefreshScript::Reject, Duration::ZERO);
	let h = harness(transport, Some("T1"), config());
	let err = h.client.refresher().refresh_now().await.expect_err("Rejected refresh should fail.");

	assert!(matches!(err, Error::RefreshExhausted { .. }));
	assert!(h.store.get().is_none());
	assert_eq!(h.invalidations.load(Ordering::SeqCst), 1);
}

/// Sends a call whose refresh is delayed, and logs in again while that refresh is pending.
async fn relogin_during_refresh(
	refresh: RefreshScript,
) -> (Harness, SessionOrchestrator<ScriptedTransport>, ApiResponse) {
	let transport = ScriptedTransport::new("T0", refresh, Duration::from_millis(200));
	let h = harness(transport, Some("stale"), config());
	let orchestrator = SessionOrchestrator::new(h.client.clone());
	let (response, session) = tokio::join!(h.client.send(ApiRequest::get("/users")), async {
		tokio::time::sleep(Duration::from_millis(50)).await;

		orchestrator.login(&LoginRequest::new("grace@x.com", "secret")).await
	});

	session.expect("Login should succeed while a refresh is pending.");

	(h, orchestrator, response.expect("Call should produce a response."))
}

fn assert_newer_login_kept(h: &Harness, orchestrator: &SessionOrchestrator<ScriptedTransport>) {
	let credential = h.store.get().expect("The newer login should survive the late refresh.");

	assert_eq!(credential.token.expose(), LOGIN_TOKEN);
	assert_eq!(credential.user.name, "Grace");
	assert_eq!(
		h.slots.load(Slot::AccessToken).expect("Slot read should succeed.").as_deref(),
		Some(LOGIN_TOKEN)
	);
	assert_eq!(h.invalidations.load(Ordering::SeqCst), 0);
	assert_eq!(orchestrator.state(), SessionState::Authenticated);

	let calls = h.transport.calls_to("/users");

	assert_eq!(calls.len(), 2);
	assert_eq!(calls[1].authorization(), Some("Bearer T9"));
}

#[tokio::test]
async fn late_refresh_result_never_overwrites_a_newer_login() {
	let (h, orchestrator, response) = relogin_during_refresh(RefreshScript::Issue("TR")).await;

	assert_eq!(response.status, StatusCode::OK);
	assert_eq!(h.transport.refresh_calls(), 1);
	assert_newer_login_kept(&h, &orchestrator);
}

#[tokio::test]
async fn late_refresh_failure_never_ends_a_newer_login() {
	let (h, orchestrator, response) = relogin_during_refresh(RefreshScript::Reject).await;

	assert_eq!(response.status, StatusCode::OK);
	assert_eq!(h.transport.refresh_calls(), 1);
	assert_eq!(h.client.refresher().metrics().failures(), 1);
	assert_newer_login_kept(&h, &orchestrator);
}
