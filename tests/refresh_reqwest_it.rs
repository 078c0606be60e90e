#![cfg(all(feature = "reqwest", feature = "test"))]

// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use bearer_session::{
	_preludet::*,
	config::ClientConfig,
	http::{ApiRequest, StatusCode},
	session::{LoginRequest, SessionState},
	store::{DurableSlots, MemorySlots, Slot},
	users::UserDirectory,
};

fn config(server: &MockServer) -> ClientConfig {
	ClientConfig::new(Url::parse(&server.url("/api")).expect("Mock base URL should parse."))
}

#[tokio::test]
async fn refresh_cookie_from_login_renews_the_access_token() {
	let server = MockServer::start_async().await;
	let stack = build_reqwest_test_stack(config(&server), Arc::new(MemorySlots::default()));

	server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/login");
			then.status(200)
				.header("set-cookie", "refreshToken=r1; Path=/; HttpOnly")
				.json_body(json!({
					"token": "T1",
					"user": { "id": 1, "name": "Ada", "email": "ada@x.com", "role": "USER" }
				}));
		})
		.await;

	let expired = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/users").header("authorization", "Bearer T1");
			then.status(401).json_body(json!({ "message": "Token expired" }));
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/refresh").header("cookie", "refreshToken=r1");
			then.status(200).json_body(json!({ "token": "T2" }));
		})
		.await;
	let renewed = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/users").header("authorization", "Bearer T2");
			then.status(200).json_body(json!([
				{ "id": 1, "name": "Ada", "email": "ada@x.com", "role": "USER" }
			]));
		})
		.await;

	stack
		.orchestrator
		.login(&LoginRequest::new("ada@x.com", "secret"))
		.await
		.expect("Login should succeed.");

	let users = UserDirectory::new(stack.client.clone())
		.list()
		.await
		.expect("Listing should succeed after the refresh.");

	expired.assert_async().await;
	refresh.assert_async().await;
	renewed.assert_async().await;

	assert_eq!(users.len(), 1);
	assert_eq!(users[0].role.as_deref(), Some("USER"));
	assert_eq!(stack.orchestrator.state(), SessionState::Authenticated);

	let credential = stack.store.get().expect("Credential should survive the refresh.");

	assert_eq!(credential.token.expose(), "T2");
	assert_eq!(credential.user.name, "Ada", "The profile should be kept when refresh omits it.");
	assert_eq!(
		stack.slots.load(Slot::AccessToken).expect("Slot read should succeed.").as_deref(),
		Some("T2")
	);
}

#[tokio::test]
async fn resubmission_that_is_rejected_again_ends_the_session() {
	let server = MockServer::start_async().await;
	let stack = build_reqwest_test_stack(config(&server), seeded_slots("T1", &test_user("u1")));
	let protected = server
		.mock_async(|when, then| {
			when.method(DELETE).path("/api/users/7");
			then.status(401);
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/refresh");
			then.status(200).json_body(json!({ "token": "T2" }));
		})
		.await;
	let response = stack
		.client
		.send(ApiRequest::delete("/users/7"))
		.await
		.expect("Call should complete with the original response.");

	protected.assert_calls_async(2).await;
	refresh.assert_calls_async(1).await;

	assert_eq!(response.status, StatusCode::UNAUTHORIZED);
	assert!(stack.store.get().is_none());
	assert!(stack.slots.is_empty());
}

#[tokio::test]
async fn malformed_refresh_answers_count_as_failures() {
	let server = MockServer::start_async().await;
	let stack = build_reqwest_test_stack(config(&server), seeded_slots("T1", &test_user("u1")));

	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/users/me");
			then.status(401);
		})
		.await;

	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/refresh");
			then.status(200).body("not json");
		})
		.await;

	assert_eq!(stack.orchestrator.start().await, SessionState::Anonymous);

	refresh.assert_async().await;

	assert!(stack.store.get().is_none());
	assert_eq!(stack.client.refresher().metrics().failures(), 1);
}
