//! Walks through a session against a mocked backend: login, a call that needs a token
//! refresh, a restart that rehydrates from disk, and logout.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::json;
use url::Url;
// self
use bearer_session::{
	broadcast::{AuthStateBroadcaster, SessionInvalidated},
	client::ApiClient,
	config::ClientConfig,
	session::{LoginRequest, SessionOrchestrator},
	store::{CredentialStore, FileSlots},
	users::UserDirectory,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let profile = json!({ "id": 1, "name": "Ada", "email": "ada@x.com", "role": "ADMIN" });
	let login_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/login");
			then.status(200)
				.header("set-cookie", "refreshToken=r1; Path=/; HttpOnly")
				.json_body(json!({ "token": "access-1", "user": profile }));
		})
		.await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/users").header("authorization", "Bearer access-1");
			then.status(401).json_body(json!({ "message": "Token expired" }));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/users").header("authorization", "Bearer access-2");
			then.status(200).json_body(json!([profile]));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/users/me").header("authorization", "Bearer access-2");
			then.status(200).json_body(profile.clone());
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/logout");
			then.status(204);
		})
		.await;

	let refresh_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/refresh").header("cookie", "refreshToken=r1");
			then.status(200).json_body(json!({ "token": "access-2" }));
		})
		.await;
	let slots_path = std::env::temp_dir().join("bearer-session-walkthrough.json");
	let _ = std::fs::remove_file(&slots_path);
	let config = ClientConfig::new(Url::parse(&server.url("/api"))?);
	let broadcaster = Arc::new(AuthStateBroadcaster::default());

	broadcaster.subscribe(|event: &SessionInvalidated| {
		println!("Session invalidated at {}.", event.at);
	});

	{
		let store = Arc::new(CredentialStore::hydrate(Arc::new(FileSlots::open(&slots_path)?)));
		let client = ApiClient::new(config.clone(), store, broadcaster.clone())?;
		let orchestrator = SessionOrchestrator::new(client.clone());

		println!("Started as {}.", orchestrator.start().await);

		let session = orchestrator.login(&LoginRequest::new("ada@x.com", "secret")).await?;

		println!("Logged in as {} ({}).", session.user.name, session.user.email);

		let users = UserDirectory::new(client.clone()).list().await?;

		println!(
			"Listed {} user(s) after {} refresh call(s).",
			users.len(),
			client.refresher().metrics().attempts()
		);
	}

	let store = Arc::new(CredentialStore::hydrate(Arc::new(FileSlots::open(&slots_path)?)));
	let client = ApiClient::new(config, store, broadcaster)?;
	let orchestrator = SessionOrchestrator::new(client);

	println!("Restarted and hydrated into {}.", orchestrator.start().await);

	orchestrator.logout().await;

	println!("Logged out; state is {}.", orchestrator.state());

	login_mock.assert_async().await;
	refresh_mock.assert_async().await;

	Ok(())
}
