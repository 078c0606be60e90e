//! Client-side session layer for bearer-token APIs: credential decoration, single-flight
//! refresh-and-retry, and session invalidation broadcasts in one crate.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod broadcast;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod obs;
pub mod session;
pub mod store;
pub mod users;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::UserProfile,
		broadcast::AuthStateBroadcaster,
		client::ApiClient,
		config::ClientConfig,
		http::ReqwestTransport,
		session::SessionOrchestrator,
		store::{CredentialStore, DurableSlots, MemorySlots, Slot},
	};

	/// Client type alias used by reqwest-backed integration tests.
	pub type ReqwestTestClient = ApiClient<ReqwestTransport>;

	/// Everything a reqwest-backed integration test needs, wired the way an application
	/// would wire it at startup.
	pub struct TestStack {
		/// Pipeline used for arbitrary API calls.
		pub client: ReqwestTestClient,
		/// Session state machine under test.
		pub orchestrator: SessionOrchestrator<ReqwestTransport>,
		/// Credential store shared by the client and the orchestrator.
		pub store: Arc<CredentialStore>,
		/// Durable slots backing the store.
		pub slots: Arc<MemorySlots>,
		/// Invalidation broadcaster shared by every component.
		pub broadcaster: Arc<AuthStateBroadcaster>,
	}

	/// Builds a profile fixture with the provided identifier.
	pub fn test_user(id: &str) -> UserProfile {
		UserProfile::new(
			id.parse().expect("Test user identifier should be valid."),
			format!("User {id}"),
			format!("{id}@example.com"),
		)
	}

	/// Returns durable slots already holding a serialized credential.
	pub fn seeded_slots(token: &str, user: &UserProfile) -> Arc<MemorySlots> {
		let slots = Arc::new(MemorySlots::default());
		let profile =
			serde_json::to_string(user).expect("Test user profile should serialize to JSON.");

		slots.save(Slot::AccessToken, token).expect("Seeding the token slot should succeed.");
		slots.save(Slot::UserProfile, &profile).expect("Seeding the user slot should succeed.");

		slots
	}

	/// Hydrates a store that already holds `token` for `user`.
	pub fn seeded_store(token: &str, user: &UserProfile) -> Arc<CredentialStore> {
		Arc::new(CredentialStore::hydrate(seeded_slots(token, user)))
	}

	/// Builds a reqwest transport for the provided base URL that accepts the self-signed
	/// certificates produced by `httpmock` during tests.
	pub fn test_reqwest_transport(base_url: Url) -> ReqwestTransport {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.cookie_store(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestTransport::with_client(client, base_url)
	}

	/// Wires a complete reqwest-backed stack on top of `slots`.
	pub fn build_reqwest_test_stack(config: ClientConfig, slots: Arc<MemorySlots>) -> TestStack {
		let durable: Arc<dyn DurableSlots> = slots.clone();
		let store = Arc::new(CredentialStore::hydrate(durable));
		let broadcaster = Arc::new(AuthStateBroadcaster::default());
		let transport = test_reqwest_transport(config.base_url.clone());
		let client: ReqwestTestClient =
			ApiClient::with_transport(config, transport, store.clone(), broadcaster.clone())
				.expect("Test client configuration should be valid.");
		let orchestrator = SessionOrchestrator::new(client.clone());

		TestStack { client, orchestrator, store, slots, broadcaster }
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
