//! Credential store and the durable slot contract backing it.
//!
//! [`CredentialStore`] is the process-wide holder of the current [`Credential`]. It is
//! built once at startup by [`CredentialStore::hydrate`], shared behind an `Arc`, and
//! written only by the session orchestrator and the refresh coordinator. The in-memory
//! value is authoritative; every mutation is mirrored into two durable slots (token and
//! serialized profile) so a restarted process can pick the session back up.

pub mod file;
pub mod memory;

pub use file::FileSlots;
pub use memory::MemorySlots;

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, Credential, UserProfile},
	obs,
};

/// Durable key-value slots available to the process.
pub trait DurableSlots
where
	Self: Send + Sync,
{
	/// Reads the value stored in `slot`, if any.
	fn load(&self, slot: Slot) -> Result<Option<String>, StoreError>;

	/// Writes (or replaces) the value stored in `slot`.
	fn save(&self, slot: Slot, value: &str) -> Result<(), StoreError>;

	/// Removes `slot`; removing an empty slot succeeds.
	fn remove(&self, slot: Slot) -> Result<(), StoreError>;

	/// Writes every entry as one unit.
	///
	/// On error none of the entries may remain half-applied. The default writes slot by
	/// slot and removes what it already wrote when a later write fails; backends able to
	/// commit several values at once should override it.
	fn save_all(&self, entries: &[(Slot, &str)]) -> Result<(), StoreError> {
		for (written, (slot, value)) in entries.iter().enumerate() {
			if let Err(e) = self.save(*slot, value) {
				for (slot, _) in &entries[..written] {
					if let Err(e) = self.remove(*slot) {
						obs::record_store_failure("rollback", &e);
					}
				}

				return Err(e);
			}
		}

		Ok(())
	}
}

/// The two durable slots the session layer owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
	/// Raw access token.
	#[serde(rename = "token")]
	AccessToken,
	/// JSON-serialized [`UserProfile`].
	#[serde(rename = "user")]
	UserProfile,
}
impl Slot {
	/// Stable storage key for the slot.
	pub const fn as_str(self) -> &'static str {
		match self {
			Slot::AccessToken => "token",
			Slot::UserProfile => "user",
		}
	}
}
impl Display for Slot {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Error type produced by [`DurableSlots`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Credential plus the store revision it was read at, captured atomically.
#[derive(Clone, Debug)]
pub struct CredentialSnapshot {
	/// Credential present at read time.
	pub credential: Option<Credential>,
	/// Revision counter at read time; bumped by every mutation.
	pub revision: u64,
}

#[derive(Debug, Default)]
struct StoreState {
	credential: Option<Credential>,
	revision: u64,
}

/// Process-wide holder of the current credential.
pub struct CredentialStore {
	slots: Arc<dyn DurableSlots>,
	state: RwLock<StoreState>,
}
impl CredentialStore {
	/// Reads both durable slots once and builds the store from them.
	///
	/// A token without a profile (or the reverse), or a profile that no longer parses,
	/// is treated as no credential at all and both slots are cleared.
	pub fn hydrate(slots: Arc<dyn DurableSlots>) -> Self {
		let credential = Self::load_credential(slots.as_ref());

		if credential.is_none() {
			Self::remove_slots(slots.as_ref());
		}

		Self { slots, state: RwLock::new(StoreState { credential, revision: 0 }) }
	}

	/// Builds an empty store backed by fresh in-memory slots.
	pub fn in_memory() -> Self {
		Self::hydrate(Arc::new(MemorySlots::default()))
	}

	/// Returns the current credential.
	pub fn get(&self) -> Option<Credential> {
		self.state.read().credential.clone()
	}

	/// Returns the current credential together with the store revision.
	pub fn snapshot(&self) -> CredentialSnapshot {
		let state = self.state.read();

		CredentialSnapshot { credential: state.credential.clone(), revision: state.revision }
	}

	/// Current revision counter.
	pub fn revision(&self) -> u64 {
		self.state.read().revision
	}

	/// Whether a credential is currently held.
	pub fn is_authenticated(&self) -> bool {
		self.state.read().credential.is_some()
	}

	/// Stores `token` and `user` as one credential.
	pub(crate) fn set(&self, token: AccessToken, user: UserProfile) {
		let mut state = self.state.write();

		self.persist(&token, &user);

		state.credential = Some(Credential::new(token, user));
		state.revision += 1;
	}

	/// Swaps in a refreshed token, optionally with an updated profile.
	///
	/// Applies only while the store is still at `expected`, the revision the refresh
	/// started from. Returns `None` without touching anything when the credential was
	/// cleared or replaced in the meantime, so a late refresh can neither resurrect a
	/// logged-out session nor overwrite a newer one.
	pub(crate) fn replace_token(
		&self,
		expected: u64,
		token: AccessToken,
		user: Option<UserProfile>,
	) -> Option<CredentialSnapshot> {
		let mut state = self.state.write();

		if state.revision != expected {
			return None;
		}

		let current = state.credential.as_ref()?;
		let updated = Credential::new(token, user.unwrap_or_else(|| current.user.clone()));

		self.persist(&updated.token, &updated.user);

		state.credential = Some(updated.clone());
		state.revision += 1;

		Some(CredentialSnapshot { credential: Some(updated), revision: state.revision })
	}

	/// Drops the credential; clearing an empty store succeeds.
	pub(crate) fn clear(&self) {
		let mut state = self.state.write();

		Self::remove_slots(self.slots.as_ref());

		state.credential = None;
		state.revision += 1;
	}

	/// Drops the credential only while the store is still at `expected`.
	///
	/// Returns whether it did; `false` means another writer moved the store on.
	pub(crate) fn clear_if(&self, expected: u64) -> bool {
		let mut state = self.state.write();

		if state.revision != expected {
			return false;
		}

		Self::remove_slots(self.slots.as_ref());

		state.credential = None;
		state.revision += 1;

		true
	}

	fn persist(&self, token: &AccessToken, user: &UserProfile) {
		let profile = match serde_json::to_string(user) {
			Ok(profile) => profile,
			Err(e) => {
				obs::record_store_failure(
					"persist",
					&StoreError::Serialization { message: e.to_string() },
				);
				Self::remove_slots(self.slots.as_ref());

				return;
			},
		};
		let entries = [(Slot::AccessToken, token.expose()), (Slot::UserProfile, profile.as_str())];

		if let Err(e) = self.slots.save_all(&entries) {
			obs::record_store_failure("persist", &e);
			// A restart must find both slots or neither.
			Self::remove_slots(self.slots.as_ref());
		}
	}

	fn load_credential(slots: &dyn DurableSlots) -> Option<Credential> {
		let token = Self::load_slot(slots, Slot::AccessToken)?;
		let profile = Self::load_slot(slots, Slot::UserProfile)?;

		match serde_json::from_str::<UserProfile>(&profile) {
			Ok(user) => Some(Credential::new(AccessToken::new(token), user)),
			Err(e) => {
				obs::record_store_failure(
					"hydrate",
					&StoreError::Serialization { message: e.to_string() },
				);

				None
			},
		}
	}

	fn load_slot(slots: &dyn DurableSlots, slot: Slot) -> Option<String> {
		match slots.load(slot) {
			Ok(value) => value.filter(|value| !value.is_empty()),
			Err(e) => {
				obs::record_store_failure("hydrate", &e);

				None
			},
		}
	}

	fn remove_slots(slots: &dyn DurableSlots) {
		for slot in [Slot::AccessToken, Slot::UserProfile] {
			if let Err(e) = slots.remove(slot) {
				obs::record_store_failure("clear", &e);
			}
		}
	}
}
impl Debug for CredentialStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.state.read();

		f.debug_struct("CredentialStore")
			.field("authenticated", &state.credential.is_some())
			.field("revision", &state.revision)
			.finish()
	}
}
