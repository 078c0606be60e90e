//! Simple file-backed [`DurableSlots`] for desktop and CLI deployments.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	store::{DurableSlots, Slot, StoreError},
};

/// Persists both slots to one JSON file after each mutation.
///
/// Every mutation, including a multi-slot [`DurableSlots::save_all`], is a single
/// write-to-temp-then-rename, so the file never holds half of a batch.
#[derive(Clone, Debug)]
pub struct FileSlots {
	path: PathBuf,
	inner: Arc<RwLock<BTreeMap<Slot, String>>>,
}
impl FileSlots {
	/// Opens (or creates) a slot file at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<BTreeMap<Slot, String>, StoreError> {
		if !path.exists() {
			return Ok(BTreeMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(BTreeMap::new());
		}

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create slot directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &BTreeMap<Slot, String>) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(contents).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize slot snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl DurableSlots for FileSlots {
	fn load(&self, slot: Slot) -> Result<Option<String>, StoreError> {
		Ok(self.inner.read().get(&slot).cloned())
	}

	fn save(&self, slot: Slot, value: &str) -> Result<(), StoreError> {
		self.save_all(&[(slot, value)])
	}

	fn save_all(&self, entries: &[(Slot, &str)]) -> Result<(), StoreError> {
		let mut guard = self.inner.write();
		let previous = guard.clone();

		for (slot, value) in entries {
			guard.insert(*slot, (*value).to_owned());
		}

		let persisted = self.persist_locked(&guard);

		if persisted.is_err() {
			*guard = previous;
		}

		persisted
	}

	fn remove(&self, slot: Slot) -> Result<(), StoreError> {
		let mut guard = self.inner.write();

		if guard.remove(&slot).is_none() {
			return Ok(());
		}

		self.persist_locked(&guard)
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// self
	use super::*;
	use crate::{
		auth::{UserId, UserProfile},
		store::CredentialStore,
	};

	fn temp_path() -> PathBuf {
		let unique = format!(
			"bearer_session_file_slots_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	#[test]
	fn credential_survives_a_restart() {
		let path = temp_path();
		let slots = FileSlots::open(&path).expect("Failed to open slot file.");
		let store = CredentialStore::hydrate(Arc::new(slots));
		let user = UserProfile::new(
			UserId::new("u1").expect("User fixture should be valid."),
			"Ada",
			"ada@example.com",
		);

		store.set(crate::auth::AccessToken::new("T1"), user.clone());
		drop(store);

		let reopened = FileSlots::open(&path).expect("Failed to reopen slot file.");
		let restored = CredentialStore::hydrate(Arc::new(reopened))
			.get()
			.expect("Slot file lost the credential after reopen.");

		assert_eq!(restored.token.expose(), "T1");
		assert_eq!(restored.user, user);

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary slot file {}: {e}", path.display())
		});
	}

	#[test]
	fn failed_batch_leaves_memory_and_file_unchanged() {
		let dir = temp_path();
		let path = dir.join("slots.json");
		let slots = FileSlots::open(&path).expect("Failed to open slot file.");

		slots
			.save_all(&[(Slot::AccessToken, "T1"), (Slot::UserProfile, "u1")])
			.expect("Batch save should succeed.");
		// Swapping the directory for a plain file makes every later write fail.
		fs::remove_dir_all(&dir).unwrap_or_else(|e| {
			panic!("Failed to remove temporary slot directory {}: {e}", dir.display())
		});
		fs::write(&dir, b"").unwrap_or_else(|e| {
			panic!("Failed to block temporary slot directory {}: {e}", dir.display())
		});

		assert!(slots.save_all(&[(Slot::AccessToken, "T2"), (Slot::UserProfile, "u2")]).is_err());
		assert_eq!(slots.load(Slot::AccessToken).expect("Load should succeed.").as_deref(), Some("T1"));
		assert_eq!(slots.load(Slot::UserProfile).expect("Load should succeed.").as_deref(), Some("u1"));

		fs::remove_file(&dir).unwrap_or_else(|e| {
			panic!("Failed to remove temporary blocker {}: {e}", dir.display())
		});
	}

	#[test]
	fn clear_empties_the_file() {
		let path = temp_path();
		let slots = FileSlots::open(&path).expect("Failed to open slot file.");

		slots.save(Slot::AccessToken, "T1").expect("Saving the token slot should succeed.");
		slots.remove(Slot::AccessToken).expect("Removing the token slot should succeed.");

		let reopened = FileSlots::open(&path).expect("Failed to reopen slot file.");

		assert_eq!(reopened.load(Slot::AccessToken).expect("Load should succeed."), None);

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary slot file {}: {e}", path.display())
		});
	}
}
