//! Thread-safe in-memory [`DurableSlots`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	store::{DurableSlots, Slot, StoreError},
};

type SlotMap = Arc<RwLock<HashMap<Slot, String>>>;

/// Slot backend that keeps values in-process; durable only for the lifetime of the value.
#[derive(Clone, Debug, Default)]
pub struct MemorySlots(SlotMap);
impl MemorySlots {
	/// Number of occupied slots.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Whether every slot is empty.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl DurableSlots for MemorySlots {
	fn load(&self, slot: Slot) -> Result<Option<String>, StoreError> {
		Ok(self.0.read().get(&slot).cloned())
	}

	fn save(&self, slot: Slot, value: &str) -> Result<(), StoreError> {
		self.0.write().insert(slot, value.to_owned());

		Ok(())
	}

	fn remove(&self, slot: Slot) -> Result<(), StoreError> {
		self.0.write().remove(&slot);

		Ok(())
	}

	fn save_all(&self, entries: &[(Slot, &str)]) -> Result<(), StoreError> {
		let mut map = self.0.write();

		for (slot, value) in entries {
			map.insert(*slot, (*value).to_owned());
		}

		Ok(())
	}
}
