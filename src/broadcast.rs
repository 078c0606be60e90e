//! Session invalidation broadcasts.
//!
//! The transport layer never talks to presentation code directly. When the refresh
//! protocol or the orchestrator concludes that the session is gone, it publishes a
//! [`SessionInvalidated`] event here, and whoever registered a subscriber reacts.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::_prelude::*;

/// The only event kind the broadcaster carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionInvalidated {
	/// Instant the session was declared invalid.
	pub at: OffsetDateTime,
}
impl SessionInvalidated {
	/// Stamps a new event with the current time.
	pub fn now() -> Self {
		Self { at: OffsetDateTime::now_utc() }
	}
}

/// Receiver of [`SessionInvalidated`] events.
///
/// Closures of the shape `Fn(&SessionInvalidated) + Send + Sync` implement the trait.
pub trait InvalidationSubscriber
where
	Self: Send + Sync,
{
	/// Called once per published event, outside the broadcaster's registry lock.
	fn on_session_invalidated(&self, event: &SessionInvalidated);
}
impl<F> InvalidationSubscriber for F
where
	F: Fn(&SessionInvalidated) + Send + Sync,
{
	fn on_session_invalidated(&self, event: &SessionInvalidated) {
		self(event)
	}
}

/// Handle returned by [`AuthStateBroadcaster::subscribe`]; pass it back to detach.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

/// Registry of invalidation subscribers.
#[derive(Default)]
pub struct AuthStateBroadcaster {
	next_id: AtomicU64,
	subscribers: RwLock<BTreeMap<SubscriptionId, Arc<dyn InvalidationSubscriber>>>,
}
impl AuthStateBroadcaster {
	/// Registers `subscriber` until [`unsubscribe`](Self::unsubscribe) is called.
	pub fn subscribe(&self, subscriber: impl 'static + InvalidationSubscriber) -> SubscriptionId {
		self.subscribe_shared(Arc::new(subscriber))
	}

	/// Registers an already shared subscriber.
	pub fn subscribe_shared(&self, subscriber: Arc<dyn InvalidationSubscriber>) -> SubscriptionId {
		let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));

		self.subscribers.write().insert(id, subscriber);

		id
	}

	/// Detaches a subscriber; returns `false` when the id was not registered.
	pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
		self.subscribers.write().remove(&id).is_some()
	}

	/// Number of registered subscribers.
	pub fn subscriber_count(&self) -> usize {
		self.subscribers.read().len()
	}

	/// Publishes a fresh event to every subscriber and returns it.
	pub fn publish(&self) -> SessionInvalidated {
		let event = SessionInvalidated::now();
		let subscribers = self.subscribers.read().values().cloned().collect::<Vec<_>>();

		for subscriber in subscribers {
			subscriber.on_session_invalidated(&event);
		}

		event
	}
}
impl Debug for AuthStateBroadcaster {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthStateBroadcaster")
			.field("subscribers", &self.subscriber_count())
			.finish()
	}
}
