use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::StoreError;
use crate::lock_mutex;
use crate::logging;
use crate::state::{EventId, GameState, StateDefaults, StateId, StatePatch};
use crate::store::{StateStore, Subscription, SubscriptionId};

struct Subscriber {
	event_id: EventId,
	sender: mpsc::UnboundedSender<GameState>,
}

#[derive(Default)]
struct Tables {
	records: HashMap<EventId, GameState>,
	events_by_state: HashMap<StateId, EventId>,
	subscribers: HashMap<SubscriptionId, Subscriber>,
	next_state_id: u64,
	next_subscription: u64,
}

impl Tables {
	fn notify(&mut self, state: &GameState) {
		self.subscribers.retain(|_, sub| {
			if sub.event_id != state.event_id {
				return true;
			}
			sub.sender.send(state.clone()).is_ok()
		});
	}
}

/// The authoritative store: one record per event, committed under a single
/// lock so every subscriber of an event sees the same total order.
#[derive(Default)]
pub struct MemoryStore {
	tables: Mutex<Tables>,
	offline: AtomicBool,
	reject_writes: AtomicBool,
	commits: AtomicU64,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// While offline every call fails with `Unreachable`.
	pub fn set_offline(&self, offline: bool) {
		self.offline.store(offline, Ordering::SeqCst);
	}

	pub fn set_reject_writes(&self, reject: bool) {
		self.reject_writes.store(reject, Ordering::SeqCst);
	}

	/// Ends every live feed, as a dropped transport would.
	pub fn disconnect_all(&self) {
		lock_mutex(&self.tables).subscribers.clear();
	}

	pub fn record(&self, event_id: &EventId) -> Option<GameState> {
		lock_mutex(&self.tables).records.get(event_id).cloned()
	}

	pub fn subscriber_count(&self, event_id: &EventId) -> usize {
		lock_mutex(&self.tables)
			.subscribers
			.values()
			.filter(|s| &s.event_id == event_id && !s.sender.is_closed())
			.count()
	}

	/// Number of committed field updates since start.
	pub fn commit_count(&self) -> u64 {
		self.commits.load(Ordering::SeqCst)
	}

	fn ensure_online(&self) -> Result<(), StoreError> {
		if self.offline.load(Ordering::SeqCst) {
			Err(StoreError::Unreachable("store is offline".to_string()))
		} else {
			Ok(())
		}
	}
}

#[async_trait]
impl StateStore for MemoryStore {
	async fn read_state(&self, event_id: &EventId) -> Result<Option<GameState>, StoreError> {
		self.ensure_online()?;
		Ok(self.record(event_id))
	}

	async fn create_state(
		&self,
		event_id: &EventId,
		defaults: StateDefaults,
	) -> Result<GameState, StoreError> {
		self.ensure_online()?;
		let mut tables = lock_mutex(&self.tables);
		if let Some(existing) = tables.records.get(event_id) {
			return Ok(existing.clone());
		}

		tables.next_state_id += 1;
		let state_id = StateId(tables.next_state_id);
		let state = GameState::new(state_id, event_id.clone(), defaults);
		tables.records.insert(event_id.clone(), state.clone());
		tables.events_by_state.insert(state_id, event_id.clone());
		tables.notify(&state);
		logging::store::created(event_id, state_id);
		Ok(state)
	}

	async fn update_fields(&self, state_id: StateId, patch: &StatePatch) -> Result<(), StoreError> {
		self.ensure_online()?;
		if self.reject_writes.load(Ordering::SeqCst) {
			return Err(StoreError::Rejected("writes are disabled".to_string()));
		}

		let mut tables = lock_mutex(&self.tables);
		let event_id = tables
			.events_by_state
			.get(&state_id)
			.cloned()
			.ok_or(StoreError::NotFound(state_id))?;
		let snapshot = {
			let record = tables
				.records
				.get_mut(&event_id)
				.ok_or(StoreError::NotFound(state_id))?;
			patch.apply_to(record);
			record.clone()
		};
		self.commits.fetch_add(1, Ordering::SeqCst);
		tables.notify(&snapshot);
		logging::store::committed(&event_id, state_id, patch.changes().len());
		Ok(())
	}

	async fn subscribe(&self, event_id: &EventId) -> Result<Subscription, StoreError> {
		self.ensure_online()?;
		let (sender, updates) = mpsc::unbounded_channel();
		let mut tables = lock_mutex(&self.tables);
		tables.next_subscription += 1;
		let id = SubscriptionId(tables.next_subscription);
		tables.subscribers.insert(
			id,
			Subscriber {
				event_id: event_id.clone(),
				sender,
			},
		);
		logging::store::subscribed(event_id, id);
		Ok(Subscription { id, updates })
	}

	async fn unsubscribe(&self, subscription: SubscriptionId) -> Result<(), StoreError> {
		if lock_mutex(&self.tables).subscribers.remove(&subscription).is_some() {
			logging::store::unsubscribed(subscription);
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::state::{Player, RosterId, Scene};

	fn cup() -> EventId {
		EventId::new("cup")
	}

	#[tokio::test]
	async fn test_read_missing_record() {
		let store = MemoryStore::new();
		assert!(store.read_state(&cup()).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_create_is_idempotent_per_event() {
		let store = MemoryStore::new();
		let first = store.create_state(&cup(), StateDefaults::default()).await.unwrap();
		let defaults = StateDefaults {
			scene: Scene::Select,
			allow_duplicates: true,
		};
		let second = store.create_state(&cup(), defaults).await.unwrap();
		assert_eq!(first, second);
		assert_eq!(second.current_scene, Scene::Intro);

		let other = store.create_state(&EventId::new("other"), defaults).await.unwrap();
		assert_ne!(other.id, first.id);
		assert!(other.allow_duplicates);
	}

	#[tokio::test]
	async fn test_update_broadcasts_full_rows_in_commit_order() {
		let store = MemoryStore::new();
		let state = store.create_state(&cup(), StateDefaults::default()).await.unwrap();
		let mut sub = store.subscribe(&cup()).await.unwrap();

		store
			.update_fields(state.id, &StatePatch::new().cursor(Player::P1, 3))
			.await
			.unwrap();
		store
			.update_fields(state.id, &StatePatch::new().scene(Scene::Select))
			.await
			.unwrap();

		let first = sub.updates.recv().await.unwrap();
		assert_eq!(first.player1.cursor_index, 3);
		assert_eq!(first.current_scene, Scene::Intro);

		let second = sub.updates.recv().await.unwrap();
		assert_eq!(second.player1.cursor_index, 3);
		assert_eq!(second.current_scene, Scene::Select);
		assert_eq!(store.commit_count(), 2);
	}

	#[tokio::test]
	async fn test_feed_only_carries_own_event() {
		let store = MemoryStore::new();
		let other = store
			.create_state(&EventId::new("other"), StateDefaults::default())
			.await
			.unwrap();
		let mut sub = store.subscribe(&cup()).await.unwrap();

		store
			.update_fields(other.id, &StatePatch::new().winner(Some(RosterId::new("ryu"))))
			.await
			.unwrap();
		assert!(sub.updates.try_recv().is_err());
	}

	#[tokio::test]
	async fn test_unsubscribe_stops_feed() {
		let store = MemoryStore::new();
		let state = store.create_state(&cup(), StateDefaults::default()).await.unwrap();
		let mut sub = store.subscribe(&cup()).await.unwrap();
		assert_eq!(store.subscriber_count(&cup()), 1);

		store.unsubscribe(sub.id).await.unwrap();
		store.unsubscribe(sub.id).await.unwrap();
		store
			.update_fields(state.id, &StatePatch::new().allow_duplicates(true))
			.await
			.unwrap();

		assert!(sub.updates.recv().await.is_none());
		assert_eq!(store.subscriber_count(&cup()), 0);
	}

	#[tokio::test]
	async fn test_unknown_state_id() {
		let store = MemoryStore::new();
		let err = store
			.update_fields(StateId(42), &StatePatch::new().scene(Scene::Combat))
			.await
			.unwrap_err();
		assert_eq!(err, StoreError::NotFound(StateId(42)));
	}

	#[tokio::test]
	async fn test_offline_and_rejecting_store() {
		let store = MemoryStore::new();
		let state = store.create_state(&cup(), StateDefaults::default()).await.unwrap();

		store.set_offline(true);
		assert!(matches!(
			store.read_state(&cup()).await,
			Err(StoreError::Unreachable(_))
		));
		assert!(matches!(
			store.subscribe(&cup()).await,
			Err(StoreError::Unreachable(_))
		));

		store.set_offline(false);
		store.set_reject_writes(true);
		let err = store
			.update_fields(state.id, &StatePatch::new().scene(Scene::Combat))
			.await
			.unwrap_err();
		assert!(matches!(err, StoreError::Rejected(_)));
		assert_eq!(store.record(&cup()).unwrap().current_scene, Scene::Intro);
	}
}
