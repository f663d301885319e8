mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::StoreError;
use crate::state::{EventId, GameState, StateDefaults, StateId, StatePatch};

pub use memory::MemoryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "sub-{}", self.0)
	}
}

/// A live change feed for one event. Every item is a full-row snapshot, in
/// the store's commit order. The feed ends when the store drops it.
#[derive(Debug)]
pub struct Subscription {
	pub id: SubscriptionId,
	pub updates: mpsc::UnboundedReceiver<GameState>,
}

/// Durable per-event state record with subscribe-on-change.
#[async_trait]
pub trait StateStore: Send + Sync {
	async fn read_state(&self, event_id: &EventId) -> Result<Option<GameState>, StoreError>;

	/// Creates the event's record, or returns the existing one if another
	/// client got there first.
	async fn create_state(
		&self,
		event_id: &EventId,
		defaults: StateDefaults,
	) -> Result<GameState, StoreError>;

	async fn update_fields(&self, state_id: StateId, patch: &StatePatch) -> Result<(), StoreError>;

	async fn subscribe(&self, event_id: &EventId) -> Result<Subscription, StoreError>;

	async fn unsubscribe(&self, subscription: SubscriptionId) -> Result<(), StoreError>;
}
