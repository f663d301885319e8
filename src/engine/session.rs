use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::Settings;
use crate::engine::randomizer::RandomizerConfig;
use crate::error::{EngineError, StoreError};
use crate::lock_mutex;
use crate::logging;
use crate::navigation::{PRESENTATION_COLUMNS, SELECT_COLUMNS};
use crate::roster::{Roster, RosterProvider};
use crate::state::{EventId, GameState, Player, StateDefaults, StateId, StatePatch};
use crate::store::{StateStore, Subscription, SubscriptionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
	Connecting,
	Connected,
	Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
	pub updates: u64,
	pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
	pub select_columns: usize,
	pub presentation_columns: usize,
	pub defaults: StateDefaults,
	pub randomizer: RandomizerConfig,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			select_columns: SELECT_COLUMNS,
			presentation_columns: PRESENTATION_COLUMNS,
			defaults: StateDefaults::default(),
			randomizer: RandomizerConfig::default(),
		}
	}
}

impl From<&Settings> for EngineConfig {
	fn from(settings: &Settings) -> Self {
		Self {
			select_columns: settings.grid.select_columns,
			presentation_columns: settings.grid.presentation_columns,
			defaults: StateDefaults {
				allow_duplicates: settings.event.allow_duplicates,
				..StateDefaults::default()
			},
			randomizer: RandomizerConfig {
				duration: Duration::from_millis(settings.randomizer.duration_ms),
				tick: Duration::from_millis(settings.randomizer.tick_ms),
				seed: settings.randomizer.seed,
			},
		}
	}
}

enum WriteRequest {
	Fields {
		state_id: StateId,
		patch: StatePatch,
		op: &'static str,
	},
	Barrier(oneshot::Sender<()>),
}

struct Session {
	subscription: SubscriptionId,
	inbound: JoinHandle<()>,
}

pub(super) struct Inner {
	pub(super) event_id: EventId,
	store: Arc<dyn StateStore>,
	pub(super) config: EngineConfig,
	pub(super) runtime: Handle,
	state: Mutex<Option<GameState>>,
	roster: Mutex<Roster>,
	session: tokio::sync::Mutex<Option<Session>>,
	writes: Mutex<Option<mpsc::UnboundedSender<WriteRequest>>>,
	pub(super) generation: AtomicU64,
	snapshots: watch::Sender<Option<GameState>>,
	status: watch::Sender<SyncStatus>,
	stats: Mutex<SyncStats>,
	pub(super) randomizing: Mutex<HashSet<Player>>,
}

impl Inner {
	fn enqueue(&self, request: WriteRequest) {
		if let Some(writes) = lock_mutex(&self.writes).as_ref() {
			let _ = writes.send(request);
		}
	}

	fn set_status(&self, status: SyncStatus) {
		self.status.send_if_modified(|current| {
			if *current == status {
				false
			} else {
				*current = status;
				true
			}
		});
	}

	/// Replaces the local view with a snapshot from the store's feed.
	fn apply_snapshot(&self, generation: u64, snapshot: GameState) {
		{
			let mut state = lock_mutex(&self.state);
			if self.generation.load(Ordering::SeqCst) != generation {
				return;
			}
			*state = Some(snapshot.clone());
			self.snapshots.send_replace(Some(snapshot));
		}

		let updates = {
			let mut stats = lock_mutex(&self.stats);
			stats.updates += 1;
			stats.last_update = Some(Utc::now());
			stats.updates
		};
		self.set_status(SyncStatus::Connected);
		logging::sync::snapshot(&self.event_id, updates);
	}
}

/// One client's live, optimistic view of an event's game state.
///
/// Operations apply to the local copy first and are then written to the
/// store in call order by a background writer. The store's change feed
/// replaces the local copy wholesale, so writes from other clients (and a
/// rejected write of our own) converge on the next broadcast.
#[derive(Clone)]
pub struct Engine {
	pub(super) inner: Arc<Inner>,
}

impl Engine {
	pub fn new(
		event_id: EventId,
		store: Arc<dyn StateStore>,
		roster: Roster,
		config: EngineConfig,
		runtime: Handle,
	) -> Self {
		let (snapshots, _) = watch::channel(None);
		let (status, _) = watch::channel(SyncStatus::Connecting);

		Self {
			inner: Arc::new(Inner {
				event_id,
				store,
				config,
				runtime,
				state: Mutex::new(None),
				roster: Mutex::new(roster),
				session: tokio::sync::Mutex::new(None),
				writes: Mutex::new(None),
				generation: AtomicU64::new(0),
				snapshots,
				status,
				stats: Mutex::new(SyncStats::default()),
				randomizing: Mutex::new(HashSet::new()),
			}),
		}
	}

	/// Loads the event's state (creating it if missing) and starts following
	/// the store's change feed. Opening an open engine does nothing.
	pub async fn open(&self) -> Result<(), EngineError> {
		let mut session = self.inner.session.lock().await;
		if session.is_some() {
			return Ok(());
		}

		self.inner.set_status(SyncStatus::Connecting);
		logging::sync::opening(&self.inner.event_id);
		let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

		let (mut subscription, mut initial, created) = match self.connect().await {
			Ok(connected) => connected,
			Err(err) => {
				self.inner.set_status(SyncStatus::Error);
				logging::sync::open_failed(&self.inner.event_id, &err);
				return Err(EngineError::Connection(err));
			}
		};

		// commits queued since subscribing are at least as fresh as the read
		while let Ok(newer) = subscription.updates.try_recv() {
			initial = newer;
		}

		let state_id = initial.id;
		{
			let mut state = lock_mutex(&self.inner.state);
			*state = Some(initial.clone());
			self.inner.snapshots.send_replace(Some(initial));
		}

		let (writes, queue) = mpsc::unbounded_channel();
		*lock_mutex(&self.inner.writes) = Some(writes);
		self.inner.runtime.spawn(run_writer(Arc::clone(&self.inner), queue));
		let inbound = self.inner.runtime.spawn(run_inbound(
			Arc::clone(&self.inner),
			generation,
			subscription.updates,
		));

		*session = Some(Session {
			subscription: subscription.id,
			inbound,
		});
		self.inner.set_status(SyncStatus::Connected);
		logging::sync::opened(&self.inner.event_id, state_id, created);
		Ok(())
	}

	async fn connect(&self) -> Result<(Subscription, GameState, bool), StoreError> {
		let store = &self.inner.store;
		let event_id = &self.inner.event_id;

		let subscription = store.subscribe(event_id).await?;
		let loaded = match store.read_state(event_id).await {
			Ok(Some(state)) => Ok((state, false)),
			Ok(None) => store
				.create_state(event_id, self.inner.config.defaults)
				.await
				.map(|state| (state, true)),
			Err(err) => Err(err),
		};

		match loaded {
			Ok((state, created)) => Ok((subscription, state, created)),
			Err(err) => {
				let _ = store.unsubscribe(subscription.id).await;
				Err(err)
			}
		}
	}

	/// Stops following the store. The local view becomes "not loaded", so
	/// later operations are no-ops. Safe to call more than once.
	pub async fn close(&self) {
		let mut session = self.inner.session.lock().await;
		let Some(active) = session.take() else {
			return;
		};

		self.inner.generation.fetch_add(1, Ordering::SeqCst);
		active.inbound.abort();
		lock_mutex(&self.inner.writes).take();
		{
			let mut state = lock_mutex(&self.inner.state);
			*state = None;
			self.inner.snapshots.send_replace(None);
		}

		if let Err(err) = self.inner.store.unsubscribe(active.subscription).await {
			logging::sync::unsubscribe_failed(&self.inner.event_id, &err);
		}
		logging::sync::closed(&self.inner.event_id, active.subscription);
	}

	/// Waits until every write queued before this call has been attempted.
	pub async fn flush(&self) {
		let (done, wait) = oneshot::channel();
		self.inner.enqueue(WriteRequest::Barrier(done));
		let _ = wait.await;
	}

	/// The shared optimistic mutation path: compute a patch from the current
	/// state, apply it locally, queue the durable write.
	pub(super) fn mutate<F>(&self, op: &'static str, transition: F) -> Result<(), EngineError>
	where
		F: FnOnce(&GameState, &Roster) -> Result<Option<StatePatch>, EngineError>,
	{
		let roster = self.roster();
		let mut guard = lock_mutex(&self.inner.state);
		let Some(current) = guard.as_ref() else {
			logging::engine::not_loaded(&self.inner.event_id, op);
			return Ok(());
		};

		// always written, even when the local copy already matches: that copy
		// may hold a rejected write or miss another client's commit
		let patch = match transition(current, &roster) {
			Ok(Some(patch)) => patch,
			Ok(None) => return Ok(()),
			Err(err) => {
				logging::engine::rejected(&self.inner.event_id, op, &err);
				return Err(err);
			}
		};

		let mut next = current.clone();
		patch.apply_to(&mut next);
		let state_id = next.id;
		logging::engine::applied(&self.inner.event_id, op, patch.changes().len());

		*guard = Some(next.clone());
		self.inner.snapshots.send_replace(Some(next));
		self.inner.enqueue(WriteRequest::Fields { state_id, patch, op });
		Ok(())
	}

	pub(super) fn is_live(&self, generation: u64) -> bool {
		self.inner.generation.load(Ordering::SeqCst) == generation && self.is_loaded()
	}

	pub fn event_id(&self) -> &EventId {
		&self.inner.event_id
	}

	pub fn config(&self) -> &EngineConfig {
		&self.inner.config
	}

	pub fn state(&self) -> Option<GameState> {
		lock_mutex(&self.inner.state).clone()
	}

	pub fn is_loaded(&self) -> bool {
		lock_mutex(&self.inner.state).is_some()
	}

	pub fn roster(&self) -> Roster {
		lock_mutex(&self.inner.roster).clone()
	}

	/// Swaps in the latest roster snapshot. Cursors are clamped on their next use.
	pub fn set_roster(&self, roster: Roster) {
		*lock_mutex(&self.inner.roster) = roster;
	}

	pub async fn refresh_roster(&self, provider: &dyn RosterProvider) -> Result<(), StoreError> {
		let roster = provider.list_roster(&self.inner.event_id).await?;
		self.set_roster(roster);
		Ok(())
	}

	/// Read-only feed of the local view, optimistic updates included.
	pub fn snapshots(&self) -> watch::Receiver<Option<GameState>> {
		self.inner.snapshots.subscribe()
	}

	pub fn status(&self) -> watch::Receiver<SyncStatus> {
		self.inner.status.subscribe()
	}

	pub fn current_status(&self) -> SyncStatus {
		*self.inner.status.borrow()
	}

	pub fn stats(&self) -> SyncStats {
		lock_mutex(&self.inner.stats).clone()
	}
}

async fn run_inbound(
	inner: Arc<Inner>,
	generation: u64,
	mut updates: mpsc::UnboundedReceiver<GameState>,
) {
	while let Some(snapshot) = updates.recv().await {
		if inner.generation.load(Ordering::SeqCst) != generation {
			return;
		}
		inner.apply_snapshot(generation, snapshot);
	}

	if inner.generation.load(Ordering::SeqCst) == generation {
		inner.set_status(SyncStatus::Error);
		logging::sync::feed_lost(&inner.event_id);
	}
}

async fn run_writer(inner: Arc<Inner>, mut queue: mpsc::UnboundedReceiver<WriteRequest>) {
	while let Some(request) = queue.recv().await {
		match request {
			WriteRequest::Fields { state_id, patch, op } => {
				if let Err(err) = inner.store.update_fields(state_id, &patch).await {
					logging::sync::write_failed(&inner.event_id, op, &err);
					if matches!(err, StoreError::Unreachable(_)) {
						inner.set_status(SyncStatus::Error);
					}
				}
			}
			WriteRequest::Barrier(done) => {
				let _ = done.send(());
			}
		}
	}
}
