use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::error::EngineError;
use crate::lock_mutex;
use crate::logging;
use crate::state::{Player, RosterId, StatePatch};

use super::ops::lock_patch;
use super::session::{Engine, Inner};

#[derive(Debug, Clone)]
pub struct RandomizerConfig {
	pub duration: Duration,
	pub tick: Duration,
	/// Fixed seed for reproducible sequences; `None` seeds from the OS.
	pub seed: Option<u64>,
}

impl Default for RandomizerConfig {
	fn default() -> Self {
		Self {
			duration: Duration::from_millis(2000),
			tick: Duration::from_millis(100),
			seed: None,
		}
	}
}

impl RandomizerConfig {
	fn tick_period(&self) -> Duration {
		self.tick.max(Duration::from_millis(1))
	}

	/// Number of spins before the final pick.
	pub fn ticks(&self) -> u32 {
		let tick = self.tick_period().as_millis();
		let ticks = (self.duration.as_millis() / tick).max(1);
		u32::try_from(ticks).unwrap_or(u32::MAX)
	}

	fn rng_for(&self, player: Player) -> StdRng {
		match self.seed {
			Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(player.index() as u64)),
			None => StdRng::from_os_rng(),
		}
	}
}

/// Handle to a running random selection.
#[derive(Debug)]
pub struct RandomSelection {
	player: Player,
	task: JoinHandle<Option<RosterId>>,
}

impl RandomSelection {
	pub fn player(&self) -> Player {
		self.player
	}

	pub fn is_finished(&self) -> bool {
		self.task.is_finished()
	}

	/// Stops the spin where it is. The last spin stays selected but unlocked.
	pub fn cancel(&self) {
		self.task.abort();
	}

	/// Waits for the sequence to end. Yields the locked pick, or `None` when
	/// the sequence was cancelled or the state went away.
	pub async fn finished(self) -> Option<RosterId> {
		self.task.await.ok().flatten()
	}
}

/// Marks a player as randomizing for as long as it lives.
struct InFlight {
	inner: Arc<Inner>,
	player: Player,
}

impl InFlight {
	fn claim(inner: &Arc<Inner>, player: Player) -> Option<Self> {
		if lock_mutex(&inner.randomizing).insert(player) {
			Some(Self {
				inner: Arc::clone(inner),
				player,
			})
		} else {
			None
		}
	}
}

impl Drop for InFlight {
	fn drop(&mut self) {
		lock_mutex(&self.inner.randomizing).remove(&self.player);
	}
}

impl Engine {
	/// Starts a timed random pick for `player`: a run of visible spins over
	/// the roster followed by a lock on an eligible fighter.
	///
	/// Returns `Ok(None)` when there is nothing to pick from, and
	/// `RandomizeInProgress` while the same player is already spinning.
	pub fn random_select(&self, player: Player) -> Result<Option<RandomSelection>, EngineError> {
		if !self.is_loaded() || self.roster().is_empty() {
			logging::engine::not_loaded(self.event_id(), "random_select");
			return Ok(None);
		}

		let Some(claim) = InFlight::claim(&self.inner, player) else {
			let err = EngineError::RandomizeInProgress(player);
			logging::engine::rejected(self.event_id(), "random_select", &err);
			return Err(err);
		};

		let generation = self.inner.generation.load(Ordering::SeqCst);
		let engine = self.clone();
		let config = self.config().randomizer.clone();
		let task = self.inner.runtime.spawn(async move {
			let _claim = claim;
			run_sequence(engine, player, generation, config).await
		});

		Ok(Some(RandomSelection { player, task }))
	}

	pub fn is_randomizing(&self, player: Player) -> bool {
		lock_mutex(&self.inner.randomizing).contains(&player)
	}

	fn spin(&self, player: Player, rng: &mut StdRng) -> Result<(), EngineError> {
		self.mutate("random_spin", |state, roster| {
			if roster.is_empty() {
				return Ok(None);
			}
			let index = rng.random_range(0..roster.len());
			let mut patch = StatePatch::new()
				.cursor(player, index)
				.selected(player, Some(roster.entries()[index].id.clone()));
			if state.slot(player).locked {
				patch = patch.locked(player, false);
			}
			Ok(Some(patch))
		})
	}

	/// Picks among fighters the other player has not locked (all of them when
	/// duplicates are allowed) and locks the pick in one step.
	fn lock_random(&self, player: Player, rng: &mut StdRng) -> Result<Option<RosterId>, EngineError> {
		let mut pick = None;
		self.mutate("random_lock", |state, roster| {
			let other = state.slot(player.other());
			let eligible: Vec<usize> = roster
				.entries()
				.iter()
				.enumerate()
				.filter(|(_, entry)| state.allow_duplicates || !other.is_locked_on(&entry.id))
				.map(|(index, _)| index)
				.collect();
			if eligible.is_empty() {
				// only the other player's locked fighter is left
				return match &other.selected_id {
					Some(taken) => lock_patch(state, player, taken, true).map(Some),
					None => Ok(None),
				};
			}

			let index = eligible[rng.random_range(0..eligible.len())];
			let roster_id = roster.entries()[index].id.clone();
			let patch = lock_patch(state, player, &roster_id, true)?.cursor(player, index);
			pick = Some(roster_id);
			Ok(Some(patch))
		})?;
		Ok(pick)
	}
}

async fn run_sequence(
	engine: Engine,
	player: Player,
	generation: u64,
	config: RandomizerConfig,
) -> Option<RosterId> {
	let event_id = engine.event_id().clone();
	let mut rng = config.rng_for(player);
	let ticks = config.ticks();
	logging::engine::randomize_started(&event_id, player, ticks);

	let mut interval = time::interval(config.tick_period());
	interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
	interval.tick().await;

	for _ in 0..ticks {
		interval.tick().await;
		if !engine.is_live(generation) {
			logging::engine::randomize_cancelled(&event_id, player);
			return None;
		}
		if let Err(err) = engine.spin(player, &mut rng) {
			logging::engine::randomize_failed(&event_id, player, &err);
			return None;
		}
	}

	if !engine.is_live(generation) {
		logging::engine::randomize_cancelled(&event_id, player);
		return None;
	}

	match engine.lock_random(player, &mut rng) {
		Ok(Some(pick)) => {
			logging::engine::randomize_finished(&event_id, player, &pick);
			Some(pick)
		}
		Ok(None) => {
			logging::engine::randomize_cancelled(&event_id, player);
			None
		}
		Err(err) => {
			logging::engine::randomize_failed(&event_id, player, &err);
			None
		}
	}
}
