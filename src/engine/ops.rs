use crate::error::EngineError;
use crate::logging;
use crate::navigation::{clamp_index, navigate};
use crate::state::{Direction, GameState, Player, RosterId, Scene, StatePatch};

use super::session::{Engine, EngineConfig};

/// Switching scene away from the victory screen also clears the winner.
pub fn scene_patch(state: &GameState, scene: Scene) -> StatePatch {
	let patch = StatePatch::new().scene(scene);
	if scene != Scene::Winner && state.winner_id.is_some() {
		patch.winner(None)
	} else {
		patch
	}
}

/// Cursor movement for `player`. In the presentation scene both players
/// drive the shared presentation cursor on its narrower grid.
pub fn move_patch(
	state: &GameState,
	roster_len: usize,
	player: Player,
	direction: Direction,
	config: &EngineConfig,
) -> Option<StatePatch> {
	if roster_len == 0 {
		return None;
	}

	if state.current_scene == Scene::Presentation {
		let index = navigate(
			state.presentation.cursor_index,
			roster_len,
			config.presentation_columns,
			direction,
		);
		Some(StatePatch::new().presentation_cursor(index))
	} else {
		let index = navigate(
			state.slot(player).cursor_index,
			roster_len,
			config.select_columns,
			direction,
		);
		Some(StatePatch::new().cursor(player, index))
	}
}

/// Locks `roster_id` for `player`, or releases the player's pick entirely.
pub fn lock_patch(
	state: &GameState,
	player: Player,
	roster_id: &RosterId,
	locked: bool,
) -> Result<StatePatch, EngineError> {
	if !locked {
		return Ok(StatePatch::new().selected(player, None).locked(player, false));
	}

	if !state.allow_duplicates && state.slot(player.other()).is_locked_on(roster_id) {
		return Err(EngineError::DuplicateSelection {
			player,
			roster_id: roster_id.clone(),
		});
	}

	Ok(StatePatch::new()
		.selected(player, Some(roster_id.clone()))
		.locked(player, true))
}

/// Everything back to zero except the scene and the duplicates rule.
pub fn reset_patch() -> StatePatch {
	let mut patch = StatePatch::new();
	for player in Player::ALL {
		patch = patch.selected(player, None).locked(player, false).cursor(player, 0);
	}
	patch
		.winner(None)
		.presentation_focus(None)
		.presentation_cursor(0)
}

impl Engine {
	pub fn set_scene(&self, scene: Scene) -> Result<(), EngineError> {
		self.mutate("set_scene", |state, _| Ok(Some(scene_patch(state, scene))))
	}

	pub fn move_cursor(&self, player: Player, direction: Direction) -> Result<(), EngineError> {
		let config = self.config();
		self.mutate("move_cursor", |state, roster| {
			Ok(move_patch(state, roster.len(), player, direction, config))
		})
	}

	/// Marks `roster_id` as the player's current pick without locking it.
	/// A locked player is released, so the pick never bypasses the duplicate rule.
	pub fn select(&self, player: Player, roster_id: RosterId) -> Result<(), EngineError> {
		self.mutate("select", |state, roster| {
			if roster.is_empty() {
				return Ok(None);
			}
			let mut patch = StatePatch::new().selected(player, Some(roster_id));
			if state.slot(player).locked {
				patch = patch.locked(player, false);
			}
			Ok(Some(patch))
		})
	}

	/// Locks or unlocks a pick. Locking the fighter the other player already
	/// holds fails with `DuplicateSelection` unless duplicates are allowed.
	pub fn lock(&self, player: Player, roster_id: RosterId, locked: bool) -> Result<(), EngineError> {
		self.mutate("lock", |state, roster| {
			if locked && roster.is_empty() {
				return Ok(None);
			}
			lock_patch(state, player, &roster_id, locked).map(Some)
		})
	}

	pub fn unlock(&self, player: Player) -> Result<(), EngineError> {
		self.mutate("unlock", |_, _| {
			Ok(Some(StatePatch::new().selected(player, None).locked(player, false)))
		})
	}

	pub fn set_presentation_focus(&self, roster_id: Option<RosterId>) -> Result<(), EngineError> {
		self.mutate("set_presentation_focus", |_, _| {
			Ok(Some(StatePatch::new().presentation_focus(roster_id)))
		})
	}

	pub fn set_presentation_cursor(&self, index: usize) -> Result<(), EngineError> {
		self.mutate("set_presentation_cursor", |_, roster| {
			if roster.is_empty() {
				return Ok(None);
			}
			Ok(Some(
				StatePatch::new().presentation_cursor(clamp_index(index, roster.len())),
			))
		})
	}

	pub fn set_cursors(&self, p1: usize, p2: usize) -> Result<(), EngineError> {
		self.mutate("set_cursors", |_, roster| {
			if roster.is_empty() {
				return Ok(None);
			}
			Ok(Some(
				StatePatch::new()
					.cursor(Player::P1, clamp_index(p1, roster.len()))
					.cursor(Player::P2, clamp_index(p2, roster.len())),
			))
		})
	}

	pub fn toggle_duplicates(&self, enabled: bool) -> Result<(), EngineError> {
		self.mutate("toggle_duplicates", |_, _| {
			Ok(Some(StatePatch::new().allow_duplicates(enabled)))
		})
	}

	/// Records the match winner. The id is not checked against the current
	/// picks; an unexpected winner is logged and stored as given.
	pub fn set_winner(&self, roster_id: Option<RosterId>) -> Result<(), EngineError> {
		let event_id = self.event_id().clone();
		self.mutate("set_winner", |state, _| {
			if let Some(winner) = &roster_id {
				if !state.is_selected(winner) {
					logging::engine::unchecked_winner(&event_id, winner);
				}
			}
			Ok(Some(StatePatch::new().winner(roster_id)))
		})
	}

	pub fn reset(&self) -> Result<(), EngineError> {
		self.mutate("reset", |_, _| Ok(Some(reset_patch())))
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::*;
	use crate::engine::test_support::{cup, open, roster};
	use crate::state::{EventId, StateDefaults, StateId};
	use crate::store::MemoryStore;

	fn blank() -> GameState {
		GameState::new(StateId(1), EventId::new("cup"), StateDefaults::default())
	}

	fn rid(id: &str) -> RosterId {
		RosterId::new(id)
	}

	#[test]
	fn test_scene_patch_clears_winner_when_leaving_victory() {
		let mut state = blank();
		state.current_scene = Scene::Winner;
		state.winner_id = Some(rid("ryu"));

		let mut next = state.clone();
		scene_patch(&state, Scene::Select).apply_to(&mut next);
		assert_eq!(next.current_scene, Scene::Select);
		assert!(next.winner_id.is_none());

		let mut stay = state.clone();
		scene_patch(&state, Scene::Winner).apply_to(&mut stay);
		assert_eq!(stay.winner_id, Some(rid("ryu")));
	}

	#[test]
	fn test_move_patch_uses_scene_grid() {
		let config = EngineConfig::default();
		let mut state = blank();
		state.current_scene = Scene::Select;

		let patch = move_patch(&state, 12, Player::P2, Direction::Down, &config).unwrap();
		let mut next = state.clone();
		patch.apply_to(&mut next);
		assert_eq!(next.player2.cursor_index, 10);
		assert_eq!(next.presentation.cursor_index, 0);

		state.current_scene = Scene::Presentation;
		let patch = move_patch(&state, 12, Player::P2, Direction::Down, &config).unwrap();
		let mut next = state.clone();
		patch.apply_to(&mut next);
		assert_eq!(next.presentation.cursor_index, 5);
		assert_eq!(next.player2.cursor_index, 0);

		assert!(move_patch(&state, 0, Player::P1, Direction::Right, &config).is_none());
	}

	#[test]
	fn test_lock_patch_duplicate_rule() {
		let mut state = blank();
		state.player1.selected_id = Some(rid("ken"));
		state.player1.locked = true;

		let err = lock_patch(&state, Player::P2, &rid("ken"), true).unwrap_err();
		assert_eq!(
			err,
			EngineError::DuplicateSelection {
				player: Player::P2,
				roster_id: rid("ken")
			}
		);

		state.allow_duplicates = true;
		assert!(lock_patch(&state, Player::P2, &rid("ken"), true).is_ok());

		// a selected but unlocked pick does not block the other player
		state.allow_duplicates = false;
		state.player1.locked = false;
		assert!(lock_patch(&state, Player::P2, &rid("ken"), true).is_ok());
	}

	#[test]
	fn test_reset_patch_keeps_scene_and_duplicates() {
		let mut state = blank();
		state.current_scene = Scene::Combat;
		state.allow_duplicates = true;
		state.player1 = crate::state::PlayerSlot {
			selected_id: Some(rid("ryu")),
			locked: true,
			cursor_index: 4,
		};
		state.player2.cursor_index = 7;
		state.winner_id = Some(rid("ryu"));
		state.presentation.focused_character_id = Some(rid("ryu"));
		state.presentation.cursor_index = 3;

		reset_patch().apply_to(&mut state);
		assert_eq!(state.current_scene, Scene::Combat);
		assert!(state.allow_duplicates);
		assert_eq!(state.player1, Default::default());
		assert_eq!(state.player2, Default::default());
		assert!(state.winner_id.is_none());
		assert_eq!(state.presentation, Default::default());
	}

	#[tokio::test]
	async fn test_operations_before_open_do_nothing() {
		let store = Arc::new(MemoryStore::new());
		let engine = crate::engine::Engine::new(
			cup(),
			store.clone(),
			roster(4),
			EngineConfig::default(),
			tokio::runtime::Handle::current(),
		);

		engine.set_scene(Scene::Combat).unwrap();
		engine.lock(Player::P1, rid("f00"), true).unwrap();
		engine.reset().unwrap();
		assert!(engine.state().is_none());
		assert!(store.record(&cup()).is_none());
	}

	#[tokio::test]
	async fn test_rejected_lock_leaves_state_untouched() {
		let store = Arc::new(MemoryStore::new());
		let engine = open(&store, roster(4)).await;
		engine.lock(Player::P1, rid("f01"), true).unwrap();
		let before = engine.state().unwrap();

		let err = engine.lock(Player::P2, rid("f01"), true).unwrap_err();
		assert!(matches!(err, EngineError::DuplicateSelection { player: Player::P2, .. }));
		assert_eq!(engine.state().unwrap(), before);

		engine.toggle_duplicates(true).unwrap();
		engine.lock(Player::P2, rid("f01"), true).unwrap();
		let state = engine.state().unwrap();
		assert!(state.player1.is_locked_on(&rid("f01")));
		assert!(state.player2.is_locked_on(&rid("f01")));
	}

	#[tokio::test]
	async fn test_select_releases_a_held_lock() {
		let store = Arc::new(MemoryStore::new());
		let engine = open(&store, roster(4)).await;
		engine.lock(Player::P1, rid("f01"), true).unwrap();
		engine.lock(Player::P2, rid("f02"), true).unwrap();

		engine.select(Player::P2, rid("f01")).unwrap();
		let state = engine.state().unwrap();
		assert!(state.player1.is_locked_on(&rid("f01")));
		assert_eq!(state.player2.selected_id, Some(rid("f01")));
		assert!(!state.player2.locked);

		engine.select(Player::P2, rid("f03")).unwrap();
		assert!(!engine.state().unwrap().player2.locked);

		engine.flush().await;
		let record = store.record(&cup()).unwrap();
		assert!(!(record.player2.locked && record.player1.selected_id == record.player2.selected_id));
		assert_eq!(record.player2.selected_id, Some(rid("f03")));
	}

	#[tokio::test]
	async fn test_unlock_is_idempotent() {
		let store = Arc::new(MemoryStore::new());
		let engine = open(&store, roster(4)).await;
		engine.lock(Player::P1, rid("f02"), true).unwrap();
		engine.flush().await;

		engine.unlock(Player::P1).unwrap();
		engine.unlock(Player::P1).unwrap();
		assert!(!engine.state().unwrap().player1.locked);
		engine.flush().await;

		let state = store.record(&cup()).unwrap();
		assert!(!state.player1.locked);
		assert!(state.player1.selected_id.is_none());
		assert_eq!(state.player2, Default::default());
	}

	#[tokio::test]
	async fn test_empty_roster_ignores_selection_ops() {
		let store = Arc::new(MemoryStore::new());
		let engine = open(&store, roster(0)).await;
		let before = engine.state().unwrap();

		engine.move_cursor(Player::P1, Direction::Right).unwrap();
		engine.select(Player::P1, rid("ghost")).unwrap();
		engine.lock(Player::P1, rid("ghost"), true).unwrap();
		engine.set_presentation_cursor(3).unwrap();
		engine.set_cursors(2, 2).unwrap();
		assert_eq!(engine.state().unwrap(), before);

		engine.set_scene(Scene::Select).unwrap();
		assert_eq!(engine.state().unwrap().current_scene, Scene::Select);
	}

	#[tokio::test]
	async fn test_cursors_are_clamped_to_roster() {
		let store = Arc::new(MemoryStore::new());
		let engine = open(&store, roster(12)).await;

		engine.set_cursors(3, 40).unwrap();
		engine.set_presentation_cursor(99).unwrap();
		let state = engine.state().unwrap();
		assert_eq!(state.player1.cursor_index, 3);
		assert_eq!(state.player2.cursor_index, 11);
		assert_eq!(state.presentation.cursor_index, 11);
	}

	#[tokio::test]
	async fn test_presentation_moves_share_one_cursor() {
		let store = Arc::new(MemoryStore::new());
		let engine = open(&store, roster(12)).await;
		engine.set_scene(Scene::Presentation).unwrap();

		engine.move_cursor(Player::P1, Direction::Down).unwrap();
		engine.move_cursor(Player::P2, Direction::Right).unwrap();
		let state = engine.state().unwrap();
		assert_eq!(state.presentation.cursor_index, 6);
		assert_eq!(state.player1.cursor_index, 0);
		assert_eq!(state.player2.cursor_index, 0);
	}

	#[tokio::test]
	async fn test_winner_is_stored_even_when_not_picked() {
		let store = Arc::new(MemoryStore::new());
		let engine = open(&store, roster(4)).await;
		engine.set_scene(Scene::Winner).unwrap();
		engine.set_winner(Some(rid("f03"))).unwrap();
		assert_eq!(engine.state().unwrap().winner_id, Some(rid("f03")));

		engine.set_scene(Scene::Combat).unwrap();
		assert!(engine.state().unwrap().winner_id.is_none());
	}

	#[tokio::test]
	async fn test_local_update_precedes_store_commit() {
		let store = Arc::new(MemoryStore::new());
		let engine = open(&store, roster(12)).await;

		for _ in 0..7 {
			engine.move_cursor(Player::P1, Direction::Right).unwrap();
		}
		engine.move_cursor(Player::P1, Direction::Down).unwrap();
		assert_eq!(engine.state().unwrap().player1.cursor_index, 7);

		engine.flush().await;
		assert_eq!(store.record(&cup()).unwrap().player1.cursor_index, 7);
	}

	#[tokio::test]
	async fn test_reset_returns_everything_but_scene() {
		let store = Arc::new(MemoryStore::new());
		let engine = open(&store, roster(12)).await;
		engine.set_scene(Scene::Winner).unwrap();
		engine.toggle_duplicates(true).unwrap();
		engine.lock(Player::P1, rid("f04"), true).unwrap();
		engine.set_cursors(4, 9).unwrap();
		engine.set_winner(Some(rid("f04"))).unwrap();
		engine.set_presentation_focus(Some(rid("f04"))).unwrap();

		engine.reset().unwrap();
		engine.flush().await;

		let state = store.record(&cup()).unwrap();
		assert_eq!(state.current_scene, Scene::Winner);
		assert!(state.allow_duplicates);
		assert_eq!(state.player1, Default::default());
		assert_eq!(state.player2, Default::default());
		assert!(state.winner_id.is_none());
		assert_eq!(state.presentation, Default::default());
	}
}
