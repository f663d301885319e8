use crossterm::event::KeyCode;

use crate::engine::{Engine, RandomSelection};
use crate::error::EngineError;
use crate::input::{map_key, Intent, IntentKind, KeyAction, OperatorCommand};
use crate::logging;
use crate::navigation::clamp_index;
use crate::state::{Player, Scene};

/// What the operator panel should show after a key.
#[derive(Debug)]
pub enum Outcome {
	Ignored,
	/// Changed state, nothing worth announcing.
	Applied,
	Info(String),
	Success(String),
	Randomizing(RandomSelection),
	Quit,
}

/// Turns control-panel keys into engine operations.
pub struct Controller {
	engine: Engine,
	controls_enabled: bool,
	/// Random select starts off and is armed by the operator.
	random_enabled: bool,
}

impl Controller {
	pub fn new(engine: Engine) -> Self {
		Self {
			engine,
			controls_enabled: true,
			random_enabled: false,
		}
	}

	pub fn engine(&self) -> &Engine {
		&self.engine
	}

	pub fn controls_enabled(&self) -> bool {
		self.controls_enabled
	}

	pub fn random_enabled(&self) -> bool {
		self.random_enabled
	}

	pub fn handle_key(&mut self, key: KeyCode) -> Result<Outcome, EngineError> {
		logging::input::key(&format!("{:?}", key));
		match map_key(key) {
			Some(KeyAction::Fighter(intent)) => self.handle_intent(intent),
			Some(KeyAction::Operator(command)) => self.handle_command(command),
			None => Ok(Outcome::Ignored),
		}
	}

	pub fn handle_intent(&mut self, intent: Intent) -> Result<Outcome, EngineError> {
		if !self.controls_enabled {
			logging::input::ignored("controls disabled");
			return Ok(Outcome::Ignored);
		}
		let Some(state) = self.engine.state() else {
			logging::input::ignored("state not loaded");
			return Ok(Outcome::Ignored);
		};
		if !state.current_scene.accepts_fighter_input() {
			logging::input::ignored("scene takes no fighter input");
			return Ok(Outcome::Ignored);
		}

		let player = intent.player;
		let roster = self.engine.roster();
		match (state.current_scene, intent.kind) {
			(Scene::Presentation, IntentKind::Move(direction)) => {
				self.engine.move_cursor(player, direction)?;
				Ok(Outcome::Applied)
			}
			(Scene::Presentation, IntentKind::Select) => {
				if roster.is_empty() {
					return Ok(Outcome::Ignored);
				}
				let index = clamp_index(state.presentation.cursor_index, roster.len());
				let entry = &roster.entries()[index];
				self.engine.set_presentation_focus(Some(entry.id.clone()))?;
				Ok(Outcome::Info(format!("Biographic focus: {}", entry.name)))
			}
			(_, IntentKind::Move(direction)) => {
				if state.slot(player).locked {
					logging::input::ignored("player is locked");
					return Ok(Outcome::Ignored);
				}
				self.engine.move_cursor(player, direction)?;
				Ok(Outcome::Applied)
			}
			(_, IntentKind::Select) => {
				if state.slot(player).locked {
					self.engine.unlock(player)?;
					return Ok(Outcome::Info(format!("{} unlocked", player)));
				}
				if roster.is_empty() {
					return Ok(Outcome::Ignored);
				}
				let index = clamp_index(state.slot(player).cursor_index, roster.len());
				let entry = &roster.entries()[index];
				self.engine.lock(player, entry.id.clone(), true)?;
				Ok(Outcome::Success(format!("{} locked {}", player, entry.name)))
			}
		}
	}

	pub fn handle_command(&mut self, command: OperatorCommand) -> Result<Outcome, EngineError> {
		match command {
			OperatorCommand::SetScene(scene) => {
				self.engine.set_scene(scene)?;
				Ok(Outcome::Info(format!("Scene: {}", scene.label())))
			}
			OperatorCommand::Reset => {
				self.engine.reset()?;
				Ok(Outcome::Info("Selections cleared".to_string()))
			}
			OperatorCommand::ResetCursors => {
				self.engine.set_cursors(0, 0)?;
				Ok(Outcome::Applied)
			}
			OperatorCommand::ToggleDuplicates => {
				let enabled = !self.engine.state().is_some_and(|s| s.allow_duplicates);
				self.engine.toggle_duplicates(enabled)?;
				let word = if enabled { "allowed" } else { "blocked" };
				Ok(Outcome::Info(format!("Duplicate picks {}", word)))
			}
			OperatorCommand::ToggleControls => {
				self.controls_enabled = !self.controls_enabled;
				let word = if self.controls_enabled { "enabled" } else { "disabled" };
				Ok(Outcome::Info(format!("Fighter controls {}", word)))
			}
			OperatorCommand::ToggleRandom => {
				self.random_enabled = !self.random_enabled;
				let word = if self.random_enabled { "enabled" } else { "disabled" };
				Ok(Outcome::Info(format!("Random select {}", word)))
			}
			OperatorCommand::Randomize(player) => {
				if !self.random_enabled {
					logging::input::ignored("random select disabled");
					return Ok(Outcome::Info("Random select is off (r to enable)".to_string()));
				}
				match self.engine.random_select(player)? {
					Some(selection) => Ok(Outcome::Randomizing(selection)),
					None => Ok(Outcome::Ignored),
				}
			}
			OperatorCommand::WinnerFrom(player) => self.winner_from(player),
			OperatorCommand::ClearWinner => {
				self.engine.set_winner(None)?;
				Ok(Outcome::Applied)
			}
			OperatorCommand::Quit => Ok(Outcome::Quit),
		}
	}

	fn winner_from(&self, player: Player) -> Result<Outcome, EngineError> {
		let Some(picked) = self.engine.state().and_then(|s| s.slot(player).selected_id.clone()) else {
			return Ok(Outcome::Info(format!("{} has no fighter selected", player)));
		};
		let name = self.engine.roster().name_of(&picked);
		self.engine.set_winner(Some(picked))?;
		Ok(Outcome::Success(format!("Winner: {}", name)))
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::*;
	use crate::engine::test_support::{open, roster};
	use crate::state::{Direction, RosterId};
	use crate::store::MemoryStore;

	async fn controller(len: usize) -> Controller {
		let store = Arc::new(MemoryStore::new());
		Controller::new(open(&store, roster(len)).await)
	}

	fn key(c: char) -> KeyCode {
		KeyCode::Char(c)
	}

	#[tokio::test]
	async fn test_fighter_keys_need_an_input_scene() {
		let mut panel = controller(12).await;
		assert!(matches!(panel.handle_key(key('d')).unwrap(), Outcome::Ignored));
		assert_eq!(panel.engine().state().unwrap().player1.cursor_index, 0);

		panel.handle_key(key('2')).unwrap();
		assert!(matches!(panel.handle_key(key('d')).unwrap(), Outcome::Applied));
		assert_eq!(panel.engine().state().unwrap().player1.cursor_index, 1);
	}

	#[tokio::test]
	async fn test_select_toggles_lock_at_cursor() {
		let mut panel = controller(12).await;
		panel.handle_key(key('2')).unwrap();
		panel.handle_key(key('s')).unwrap();

		let outcome = panel.handle_key(key('e')).unwrap();
		assert!(matches!(outcome, Outcome::Success(ref msg) if msg == "P1 locked Fighter 10"));
		let state = panel.engine().state().unwrap();
		assert!(state.player1.is_locked_on(&RosterId::new("f10")));

		// locked players cannot move
		assert!(matches!(panel.handle_key(KeyCode::Right).unwrap(), Outcome::Ignored));
		assert_eq!(panel.engine().state().unwrap().player1.cursor_index, 10);

		let outcome = panel.handle_key(KeyCode::Enter).unwrap();
		assert!(matches!(outcome, Outcome::Info(_)));
		let state = panel.engine().state().unwrap();
		assert!(!state.player1.locked);
		assert!(state.player1.selected_id.is_none());
	}

	#[tokio::test]
	async fn test_duplicate_lock_surfaces_error() {
		let mut panel = controller(12).await;
		panel.handle_key(key('2')).unwrap();
		panel.handle_key(key('e')).unwrap();

		let err = panel.handle_key(key('o')).unwrap_err();
		assert!(matches!(err, EngineError::DuplicateSelection { player: Player::P2, .. }));
		assert!(!panel.engine().state().unwrap().player2.locked);

		panel.handle_key(key('x')).unwrap();
		panel.handle_key(key('o')).unwrap();
		assert!(panel.engine().state().unwrap().player2.locked);
	}

	#[tokio::test]
	async fn test_presentation_select_focuses_entry() {
		let mut panel = controller(12).await;
		panel.handle_key(key('6')).unwrap();
		panel.handle_key(key('k')).unwrap();
		panel.handle_key(key('l')).unwrap();

		let outcome = panel.handle_key(key('o')).unwrap();
		assert!(matches!(outcome, Outcome::Info(ref msg) if msg == "Biographic focus: Fighter 06"));
		let state = panel.engine().state().unwrap();
		assert_eq!(state.presentation.focused_character_id, Some(RosterId::new("f06")));
		assert_eq!(state.presentation_subject(), Some(&RosterId::new("f06")));
	}

	#[tokio::test]
	async fn test_disabled_controls_ignore_fighters_only() {
		let mut panel = controller(12).await;
		panel.handle_key(key('2')).unwrap();
		panel.handle_key(key('c')).unwrap();
		assert!(!panel.controls_enabled());

		assert!(matches!(panel.handle_key(key('d')).unwrap(), Outcome::Ignored));
		panel.handle_key(key('4')).unwrap();
		assert_eq!(panel.engine().state().unwrap().current_scene, Scene::Combat);

		panel.handle_key(key('c')).unwrap();
		panel.handle_key(key('2')).unwrap();
		assert!(matches!(
			panel.handle_intent(Intent { player: Player::P2, kind: IntentKind::Move(Direction::Left) }).unwrap(),
			Outcome::Applied
		));
		assert_eq!(panel.engine().state().unwrap().player2.cursor_index, 9);
	}

	#[tokio::test]
	async fn test_winner_from_player_pick() {
		let mut panel = controller(12).await;
		let outcome = panel.handle_key(key('.')).unwrap();
		assert!(matches!(outcome, Outcome::Info(_)));
		assert!(panel.engine().state().unwrap().winner_id.is_none());

		panel.handle_key(key('2')).unwrap();
		panel.handle_key(key('l')).unwrap();
		panel.handle_key(key('o')).unwrap();
		panel.handle_key(key('5')).unwrap();
		let outcome = panel.handle_key(key('.')).unwrap();
		assert!(matches!(outcome, Outcome::Success(ref msg) if msg == "Winner: Fighter 01"));
		assert_eq!(panel.engine().state().unwrap().winner_id, Some(RosterId::new("f01")));

		panel.handle_key(key('/')).unwrap();
		assert!(panel.engine().state().unwrap().winner_id.is_none());
	}

	#[tokio::test]
	async fn test_randomize_needs_arming() {
		let mut panel = controller(12).await;
		assert!(!panel.random_enabled());
		assert!(matches!(panel.handle_key(key('[')).unwrap(), Outcome::Info(_)));
		assert!(!panel.engine().is_randomizing(Player::P1));

		panel.handle_key(key('r')).unwrap();
		assert!(panel.random_enabled());
		panel.handle_key(key('r')).unwrap();
		assert!(matches!(panel.handle_key(key(']')).unwrap(), Outcome::Info(_)));
		assert!(!panel.engine().is_randomizing(Player::P2));
	}

	#[tokio::test]
	async fn test_randomize_and_quit() {
		let mut panel = controller(12).await;
		panel.handle_key(key('r')).unwrap();
		match panel.handle_key(key('[')).unwrap() {
			Outcome::Randomizing(selection) => {
				assert_eq!(selection.player(), Player::P1);
				assert!(matches!(
					panel.handle_key(key('[')),
					Err(EngineError::RandomizeInProgress(Player::P1))
				));
				assert!(selection.finished().await.is_some());
			}
			other => panic!("expected a random selection, got {:?}", other),
		}

		assert!(matches!(panel.handle_key(KeyCode::Esc).unwrap(), Outcome::Quit));
	}

	#[tokio::test]
	async fn test_reset_cursors_and_reset() {
		let mut panel = controller(12).await;
		panel.handle_key(key('2')).unwrap();
		panel.handle_key(key('s')).unwrap();
		panel.handle_key(key('k')).unwrap();
		panel.handle_key(key('0')).unwrap();
		let state = panel.engine().state().unwrap();
		assert_eq!((state.player1.cursor_index, state.player2.cursor_index), (0, 0));

		panel.handle_key(key('e')).unwrap();
		panel.handle_key(key('z')).unwrap();
		let state = panel.engine().state().unwrap();
		assert!(!state.player1.locked);
		assert_eq!(state.current_scene, Scene::Select);
	}
}
