use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}
}

impl fmt::Display for EventId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateId(pub u64);

impl fmt::Display for StateId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RosterId(pub String);

impl RosterId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}
}

impl fmt::Display for RosterId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scene {
	#[default]
	Intro,
	Select,
	Versus,
	Combat,
	Winner,
	Presentation,
}

impl Scene {
	pub const ALL: [Scene; 6] = [
		Scene::Intro,
		Scene::Select,
		Scene::Versus,
		Scene::Combat,
		Scene::Winner,
		Scene::Presentation,
	];

	/// Scenes in which the two fighters' keyboards drive cursors.
	pub fn accepts_fighter_input(self) -> bool {
		matches!(self, Scene::Select | Scene::Presentation)
	}

	pub fn label(self) -> &'static str {
		match self {
			Scene::Intro => "Intro Sequence",
			Scene::Select => "Character Select",
			Scene::Versus => "Versus Screen",
			Scene::Combat => "Live Combat",
			Scene::Winner => "Victory Screen",
			Scene::Presentation => "Biography",
		}
	}
}

impl fmt::Display for Scene {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Scene::Intro => "INTRO",
			Scene::Select => "SELECT",
			Scene::Versus => "VERSUS",
			Scene::Combat => "COMBAT",
			Scene::Winner => "WINNER",
			Scene::Presentation => "PRESENTATION",
		};
		f.write_str(name)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Player {
	P1,
	P2,
}

impl Player {
	pub const ALL: [Player; 2] = [Player::P1, Player::P2];

	pub fn other(self) -> Player {
		match self {
			Player::P1 => Player::P2,
			Player::P2 => Player::P1,
		}
	}

	pub fn index(self) -> usize {
		match self {
			Player::P1 => 0,
			Player::P2 => 1,
		}
	}
}

impl fmt::Display for Player {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Player::P1 => f.write_str("P1"),
			Player::P2 => f.write_str("P2"),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
	Up,
	Down,
	Left,
	Right,
}

impl Direction {
	pub const ALL: [Direction; 4] = [Direction::Up, Direction::Down, Direction::Left, Direction::Right];
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerSlot {
	pub selected_id: Option<RosterId>,
	pub locked: bool,
	pub cursor_index: usize,
}

impl PlayerSlot {
	pub fn is_locked_on(&self, roster_id: &RosterId) -> bool {
		self.locked && self.selected_id.as_ref() == Some(roster_id)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Presentation {
	pub focused_character_id: Option<RosterId>,
	pub cursor_index: usize,
}

/// Values a store uses when it has to create an event's record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StateDefaults {
	pub scene: Scene,
	pub allow_duplicates: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
	pub id: StateId,
	pub event_id: EventId,
	pub current_scene: Scene,
	pub player1: PlayerSlot,
	pub player2: PlayerSlot,
	pub allow_duplicates: bool,
	pub winner_id: Option<RosterId>,
	pub presentation: Presentation,
}

impl GameState {
	pub fn new(id: StateId, event_id: EventId, defaults: StateDefaults) -> Self {
		Self {
			id,
			event_id,
			current_scene: defaults.scene,
			player1: PlayerSlot::default(),
			player2: PlayerSlot::default(),
			allow_duplicates: defaults.allow_duplicates,
			winner_id: None,
			presentation: Presentation::default(),
		}
	}

	pub fn slot(&self, player: Player) -> &PlayerSlot {
		match player {
			Player::P1 => &self.player1,
			Player::P2 => &self.player2,
		}
	}

	pub fn slot_mut(&mut self, player: Player) -> &mut PlayerSlot {
		match player {
			Player::P1 => &mut self.player1,
			Player::P2 => &mut self.player2,
		}
	}

	pub fn is_selected(&self, roster_id: &RosterId) -> bool {
		Player::ALL
			.iter()
			.any(|&p| self.slot(p).selected_id.as_ref() == Some(roster_id))
	}

	/// The character the presentation scene shows: the focused one, else a fighter's pick.
	pub fn presentation_subject(&self) -> Option<&RosterId> {
		self.presentation
			.focused_character_id
			.as_ref()
			.or(self.player1.selected_id.as_ref())
			.or(self.player2.selected_id.as_ref())
	}

	pub fn render_key(&self) -> RenderKey {
		RenderKey {
			scene: self.current_scene,
			p1: self.player1.selected_id.clone(),
			p2: self.player2.selected_id.clone(),
		}
	}
}

/// What a display keys its scene transitions on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderKey {
	pub scene: Scene,
	pub p1: Option<RosterId>,
	pub p2: Option<RosterId>,
}

impl fmt::Display for RenderKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let p1 = self.p1.as_ref().map(|id| id.0.as_str()).unwrap_or("-");
		let p2 = self.p2.as_ref().map(|id| id.0.as_str()).unwrap_or("-");
		write!(f, "{}:{}:{}", self.scene, p1, p2)
	}
}
