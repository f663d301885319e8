use serde::{Deserialize, Serialize};

use crate::state::{GameState, Player, RosterId, Scene};

/// One field of the state record being overwritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum FieldChange {
	Scene {
		scene: Scene,
	},
	Selected {
		player: Player,
		roster_id: Option<RosterId>,
	},
	Locked {
		player: Player,
		locked: bool,
	},
	Cursor {
		player: Player,
		index: usize,
	},
	AllowDuplicates {
		enabled: bool,
	},
	Winner {
		roster_id: Option<RosterId>,
	},
	PresentationFocus {
		roster_id: Option<RosterId>,
	},
	PresentationCursor {
		index: usize,
	},
}

impl FieldChange {
	pub fn apply_to(&self, state: &mut GameState) {
		match self {
			FieldChange::Scene { scene } => state.current_scene = *scene,
			FieldChange::Selected { player, roster_id } => {
				state.slot_mut(*player).selected_id = roster_id.clone();
			}
			FieldChange::Locked { player, locked } => state.slot_mut(*player).locked = *locked,
			FieldChange::Cursor { player, index } => state.slot_mut(*player).cursor_index = *index,
			FieldChange::AllowDuplicates { enabled } => state.allow_duplicates = *enabled,
			FieldChange::Winner { roster_id } => state.winner_id = roster_id.clone(),
			FieldChange::PresentationFocus { roster_id } => {
				state.presentation.focused_character_id = roster_id.clone();
			}
			FieldChange::PresentationCursor { index } => state.presentation.cursor_index = *index,
		}
	}
}

/// A partial-field update, applied in order. The store commits a patch atomically.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatePatch(Vec<FieldChange>);

impl StatePatch {
	pub fn new() -> Self {
		Self(Vec::new())
	}

	pub fn changes(&self) -> &[FieldChange] {
		&self.0
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn push(&mut self, change: FieldChange) {
		self.0.push(change);
	}

	pub fn scene(mut self, scene: Scene) -> Self {
		self.push(FieldChange::Scene { scene });
		self
	}

	pub fn selected(mut self, player: Player, roster_id: Option<RosterId>) -> Self {
		self.push(FieldChange::Selected { player, roster_id });
		self
	}

	pub fn locked(mut self, player: Player, locked: bool) -> Self {
		self.push(FieldChange::Locked { player, locked });
		self
	}

	pub fn cursor(mut self, player: Player, index: usize) -> Self {
		self.push(FieldChange::Cursor { player, index });
		self
	}

	pub fn allow_duplicates(mut self, enabled: bool) -> Self {
		self.push(FieldChange::AllowDuplicates { enabled });
		self
	}

	pub fn winner(mut self, roster_id: Option<RosterId>) -> Self {
		self.push(FieldChange::Winner { roster_id });
		self
	}

	pub fn presentation_focus(mut self, roster_id: Option<RosterId>) -> Self {
		self.push(FieldChange::PresentationFocus { roster_id });
		self
	}

	pub fn presentation_cursor(mut self, index: usize) -> Self {
		self.push(FieldChange::PresentationCursor { index });
		self
	}

	pub fn apply_to(&self, state: &mut GameState) {
		for change in &self.0 {
			change.apply_to(state);
		}
	}
}
