mod patch;
mod types;

pub use patch::{FieldChange, StatePatch};
pub use types::{
	Direction, EventId, GameState, Player, PlayerSlot, Presentation, RenderKey, RosterId, Scene,
	StateDefaults, StateId,
};
