mod ops;
mod randomizer;
mod session;

pub use ops::{lock_patch, move_patch, reset_patch, scene_patch};
pub use randomizer::{RandomSelection, RandomizerConfig};
pub use session::{Engine, EngineConfig, SyncStats, SyncStatus};
