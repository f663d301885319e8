use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::{Player, RosterId, StateId};

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum StoreError {
	#[error("store unreachable: {0}")]
	Unreachable(String),

	#[error("no state record {0}")]
	NotFound(StateId),

	#[error("store rejected the write: {0}")]
	Rejected(String),

	#[error("protocol error: {0}")]
	Protocol(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
	#[error("connection error: {0}")]
	Connection(#[source] StoreError),

	#[error("{player} cannot lock {roster_id}: the other player already locked it")]
	DuplicateSelection { player: Player, roster_id: RosterId },

	#[error("random selection already running for {0}")]
	RandomizeInProgress(Player),
}

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("config file '{filename}' not found. Searched: {searched}")]
	NotFound { filename: String, searched: String },

	#[error("failed to read {}: {source}", .path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse {}: {source}", .path.display())]
	Parse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},
}
