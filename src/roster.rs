use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, StoreError};
use crate::state::{EventId, RosterId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
	pub id: RosterId,
	pub name: String,
	#[serde(default)]
	pub icon_image: String,
	#[serde(default)]
	pub combat_image: String,
	#[serde(default)]
	pub victory_image: String,
	#[serde(default)]
	pub description: Option<String>,
}

impl RosterEntry {
	pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			id: RosterId::new(id),
			name: name.into(),
			icon_image: String::new(),
			combat_image: String::new(),
			victory_image: String::new(),
			description: None,
		}
	}
}

/// Ordered, read-only list of an event's fighters. Order is grid order.
#[derive(Debug, Clone, Default)]
pub struct Roster {
	entries: Arc<Vec<RosterEntry>>,
}

impl Roster {
	/// Builds a roster sorted by display name.
	pub fn new(mut entries: Vec<RosterEntry>) -> Self {
		entries.sort_by(|a, b| a.name.cmp(&b.name));
		Self {
			entries: Arc::new(entries),
		}
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn entries(&self) -> &[RosterEntry] {
		&self.entries
	}

	pub fn get(&self, index: usize) -> Option<&RosterEntry> {
		self.entries.get(index)
	}

	pub fn find(&self, id: &RosterId) -> Option<&RosterEntry> {
		self.entries.iter().find(|e| &e.id == id)
	}

	pub fn index_of(&self, id: &RosterId) -> Option<usize> {
		self.entries.iter().position(|e| &e.id == id)
	}

	pub fn name_of(&self, id: &RosterId) -> String {
		self.find(id)
			.map(|e| e.name.clone())
			.unwrap_or_else(|| id.0.clone())
	}
}

#[async_trait]
pub trait RosterProvider: Send + Sync {
	async fn list_roster(&self, event_id: &EventId) -> Result<Roster, StoreError>;
}

#[derive(Debug, Clone, Deserialize)]
struct RosterFile {
	#[serde(default)]
	events: Vec<EventRoster>,
}

#[derive(Debug, Clone, Deserialize)]
struct EventRoster {
	id: EventId,
	#[serde(default)]
	characters: Vec<RosterEntry>,
}

/// Rosters for every known event, as loaded from `roster.toml`.
#[derive(Debug, Clone, Default)]
pub struct RosterBook {
	events: HashMap<EventId, Roster>,
}

impl RosterBook {
	pub fn insert(&mut self, event_id: EventId, roster: Roster) {
		self.events.insert(event_id, roster);
	}

	/// An unknown event has an empty roster.
	pub fn roster(&self, event_id: &EventId) -> Roster {
		self.events.get(event_id).cloned().unwrap_or_default()
	}

	pub fn event_ids(&self) -> Vec<EventId> {
		let mut ids: Vec<EventId> = self.events.keys().cloned().collect();
		ids.sort_by(|a, b| a.0.cmp(&b.0));
		ids
	}

	pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
		let file: RosterFile = toml::from_str(content)?;
		let events = file
			.events
			.into_iter()
			.map(|event| (event.id, Roster::new(event.characters)))
			.collect();
		Ok(Self { events })
	}
}

#[async_trait]
impl RosterProvider for RosterBook {
	async fn list_roster(&self, event_id: &EventId) -> Result<Roster, StoreError> {
		Ok(self.roster(event_id))
	}
}

pub fn load_rosters<P: AsRef<Path>>(path: P) -> Result<RosterBook, ConfigError> {
	let path = path.as_ref();
	let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
		path: path.to_path_buf(),
		source,
	})?;
	RosterBook::parse(&content).map_err(|source| ConfigError::Parse {
		path: path.to_path_buf(),
		source,
	})
}
