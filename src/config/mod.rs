use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::navigation::{PRESENTATION_COLUMNS, SELECT_COLUMNS};

pub const APP_DIR: &str = "fighter-control";

fn config_paths(filename: &str) -> Vec<PathBuf> {
	let mut paths = Vec::new();

	if let Some(user_config) = dirs::config_dir() {
		paths.push(user_config.join(APP_DIR).join(filename));
	}

	paths.push(PathBuf::from("config").join(filename));

	paths
}

fn find_config(filename: &str) -> Option<PathBuf> {
	config_paths(filename).into_iter().find(|p| p.exists())
}

pub fn resolve_config(filename: &str) -> Result<PathBuf, ConfigError> {
	find_config(filename).ok_or_else(|| {
		let searched: Vec<_> = config_paths(filename)
			.iter()
			.map(|p| p.display().to_string())
			.collect();
		ConfigError::NotFound {
			filename: filename.to_string(),
			searched: searched.join(", "),
		}
	})
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
	#[serde(default)]
	pub store: StoreSettings,
	#[serde(default)]
	pub grid: GridSettings,
	#[serde(default)]
	pub randomizer: RandomizerSettings,
	#[serde(default)]
	pub event: EventSettings,
	#[serde(default)]
	pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
	#[serde(default = "default_addr")]
	pub addr: String,
	#[serde(default = "default_request_timeout")]
	pub request_timeout_ms: u64,
}

fn default_addr() -> String { "127.0.0.1:7878".to_string() }
fn default_request_timeout() -> u64 { 3000 }

impl Default for StoreSettings {
	fn default() -> Self {
		Self {
			addr: default_addr(),
			request_timeout_ms: default_request_timeout(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct GridSettings {
	#[serde(default = "default_select_columns")]
	pub select_columns: usize,
	#[serde(default = "default_presentation_columns")]
	pub presentation_columns: usize,
}

fn default_select_columns() -> usize { SELECT_COLUMNS }
fn default_presentation_columns() -> usize { PRESENTATION_COLUMNS }

impl Default for GridSettings {
	fn default() -> Self {
		Self {
			select_columns: default_select_columns(),
			presentation_columns: default_presentation_columns(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct RandomizerSettings {
	#[serde(default = "default_duration")]
	pub duration_ms: u64,
	#[serde(default = "default_tick")]
	pub tick_ms: u64,
	#[serde(default)]
	pub seed: Option<u64>,
}

fn default_duration() -> u64 { 2000 }
fn default_tick() -> u64 { 100 }

impl Default for RandomizerSettings {
	fn default() -> Self {
		Self {
			duration_ms: default_duration(),
			tick_ms: default_tick(),
			seed: None,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventSettings {
	#[serde(default)]
	pub allow_duplicates: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
	#[serde(default = "default_filter")]
	pub filter: String,
	#[serde(default)]
	pub directory: Option<PathBuf>,
}

fn default_filter() -> String { "info".to_string() }

impl Default for LoggingSettings {
	fn default() -> Self {
		Self {
			filter: default_filter(),
			directory: None,
		}
	}
}

pub fn parse_settings(content: &str) -> Result<Settings, toml::de::Error> {
	toml::from_str(content)
}

pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
	let path = path.as_ref();
	let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
		path: path.to_path_buf(),
		source,
	})?;

	parse_settings(&content).map_err(|source| ConfigError::Parse {
		path: path.to_path_buf(),
		source,
	})
}

pub fn load_settings_auto() -> Result<Settings, ConfigError> {
	let path = resolve_config("settings.toml")?;
	load_settings(&path)
}

pub fn load_rosters_auto() -> Result<crate::roster::RosterBook, ConfigError> {
	let path = resolve_config("roster.toml")?;
	crate::roster::load_rosters(&path)
}
