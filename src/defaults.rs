use include_dir::{include_dir, Dir};
use std::fs;
use std::path::Path;

use crate::config::{self, Settings, APP_DIR};
use crate::roster::RosterBook;

static CONFIG_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/config");

/// Copies the shipped config files into the user config dir, leaving
/// existing files alone.
pub fn ensure_config() {
	let Some(user_config) = dirs::config_dir() else {
		return;
	};
	let dest = user_config.join(APP_DIR);

	extract_dir(&CONFIG_DIR, &dest);
}

fn extract_dir(dir: &Dir, dest: &Path) {
	for file in dir.files() {
		let file_dest = dest.join(file.path());
		if !file_dest.exists() {
			if let Some(parent) = file_dest.parent() {
				let _ = fs::create_dir_all(parent);
			}
			let _ = fs::write(&file_dest, file.contents());
		}
	}

	for subdir in dir.dirs() {
		extract_dir(subdir, dest);
	}
}

fn embedded_text(name: &str) -> Option<&'static str> {
	CONFIG_DIR.get_file(name).and_then(|f| f.contents_utf8())
}

pub fn embedded_settings() -> Settings {
	embedded_text("settings.toml")
		.and_then(|text| config::parse_settings(text).ok())
		.unwrap_or_default()
}

pub fn embedded_rosters() -> RosterBook {
	embedded_text("roster.toml")
		.and_then(|text| RosterBook::parse(text).ok())
		.unwrap_or_default()
}

/// Settings from the user's files, falling back to the shipped ones.
pub fn settings_or_embedded() -> Settings {
	config::load_settings_auto().unwrap_or_else(|_| embedded_settings())
}
