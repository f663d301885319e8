use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::runtime::Handle;

use fighter_control::defaults;
use fighter_control::engine::{Engine, EngineConfig, SyncStatus};
use fighter_control::logging;
use fighter_control::net::RemoteStore;
use fighter_control::roster::{Roster, RosterProvider};
use fighter_control::state::{EventId, GameState, RenderKey, RosterId};

#[derive(Parser)]
#[command(name = "fighter-visor")]
#[command(about = "Follow an event and print every scene or pick change")]
struct Cli {
	/// Event to follow
	#[arg(short, long, default_value = "demo", env = "FIGHTER_EVENT")]
	event: String,

	/// Store server address, overriding settings.toml
	#[arg(short, long, env = "FIGHTER_STORE_ADDR")]
	store: Option<String>,
}

fn describe(state: &GameState, roster: &Roster) -> String {
	let pick = |id: Option<&RosterId>| {
		id.map(|id| roster.name_of(id)).unwrap_or_else(|| "?".to_string())
	};
	let mut line = format!(
		"{:<16} {} vs {}",
		state.current_scene.label(),
		pick(state.player1.selected_id.as_ref()),
		pick(state.player2.selected_id.as_ref()),
	);
	if let Some(winner) = &state.winner_id {
		line.push_str(&format!(" | winner {}", roster.name_of(winner)));
	}
	if let Some(subject) = state.presentation_subject() {
		line.push_str(&format!(" | presenting {}", roster.name_of(subject)));
	}
	line
}

#[tokio::main]
async fn main() {
	defaults::ensure_config();
	let cli = Cli::parse();
	let settings = defaults::settings_or_embedded();
	logging::init(&settings.logging, "fighter-visor");

	let addr = cli.store.unwrap_or_else(|| settings.store.addr.clone());
	let timeout = Duration::from_millis(settings.store.request_timeout_ms);
	let remote = match RemoteStore::connect(&addr, timeout).await {
		Ok(remote) => Arc::new(remote),
		Err(e) => {
			eprintln!("Cannot reach store at {}: {}", addr, e);
			std::process::exit(1);
		}
	};

	let event_id = EventId::new(cli.event);
	let roster = remote.list_roster(&event_id).await.unwrap_or_default();
	let engine = Engine::new(
		event_id,
		remote.clone(),
		roster,
		EngineConfig::from(&settings),
		Handle::current(),
	);
	if let Err(e) = engine.open().await {
		eprintln!("{}", e);
		std::process::exit(1);
	}

	let mut snapshots = engine.snapshots();
	let mut status = engine.status();
	let mut last_key: Option<RenderKey> = None;
	let mut last_winner = None;

	loop {
		let current = snapshots.borrow_and_update().clone();
		if let Some(state) = current {
			let key = state.render_key();
			if last_key.as_ref() != Some(&key) || last_winner != state.winner_id {
				println!("[{}] {}", key, describe(&state, &engine.roster()));
				last_key = Some(key);
				last_winner = state.winner_id.clone();
			}
		}

		tokio::select! {
			changed = snapshots.changed() => {
				if changed.is_err() {
					break;
				}
			}
			changed = status.changed() => {
				if changed.is_err() {
					break;
				}
				match *status.borrow_and_update() {
					SyncStatus::Error if !remote.is_connected() => {
						eprintln!("store connection lost");
						break;
					}
					SyncStatus::Error => eprintln!("store unreachable; showing last known state"),
					SyncStatus::Connected => eprintln!("store connection live"),
					SyncStatus::Connecting => {}
				}
			}
		}
	}
}
