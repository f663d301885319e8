use std::error::Error;
use std::io::{self, stdout, Write};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use crossterm::{
	cursor::MoveTo,
	event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
	execute,
	terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType},
};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use fighter_control::config::{self, Settings};
use fighter_control::control::{Controller, Outcome};
use fighter_control::defaults;
use fighter_control::embedded_store::EmbeddedStore;
use fighter_control::engine::{Engine, EngineConfig};
use fighter_control::input::help_text;
use fighter_control::logging;
use fighter_control::net::RemoteStore;
use fighter_control::roster::RosterProvider;
use fighter_control::state::{EventId, Player};

#[derive(Parser)]
#[command(name = "fighter-control")]
#[command(about = "Operator panel for a fighter event")]
struct Cli {
	/// Event to control
	#[arg(short, long, default_value = "demo", env = "FIGHTER_EVENT")]
	event: String,

	/// Store server address, overriding settings.toml
	#[arg(short, long, env = "FIGHTER_STORE_ADDR")]
	store: Option<String>,

	/// Run an in-process store instead of connecting to one
	#[arg(long)]
	embedded: bool,
}

#[tokio::main]
async fn main() {
	defaults::ensure_config();
	let cli = Cli::parse();
	let settings = defaults::settings_or_embedded();
	logging::init(&settings.logging, "fighter-control");

	if let Err(e) = run(cli, settings).await {
		eprintln!("Error: {}", e);
		std::process::exit(1);
	}
}

async fn run(cli: Cli, settings: Settings) -> Result<(), Box<dyn Error>> {
	let timeout = Duration::from_millis(settings.store.request_timeout_ms);

	let embedded = if cli.embedded {
		let rosters = config::load_rosters_auto().unwrap_or_else(|_| defaults::embedded_rosters());
		Some(EmbeddedStore::start(rosters).await?)
	} else {
		None
	};
	let addr = match &embedded {
		Some(store) => store.addr(),
		None => cli.store.unwrap_or_else(|| settings.store.addr.clone()),
	};

	let remote = Arc::new(RemoteStore::connect(&addr, timeout).await?);
	let event_id = EventId::new(cli.event);
	let roster = remote.list_roster(&event_id).await?;
	let engine = Engine::new(
		event_id,
		remote.clone(),
		roster,
		EngineConfig::from(&settings),
		Handle::current(),
	);
	engine.open().await?;

	enable_raw_mode()?;
	let result = panel_loop(Controller::new(engine.clone())).await;
	disable_raw_mode()?;

	engine.flush().await;
	engine.close().await;
	result
}

async fn panel_loop(mut controller: Controller) -> Result<(), Box<dyn Error>> {
	let (keys_tx, mut keys) = mpsc::unbounded_channel();
	std::thread::spawn(move || read_keys(keys_tx));

	let mut snapshots = controller.engine().snapshots();
	let mut status = controller.engine().status();
	let mut message = String::new();
	let mut out = stdout();
	render(&mut out, &controller, &message)?;

	loop {
		tokio::select! {
			Some(key) = keys.recv() => match controller.handle_key(key) {
				Ok(Outcome::Quit) => return Ok(()),
				Ok(Outcome::Info(msg)) | Ok(Outcome::Success(msg)) => message = msg,
				Ok(Outcome::Randomizing(selection)) => {
					message = format!("Randomizing {}...", selection.player());
				}
				Ok(Outcome::Applied) | Ok(Outcome::Ignored) => {}
				Err(e) => message = format!("Error: {}", e),
			},
			Ok(()) = snapshots.changed() => {}
			Ok(()) = status.changed() => {}
			else => return Ok(()),
		}
		render(&mut out, &controller, &message)?;
	}
}

fn read_keys(keys: mpsc::UnboundedSender<KeyCode>) {
	loop {
		match event::read() {
			Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
				let code = if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
					KeyCode::Esc
				} else {
					key.code
				};
				if keys.send(code).is_err() {
					return;
				}
			}
			Ok(_) => {}
			Err(_) => return,
		}
	}
}

fn render(out: &mut impl Write, controller: &Controller, message: &str) -> io::Result<()> {
	let engine = controller.engine();
	execute!(out, Clear(ClearType::All), MoveTo(0, 0))?;

	let Some(state) = engine.state() else {
		write!(out, "Waiting for state ({:?})\r\n", engine.current_status())?;
		return out.flush();
	};
	let roster = engine.roster();

	write!(
		out,
		"{} | {:?} | {} | duplicates {} | controls {} | random {}\r\n\r\n",
		engine.event_id(),
		engine.current_status(),
		state.current_scene.label(),
		if state.allow_duplicates { "on" } else { "off" },
		if controller.controls_enabled() { "on" } else { "off" },
		if controller.random_enabled() { "on" } else { "off" },
	)?;

	for player in Player::ALL {
		let slot = state.slot(player);
		let cursor = roster.get(slot.cursor_index).map(|e| e.name.as_str()).unwrap_or("-");
		let pick = slot
			.selected_id
			.as_ref()
			.map(|id| roster.name_of(id))
			.unwrap_or_else(|| "-".to_string());
		let lock = if slot.locked { " [LOCKED]" } else { "" };
		write!(out, "{}  cursor {:<16} pick {}{}\r\n", player, cursor, pick, lock)?;
	}

	let winner = state
		.winner_id
		.as_ref()
		.map(|id| roster.name_of(id))
		.unwrap_or_else(|| "-".to_string());
	write!(out, "\r\nWinner: {}\r\n", winner)?;
	if let Some(subject) = state.presentation_subject() {
		write!(out, "Presenting: {}\r\n", roster.name_of(subject))?;
	}

	write!(out, "\r\n{}\r\n\r\n{}\r\n", message, help_text())?;
	out.flush()
}
