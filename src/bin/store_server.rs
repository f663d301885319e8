use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use fighter_control::config;
use fighter_control::defaults;
use fighter_control::logging;
use fighter_control::net::StoreServer;
use fighter_control::store::MemoryStore;

#[derive(Parser)]
#[command(name = "fighter-store")]
#[command(about = "Serve game state and rosters to control panels and visors")]
struct Cli {
	/// Address to listen on, overriding settings.toml
	#[arg(short, long, env = "FIGHTER_STORE_ADDR")]
	addr: Option<String>,

	/// Settings file to use instead of the usual search path
	#[arg(short, long)]
	config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
	defaults::ensure_config();
	let cli = Cli::parse();

	let settings = match &cli.config {
		Some(path) => match config::load_settings(path) {
			Ok(settings) => settings,
			Err(e) => {
				eprintln!("{}", e);
				std::process::exit(1);
			}
		},
		None => defaults::settings_or_embedded(),
	};
	logging::init(&settings.logging, "fighter-store");

	let rosters = config::load_rosters_auto().unwrap_or_else(|e| {
		eprintln!("{}; serving the built-in demo roster", e);
		defaults::embedded_rosters()
	});

	let addr = cli.addr.unwrap_or_else(|| settings.store.addr.clone());
	let server = Arc::new(StoreServer::new(Arc::new(MemoryStore::new()), rosters));

	if let Err(e) = server.run(&addr).await {
		eprintln!("Server error: {}", e);
		std::process::exit(1);
	}
}
