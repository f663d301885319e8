use std::fs::{self, OpenOptions};
use std::sync::Mutex;

use chrono::Local;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;

/// Installs the global subscriber. `RUST_LOG` wins over the configured filter.
///
/// With a log directory configured, lines go to `<dir>/<app>-YYYY-MM-DD.log`,
/// otherwise to stderr. Calling this twice is harmless.
pub fn init(settings: &LoggingSettings, app: &str) {
	let filter = EnvFilter::try_from_default_env()
		.or_else(|_| EnvFilter::try_new(&settings.filter))
		.unwrap_or_else(|_| EnvFilter::new("info"));

	let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

	if let Some(dir) = &settings.directory {
		let _ = fs::create_dir_all(dir);
		let path = dir.join(format!("{}-{}.log", app, Local::now().format("%Y-%m-%d")));
		match OpenOptions::new().create(true).append(true).open(&path) {
			Ok(file) => {
				let _ = builder.with_ansi(false).with_writer(Mutex::new(file)).try_init();
				return;
			}
			Err(e) => eprintln!("Cannot open log file {}: {}", path.display(), e),
		}
	}

	let _ = builder.with_writer(std::io::stderr).try_init();
}

pub mod sync {
	use tracing::{debug, info, warn};

	use crate::error::StoreError;
	use crate::state::{EventId, StateId};
	use crate::store::SubscriptionId;

	pub fn opening(event: &EventId) {
		debug!(%event, "opening state subscription");
	}

	pub fn opened(event: &EventId, state_id: StateId, created: bool) {
		info!(%event, %state_id, created, "state subscription live");
	}

	pub fn open_failed(event: &EventId, err: &StoreError) {
		warn!(%event, error = %err, "cannot open state subscription");
	}

	pub fn snapshot(event: &EventId, updates: u64) {
		debug!(%event, updates, "snapshot applied");
	}

	pub fn feed_lost(event: &EventId) {
		warn!(%event, "change feed ended; keeping last known state");
	}

	pub fn write_failed(event: &EventId, op: &str, err: &StoreError) {
		warn!(%event, op, error = %err, "durable write failed; waiting for next broadcast");
	}

	pub fn closed(event: &EventId, subscription: SubscriptionId) {
		info!(%event, %subscription, "state subscription closed");
	}

	pub fn unsubscribe_failed(event: &EventId, err: &StoreError) {
		warn!(%event, error = %err, "unsubscribe failed");
	}
}

pub mod engine {
	use tracing::{debug, info, warn};

	use crate::error::EngineError;
	use crate::state::{EventId, Player, RosterId};

	pub fn not_loaded(event: &EventId, op: &str) {
		debug!(%event, op, "ignored: state not loaded");
	}

	pub fn applied(event: &EventId, op: &str, changes: usize) {
		debug!(%event, op, changes, "optimistic update");
	}

	pub fn rejected(event: &EventId, op: &str, err: &EngineError) {
		info!(%event, op, error = %err, "mutation rejected");
	}

	pub fn unchecked_winner(event: &EventId, winner: &RosterId) {
		warn!(%event, %winner, "winner is not one of the selected fighters");
	}

	pub fn randomize_started(event: &EventId, player: Player, ticks: u32) {
		debug!(%event, %player, ticks, "random selection started");
	}

	pub fn randomize_finished(event: &EventId, player: Player, pick: &RosterId) {
		info!(%event, %player, %pick, "random selection locked");
	}

	pub fn randomize_cancelled(event: &EventId, player: Player) {
		info!(%event, %player, "random selection stopped: state unavailable");
	}

	pub fn randomize_failed(event: &EventId, player: Player, err: &EngineError) {
		warn!(%event, %player, error = %err, "random selection could not lock");
	}
}

pub mod store {
	use tracing::{debug, info, warn};

	use crate::state::{EventId, StateId};
	use crate::store::SubscriptionId;

	pub fn created(event: &EventId, state_id: StateId) {
		info!(%event, %state_id, "state record created");
	}

	pub fn committed(event: &EventId, state_id: StateId, changes: usize) {
		debug!(%event, %state_id, changes, "fields committed");
	}

	pub fn subscribed(event: &EventId, subscription: SubscriptionId) {
		debug!(%event, %subscription, "subscriber added");
	}

	pub fn unsubscribed(subscription: SubscriptionId) {
		debug!(%subscription, "subscriber removed");
	}

	pub fn listening(addr: &str) {
		info!(addr, "state store listening");
	}

	pub fn client_connected(conn: u64, peer: &str) {
		info!(conn, peer, "client connected");
	}

	pub fn client_disconnected(conn: u64) {
		info!(conn, "client disconnected");
	}

	pub fn bad_frame(conn: u64, err: &std::io::Error) {
		warn!(conn, error = %err, "dropping client after bad frame");
	}

	pub fn accept_failed(err: &std::io::Error) {
		warn!(error = %err, "accept failed");
	}
}

pub mod input {
	use tracing::debug;

	pub fn key(key: &str) {
		debug!(key, "key");
	}

	pub fn ignored(reason: &str) {
		debug!(reason, "intent ignored");
	}
}
