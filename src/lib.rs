#![allow(clippy::collapsible_if)]

use std::sync::{Mutex, MutexGuard};

pub mod config;
pub mod control;
pub mod defaults;
pub mod embedded_store;
pub mod engine;
pub mod error;
pub mod input;
pub mod logging;
pub mod navigation;
pub mod net;
pub mod roster;
pub mod state;
pub mod store;

/// Locks `m`, carrying on with the data if a previous holder panicked.
pub(crate) fn lock_mutex<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
	m.lock().unwrap_or_else(|e| e.into_inner())
}
