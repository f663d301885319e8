pub mod client;
pub mod protocol;
pub mod server;

pub use client::RemoteStore;
pub use protocol::{ClientMessage, ServerMessage};
pub use server::StoreServer;
