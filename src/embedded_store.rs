use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::net::StoreServer;
use crate::roster::RosterBook;
use crate::store::MemoryStore;

/// A store server on an ephemeral localhost port, for single-machine setups
/// and tests. Dropping it disconnects every client.
pub struct EmbeddedStore {
	addr: SocketAddr,
	store: Arc<MemoryStore>,
	handle: JoinHandle<()>,
}

impl EmbeddedStore {
	pub async fn start(rosters: RosterBook) -> io::Result<Self> {
		let listener = TcpListener::bind("127.0.0.1:0").await?;
		let addr = listener.local_addr()?;

		let store = Arc::new(MemoryStore::new());
		let server = Arc::new(StoreServer::new(Arc::clone(&store), rosters));
		let handle = tokio::spawn(server.run_with_listener(listener));

		Ok(Self {
			addr,
			store,
			handle,
		})
	}

	pub fn port(&self) -> u16 {
		self.addr.port()
	}

	pub fn addr(&self) -> String {
		self.addr.to_string()
	}

	/// The backing store, for inspecting or faulting it directly.
	pub fn store(&self) -> &Arc<MemoryStore> {
		&self.store
	}

	pub fn shutdown(&self) {
		self.handle.abort();
	}
}

impl Drop for EmbeddedStore {
	fn drop(&mut self) {
		self.handle.abort();
	}
}
