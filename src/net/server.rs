use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinSet};

use crate::logging;
use crate::net::protocol::*;
use crate::roster::{RosterBook, RosterProvider};
use crate::state::GameState;
use crate::store::{MemoryStore, StateStore, SubscriptionId};

type ConnectionId = u64;

struct Connection {
	id: ConnectionId,
	outbox: mpsc::UnboundedSender<ServerMessage>,
	/// Writer and forwarders. Dropping the set aborts them all.
	tasks: JoinSet<()>,
	forwarders: HashMap<SubscriptionId, AbortHandle>,
}

impl Connection {
	fn send(&self, msg: ServerMessage) {
		let _ = self.outbox.send(msg);
	}

	async fn close(&mut self, store: &MemoryStore) {
		for (subscription, forwarder) in self.forwarders.drain() {
			forwarder.abort();
			let _ = store.unsubscribe(subscription).await;
		}
	}
}

/// Serves a [`MemoryStore`] and a roster book to remote engines over TCP.
pub struct StoreServer {
	store: Arc<MemoryStore>,
	rosters: RosterBook,
	next_conn_id: AtomicU64,
}

impl StoreServer {
	pub fn new(store: Arc<MemoryStore>, rosters: RosterBook) -> Self {
		Self {
			store,
			rosters,
			next_conn_id: AtomicU64::new(1),
		}
	}

	pub fn store(&self) -> &Arc<MemoryStore> {
		&self.store
	}

	pub async fn run(self: Arc<Self>, addr: &str) -> io::Result<()> {
		let listener = TcpListener::bind(addr).await?;
		logging::store::listening(&listener.local_addr()?.to_string());
		self.run_with_listener(listener).await;
		Ok(())
	}

	/// Accept loop. Connection tasks belong to this future, so dropping or
	/// aborting it disconnects every client.
	pub async fn run_with_listener(self: Arc<Self>, listener: TcpListener) {
		let mut connections = JoinSet::new();

		loop {
			tokio::select! {
				accepted = listener.accept() => match accepted {
					Ok((stream, peer)) => {
						let conn_id = self.next_conn_id.fetch_add(1, Ordering::SeqCst);
						let server = Arc::clone(&self);
						connections.spawn(async move {
							server.handle_connection(conn_id, stream, peer.to_string()).await;
						});
					}
					Err(e) => logging::store::accept_failed(&e),
				},
				Some(_) = connections.join_next(), if !connections.is_empty() => {}
			}
		}
	}

	async fn handle_connection(&self, conn_id: ConnectionId, stream: TcpStream, peer: String) {
		logging::store::client_connected(conn_id, &peer);
		let _ = stream.set_nodelay(true);
		let (mut reader, mut writer) = stream.into_split();

		let (outbox, mut outgoing) = mpsc::unbounded_channel::<ServerMessage>();
		let mut tasks = JoinSet::new();
		tasks.spawn(async move {
			while let Some(msg) = outgoing.recv().await {
				if write_frame(&mut writer, &msg).await.is_err() {
					break;
				}
			}
		});

		let mut connection = Connection {
			id: conn_id,
			outbox,
			tasks,
			forwarders: HashMap::new(),
		};

		loop {
			match read_frame::<_, ClientMessage>(&mut reader).await {
				Ok(Some(msg)) => self.handle_message(&mut connection, msg).await,
				Ok(None) => break,
				Err(e) => {
					logging::store::bad_frame(connection.id, &e);
					break;
				}
			}
		}

		connection.close(&self.store).await;
		let Connection { outbox, mut tasks, .. } = connection;
		drop(outbox);
		while tasks.join_next().await.is_some() {}
		logging::store::client_disconnected(conn_id);
	}

	async fn handle_message(&self, connection: &mut Connection, msg: ClientMessage) {
		let reply = match msg {
			ClientMessage::ReadState { request, event_id } => {
				match self.store.read_state(&event_id).await {
					Ok(state) => ServerMessage::StateRead { request, state },
					Err(error) => ServerMessage::Error { request, error },
				}
			}
			ClientMessage::CreateState { request, event_id, defaults } => {
				match self.store.create_state(&event_id, defaults).await {
					Ok(state) => ServerMessage::StateCreated { request, state },
					Err(error) => ServerMessage::Error { request, error },
				}
			}
			ClientMessage::UpdateFields { request, state_id, patch } => {
				match self.store.update_fields(state_id, &patch).await {
					Ok(()) => ServerMessage::FieldsUpdated { request },
					Err(error) => ServerMessage::Error { request, error },
				}
			}
			ClientMessage::Subscribe { request, event_id } => {
				match self.store.subscribe(&event_id).await {
					Ok(subscription) => {
						// reply first so the client knows the id before any push
						connection.send(ServerMessage::Subscribed {
							request,
							subscription: subscription.id,
						});
						let forwarder = connection.tasks.spawn(forward(
							subscription.id,
							subscription.updates,
							connection.outbox.clone(),
						));
						connection.forwarders.insert(subscription.id, forwarder);
						return;
					}
					Err(error) => ServerMessage::Error { request, error },
				}
			}
			ClientMessage::Unsubscribe { request, subscription } => {
				if let Some(forwarder) = connection.forwarders.remove(&subscription) {
					forwarder.abort();
					let _ = self.store.unsubscribe(subscription).await;
				}
				ServerMessage::Unsubscribed { request }
			}
			ClientMessage::ListRoster { request, event_id } => {
				match self.rosters.list_roster(&event_id).await {
					Ok(roster) => ServerMessage::RosterListed {
						request,
						entries: roster.entries().to_vec(),
					},
					Err(error) => ServerMessage::Error { request, error },
				}
			}
		};

		connection.send(reply);
	}
}

async fn forward(
	subscription: SubscriptionId,
	mut updates: mpsc::UnboundedReceiver<GameState>,
	outbox: mpsc::UnboundedSender<ServerMessage>,
) {
	while let Some(state) = updates.recv().await {
		if outbox.send(ServerMessage::StateChanged { subscription, state }).is_err() {
			break;
		}
	}
}
