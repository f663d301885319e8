use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time;

use crate::error::StoreError;
use crate::lock_mutex;
use crate::net::protocol::*;
use crate::roster::{Roster, RosterProvider};
use crate::state::{EventId, GameState, StateDefaults, StateId, StatePatch};
use crate::store::{StateStore, Subscription, SubscriptionId};

#[derive(Default)]
struct Routes {
	closed: bool,
	pending: HashMap<RequestId, oneshot::Sender<ServerMessage>>,
	/// Feeds registered before their `Subscribed` reply arrives.
	awaiting: HashMap<RequestId, mpsc::UnboundedSender<GameState>>,
	feeds: HashMap<SubscriptionId, mpsc::UnboundedSender<GameState>>,
	/// Subscribe requests that timed out; a late `Subscribed` is released.
	abandoned: HashSet<RequestId>,
}

impl Routes {
	/// Routes one inbound message. Returns a subscription nobody is waiting
	/// for any more, which the caller should release.
	fn dispatch(&mut self, msg: ServerMessage) -> Option<SubscriptionId> {
		if let ServerMessage::StateChanged { subscription, state } = msg {
			let dead = self
				.feeds
				.get(&subscription)
				.is_some_and(|feed| feed.send(state).is_err());
			if dead {
				self.feeds.remove(&subscription);
			}
			return None;
		}

		let request = msg.request_id()?;
		if self.abandoned.remove(&request) {
			return match msg {
				ServerMessage::Subscribed { subscription, .. } => Some(subscription),
				_ => None,
			};
		}
		if let ServerMessage::Subscribed { subscription, .. } = &msg {
			if let Some(feed) = self.awaiting.remove(&request) {
				self.feeds.insert(*subscription, feed);
			}
		}
		if let Some(waiter) = self.pending.remove(&request) {
			let _ = waiter.send(msg);
		}
		None
	}

	/// Fails every outstanding request and ends every feed.
	fn shut(&mut self) {
		self.closed = true;
		self.pending.clear();
		self.awaiting.clear();
		self.feeds.clear();
		self.abandoned.clear();
	}
}

fn disconnected() -> StoreError {
	StoreError::Unreachable("connection to store lost".to_string())
}

fn unexpected(reply: ServerMessage) -> StoreError {
	StoreError::Protocol(format!("unexpected reply: {:?}", reply))
}

/// A [`StateStore`] and [`RosterProvider`] reached through a store server.
///
/// Requests are matched to replies by id, so several engines may share one
/// connection. When the connection drops, pending calls fail with
/// `Unreachable` and every subscription feed ends.
pub struct RemoteStore {
	outbox: mpsc::UnboundedSender<ClientMessage>,
	routes: Arc<Mutex<Routes>>,
	next_request: Arc<AtomicU64>,
	timeout: Duration,
	reader: JoinHandle<()>,
	writer: JoinHandle<()>,
}

impl RemoteStore {
	pub async fn connect(addr: &str, timeout: Duration) -> Result<Self, StoreError> {
		let stream = time::timeout(timeout, TcpStream::connect(addr))
			.await
			.map_err(|_| StoreError::Unreachable(format!("{}: connect timed out", addr)))?
			.map_err(|e| StoreError::Unreachable(format!("{}: {}", addr, e)))?;
		let _ = stream.set_nodelay(true);
		let (reader, writer) = stream.into_split();

		let routes = Arc::new(Mutex::new(Routes::default()));
		let next_request = Arc::new(AtomicU64::new(1));
		let (outbox, outgoing) = mpsc::unbounded_channel();

		Ok(Self {
			reader: tokio::spawn(read_loop(
				reader,
				Arc::clone(&routes),
				outbox.clone(),
				Arc::clone(&next_request),
			)),
			writer: tokio::spawn(write_loop(writer, outgoing, Arc::clone(&routes))),
			outbox,
			routes,
			next_request,
			timeout,
		})
	}

	pub fn is_connected(&self) -> bool {
		!lock_mutex(&self.routes).closed
	}

	fn next_request_id(&self) -> RequestId {
		self.next_request.fetch_add(1, Ordering::SeqCst)
	}

	async fn send_request(&self, request: RequestId, msg: ClientMessage) -> Result<ServerMessage, StoreError> {
		let (waiter, reply) = oneshot::channel();
		{
			let mut routes = lock_mutex(&self.routes);
			if routes.closed {
				return Err(disconnected());
			}
			routes.pending.insert(request, waiter);
		}

		if self.outbox.send(msg).is_err() {
			lock_mutex(&self.routes).pending.remove(&request);
			return Err(disconnected());
		}

		match time::timeout(self.timeout, reply).await {
			Ok(Ok(ServerMessage::Error { error, .. })) => Err(error),
			Ok(Ok(reply)) => Ok(reply),
			Ok(Err(_)) => Err(disconnected()),
			Err(_) => {
				let mut routes = lock_mutex(&self.routes);
				routes.pending.remove(&request);
				if routes.awaiting.remove(&request).is_some() {
					routes.abandoned.insert(request);
				}
				Err(StoreError::Unreachable(format!(
					"no reply within {}ms",
					self.timeout.as_millis()
				)))
			}
		}
	}
}

impl Drop for RemoteStore {
	fn drop(&mut self) {
		self.reader.abort();
		self.writer.abort();
	}
}

#[async_trait]
impl StateStore for RemoteStore {
	async fn read_state(&self, event_id: &EventId) -> Result<Option<GameState>, StoreError> {
		let request = self.next_request_id();
		let msg = ClientMessage::ReadState {
			request,
			event_id: event_id.clone(),
		};
		match self.send_request(request, msg).await? {
			ServerMessage::StateRead { state, .. } => Ok(state),
			other => Err(unexpected(other)),
		}
	}

	async fn create_state(
		&self,
		event_id: &EventId,
		defaults: StateDefaults,
	) -> Result<GameState, StoreError> {
		let request = self.next_request_id();
		let msg = ClientMessage::CreateState {
			request,
			event_id: event_id.clone(),
			defaults,
		};
		match self.send_request(request, msg).await? {
			ServerMessage::StateCreated { state, .. } => Ok(state),
			other => Err(unexpected(other)),
		}
	}

	async fn update_fields(&self, state_id: StateId, patch: &StatePatch) -> Result<(), StoreError> {
		let request = self.next_request_id();
		let msg = ClientMessage::UpdateFields {
			request,
			state_id,
			patch: patch.clone(),
		};
		match self.send_request(request, msg).await? {
			ServerMessage::FieldsUpdated { .. } => Ok(()),
			other => Err(unexpected(other)),
		}
	}

	async fn subscribe(&self, event_id: &EventId) -> Result<Subscription, StoreError> {
		let request = self.next_request_id();
		let (feed, updates) = mpsc::unbounded_channel();
		lock_mutex(&self.routes).awaiting.insert(request, feed);

		let msg = ClientMessage::Subscribe {
			request,
			event_id: event_id.clone(),
		};
		match self.send_request(request, msg).await {
			Ok(ServerMessage::Subscribed { subscription, .. }) => Ok(Subscription {
				id: subscription,
				updates,
			}),
			Ok(other) => {
				lock_mutex(&self.routes).awaiting.remove(&request);
				Err(unexpected(other))
			}
			Err(err) => {
				lock_mutex(&self.routes).awaiting.remove(&request);
				Err(err)
			}
		}
	}

	async fn unsubscribe(&self, subscription: SubscriptionId) -> Result<(), StoreError> {
		lock_mutex(&self.routes).feeds.remove(&subscription);

		let request = self.next_request_id();
		let msg = ClientMessage::Unsubscribe { request, subscription };
		match self.send_request(request, msg).await? {
			ServerMessage::Unsubscribed { .. } => Ok(()),
			other => Err(unexpected(other)),
		}
	}
}

#[async_trait]
impl RosterProvider for RemoteStore {
	async fn list_roster(&self, event_id: &EventId) -> Result<Roster, StoreError> {
		let request = self.next_request_id();
		let msg = ClientMessage::ListRoster {
			request,
			event_id: event_id.clone(),
		};
		match self.send_request(request, msg).await? {
			ServerMessage::RosterListed { entries, .. } => Ok(Roster::new(entries)),
			other => Err(unexpected(other)),
		}
	}
}

async fn read_loop(
	mut reader: OwnedReadHalf,
	routes: Arc<Mutex<Routes>>,
	outbox: mpsc::UnboundedSender<ClientMessage>,
	next_request: Arc<AtomicU64>,
) {
	while let Ok(Some(msg)) = read_frame::<_, ServerMessage>(&mut reader).await {
		let orphan = lock_mutex(&routes).dispatch(msg);
		if let Some(subscription) = orphan {
			// the reply is not awaited
			let request = next_request.fetch_add(1, Ordering::SeqCst);
			let _ = outbox.send(ClientMessage::Unsubscribe { request, subscription });
		}
	}
	lock_mutex(&routes).shut();
}

async fn write_loop(
	mut writer: OwnedWriteHalf,
	mut outgoing: mpsc::UnboundedReceiver<ClientMessage>,
	routes: Arc<Mutex<Routes>>,
) {
	while let Some(msg) = outgoing.recv().await {
		if write_frame(&mut writer, &msg).await.is_err() {
			lock_mutex(&routes).shut();
			return;
		}
	}
}

#[cfg(test)]
mod tests {
	use tokio::net::TcpListener;

	use super::*;
	use crate::state::{Player, Scene};

	const TIMEOUT: Duration = Duration::from_millis(300);

	/// A one-connection fake server driven by the test body.
	async fn fake_server() -> (String, JoinHandle<(OwnedReadHalf, OwnedWriteHalf)>) {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap().to_string();
		let accept = tokio::spawn(async move {
			let (stream, _) = listener.accept().await.unwrap();
			stream.into_split()
		});
		(addr, accept)
	}

	#[tokio::test]
	async fn test_refused_connection_is_unreachable() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap().to_string();
		drop(listener);

		let err = RemoteStore::connect(&addr, TIMEOUT).await.err().unwrap();
		assert!(matches!(err, StoreError::Unreachable(_)));
	}

	#[tokio::test]
	async fn test_silent_server_times_out() {
		let (addr, accept) = fake_server().await;
		let store = RemoteStore::connect(&addr, TIMEOUT).await.unwrap();
		let _server = accept.await.unwrap();

		let err = store.read_state(&EventId::new("cup")).await.unwrap_err();
		assert!(matches!(err, StoreError::Unreachable(_)));
		assert!(store.is_connected());
	}

	#[tokio::test]
	async fn test_replies_are_matched_by_request_id() {
		let (addr, accept) = fake_server().await;
		let store = Arc::new(RemoteStore::connect(&addr, Duration::from_secs(1)).await.unwrap());
		let (mut reader, mut writer) = accept.await.unwrap();

		let cup = EventId::new("cup");
		let patch = StatePatch::new().cursor(Player::P1, 2);
		let (read, update, ()) = tokio::join!(
			store.read_state(&cup),
			store.update_fields(StateId(1), &patch),
			async {
				let first: ClientMessage = read_frame(&mut reader).await.unwrap().unwrap();
				let second: ClientMessage = read_frame(&mut reader).await.unwrap().unwrap();
				// answer in reverse order
				for msg in [second, first] {
					let reply = match msg {
						ClientMessage::ReadState { request, .. } => ServerMessage::StateRead { request, state: None },
						ClientMessage::UpdateFields { request, .. } => ServerMessage::Error {
							request,
							error: StoreError::Rejected("read only".to_string()),
						},
						other => panic!("Wrong message: {:?}", other),
					};
					write_frame(&mut writer, &reply).await.unwrap();
				}
			}
		);

		assert_eq!(read.unwrap(), None);
		assert_eq!(update.unwrap_err(), StoreError::Rejected("read only".to_string()));
	}

	#[tokio::test]
	async fn test_late_subscribe_reply_is_released() {
		let (addr, accept) = fake_server().await;
		let store = RemoteStore::connect(&addr, TIMEOUT).await.unwrap();
		let (mut reader, mut writer) = accept.await.unwrap();

		let err = store.subscribe(&EventId::new("cup")).await.unwrap_err();
		assert!(matches!(err, StoreError::Unreachable(_)));

		let msg: ClientMessage = read_frame(&mut reader).await.unwrap().unwrap();
		let ClientMessage::Subscribe { request, .. } = msg else {
			panic!("Wrong message: {:?}", msg);
		};
		write_frame(
			&mut writer,
			&ServerMessage::Subscribed {
				request,
				subscription: SubscriptionId(4),
			},
		)
		.await
		.unwrap();

		let release = time::timeout(Duration::from_secs(1), read_frame::<_, ClientMessage>(&mut reader))
			.await
			.unwrap()
			.unwrap()
			.unwrap();
		match release {
			ClientMessage::Unsubscribe { subscription, .. } => assert_eq!(subscription, SubscriptionId(4)),
			other => panic!("Wrong message: {:?}", other),
		}
		assert!(store.is_connected());
	}

	#[tokio::test]
	async fn test_dropped_connection_ends_feeds() {
		let (addr, accept) = fake_server().await;
		let store = RemoteStore::connect(&addr, TIMEOUT).await.unwrap();
		let (mut reader, mut writer) = accept.await.unwrap();

		let cup = EventId::new("cup");
		let (subscription, ()) = tokio::join!(store.subscribe(&cup), async {
			let msg: ClientMessage = read_frame(&mut reader).await.unwrap().unwrap();
			let ClientMessage::Subscribe { request, .. } = msg else {
				panic!("Wrong message: {:?}", msg);
			};
			write_frame(
				&mut writer,
				&ServerMessage::Subscribed {
					request,
					subscription: SubscriptionId(8),
				},
			)
			.await
			.unwrap();
			let mut state = GameState::new(StateId(1), cup.clone(), StateDefaults::default());
			state.current_scene = Scene::Versus;
			write_frame(
				&mut writer,
				&ServerMessage::StateChanged {
					subscription: SubscriptionId(8),
					state,
				},
			)
			.await
			.unwrap();
		});

		let mut subscription = subscription.unwrap();
		assert_eq!(subscription.id, SubscriptionId(8));
		let pushed = subscription.updates.recv().await.unwrap();
		assert_eq!(pushed.current_scene, Scene::Versus);

		drop(reader);
		drop(writer);
		assert!(subscription.updates.recv().await.is_none());
		assert!(!store.is_connected());

		let err = store.read_state(&cup).await.unwrap_err();
		assert!(matches!(err, StoreError::Unreachable(_)));
	}
}
