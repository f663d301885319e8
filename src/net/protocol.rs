use std::io;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::StoreError;
use crate::roster::RosterEntry;
use crate::state::{EventId, GameState, StateDefaults, StateId, StatePatch};
use crate::store::SubscriptionId;

/// Largest frame either side accepts.
pub const MAX_FRAME_LEN: u32 = 1024 * 1024;

pub type RequestId = u64;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
	ReadState {
		request: RequestId,
		event_id: EventId,
	},
	CreateState {
		request: RequestId,
		event_id: EventId,
		defaults: StateDefaults,
	},
	UpdateFields {
		request: RequestId,
		state_id: StateId,
		patch: StatePatch,
	},
	Subscribe {
		request: RequestId,
		event_id: EventId,
	},
	Unsubscribe {
		request: RequestId,
		subscription: SubscriptionId,
	},
	ListRoster {
		request: RequestId,
		event_id: EventId,
	},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
	StateRead {
		request: RequestId,
		state: Option<GameState>,
	},
	StateCreated {
		request: RequestId,
		state: GameState,
	},
	FieldsUpdated {
		request: RequestId,
	},
	Subscribed {
		request: RequestId,
		subscription: SubscriptionId,
	},
	Unsubscribed {
		request: RequestId,
	},
	RosterListed {
		request: RequestId,
		entries: Vec<RosterEntry>,
	},
	Error {
		request: RequestId,
		error: StoreError,
	},
	/// Pushed, not a reply: the latest row for a subscribed event.
	StateChanged {
		subscription: SubscriptionId,
		state: GameState,
	},
}

impl ServerMessage {
	/// The request this message answers, if it is a reply.
	pub fn request_id(&self) -> Option<RequestId> {
		match self {
			ServerMessage::StateRead { request, .. }
			| ServerMessage::StateCreated { request, .. }
			| ServerMessage::FieldsUpdated { request }
			| ServerMessage::Subscribed { request, .. }
			| ServerMessage::Unsubscribed { request }
			| ServerMessage::RosterListed { request, .. }
			| ServerMessage::Error { request, .. } => Some(*request),
			ServerMessage::StateChanged { .. } => None,
		}
	}
}

pub fn encode_message<T: Serialize>(msg: &T) -> io::Result<Vec<u8>> {
	let json = serde_json::to_vec(msg).map_err(io::Error::other)?;
	let len = u32::try_from(json.len())
		.ok()
		.filter(|len| *len <= MAX_FRAME_LEN)
		.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "frame too large"))?;
	let mut buf = len.to_be_bytes().to_vec();
	buf.extend(json);
	Ok(buf)
}

pub fn decode_length(buf: &[u8]) -> Option<u32> {
	if buf.len() < 4 {
		return None;
	}
	Some(u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]))
}

pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> io::Result<()>
where
	W: AsyncWrite + Unpin,
	T: Serialize,
{
	let data = encode_message(msg)?;
	writer.write_all(&data).await?;
	writer.flush().await
}

/// Reads one frame. `Ok(None)` means the peer closed cleanly between frames.
pub async fn read_frame<R, T>(reader: &mut R) -> io::Result<Option<T>>
where
	R: AsyncRead + Unpin,
	T: DeserializeOwned,
{
	let mut header = [0u8; 4];
	match reader.read_exact(&mut header).await {
		Ok(_) => {}
		Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
		Err(e) => return Err(e),
	}

	let len = decode_length(&header).unwrap_or(0);
	if len > MAX_FRAME_LEN {
		return Err(io::Error::new(
			io::ErrorKind::InvalidData,
			format!("frame of {} bytes exceeds limit", len),
		));
	}

	let mut body = vec![0u8; len as usize];
	reader.read_exact(&mut body).await?;
	serde_json::from_slice(&body)
		.map(Some)
		.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
