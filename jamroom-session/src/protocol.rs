//! Session protocol: tagged inbound/outbound events and their wire codec.
//!
//! Events travel as WebSocket binary frames, bincode-encoded with the
//! standard configuration:
//! ```text
//! ┌───────────────┬──────────────────────────────┐
//! │ variant tag   │ variant fields               │
//! │ varint        │ varint lengths + payload     │
//! └───────────────┴──────────────────────────────┘
//! ```
//!
//! Audio travels as normalized `f32` samples in both directions.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Member role within a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Listener,
    Performer,
}

/// Member identity as supplied by the client on create/join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub username: String,
    pub role: Role,
    pub is_host: bool,
}

impl Member {
    pub fn listener(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            role: Role::Listener,
            is_host: false,
        }
    }

    pub fn performer(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            role: Role::Performer,
            is_host: false,
        }
    }

    /// Mark this member as the room host.
    pub fn as_host(mut self) -> Self {
        self.is_host = true;
        self
    }
}

/// Room definition sent with `CreateRoom`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSpec {
    pub id: String,
    pub name: String,
    pub pin: String,
    pub max_listeners: usize,
    pub max_performers: usize,
}

impl RoomSpec {
    pub fn new(id: impl Into<String>, pin: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            pin: pin.into(),
            max_listeners: 16,
            max_performers: 4,
        }
    }

    pub fn with_limits(mut self, max_listeners: usize, max_performers: usize) -> Self {
        self.max_listeners = max_listeners;
        self.max_performers = max_performers;
        self
    }
}

/// Composition metadata supplied by the host when ending a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositionMetadata {
    pub title: String,
    pub tags: Vec<String>,
    /// Recording date as supplied by the client
    pub date: String,
}

/// Room-level lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomState {
    /// Created, members may join, audio is already mixed on demand
    Active,
    /// Host has issued start
    Started,
}

/// One row of the room table. Never carries the pin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: String,
    pub name: String,
    pub max_listeners: usize,
    pub max_performers: usize,
    pub current_listeners: usize,
    pub current_performers: usize,
    pub state: RoomState,
}

/// One roster row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub member_id: Uuid,
    pub username: String,
    pub role: Role,
    pub is_host: bool,
}

/// Outcome of a PIN check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinCheck {
    Accepted,
    Incorrect,
    /// Room no longer exists
    Unavailable,
}

/// Inbound events, client → server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientEvent {
    /// Ask for the current room table
    UpdateRooms,
    CreateRoom { room: RoomSpec, member: Member },
    LeaveRoom { room_id: String },
    VerifyPin { room_id: String, pin: String },
    JoinRoom { room_id: String, member: Member },
    StartSession { room_id: String },
    SendAudio { samples: Vec<f32> },
    EndSession { room_id: String, metadata: CompositionMetadata },
}

/// Outbound events, server → client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerEvent {
    /// First frame on every connection
    Connected { member_id: Uuid },
    UpdateRooms(Vec<RoomSummary>),
    UpdateMembers(Vec<RosterEntry>),
    RoomError(String),
    VerifyPin(PinCheck),
    AudioStart,
    AudioStop(String),
    PlayAudio(Vec<f32>),
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| ProtocolError::SerializationError(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
    Ok(value)
}

impl ClientEvent {
    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        encode(self)
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        decode(bytes)
    }

    /// Short event name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UpdateRooms => "updaterooms",
            Self::CreateRoom { .. } => "createroom",
            Self::LeaveRoom { .. } => "leaveroom",
            Self::VerifyPin { .. } => "verifypin",
            Self::JoinRoom { .. } => "joinroom",
            Self::StartSession { .. } => "startsession",
            Self::SendAudio { .. } => "sendaudio",
            Self::EndSession { .. } => "endsession",
        }
    }
}

impl ServerEvent {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        decode(bytes)
    }
}

/// Protocol errors.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    SerializationError(String),
    DeserializationError(String),
    ConnectionClosed,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SerializationError(e) => write!(f, "Serialization error: {e}"),
            Self::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_room_roundtrip() {
        let event = ClientEvent::CreateRoom {
            room: RoomSpec::new("R1", "1234").with_limits(3, 2),
            member: Member::performer("Alice").as_host(),
        };
        let decoded = ClientEvent::decode(&event.encode().unwrap()).unwrap();
        assert_eq!(decoded, event);
        assert_eq!(decoded.kind(), "createroom");
    }

    #[test]
    fn test_audio_payload_preserved() {
        let samples: Vec<f32> = (0..1024).map(|i| (i as f32 / 1024.0) - 0.5).collect();
        let event = ClientEvent::SendAudio { samples: samples.clone() };
        match ClientEvent::decode(&event.encode().unwrap()).unwrap() {
            ClientEvent::SendAudio { samples: got } => assert_eq!(got, samples),
            other => panic!("Expected SendAudio, got {other:?}"),
        }
    }

    #[test]
    fn test_server_event_roundtrip() {
        let event = ServerEvent::UpdateMembers(vec![RosterEntry {
            member_id: Uuid::new_v4(),
            username: "Bob".into(),
            role: Role::Listener,
            is_host: false,
        }]);
        assert_eq!(ServerEvent::decode(&event.encode().unwrap()).unwrap(), event);
    }

    #[test]
    fn test_decode_invalid_bytes() {
        let garbage = vec![0xFF, 0xFE, 0xFD];
        assert!(ClientEvent::decode(&garbage).is_err());
        assert!(ServerEvent::decode(&[]).is_err());
    }

    #[test]
    fn test_member_builders() {
        let host = Member::listener("H").as_host();
        assert!(host.is_host);
        assert_eq!(host.role, Role::Listener);
        assert!(!Member::performer("P").is_host);
    }

    #[test]
    fn test_room_spec_defaults_name_to_id() {
        let spec = RoomSpec::new("jam", "0000");
        assert_eq!(spec.name, "jam");
        assert_eq!(spec.max_performers, 4);
    }
}
