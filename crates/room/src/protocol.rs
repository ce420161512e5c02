//! Wire protocol
//!
//! Every message is a JSON object with a `"type"` discriminator and camelCase
//! fields, sent one per line.
//!
//! ## Client → Room
//!
//! - room requests ([`RoomRequest`]): `createRoom`, `joinRoom`, `spectateRoom`,
//!   `leaveRoom`, `joinQueue`, `startRoom`
//! - game reports ([`ParticipantMessage`]): `sendState`, `sendNuisance`,
//!   `activateNuisance`, `gameOver`, `focus`
//!
//! ## Room → Client
//!
//! [`ServerMessage`]: lobby updates, round start, pacing (`pause`, `play`,
//! `timeout`), results, relayed opponent reports, and `error`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use puyo_versus_engine::ParticipantMessage;
use puyo_versus_types::ParticipantId;

use crate::error::RoomError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoomType {
    #[default]
    Default,
    FreeForAll,
    Ranked,
}

impl RoomType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomType::Default => "default",
            RoomType::FreeForAll => "freeForAll",
            RoomType::Ranked => "ranked",
        }
    }
}

/// Matchmaking queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueueKind {
    FreeForAll,
    Ranked,
}

impl QueueKind {
    pub fn room_type(&self) -> RoomType {
        match self {
            QueueKind::FreeForAll => RoomType::FreeForAll,
            QueueKind::Ranked => RoomType::Ranked,
        }
    }

    /// Players needed before a queue room starts.
    pub fn room_size(&self) -> usize {
        match self {
            QueueKind::FreeForAll => 4,
            QueueKind::Ranked => 2,
        }
    }
}

/// A server-driven opponent requested at room creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuSpec {
    /// Strategy name (`flat`, `random`).
    pub strategy: String,
    /// Frames between inputs.
    #[serde(default = "default_cpu_speed")]
    pub speed: u32,
}

fn default_cpu_speed() -> u32 {
    8
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RoomRequest {
    #[serde(rename_all = "camelCase")]
    CreateRoom {
        settings_string: String,
        room_size: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        cpus: Vec<CpuSpec>,
    },
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    SpectateRoom { room_id: String },
    LeaveRoom,
    JoinQueue { queue: QueueKind },
    StartRoom,
}

/// Anything a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientMessage {
    Room(RoomRequest),
    Game(ParticipantMessage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    #[serde(rename = "room_not_found")]
    RoomNotFound,
    #[serde(rename = "password_required")]
    PasswordRequired,
    #[serde(rename = "password_incorrect")]
    PasswordIncorrect,
    #[serde(rename = "not_in_room")]
    NotInRoom,
    #[serde(rename = "not_host")]
    NotHost,
    #[serde(rename = "invalid_request")]
    InvalidRequest,
    #[serde(rename = "invalid_message")]
    InvalidMessage,
    #[serde(rename = "closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    RoomUpdate {
        room_id: String,
        participant_ids: Vec<ParticipantId>,
        room_size: usize,
        settings_string: String,
        room_type: RoomType,
        is_host: bool,
        is_spectating: bool,
    },
    #[serde(rename_all = "camelCase")]
    Start {
        room_id: String,
        participant_scores: BTreeMap<ParticipantId, u32>,
        opponent_ids: Vec<ParticipantId>,
        settings_string: String,
    },
    #[serde(rename_all = "camelCase")]
    Spectate {
        room_id: String,
        participant_scores: BTreeMap<ParticipantId, u32>,
        opponent_ids: Vec<ParticipantId>,
        settings_string: String,
    },
    Pause,
    Play,
    Timeout,
    #[serde(rename_all = "camelCase")]
    PlayerDisconnect { participant_id: ParticipantId },
    /// `participantId` is null when nobody survived.
    #[serde(rename_all = "camelCase")]
    WinnerResult { participant_id: Option<ParticipantId> },
    #[serde(rename_all = "camelCase")]
    OpponentState {
        participant_id: ParticipantId,
        board_state_hash: u64,
        score: u32,
        total_nuisance: u32,
    },
    #[serde(rename_all = "camelCase")]
    Nuisance {
        participant_id: ParticipantId,
        nuisance_amount: u32,
    },
    #[serde(rename_all = "camelCase")]
    ActivateNuisance { participant_id: ParticipantId },
    #[serde(rename_all = "camelCase")]
    GameOver { participant_id: ParticipantId },
    Error { code: ErrorCode, message: String },
}

impl ServerMessage {
    pub fn error(err: &RoomError) -> Self {
        ServerMessage::Error {
            code: err.code(),
            message: err.to_string(),
        }
    }

    /// Relay form of a participant report, as seen by everyone else.
    pub fn relay(message: &ParticipantMessage) -> Option<Self> {
        match *message {
            ParticipantMessage::SendState {
                participant_id,
                board_state_hash,
                score,
                total_nuisance,
            } => Some(ServerMessage::OpponentState {
                participant_id,
                board_state_hash,
                score,
                total_nuisance,
            }),
            ParticipantMessage::SendNuisance {
                participant_id,
                nuisance_amount,
            } => Some(ServerMessage::Nuisance {
                participant_id,
                nuisance_amount,
            }),
            ParticipantMessage::ActivateNuisance { participant_id } => {
                Some(ServerMessage::ActivateNuisance { participant_id })
            }
            ParticipantMessage::GameOver { participant_id } => {
                Some(ServerMessage::GameOver { participant_id })
            }
            ParticipantMessage::Focus { .. } => None,
        }
    }
}

/// A server message addressed to one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub to: ParticipantId,
    pub message: ServerMessage,
}

impl Outbound {
    pub fn new(to: ParticipantId, message: ServerMessage) -> Self {
        Self { to, message }
    }
}

/// Encode a message as one JSON line (without the trailing newline).
pub fn encode_line(message: &ServerMessage) -> Result<String, RoomError> {
    Ok(serde_json::to_string(message)?)
}

pub fn decode_client(line: &str) -> Result<ClientMessage, RoomError> {
    Ok(serde_json::from_str(line.trim())?)
}
