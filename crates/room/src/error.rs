//! Room and manager errors.
//!
//! Errors are reported to the requester only; the failing call leaves every
//! room untouched.

use thiserror::Error;

use puyo_versus_types::{ParticipantId, SettingsError};

use crate::protocol::ErrorCode;

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("room {0} does not exist")]
    RoomNotFound(String),

    #[error("room {0} requires a password")]
    PasswordRequired(String),

    #[error("incorrect password for room {0}")]
    PasswordIncorrect(String),

    #[error("participant {0} is not in a room")]
    NotInRoom(ParticipantId),

    #[error("participant {0} is not the host")]
    NotHost(ParticipantId),

    #[error("unknown cpu strategy: {0}")]
    UnknownCpu(String),

    #[error("room manager is closed")]
    ManagerClosed,

    #[error("invalid settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("message codec: {0}")]
    Codec(#[from] serde_json::Error),
}

impl RoomError {
    /// Wire code sent back to the requester.
    pub fn code(&self) -> ErrorCode {
        match self {
            RoomError::RoomNotFound(_) => ErrorCode::RoomNotFound,
            RoomError::PasswordRequired(_) => ErrorCode::PasswordRequired,
            RoomError::PasswordIncorrect(_) => ErrorCode::PasswordIncorrect,
            RoomError::NotInRoom(_) => ErrorCode::NotInRoom,
            RoomError::NotHost(_) => ErrorCode::NotHost,
            RoomError::UnknownCpu(_) | RoomError::Settings(_) => ErrorCode::InvalidRequest,
            RoomError::ManagerClosed => ErrorCode::Closed,
            RoomError::Codec(_) => ErrorCode::InvalidMessage,
        }
    }
}
