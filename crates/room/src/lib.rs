//! Room module - multiplayer pacing over independently stepping sessions
//!
//! Human participants run their own engines and only send reports; the room
//! relays those reports, keeps everyone within a bounded frame lead, runs CPU
//! participants itself, and decides rounds.
//!
//! # Module Structure
//!
//! - [`room`]: one room: members, rounds, pacing, CPU sessions
//! - [`manager`]: registry of rooms, queues, id generation
//! - [`scheduler`]: timer abstraction with a virtual-time implementation
//! - [`protocol`]: JSON line messages
//! - [`runtime`]: tokio task owning a manager
//! - [`error`]: [`RoomError`]
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use puyo_versus_room::{RoomManager, RoomOptions, SequentialIdGenerator};
//! use puyo_versus_types::ManualClock;
//!
//! let mut manager = RoomManager::with_virtual_time(
//!     Box::new(SequentialIdGenerator::new("room")),
//!     Arc::new(ManualClock::new(0)),
//! );
//! manager.open();
//!
//! let room_id = manager.create_room(1, RoomOptions::default()).unwrap();
//! assert!(manager.join_room(2, &room_id, None).unwrap());
//! manager.start_room(1).unwrap();
//! assert!(manager.room(&room_id).unwrap().in_game());
//! ```

pub mod error;
pub mod manager;
pub mod protocol;
pub mod room;
pub mod runtime;
pub mod scheduler;

pub use error::RoomError;
pub use manager::{
    IdGenerator, RandomIdGenerator, RoomManager, RoomOptions, SequentialIdGenerator, CPU_ID_BASE,
};
pub use protocol::{
    decode_client, encode_line, ClientMessage, CpuSpec, ErrorCode, Outbound, QueueKind,
    RoomRequest, RoomType, ServerMessage,
};
pub use room::{Room, RoomTimer, TimerKind};
pub use runtime::{InboundCommand, OutboundMessage, RoomRuntime, RuntimeConfig};
pub use scheduler::{Scheduler, TimerHandle, VirtualScheduler};
