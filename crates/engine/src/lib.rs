//! Engine module - per-player simulation stepped one frame at a time
//!
//! Built on the pure rules in `puyo-versus-core`, this crate adds the frame
//! state machine, nuisance bookkeeping, and the pieces that let a room run a
//! participant:
//!
//! - [`game`]: [`GameEngine`], the per-frame mode machine
//! - [`mode`]: mode enum with per-mode transient state
//! - [`nuisance`]: incoming nuisance ledger and cancellation
//! - [`snapshot`]: serialisable view and FNV-1a state hash
//! - [`session`]: tick driver producing room messages
//! - [`cpu`]: strategy trait, reference strategies, input driver
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use puyo_versus_engine::{GameEngine, Mode};
//! use puyo_versus_types::{ManualClock, Settings};
//!
//! let mut engine = GameEngine::new(Settings::default(), Arc::new(ManualClock::new(0)));
//! for _ in 0..puyo_versus_types::QUEUE_SHIFT_FRAMES {
//!     engine.step(false);
//! }
//! assert!(matches!(engine.mode(), Mode::PuyoDropping(_)));
//! assert!(engine.current_drop().is_some());
//! ```

pub mod cpu;
pub mod game;
pub mod mode;
pub mod nuisance;
pub mod session;
pub mod snapshot;

pub use cpu::{cpu_from_name, Cpu, CpuDriver, CpuInput, CpuMove, FlatCpu, RandomCpu};
pub use game::{check_kick, check_lock, fits, EngineEvent, GameEngine, QUEUE_PREVIEW};
pub use mode::{Dropping, Mode, SplitPuyo};
pub use nuisance::NuisanceLedger;
pub use session::{ParticipantMessage, Session, TickOutcome};
pub use snapshot::{DropSnapshot, Fnv1aHasher, GameSnapshot};
