//! Engine modes and their per-mode transient state.
//!
//! | Mode | Ends when |
//! |------|-----------|
//! | `QueueShifting` | `QUEUE_SHIFT_FRAMES` elapse, then a drop spawns |
//! | `PuyoDropping` | the drop locks |
//! | `PuyoDroppingSplit` | every split puyo has landed |
//! | `PuyoSquishing` | `SQUISH_FRAMES` elapse, then chains are searched |
//! | `ChainResolving` | pop (and fall) frames of one chain step elapse |
//! | `ChainSquishing` | `SQUISH_FRAMES` elapse, then the next step or nuisance |
//! | `NuisanceDropping` | the nuisance fall animation elapses |

use puyo_versus_core::PuyoRef;
use puyo_versus_types::Colour;
use serde::{Deserialize, Serialize};

/// State of a drop under player control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dropping {
    /// Frames spent in lock delay.
    pub lock_frames: u32,
    /// Lock delay has started and keeps counting.
    pub lock_delay: bool,
    /// Lock on the next check regardless of rotation.
    pub force_lock: bool,
    /// Frames soft drop moved the drop.
    pub soft_drop_frames: u32,
}

/// A puyo that lost contact when its drop locked and falls on its own.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitPuyo {
    pub col: usize,
    pub y: f64,
    pub colour: Colour,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mode {
    QueueShifting { frame: u32 },
    PuyoDropping(Dropping),
    PuyoDroppingSplit { puyos: Vec<SplitPuyo> },
    PuyoSquishing { frame: u32 },
    ChainResolving {
        frame: u32,
        length: u32,
        /// Surviving puyos that fall once this step pops.
        falling: Vec<PuyoRef>,
    },
    ChainSquishing { frame: u32 },
    NuisanceDropping { frame: u32, length: u32 },
}

impl Default for Mode {
    fn default() -> Self {
        Mode::QueueShifting { frame: 0 }
    }
}

impl Mode {
    pub fn name(&self) -> &'static str {
        match self {
            Mode::QueueShifting { .. } => "QueueShifting",
            Mode::PuyoDropping(_) => "PuyoDropping",
            Mode::PuyoDroppingSplit { .. } => "PuyoDroppingSplit",
            Mode::PuyoSquishing { .. } => "PuyoSquishing",
            Mode::ChainResolving { .. } => "ChainResolving",
            Mode::ChainSquishing { .. } => "ChainSquishing",
            Mode::NuisanceDropping { .. } => "NuisanceDropping",
        }
    }

    /// Chain or nuisance work is still in flight.
    pub fn is_resolving(&self) -> bool {
        matches!(
            self,
            Mode::ChainResolving { .. } | Mode::ChainSquishing { .. } | Mode::NuisanceDropping { .. }
        )
    }
}
