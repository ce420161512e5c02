//! Core types module - shared data structures and constants
//!
//! This crate defines the fundamental types used throughout the workspace.
//! Everything here is plain data (plus the [`Settings`] string codec and the
//! [`Clock`] abstraction), usable from the simulation, the room server and tests.
//!
//! # Board Dimensions
//!
//! Default playfield dimensions (configurable through [`Settings`]):
//!
//! - **Columns**: 6 (indexed 0-5, left to right)
//! - **Rows**: 12 visible rows (indexed 0-11, bottom to top) plus one hidden row
//! - **Death column**: 2 (and 3 under the Fever rule)
//!
//! # Frame Timing Constants
//!
//! The simulation advances in whole frames (60 per second):
//!
//! | Constant | Value | Description |
//! |----------|-------|-------------|
//! | `FRAMES_PER_ROTATION` | 8 | Frames for a 90° rotation |
//! | `ROTATE_180_MS` | 200 | Window for a double-tap 180° spin |
//! | `LOCK_DELAY_FRAMES` | 22 | Grace frames once a drop touches the stack |
//! | `QUEUE_SHIFT_FRAMES` | 8 | Queue advance animation |
//! | `SQUISH_FRAMES` | 8 | Landing squish animation |
//! | `POP_FRAMES` | 65 | Chain pop animation |
//! | `DROP_FRAMES` | 10 | Post-pop fall animation |
//! | `NUISANCE_LAND_FRAMES` | 4 | Nuisance landing bounce |
//!
//! # Examples
//!
//! ```
//! use puyo_versus_types::{GameAction, Gamemode, Settings};
//!
//! let action = GameAction::from_str("rotateCw").unwrap();
//! assert_eq!(action, GameAction::RotateCw);
//!
//! let settings = Settings::default();
//! assert_eq!(settings.gamemode, Gamemode::Tsu);
//! assert_eq!(settings.cols, 6);
//! ```

use serde::{Deserialize, Serialize};

pub mod clock;
pub mod settings;

pub use clock::{Clock, ManualClock, SystemClock};
pub use settings::{Gamemode, Settings, SettingsError};

/// A cell value. `0` is nuisance, `1..=num_colours` are chainable colours.
pub type Colour = u8;

/// Colour id reserved for nuisance puyos.
pub const NUISANCE: Colour = 0;

/// Highest supported number of chainable colours.
pub const MAX_COLOURS: u32 = 5;

/// Identifier of a room participant (human or CPU).
pub type ParticipantId = u32;

/// Duration of one simulation frame in milliseconds.
pub const FRAME_MS: f64 = 1000.0 / 60.0;

/// Frames for a 90° rotation to complete.
pub const FRAMES_PER_ROTATION: u32 = 8;

/// Two failed rotations in the same direction within this window trigger a 180° spin.
pub const ROTATE_180_MS: u64 = 200;

/// Frames a grounded drop may keep rotating before it locks.
pub const LOCK_DELAY_FRAMES: u32 = 22;

/// Frames spent shifting the drop queue before a new drop appears.
pub const QUEUE_SHIFT_FRAMES: u32 = 8;

/// Frames of the landing squish animation.
pub const SQUISH_FRAMES: u32 = 8;

/// Frames of the pop animation in each chain step.
pub const POP_FRAMES: u32 = 65;

/// Frames for unsupported puyos to fall after a pop.
pub const DROP_FRAMES: u32 = 10;

/// Frames per row for a split puyo falling on its own.
pub const SPLIT_FRAMES_PER_ROW: f64 = 3.25;

/// Frames per row for falling nuisance.
pub const NUISANCE_FRAMES_PER_ROW: f64 = 3.0;

/// Frames of the nuisance landing bounce.
pub const NUISANCE_LAND_FRAMES: u32 = 4;

/// Held soft-drop frames per awarded point.
pub const SOFT_DROP_FRAMES_PER_POINT: u32 = 5;

/// Minimum group size that pops.
pub const POP_LIMIT: usize = 4;

/// Rows in a rock of nuisance.
pub const ROCK_ROWS: u32 = 5;

/// Delay between margin-time reductions after the first one.
pub const MARGIN_STEP_MS: u64 = 16_000;

/// Maximum number of margin-time reductions.
pub const MAX_MARGIN_REDUCTIONS: u32 = 15;

/// Frame lead above which a participant is paused.
pub const MAX_FRAME_DIFFERENCE: u64 = 20;

/// Lead below which a paused participant is resumed.
pub const RESUME_FRAME_DIFFERENCE: u64 = MAX_FRAME_DIFFERENCE - 5;

/// Pacing timeout before the slowest participant is removed.
pub const PACING_TIMEOUT_MS: u64 = 15_000;

/// Pacing timeout when the slowest participant's client is unfocused.
pub const UNFOCUSED_TIMEOUT_MS: u64 = 3_000;

/// CPU tick interval in microseconds (~60 Hz).
pub const CPU_TICK_MICROS: u64 = 16_667;

/// Chain power by chain length (1-indexed: chain 1 is the first entry).
pub const CHAIN_POWER: [u32; 24] = [
    0, 8, 16, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448, 480, 512, 544,
    576, 608, 640, 672,
];

/// Colour bonus by number of distinct colours popped (1-indexed).
pub const COLOUR_BONUS: [u32; 6] = [0, 3, 6, 12, 24, 48];

/// Group bonus by number of puyos of one colour popped (1-indexed).
pub const GROUP_BONUS: [u32; 14] = [0, 0, 0, 0, 2, 3, 4, 5, 6, 7, 10, 10, 10, 10];

/// Drop shapes. Tsu only ever uses `I`; Fever mixes all five.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shape {
    I,
    #[serde(rename = "h")]
    SmallH,
    L,
    H,
    O,
}

impl Shape {
    /// All shapes in generator order.
    pub const ALL: [Shape; 5] = [Shape::I, Shape::SmallH, Shape::L, Shape::H, Shape::O];

    /// Number of puyos (and colour slots) in a drop of this shape.
    pub fn colour_count(&self) -> usize {
        match self {
            Shape::I => 2,
            Shape::SmallH | Shape::L => 3,
            Shape::H | Shape::O => 4,
        }
    }

    /// Number of distinct colours the generator draws for this shape.
    pub fn distinct_colours(&self) -> usize {
        match self {
            Shape::O => 1,
            _ => 2,
        }
    }

    /// Colour slot layout: each entry indexes into the distinct colours drawn.
    pub fn colour_slots(&self) -> &'static [usize] {
        match self {
            Shape::I => &[0, 1],
            Shape::SmallH => &[0, 0, 1],
            Shape::L => &[0, 1, 1],
            Shape::H => &[0, 0, 1, 1],
            Shape::O => &[0, 0, 0, 0],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Shape::I => "I",
            Shape::SmallH => "h",
            Shape::L => "L",
            Shape::H => "H",
            Shape::O => "O",
        }
    }
}

/// Rotation in progress on a drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotating {
    #[default]
    None,
    Cw,
    Ccw,
}

/// Neighbour direction, used for connection tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Neighbour scan order used by the flood fill.
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Column/row delta for this direction (rows grow upwards).
    pub fn delta(&self) -> (i64, i64) {
        match self {
            Direction::Up => (0, 1),
            Direction::Down => (0, -1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

/// Player inputs accepted by the engine.
///
/// Soft drop is a held input and is passed to the step function instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameAction {
    /// Shift the drop one column left
    MoveLeft,
    /// Shift the drop one column right
    MoveRight,
    /// Rotate 90° clockwise
    RotateCw,
    /// Rotate 90° counter-clockwise
    RotateCcw,
}

impl GameAction {
    /// Parse action from string (case-insensitive)
    ///
    /// # Examples
    ///
    /// ```
    /// use puyo_versus_types::GameAction;
    ///
    /// assert_eq!(GameAction::from_str("moveLeft"), Some(GameAction::MoveLeft));
    /// assert_eq!(GameAction::from_str("rotateccw"), Some(GameAction::RotateCcw));
    /// assert_eq!(GameAction::from_str("hold"), None);
    /// ```
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "moveleft" => Some(GameAction::MoveLeft),
            "moveright" => Some(GameAction::MoveRight),
            "rotatecw" => Some(GameAction::RotateCw),
            "rotateccw" => Some(GameAction::RotateCcw),
            _ => None,
        }
    }

    /// Convert to camelCase string
    pub fn as_str(&self) -> &'static str {
        match self {
            GameAction::MoveLeft => "moveLeft",
            GameAction::MoveRight => "moveRight",
            GameAction::RotateCw => "rotateCw",
            GameAction::RotateCcw => "rotateCcw",
        }
    }
}

/// Terminal result of one participant's game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameResult {
    Win,
    Loss,
    /// This participant's session was stopped (left or lost connection).
    Disconnect,
    /// Every opponent disconnected.
    OppDisconnect,
    /// This participant fell too far behind and was removed by the room.
    Timeout,
}

impl GameResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameResult::Win => "Win",
            GameResult::Loss => "Loss",
            GameResult::Disconnect => "Disconnect",
            GameResult::OppDisconnect => "OppDisconnect",
            GameResult::Timeout => "Timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_table_values() {
        assert_eq!(CHAIN_POWER[0], 0);
        assert_eq!(CHAIN_POWER[1], 8);
        assert_eq!(CHAIN_POWER[23], 672);
        assert_eq!(COLOUR_BONUS[1], 3);
        assert_eq!(GROUP_BONUS[4], 2);
        assert_eq!(RESUME_FRAME_DIFFERENCE, 15);
    }

    #[test]
    fn test_shape_slots_match_colour_count() {
        for shape in Shape::ALL {
            assert_eq!(shape.colour_slots().len(), shape.colour_count());
            assert!(shape
                .colour_slots()
                .iter()
                .all(|&slot| slot < shape.distinct_colours()));
        }
    }

    #[test]
    fn test_direction_deltas_are_unit_steps() {
        for dir in Direction::ALL {
            let (dc, dr) = dir.delta();
            assert_eq!(dc.abs() + dr.abs(), 1);
        }
    }
}
