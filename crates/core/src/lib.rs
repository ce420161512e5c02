//! Core game logic module - pure, deterministic, and testable
//!
//! This crate holds the board and drop rules of the puzzle. It has no
//! dependencies on timing, networking, or I/O, making it:
//!
//! - **Deterministic**: Same seed produces identical drop sequences on every peer
//! - **Testable**: Every rule is a plain function over plain data
//! - **Portable**: Runs in a room server, a headless runner, or a benchmark
//!
//! # Module Structure
//!
//! - [`board`]: Column stacks, flood-fill chain search, nuisance placement
//! - [`drop`]: Falling piece geometry and angle-based rotation
//! - [`rng`]: Sine-stream drop generator with colour buckets
//! - [`scoring`]: Chain score, nuisance conversion, and margin time
//!
//! # Example
//!
//! ```
//! use puyo_versus_core::{Board, calculate_score};
//! use puyo_versus_types::Settings;
//!
//! let settings = Settings::default();
//! let mut board = Board::from_columns(&settings, vec![vec![1, 1], vec![1, 1]]);
//!
//! let chains = board.resolve_chains();
//! assert_eq!(chains.len(), 1);
//! assert_eq!(chains[0].puyos.len(), 4);
//! assert_eq!(calculate_score(&chains[0].puyos, 2), 320);
//! assert!(board.is_empty());
//! ```

pub mod board;
pub mod drop;
pub mod rng;
pub mod scoring;

pub use puyo_versus_types as types;

// Re-export commonly used types for convenience
pub use board::{Board, ChainStep, NuisanceDrop, PuyoRef};
pub use drop::{Drop, Point};
pub use rng::{DropGenerator, SineRng};
pub use scoring::{calculate_nuisance, calculate_score, calculate_soft_drop_score, MarginTimer};
