//! Puyo Versus (workspace facade crate).
//!
//! Re-exports the workspace crates under one name so binaries, tests and
//! benchmarks can use `puyo_versus::{types,core,engine,room}`.

pub use puyo_versus_core as core;
pub use puyo_versus_engine as engine;
pub use puyo_versus_room as room;
pub use puyo_versus_types as types;
