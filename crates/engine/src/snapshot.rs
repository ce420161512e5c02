//! Serialisable view of an engine and its stable state hash.
//!
//! The hash is what peers exchange as `boardStateHash`. It only covers
//! gameplay state (board, drop, queue, score, nuisance, mode), so two engines
//! fed the same inputs hash identically on every machine.

use std::hash::Hasher;

use serde::{Deserialize, Serialize};

use puyo_versus_core::{Drop, Point};
use puyo_versus_types::{Colour, GameResult, Rotating, Shape};

use crate::game::GameEngine;

/// 64-bit FNV-1a.
#[derive(Debug, Clone)]
pub struct Fnv1aHasher {
    state: u64,
}

impl Fnv1aHasher {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self {
            state: Self::OFFSET_BASIS,
        }
    }
}

impl Fnv1aHasher {
    pub fn write_u32_le(&mut self, value: u32) {
        self.write(&value.to_le_bytes());
    }

    pub fn write_u64_le(&mut self, value: u64) {
        self.write(&value.to_le_bytes());
    }

    /// Length prefix, always eight bytes.
    pub fn write_len(&mut self, len: usize) {
        self.write_u64_le(len as u64);
    }

    pub fn write_colours(&mut self, colours: &[Colour]) {
        self.write_len(colours.len());
        self.write(colours);
    }
}

impl Default for Fnv1aHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for Fnv1aHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.state ^= b as u64;
            self.state = self.state.wrapping_mul(Self::PRIME);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropSnapshot {
    pub shape: Shape,
    pub puyos: Vec<(Point, Colour)>,
    pub rotating: Rotating,
}

impl From<&Drop> for DropSnapshot {
    fn from(drop: &Drop) -> Self {
        Self {
            shape: drop.shape,
            puyos: drop.puyos().into_iter().collect(),
            rotating: drop.rotating,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub frame: u64,
    pub mode: String,
    /// Bottom-first columns.
    pub board: Vec<Vec<Colour>>,
    pub current: Option<DropSnapshot>,
    pub queue: Vec<(Shape, Vec<Colour>)>,
    pub score: u32,
    pub target_points: u32,
    pub active_nuisance: u32,
    pub total_nuisance: u32,
    pub result: Option<GameResult>,
}

impl GameSnapshot {
    pub fn playable(&self) -> bool {
        self.result.is_none()
    }
}

impl GameEngine {
    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            frame: self.frame(),
            mode: self.mode().name().to_string(),
            board: self.board().columns().to_vec(),
            current: self.current_drop().map(DropSnapshot::from),
            queue: self
                .queue()
                .iter()
                .map(|d| (d.shape, d.colours.to_vec()))
                .collect(),
            score: self.score(),
            target_points: self.target_points(),
            active_nuisance: self.nuisance().active(),
            total_nuisance: self.nuisance().total(),
            result: self.end(),
        }
    }

    /// FNV-1a digest of the gameplay state.
    ///
    /// Every value is fed as fixed-width little-endian bytes, so the digest
    /// does not depend on pointer width or byte order.
    pub fn state_hash(&self) -> u64 {
        let mut hasher = Fnv1aHasher::new();
        let columns = self.board().columns();
        hasher.write_len(columns.len());
        for column in columns {
            hasher.write_colours(column);
        }
        match self.current_drop() {
            Some(drop) => {
                hasher.write_u8(1);
                let puyos = drop.puyos();
                hasher.write_len(puyos.len());
                for (p, colour) in puyos {
                    hasher.write_u64_le(p.x.to_bits());
                    hasher.write_u64_le(p.y.to_bits());
                    hasher.write_u8(colour);
                }
                hasher.write_u8(drop.rotating as u8);
            }
            None => hasher.write_u8(0),
        }
        hasher.write_len(self.queue().len());
        for drop in self.queue() {
            hasher.write_u8(drop.shape as u8);
            hasher.write_colours(&drop.colours);
        }
        let mode = self.mode().name();
        hasher.write_len(mode.len());
        hasher.write(mode.as_bytes());
        hasher.write_u32_le(self.score());
        hasher.write_u32_le(self.nuisance().active());
        hasher.write_u32_le(self.nuisance().total());
        hasher.finish()
    }
}
