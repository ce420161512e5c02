//! CPU opponents
//!
//! A [`Cpu`] picks where the current drop should go. A [`CpuDriver`] turns
//! that decision into the same frame-by-frame inputs a human would send, at a
//! configurable pace.
//!
//! Rotation counts are normalised modulo 4: `1` is one clockwise turn, `2`
//! two clockwise turns, `3` (or `-1`) one counter-clockwise turn.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::trace;

use puyo_versus_core::{Board, Drop};
use puyo_versus_types::GameAction;

use crate::game::GameEngine;
use crate::mode::Mode;

/// Placement chosen by a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuMove {
    pub column: usize,
    pub rotations: i32,
}

/// Move selection strategy.
pub trait Cpu: Send {
    fn get_move(&mut self, board: &Board, drop: &Drop) -> CpuMove;

    fn name(&self) -> &'static str;
}

/// Uniformly random column and rotation.
#[derive(Debug, Clone)]
pub struct RandomCpu {
    rng: StdRng,
}

impl RandomCpu {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Cpu for RandomCpu {
    fn get_move(&mut self, board: &Board, _drop: &Drop) -> CpuMove {
        CpuMove {
            column: self.rng.random_range(0..board.cols()),
            rotations: self.rng.random_range(0..4),
        }
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

/// Always stacks on the lowest column, leftmost on ties.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatCpu;

impl Cpu for FlatCpu {
    fn get_move(&mut self, board: &Board, _drop: &Drop) -> CpuMove {
        let column = (0..board.cols())
            .min_by_key(|&col| board.height(col))
            .unwrap_or(0);
        CpuMove {
            column,
            rotations: 0,
        }
    }

    fn name(&self) -> &'static str {
        "flat"
    }
}

/// Build a strategy by name (case-insensitive).
pub fn cpu_from_name(name: &str, seed: u64) -> Option<Box<dyn Cpu>> {
    match name.trim().to_lowercase().as_str() {
        "random" => Some(Box::new(RandomCpu::new(seed))),
        "flat" => Some(Box::new(FlatCpu)),
        _ => None,
    }
}

/// Rotation inputs for a rotation count.
pub fn rotation_inputs(rotations: i32) -> Vec<GameAction> {
    match rotations.rem_euclid(4) {
        1 => vec![GameAction::RotateCw],
        2 => vec![GameAction::RotateCw, GameAction::RotateCw],
        3 => vec![GameAction::RotateCcw],
        _ => Vec::new(),
    }
}

/// Inputs for one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuInput {
    pub actions: Vec<GameAction>,
    pub soft_drop: bool,
}

/// Feeds a strategy's moves into an engine.
pub struct CpuDriver {
    cpu: Box<dyn Cpu>,
    /// Frames between inputs.
    speed: u32,
    planned_for: Option<usize>,
    rotations: VecDeque<GameAction>,
    target: Option<i64>,
    last_move: Option<f64>,
    wait: u32,
}

impl CpuDriver {
    pub fn new(cpu: Box<dyn Cpu>, speed: u32) -> Self {
        Self {
            cpu,
            speed: speed.max(1),
            planned_for: None,
            rotations: VecDeque::new(),
            target: None,
            last_move: None,
            wait: 0,
        }
    }

    pub fn cpu_name(&self) -> &'static str {
        self.cpu.name()
    }

    /// Decide this tick's inputs from the engine's current state.
    pub fn next_input(&mut self, engine: &GameEngine) -> CpuInput {
        let (Mode::PuyoDropping(_), Some(drop)) = (engine.mode(), engine.current_drop()) else {
            return CpuInput::default();
        };

        if self.planned_for != Some(engine.drops_generated()) {
            self.plan(engine.board(), drop);
            self.planned_for = Some(engine.drops_generated());
        }

        let x = drop.arle.x.round();
        if self.last_move.take() == Some(x) {
            // The last shift was rejected; settle for where the drop is.
            self.target = None;
        }

        if self.wait > 0 {
            self.wait -= 1;
            return CpuInput::default();
        }
        self.wait = self.speed - 1;

        if !drop.is_rotating() {
            if let Some(action) = self.rotations.pop_front() {
                return CpuInput {
                    actions: vec![action],
                    soft_drop: false,
                };
            }
        }

        if let Some(target) = self.target {
            let action = match (x as i64).cmp(&target) {
                std::cmp::Ordering::Less => Some(GameAction::MoveRight),
                std::cmp::Ordering::Greater => Some(GameAction::MoveLeft),
                std::cmp::Ordering::Equal => None,
            };
            match action {
                Some(action) => {
                    self.last_move = Some(x);
                    return CpuInput {
                        actions: vec![action],
                        soft_drop: false,
                    };
                }
                None => self.target = None,
            }
        }

        CpuInput {
            actions: Vec::new(),
            soft_drop: self.rotations.is_empty() && !drop.is_rotating(),
        }
    }

    fn plan(&mut self, board: &Board, drop: &Drop) {
        let mv = self.cpu.get_move(board, drop);
        trace!(cpu = self.cpu.name(), column = mv.column, rotations = mv.rotations, "cpu move");
        self.rotations = rotation_inputs(mv.rotations).into();
        self.target = Some(mv.column.min(board.cols().saturating_sub(1)) as i64);
        self.last_move = None;
        self.wait = 0;
    }
}

impl std::fmt::Debug for CpuDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuDriver")
            .field("cpu", &self.cpu.name())
            .field("speed", &self.speed)
            .field("target", &self.target)
            .finish()
    }
}
