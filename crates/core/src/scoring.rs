//! Scoring module - chain score, nuisance conversion and margin time
//!
//! Score for one chain step:
//!
//! ```text
//! score = 10 × cleared × (CHAIN_POWER[chain] + COLOUR_BONUS[distinct] + Σ GROUP_BONUS[count])
//! ```
//!
//! All tables are 1-indexed and clamp to their last entry. Nuisance cells are
//! never counted.

use std::collections::BTreeMap;

use crate::board::PuyoRef;
use crate::types::{
    CHAIN_POWER, COLOUR_BONUS, GROUP_BONUS, MARGIN_STEP_MS, MAX_MARGIN_REDUCTIONS, NUISANCE,
    SOFT_DROP_FRAMES_PER_POINT,
};

/// Look up a 1-indexed table, clamping past the end.
fn table_value(table: &[u32], n: usize) -> u32 {
    if n == 0 || table.is_empty() {
        return 0;
    }
    table[n.min(table.len()) - 1]
}

/// Score for the puyos popped in chain step `chain` (1 = first step).
pub fn calculate_score(puyos: &[PuyoRef], chain: usize) -> u32 {
    let mut per_colour: BTreeMap<u8, usize> = BTreeMap::new();
    for puyo in puyos.iter().filter(|p| p.colour != NUISANCE) {
        *per_colour.entry(puyo.colour).or_default() += 1;
    }

    let cleared: usize = per_colour.values().sum();
    if cleared == 0 {
        return 0;
    }

    let group_bonus: u32 = per_colour
        .values()
        .map(|&count| table_value(&GROUP_BONUS, count))
        .sum();
    let multiplier = table_value(&CHAIN_POWER, chain)
        + table_value(&COLOUR_BONUS, per_colour.len())
        + group_bonus;

    10u32
        .saturating_mul(cleared as u32)
        .saturating_mul(multiplier)
}

/// Convert a score gain into whole nuisance plus the fractional carry.
///
/// Returns `(sent, leftover)` with `leftover` in `[0, 1)`.
pub fn calculate_nuisance(score: u32, target_points: u32, leftover: f64) -> (u32, f64) {
    let points = score as f64 / target_points.max(1) as f64 + leftover;
    let sent = points.floor();
    (sent as u32, points - sent)
}

/// Points awarded for holding soft drop `frames` frames.
pub fn calculate_soft_drop_score(frames: u32) -> u32 {
    frames / SOFT_DROP_FRAMES_PER_POINT
}

/// Lowers the nuisance target as a round drags on.
///
/// The first reduction (to 75%) happens once elapsed time exceeds
/// `margin_time`; each further [`MARGIN_STEP_MS`] halves the target, up to
/// [`MAX_MARGIN_REDUCTIONS`] reductions. The target never drops below 1.
#[derive(Debug, Clone, PartialEq)]
pub struct MarginTimer {
    margin_time: u64,
    target_points: u32,
    reductions: u32,
}

impl MarginTimer {
    pub fn new(target_points: u32, margin_time: u64) -> Self {
        Self {
            margin_time,
            target_points: target_points.max(1),
            reductions: 0,
        }
    }

    pub fn target_points(&self) -> u32 {
        self.target_points
    }

    pub fn reductions(&self) -> u32 {
        self.reductions
    }

    /// Apply every reduction due at `elapsed_ms`. Returns true if the target changed.
    pub fn update(&mut self, elapsed_ms: u64) -> bool {
        let due = if elapsed_ms <= self.margin_time {
            0
        } else {
            let steps = (elapsed_ms - self.margin_time - 1) / MARGIN_STEP_MS + 1;
            steps.min(MAX_MARGIN_REDUCTIONS as u64) as u32
        };

        let before = self.target_points;
        while self.reductions < due {
            self.target_points = if self.reductions == 0 {
                (self.target_points as f64 * 0.75).floor() as u32
            } else {
                self.target_points / 2
            }
            .max(1);
            self.reductions += 1;
        }
        before != self.target_points
    }
}
