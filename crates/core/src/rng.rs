//! RNG module - seeded drop generation
//!
//! Drops are produced in batches of [`BATCH_SIZE`] from a sine-based stream:
//!
//! ```text
//! x = sin(seed++) · 10000
//! r = x − floor(x)
//! ```
//!
//! Colours are dealt from per-colour buckets holding `ceil(128 / num_colours)`
//! uses each. Every batch starts with full buckets, and within a batch all
//! buckets refill together once every one is empty. The first drops of a game
//! only use a small palette.
//!
//! Batches are generated in order and cached, so asking for a drop index
//! twice (or from two generators with the same seed) yields the same drop.

use arrayvec::ArrayVec;

use crate::drop::Drop;
use crate::types::{Colour, Gamemode, Settings, Shape};

/// Drops per generated batch.
pub const BATCH_SIZE: usize = 128;

/// Number of opening drops restricted to the starting palette.
pub const OPENING_DROPS: usize = 3;

/// Sine-based uniform stream in `[0, 1)`.
#[derive(Debug, Clone)]
pub struct SineRng {
    seed: u64,
}

impl SineRng {
    pub fn new(seed: u32) -> Self {
        Self { seed: seed as u64 }
    }

    /// Next value in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        let x = (self.seed as f64).sin() * 10000.0;
        self.seed += 1;
        let frac = x - x.floor();
        if frac >= 1.0 {
            0.0
        } else {
            frac
        }
    }

    /// Uniform index in `0..len`. `len` must be non-zero.
    pub fn next_index(&mut self, len: usize) -> usize {
        ((self.next_f64() * len as f64) as usize).min(len - 1)
    }
}

/// Deterministic drop sequence for one game.
#[derive(Debug, Clone)]
pub struct DropGenerator {
    gamemode: Gamemode,
    num_colours: usize,
    rng: SineRng,
    buckets: Vec<u32>,
    opening_palette: ArrayVec<Colour, 3>,
    batches: Vec<Vec<Drop>>,
}

impl DropGenerator {
    pub fn new(settings: &Settings) -> Self {
        let num_colours = settings.num_colours.max(1) as usize;
        let mut rng = SineRng::new(settings.seed);

        let mut pool: Vec<Colour> = (1..=num_colours as Colour).collect();
        let mut opening_palette = ArrayVec::new();
        while opening_palette.len() < num_colours.min(3) {
            let pick = rng.next_index(pool.len());
            opening_palette.push(pool.remove(pick));
        }

        Self {
            gamemode: settings.gamemode,
            num_colours,
            rng,
            buckets: Vec::new(),
            opening_palette,
            batches: Vec::new(),
        }
    }

    fn bucket_quota(&self) -> u32 {
        BATCH_SIZE.div_ceil(self.num_colours) as u32
    }

    fn refill_buckets(&mut self) {
        self.buckets = vec![self.bucket_quota(); self.num_colours];
    }

    /// Drop at position `index` of the sequence.
    pub fn get(&mut self, index: usize) -> Drop {
        let batch = self.batch(index / BATCH_SIZE);
        batch[index % BATCH_SIZE].clone()
    }

    /// Batch `index`, generating any missing batches up to it.
    pub fn batch(&mut self, index: usize) -> &[Drop] {
        while self.batches.len() <= index {
            let next = self.generate_batch(self.batches.len());
            self.batches.push(next);
        }
        &self.batches[index]
    }

    fn generate_batch(&mut self, batch_index: usize) -> Vec<Drop> {
        self.refill_buckets();
        (0..BATCH_SIZE)
            .map(|i| {
                let opening = batch_index == 0 && i < OPENING_DROPS;
                self.generate_drop(opening)
            })
            .collect()
    }

    fn generate_drop(&mut self, opening: bool) -> Drop {
        let shape = match self.gamemode {
            Gamemode::Tsu => Shape::I,
            Gamemode::Fever => Shape::ALL[self.rng.next_index(Shape::ALL.len())],
        };

        let mut distinct: ArrayVec<Colour, 2> = ArrayVec::new();
        for _ in 0..shape.distinct_colours() {
            let colour = if opening {
                self.opening_palette[self.rng.next_index(self.opening_palette.len())]
            } else {
                // Mixed-colour shapes other than pairs never repeat a colour.
                let avoid = if shape == Shape::I { None } else { distinct.first().copied() };
                self.deal_colour(avoid)
            };
            distinct.push(colour);
        }

        let colours: ArrayVec<Colour, 4> = shape
            .colour_slots()
            .iter()
            .map(|&slot| distinct[slot])
            .collect();
        Drop::new(shape, &colours)
    }

    fn deal_colour(&mut self, avoid: Option<Colour>) -> Colour {
        if self.buckets.iter().all(|&b| b == 0) {
            self.refill_buckets();
        }

        let mut available: Vec<usize> = (0..self.num_colours)
            .filter(|&i| self.buckets[i] > 0)
            .collect();
        if let Some(avoid) = avoid {
            let filtered: Vec<usize> = available
                .iter()
                .copied()
                .filter(|&i| i + 1 != avoid as usize)
                .collect();
            if !filtered.is_empty() {
                available = filtered;
            }
        }

        let slot = available[self.rng.next_index(available.len())];
        self.buckets[slot] -= 1;
        (slot + 1) as Colour
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sine_stream_matches_formula() {
        let mut rng = SineRng::new(5);
        let x = 5f64.sin() * 10000.0;
        assert_eq!(rng.next_f64(), x - x.floor());
        let y = 6f64.sin() * 10000.0;
        assert_eq!(rng.next_f64(), y - y.floor());
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let settings = Settings::default().with_seed(1234);
        let mut a = DropGenerator::new(&settings);
        let mut b = DropGenerator::new(&settings);
        for i in 0..300 {
            let (da, db) = (a.get(i), b.get(i));
            assert_eq!((da.shape, &da.colours), (db.shape, &db.colours));
        }
    }

    #[test]
    fn test_batches_are_cached() {
        let mut gen = DropGenerator::new(&Settings::default().with_seed(9));
        let later = gen.get(200);
        let _ = gen.get(5);
        assert_eq!(gen.get(200), later);
    }

    #[test]
    fn test_tsu_only_pairs() {
        let mut gen = DropGenerator::new(&Settings::default());
        assert!(gen.batch(0).iter().all(|d| d.shape == Shape::I));
    }

    #[test]
    fn test_opening_palette_limits_colours() {
        let settings = Settings {
            num_colours: 5,
            ..Settings::default()
        }
        .with_seed(77);
        let mut gen = DropGenerator::new(&settings);
        let mut seen: Vec<Colour> = (0..OPENING_DROPS)
            .flat_map(|i| gen.get(i).colours.into_iter())
            .collect();
        seen.sort_unstable();
        seen.dedup();
        assert!(seen.len() <= 3);
    }

    fn colour_counts(batch: &[Drop], num_colours: usize) -> Vec<u32> {
        let mut counts = vec![0u32; num_colours + 1];
        for drop in batch {
            for &c in &drop.colours {
                counts[c as usize] += 1;
            }
        }
        counts
    }

    #[test]
    fn test_every_batch_starts_with_full_buckets() {
        // Four colours: 32 uses each, so 256 pair colours empty the buckets
        // exactly twice when a batch starts full.
        let settings = Settings::default().with_seed(3);
        let mut gen = DropGenerator::new(&settings);
        for index in 1..4 {
            let counts = colour_counts(gen.batch(index), 4);
            assert_eq!(counts, vec![0, 64, 64, 64, 64], "batch {index}");
        }
    }

    #[test]
    fn test_bucket_quota_rounds_up() {
        // Three colours: 43 uses each. One full cycle of 129, then 127 more
        // from a fresh refill, leaves every colour within two of 86.
        let settings = Settings {
            num_colours: 3,
            ..Settings::default()
        }
        .with_seed(21);
        let mut gen = DropGenerator::new(&settings);
        for index in 1..3 {
            let counts = colour_counts(gen.batch(index), 3);
            assert_eq!(counts[0], 0);
            assert_eq!(counts.iter().sum::<u32>(), 256);
            assert!(counts[1..].iter().all(|&c| (84..=86).contains(&c)), "batch {index}: {counts:?}");
        }
    }
}
