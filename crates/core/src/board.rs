//! Board module - column stacks, chain detection and nuisance placement
//!
//! The board is a list of `cols` columns, each a bottom-first stack of colours.
//! Empty cells are never stored, so a column's length is its height and a
//! column can never contain a gap.
//! Coordinates: (col, row) where col ranges 0..cols (left to right) and
//! row ranges 0..height (bottom to top).

use std::collections::{BTreeMap, HashSet};

use rand::seq::index::sample;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::{Colour, Direction, Gamemode, Settings, NUISANCE, POP_LIMIT, ROCK_ROWS};

/// Column whose height decides game over.
pub const DEATH_COLUMN: usize = 2;

/// Reference to one board cell, annotated during chain search.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PuyoRef {
    pub col: usize,
    pub row: usize,
    pub colour: Colour,
    /// Join tags towards same-coloured neighbours.
    pub connections: Vec<Direction>,
    /// Row this puyo settles on when it falls after a pop.
    pub above: Option<usize>,
}

impl PuyoRef {
    pub fn new(col: usize, row: usize, colour: Colour) -> Self {
        Self {
            col,
            row,
            colour,
            connections: Vec::new(),
            above: None,
        }
    }

    pub fn loc(&self) -> (usize, usize) {
        (self.col, self.row)
    }
}

/// One round of simultaneous pops.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChainStep {
    /// Coloured puyos popped, as they stood before deletion.
    pub puyos: Vec<PuyoRef>,
    /// Nuisance cleared by adjacency.
    pub nuisance: Vec<PuyoRef>,
}

impl ChainStep {
    /// Every cell removed by this step.
    pub fn all(&self) -> impl Iterator<Item = &PuyoRef> {
        self.puyos.iter().chain(self.nuisance.iter())
    }
}

/// Outcome of [`Board::drop_nuisance`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NuisanceDrop {
    /// Nuisance added per column, before trimming.
    pub columns: Vec<u32>,
    /// Total nuisance taken from the queue.
    pub dropped: u32,
}

/// The playfield.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    rows: usize,
    gamemode: Gamemode,
    columns: Vec<Vec<Colour>>,
}

impl Board {
    /// Create an empty board sized by `settings`.
    pub fn new(settings: &Settings) -> Self {
        Self {
            rows: settings.rows as usize,
            gamemode: settings.gamemode,
            columns: vec![Vec::new(); settings.cols as usize],
        }
    }

    /// Create a board from bottom-first column stacks.
    ///
    /// Missing columns are added empty; extra columns are dropped.
    pub fn from_columns(settings: &Settings, mut columns: Vec<Vec<Colour>>) -> Self {
        columns.resize(settings.cols as usize, Vec::new());
        Self {
            rows: settings.rows as usize,
            gamemode: settings.gamemode,
            columns,
        }
    }

    /// Visible rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Vec<Colour>] {
        &self.columns
    }

    /// Height of `col`, or 0 if out of range.
    pub fn height(&self, col: usize) -> usize {
        self.columns.get(col).map_or(0, Vec::len)
    }

    pub fn get(&self, col: usize, row: usize) -> Option<Colour> {
        self.columns.get(col)?.get(row).copied()
    }

    fn get_signed(&self, col: i64, row: i64) -> Option<Colour> {
        if col < 0 || row < 0 {
            return None;
        }
        self.get(col as usize, row as usize)
    }

    /// Number of stored cells.
    pub fn count(&self) -> usize {
        self.columns.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.iter().all(Vec::is_empty)
    }

    /// Stack a puyo on top of `col`. Returns the row it landed on.
    pub fn add_puyo(&mut self, col: usize, colour: Colour) -> Option<usize> {
        let column = self.columns.get_mut(col)?;
        column.push(colour);
        Some(column.len() - 1)
    }

    /// Whether the death column (and its right neighbour under Fever) is full.
    pub fn check_game_over(&self) -> bool {
        let full = |col: usize| self.height(col) >= self.rows;
        match self.gamemode {
            Gamemode::Tsu => full(DEATH_COLUMN),
            Gamemode::Fever => full(DEATH_COLUMN) || full(DEATH_COLUMN + 1),
        }
    }

    /// Flood-fill the board into groups of equal colour.
    ///
    /// Nuisance cells are always singleton groups. Each adjacent same-colour
    /// pair gets exactly one direction tag, on the cell it is first examined
    /// from. Scan order is columns left to right, rows bottom to top, and
    /// neighbours in [`Direction::ALL`] order. Only groups of at least
    /// `min_len` cells are returned.
    pub fn get_connections(&self, min_len: usize) -> Vec<Vec<PuyoRef>> {
        let mut visited: Vec<Vec<bool>> =
            self.columns.iter().map(|c| vec![false; c.len()]).collect();
        let mut tagged: HashSet<((usize, usize), (usize, usize))> = HashSet::new();
        let mut groups = Vec::new();

        for col in 0..self.columns.len() {
            for row in 0..self.columns[col].len() {
                if visited[col][row] {
                    continue;
                }
                let mut group = Vec::new();
                self.visit(col, row, &mut visited, &mut tagged, &mut group);
                if group.len() >= min_len {
                    groups.push(group);
                }
            }
        }

        groups
    }

    fn visit(
        &self,
        col: usize,
        row: usize,
        visited: &mut [Vec<bool>],
        tagged: &mut HashSet<((usize, usize), (usize, usize))>,
        group: &mut Vec<PuyoRef>,
    ) {
        visited[col][row] = true;
        let colour = self.columns[col][row];
        let index = group.len();
        group.push(PuyoRef::new(col, row, colour));

        if colour == NUISANCE {
            return;
        }

        for dir in Direction::ALL {
            let (dc, dr) = dir.delta();
            let (nc, nr) = (col as i64 + dc, row as i64 + dr);
            if self.get_signed(nc, nr) != Some(colour) {
                continue;
            }
            let (nc, nr) = (nc as usize, nr as usize);

            let pair = if (col, row) < (nc, nr) {
                ((col, row), (nc, nr))
            } else {
                ((nc, nr), (col, row))
            };
            if tagged.insert(pair) {
                group[index].connections.push(dir);
            }
            if !visited[nc][nr] {
                self.visit(nc, nr, visited, tagged, group);
            }
        }
    }

    /// Pop every group of [`POP_LIMIT`] or more until the board is stable.
    ///
    /// Mutates the board. The result holds one step per chain link, first
    /// step first, each with the cells as they stood before deletion.
    pub fn resolve_chains(&mut self) -> Vec<ChainStep> {
        let mut steps = Vec::new();
        loop {
            let puyos: Vec<PuyoRef> = self
                .get_connections(POP_LIMIT)
                .into_iter()
                .filter(|group| group.first().is_some_and(|p| p.colour != NUISANCE))
                .flatten()
                .collect();
            if puyos.is_empty() {
                break;
            }

            let nuisance = self.find_nuisance_popped(&puyos);
            let step = ChainStep { puyos, nuisance };
            let locs: Vec<(usize, usize)> = step.all().map(PuyoRef::loc).collect();
            self.delete_puyos(&locs);
            steps.push(step);
        }
        steps
    }

    /// Remove the given cells and compact each affected column.
    ///
    /// Duplicate and out-of-range locations are ignored.
    pub fn delete_puyos(&mut self, locs: &[(usize, usize)]) {
        let mut by_column: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for &(col, row) in locs {
            if row < self.height(col) {
                by_column.entry(col).or_default().push(row);
            }
        }
        for (col, mut rows) in by_column {
            rows.sort_unstable();
            rows.dedup();
            let column = &mut self.columns[col];
            for row in rows.into_iter().rev() {
                column.remove(row);
            }
        }
    }

    /// Nuisance cells adjacent to any of `puyos`, each listed once.
    pub fn find_nuisance_popped(&self, puyos: &[PuyoRef]) -> Vec<PuyoRef> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for puyo in puyos {
            for dir in Direction::ALL {
                let (dc, dr) = dir.delta();
                let (nc, nr) = (puyo.col as i64 + dc, puyo.row as i64 + dr);
                if self.get_signed(nc, nr) == Some(NUISANCE) {
                    let loc = (nc as usize, nr as usize);
                    if seen.insert(loc) {
                        found.push(PuyoRef::new(loc.0, loc.1, NUISANCE));
                    }
                }
            }
        }
        found
    }

    /// Surviving puyos that will fall once `popped` is deleted.
    ///
    /// Each returned reference carries its landing row in `above`.
    pub fn falling_after(&self, popped: &[(usize, usize)]) -> Vec<PuyoRef> {
        let mut falling = Vec::new();
        for (col, column) in self.columns.iter().enumerate() {
            let mut removed = 0;
            for (row, &colour) in column.iter().enumerate() {
                if popped.contains(&(col, row)) {
                    removed += 1;
                } else if removed > 0 {
                    let mut puyo = PuyoRef::new(col, row, colour);
                    puyo.above = Some(row - removed);
                    falling.push(puyo);
                }
            }
        }
        falling
    }

    /// Cap every column at `rows + 1` cells.
    pub fn trim(&mut self) {
        let cap = self.rows + 1;
        for column in &mut self.columns {
            column.truncate(cap);
        }
    }

    /// Drop up to `amount` nuisance.
    ///
    /// A full rock (five rows on every column) falls when `amount` covers it;
    /// otherwise whole rows fall and the remainder goes to distinct random
    /// columns.
    pub fn drop_nuisance<R: Rng + ?Sized>(&mut self, amount: u32, rng: &mut R) -> NuisanceDrop {
        let cols = self.columns.len();
        if cols == 0 || amount == 0 {
            return NuisanceDrop {
                columns: vec![0; cols],
                dropped: 0,
            };
        }

        let rock = cols as u32 * ROCK_ROWS;
        let (counts, dropped) = if amount >= rock {
            (vec![ROCK_ROWS; cols], rock)
        } else {
            let mut counts = vec![amount / cols as u32; cols];
            let remainder = (amount % cols as u32) as usize;
            for col in sample(rng, cols, remainder) {
                counts[col] += 1;
            }
            (counts, amount)
        };

        for (column, &count) in self.columns.iter_mut().zip(&counts) {
            column.extend(std::iter::repeat(NUISANCE).take(count as usize));
        }
        self.trim();

        NuisanceDrop {
            columns: counts,
            dropped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn board(columns: Vec<Vec<Colour>>) -> Board {
        Board::from_columns(&Settings::default(), columns)
    }

    #[test]
    fn test_from_columns_pads_to_width() {
        let b = board(vec![vec![1, 2]]);
        assert_eq!(b.cols(), 6);
        assert_eq!(b.height(0), 2);
        assert_eq!(b.height(5), 0);
        assert_eq!(b.height(99), 0);
    }

    #[test]
    fn test_game_over_tsu_and_fever() {
        let mut columns = vec![Vec::new(); 6];
        columns[3] = vec![1; 12];
        let tsu = board(columns.clone());
        assert!(!tsu.check_game_over());

        let fever = Board::from_columns(
            &Settings {
                gamemode: Gamemode::Fever,
                ..Settings::default()
            },
            columns.clone(),
        );
        assert!(fever.check_game_over());

        columns[2] = vec![1; 12];
        assert!(board(columns).check_game_over());
    }

    #[test]
    fn test_connection_tags_once_per_pair() {
        // 2x2 block of colour 1
        let b = board(vec![vec![1, 1], vec![1, 1]]);
        let groups = b.get_connections(0);
        assert_eq!(groups.len(), 1);
        let tags: usize = groups[0].iter().map(|p| p.connections.len()).sum();
        assert_eq!(tags, 4);

        let first = &groups[0][0];
        assert_eq!(first.loc(), (0, 0));
        assert_eq!(first.connections, vec![Direction::Up]);
        assert_eq!(groups[0][1].connections, vec![Direction::Right]);
    }

    #[test]
    fn test_nuisance_is_never_joined() {
        let b = board(vec![vec![0, 0], vec![0, 0]]);
        let groups = b.get_connections(0);
        assert_eq!(groups.len(), 4);
        assert!(groups.iter().all(|g| g.len() == 1 && g[0].connections.is_empty()));
    }

    #[test]
    fn test_delete_compacts_columns() {
        let mut b = board(vec![vec![1, 2, 3, 4]]);
        b.delete_puyos(&[(0, 1), (0, 2), (0, 1)]);
        assert_eq!(b.columns()[0], vec![1, 4]);
    }

    #[test]
    fn test_falling_after_marks_landing_rows() {
        let b = board(vec![vec![1, 2, 3, 4]]);
        let falling = b.falling_after(&[(0, 0), (0, 1)]);
        assert_eq!(falling.len(), 2);
        assert_eq!(falling[0].loc(), (0, 2));
        assert_eq!(falling[0].above, Some(0));
        assert_eq!(falling[1].above, Some(1));
    }

    #[test]
    fn test_nuisance_popped_is_deduplicated() {
        // Nuisance at (1,0) touches both popped cells (0,0) and (2,0)
        let b = board(vec![vec![1], vec![0], vec![1]]);
        let popped = vec![PuyoRef::new(0, 0, 1), PuyoRef::new(2, 0, 1)];
        let found = b.find_nuisance_popped(&popped);
        assert_eq!(found, vec![PuyoRef::new(1, 0, NUISANCE)]);
    }

    #[test]
    fn test_drop_nuisance_remainder_uses_distinct_columns() {
        let mut b = board(Vec::new());
        let mut rng = StdRng::seed_from_u64(7);
        let result = b.drop_nuisance(9, &mut rng);
        assert_eq!(result.dropped, 9);
        assert_eq!(result.columns.iter().sum::<u32>(), 9);
        assert!(result.columns.iter().all(|&c| c == 1 || c == 2));
        assert_eq!(result.columns.iter().filter(|&&c| c == 2).count(), 3);
    }

    #[test]
    fn test_drop_nuisance_caps_at_one_rock() {
        let mut b = board(Vec::new());
        let mut rng = StdRng::seed_from_u64(1);
        let result = b.drop_nuisance(100, &mut rng);
        assert_eq!(result.dropped, 30);
        assert!((0..6).all(|c| b.height(c) == 5));
    }
}
