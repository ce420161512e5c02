//! Game engine - one player's board driven frame by frame
//!
//! [`GameEngine::step`] advances exactly one frame. The engine owns the board,
//! the current drop, the drop queue, score and nuisance bookkeeping. Player
//! input arrives through [`GameEngine::apply_action`]; opponent nuisance
//! arrives through [`GameEngine::receive_nuisance`] and
//! [`GameEngine::activate_nuisance`]. Everything the owner needs to forward
//! is queued as [`EngineEvent`]s.

use std::collections::VecDeque;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use puyo_versus_core::drop::{snap, EPSILON};
use puyo_versus_core::{
    calculate_score, calculate_soft_drop_score, Board, ChainStep, Drop, DropGenerator,
    MarginTimer, Point, PuyoRef,
};
use puyo_versus_types::{
    Clock, Direction, GameAction, GameResult, ParticipantId, Rotating, Settings, DROP_FRAMES,
    LOCK_DELAY_FRAMES, NUISANCE_FRAMES_PER_ROW, NUISANCE_LAND_FRAMES, POP_FRAMES,
    QUEUE_SHIFT_FRAMES, ROTATE_180_MS, SPLIT_FRAMES_PER_ROW, SQUISH_FRAMES,
};

use crate::mode::{Dropping, Mode, SplitPuyo};
use crate::nuisance::NuisanceLedger;

/// Drops shown in the preview queue.
pub const QUEUE_PREVIEW: usize = 2;

/// Extra height added by an upward kick so the drop clears the stack.
const KICK_CLEARANCE: f64 = 0.001;

/// Nuisance bonus per column for clearing the whole board.
const ALL_CLEAR_ROWS: u32 = 5;

/// Something the engine's owner should act on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    /// A drop locked, crediting `soft_drop_points`.
    Locked { soft_drop_points: u32 },
    /// One chain step popped.
    ChainStep { chain: u32, score: u32, popped: usize },
    /// Nuisance left over after cancellation, to be announced to opponents.
    NuisanceSent { amount: u32 },
    /// The chain that sent nuisance has finished.
    ActivateNuisance,
    /// The board topped out.
    GameOver,
}

/// Per-player simulation.
pub struct GameEngine {
    settings: Settings,
    board: Board,
    generator: DropGenerator,
    next_index: usize,
    current: Option<Drop>,
    queue: VecDeque<Drop>,
    mode: Mode,
    frame: u64,
    score: u32,
    ledger: NuisanceLedger,
    margin: MarginTimer,
    clock: Arc<dyn Clock>,
    start_ms: u64,
    chains: Vec<ChainStep>,
    chain_cursor: usize,
    chain_sent: u32,
    result: Option<GameResult>,
    events: VecDeque<EngineEvent>,
    nuisance_rng: StdRng,
    failed_rotation: Option<(Rotating, u64)>,
}

impl GameEngine {
    pub fn new(settings: Settings, clock: Arc<dyn Clock>) -> Self {
        let mut generator = DropGenerator::new(&settings);
        let queue: VecDeque<Drop> = (0..QUEUE_PREVIEW).map(|i| generator.get(i)).collect();
        let start_ms = clock.now_ms();

        Self {
            board: Board::new(&settings),
            generator,
            next_index: QUEUE_PREVIEW,
            current: None,
            queue,
            mode: Mode::default(),
            frame: 0,
            score: 0,
            ledger: NuisanceLedger::new(),
            margin: MarginTimer::new(settings.target_points, settings.margin_time),
            clock,
            start_ms,
            chains: Vec::new(),
            chain_cursor: 0,
            chain_sent: 0,
            result: None,
            events: VecDeque::new(),
            nuisance_rng: StdRng::seed_from_u64(settings.seed as u64),
            failed_rotation: None,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Mutable board access (for setting up positions).
    pub fn board_mut(&mut self) -> &mut Board {
        &mut self.board
    }

    pub fn current_drop(&self) -> Option<&Drop> {
        self.current.as_ref()
    }

    pub fn queue(&self) -> &VecDeque<Drop> {
        &self.queue
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    /// Frames stepped so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    /// Drops taken from the generator so far, including the preview.
    pub fn drops_generated(&self) -> usize {
        self.next_index
    }

    pub fn nuisance(&self) -> &NuisanceLedger {
        &self.ledger
    }

    pub fn target_points(&self) -> u32 {
        self.margin.target_points()
    }

    /// Chain steps of the chain in progress.
    pub fn chains(&self) -> &[ChainStep] {
        &self.chains
    }

    /// Terminal result, once no chain or nuisance is pending.
    pub fn end(&self) -> Option<GameResult> {
        if self.mode.is_resolving() {
            None
        } else {
            self.result
        }
    }

    /// Set the result from outside (win, timeout). The first result sticks.
    pub fn declare_result(&mut self, result: GameResult) {
        if self.result.is_none() {
            self.result = Some(result);
        }
    }

    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        self.events.drain(..).collect()
    }

    /// Nuisance announced by an opponent.
    pub fn receive_nuisance(&mut self, from: ParticipantId, amount: u32) {
        self.ledger.receive(from, amount);
    }

    /// An opponent's chain ended; their announced nuisance becomes active.
    pub fn activate_nuisance(&mut self, from: ParticipantId) {
        self.ledger.activate(from);
    }

    /// Advance one frame. Returns false once the game has ended.
    pub fn step(&mut self, soft_drop: bool) -> bool {
        if self.end().is_some() {
            return false;
        }

        self.frame += 1;
        let elapsed = self.clock.now_ms().saturating_sub(self.start_ms);
        if self.margin.update(elapsed) {
            debug!(target_points = self.margin.target_points(), "margin time reduced target");
        }

        self.mode = match std::mem::take(&mut self.mode) {
            Mode::QueueShifting { frame } => self.step_queue_shifting(frame),
            Mode::PuyoDropping(state) => self.step_dropping(state, soft_drop),
            Mode::PuyoDroppingSplit { puyos } => self.step_split(puyos),
            Mode::PuyoSquishing { frame } => self.step_squishing(frame),
            Mode::ChainResolving {
                frame,
                length,
                falling,
            } => self.step_chain_resolving(frame, length, falling),
            Mode::ChainSquishing { frame } => self.step_chain_squishing(frame),
            Mode::NuisanceDropping { frame, length } => self.step_nuisance_dropping(frame, length),
        };
        true
    }

    /// Apply a player input. Illegal inputs change nothing and return false.
    pub fn apply_action(&mut self, action: GameAction) -> bool {
        if !matches!(self.mode, Mode::PuyoDropping(_)) || self.end().is_some() {
            return false;
        }
        match action {
            GameAction::MoveLeft => self.try_move(Direction::Left),
            GameAction::MoveRight => self.try_move(Direction::Right),
            GameAction::RotateCw => self.try_rotate(Rotating::Cw),
            GameAction::RotateCcw => self.try_rotate(Rotating::Ccw),
        }
    }

    // ---- queue -----------------------------------------------------------

    fn step_queue_shifting(&mut self, frame: u32) -> Mode {
        if frame == 0 {
            if self.result.is_some() {
                return Mode::QueueShifting { frame };
            }
            if self.board.check_game_over() {
                debug!(frame = self.frame, score = self.score, "board topped out");
                self.result = Some(GameResult::Loss);
                self.events.push_back(EngineEvent::GameOver);
                return Mode::QueueShifting { frame };
            }
        }

        let frame = frame + 1;
        if frame < QUEUE_SHIFT_FRAMES {
            return Mode::QueueShifting { frame };
        }
        self.spawn_next();
        Mode::PuyoDropping(Dropping::default())
    }

    fn spawn_next(&mut self) {
        let next = self.generator.get(self.next_index);
        self.next_index += 1;
        self.queue.push_back(next);

        let mut drop = match self.queue.pop_front() {
            Some(drop) => drop,
            None => self.generator.get(self.next_index - 1),
        };
        drop.spawn(self.board.rows());
        self.current = Some(drop);
        self.failed_rotation = None;
    }

    // ---- dropping --------------------------------------------------------

    fn step_dropping(&mut self, mut state: Dropping, soft_drop: bool) -> Mode {
        let Some(mut drop) = self.current.take() else {
            return Mode::default();
        };

        drop.affect_rotation();

        if check_lock(&self.board, &drop) {
            if state.force_lock || !drop.is_rotating() {
                return self.lock_drop(drop, state);
            }
            state.lock_delay = true;
        }

        if state.lock_delay {
            state.lock_frames += 1;
            if state.lock_frames >= LOCK_DELAY_FRAMES {
                drop.finish_rotation();
                return self.lock_drop(drop, state);
            }
        }

        let speed = if soft_drop {
            self.settings.soft_drop
        } else {
            self.settings.gravity
        };
        let fall = speed.min(clearance(&self.board, &drop)).max(0.0);
        if fall > 0.0 {
            drop.shift(Direction::Down, fall);
            if soft_drop {
                state.soft_drop_frames += 1;
            }
        }
        if soft_drop && check_lock(&self.board, &drop) {
            state.force_lock = true;
        }

        self.current = Some(drop);
        Mode::PuyoDropping(state)
    }

    fn try_move(&mut self, dir: Direction) -> bool {
        let Some(drop) = self.current.as_mut() else {
            return false;
        };
        let mut moved = drop.clone();
        moved.shift(dir, 1.0);
        if !fits(&self.board, &moved) || !fits(&self.board, &moved.finished()) {
            return false;
        }
        *drop = moved;
        true
    }

    fn try_rotate(&mut self, direction: Rotating) -> bool {
        let Some(drop) = self.current.clone() else {
            return false;
        };
        if drop.is_rotating() {
            return false;
        }

        let mut target = drop.clone();
        match direction {
            Rotating::Cw => target.rotate_cw(),
            Rotating::Ccw => target.rotate_ccw(),
            Rotating::None => return false,
        };

        if let Some((kicked, forces_delay)) = check_kick(&self.board, &target) {
            if forces_delay {
                self.start_lock_delay();
            }
            self.current = Some(kicked);
            self.failed_rotation = None;
            return true;
        }

        let now = self.clock.now_ms();
        let double_tap = matches!(
            self.failed_rotation,
            Some((dir, at)) if dir == direction && now.saturating_sub(at) <= ROTATE_180_MS
        );
        if !double_tap {
            self.failed_rotation = Some((direction, now));
            return false;
        }

        let mut spin = drop.clone();
        let vertical = drop
            .satellites()
            .first()
            .is_some_and(|s| s.x == drop.arle.x && s.y > drop.arle.y);
        if vertical {
            let distance = drop.arle.y - self.board.height(column_of(&self.board, drop.arle.x)) as f64;
            if distance < 1.0 {
                spin.shift(Direction::Up, 1.0 - distance);
            }
        }
        spin.rotate_180(direction);
        if !fits(&self.board, &spin.finished()) {
            self.failed_rotation = Some((direction, now));
            return false;
        }

        self.current = Some(spin);
        self.failed_rotation = None;
        true
    }

    fn start_lock_delay(&mut self) {
        if let Mode::PuyoDropping(state) = &mut self.mode {
            state.lock_delay = true;
        }
    }

    fn lock_drop(&mut self, mut drop: Drop, state: Dropping) -> Mode {
        drop.finish_rotation();
        drop.schezo = drop.satellites().first().copied();

        let soft_drop_points = calculate_soft_drop_score(state.soft_drop_frames);
        self.score += soft_drop_points;
        self.events
            .push_back(EngineEvent::Locked { soft_drop_points });

        let mut puyos: Vec<(usize, f64, u8)> = drop
            .puyos()
            .iter()
            .map(|(p, colour)| (column_of(&self.board, p.x), p.y, *colour))
            .collect();
        puyos.sort_by(|a, b| a.1.total_cmp(&b.1));

        let gap = |board: &Board, col: usize, y: f64| y - board.height(col) as f64;
        let mut contact: Vec<usize> = puyos
            .iter()
            .filter(|(col, y, _)| gap(&self.board, *col, *y) <= EPSILON)
            .map(|(col, _, _)| *col)
            .collect();
        if contact.is_empty() {
            if let Some((col, _, _)) = puyos
                .iter()
                .min_by(|a, b| gap(&self.board, a.0, a.1).total_cmp(&gap(&self.board, b.0, b.1)))
            {
                contact.push(*col);
            }
        }

        let mut split = Vec::new();
        for (col, y, colour) in puyos {
            if contact.contains(&col) {
                self.board.add_puyo(col, colour);
            } else {
                split.push(SplitPuyo { col, y, colour });
            }
        }

        if split.is_empty() {
            Mode::PuyoSquishing { frame: 0 }
        } else {
            Mode::PuyoDroppingSplit { puyos: split }
        }
    }

    fn step_split(&mut self, puyos: Vec<SplitPuyo>) -> Mode {
        let speed = 1.0 / SPLIT_FRAMES_PER_ROW;
        let mut falling = Vec::with_capacity(puyos.len());
        for mut puyo in puyos {
            let floor = self.board.height(puyo.col) as f64;
            if puyo.y - speed <= floor {
                self.board.add_puyo(puyo.col, puyo.colour);
            } else {
                puyo.y = snap(puyo.y - speed);
                falling.push(puyo);
            }
        }

        if falling.is_empty() {
            Mode::PuyoSquishing { frame: 0 }
        } else {
            Mode::PuyoDroppingSplit { puyos: falling }
        }
    }

    fn step_squishing(&mut self, frame: u32) -> Mode {
        let frame = frame + 1;
        if frame < SQUISH_FRAMES {
            return Mode::PuyoSquishing { frame };
        }

        self.board.trim();
        self.chains = self.board.clone().resolve_chains();
        self.chain_cursor = 0;
        self.chain_sent = 0;
        if self.chains.is_empty() {
            self.after_chain()
        } else {
            debug!(length = self.chains.len(), "chain started");
            self.begin_chain_step()
        }
    }

    // ---- chains ----------------------------------------------------------

    fn chain_locs(&self) -> Vec<(usize, usize)> {
        self.chains
            .get(self.chain_cursor)
            .map(|step| step.all().map(PuyoRef::loc).collect())
            .unwrap_or_default()
    }

    fn begin_chain_step(&mut self) -> Mode {
        let Some(step) = self.chains.get(self.chain_cursor) else {
            return self.finish_chain();
        };
        let chain = self.chain_cursor + 1;
        let gain = calculate_score(&step.puyos, chain);
        let popped = step.puyos.len();
        self.score += gain;

        if self.chains.len() as u32 >= self.settings.min_chain {
            let sent = self.ledger.convert(gain, self.margin.target_points());
            self.send(sent);
        }
        self.events.push_back(EngineEvent::ChainStep {
            chain: chain as u32,
            score: gain,
            popped,
        });

        let falling = self.board.falling_after(&self.chain_locs());
        let length = if falling.is_empty() {
            POP_FRAMES
        } else {
            POP_FRAMES + DROP_FRAMES
        };
        Mode::ChainResolving {
            frame: 0,
            length,
            falling,
        }
    }

    fn send(&mut self, amount: u32) {
        if amount == 0 {
            return;
        }
        let outgoing = self.ledger.cancel(amount);
        if outgoing > 0 {
            self.chain_sent += outgoing;
            self.events
                .push_back(EngineEvent::NuisanceSent { amount: outgoing });
        }
    }

    fn step_chain_resolving(&mut self, frame: u32, length: u32, falling: Vec<PuyoRef>) -> Mode {
        let frame = frame + 1;
        if frame == POP_FRAMES {
            let locs = self.chain_locs();
            self.board.delete_puyos(&locs);
        }
        if frame < length {
            return Mode::ChainResolving {
                frame,
                length,
                falling,
            };
        }
        Mode::ChainSquishing { frame: 0 }
    }

    fn step_chain_squishing(&mut self, frame: u32) -> Mode {
        let frame = frame + 1;
        if frame < SQUISH_FRAMES {
            return Mode::ChainSquishing { frame };
        }
        self.chain_cursor += 1;
        if self.chain_cursor < self.chains.len() {
            self.begin_chain_step()
        } else {
            self.finish_chain()
        }
    }

    fn finish_chain(&mut self) -> Mode {
        if !self.chains.is_empty() && self.board.is_empty() {
            debug!("all clear");
            self.send(ALL_CLEAR_ROWS * self.board.cols() as u32);
        }
        if self.chain_sent > 0 {
            self.events.push_back(EngineEvent::ActivateNuisance);
        }
        debug!(
            length = self.chains.len(),
            sent = self.chain_sent,
            score = self.score,
            "chain finished"
        );
        self.chains.clear();
        self.chain_cursor = 0;
        self.chain_sent = 0;
        self.after_chain()
    }

    // ---- nuisance --------------------------------------------------------

    fn after_chain(&mut self) -> Mode {
        let active = self.ledger.active();
        if active == 0 {
            return Mode::default();
        }

        let dropped = self
            .board
            .drop_nuisance(active, &mut self.nuisance_rng)
            .dropped;
        self.ledger.consume_active(dropped);
        debug!(dropped, remaining = self.ledger.active(), "nuisance dropped");

        let fall = ((self.board.rows() + 2) as f64 * NUISANCE_FRAMES_PER_ROW).ceil() as u32;
        Mode::NuisanceDropping {
            frame: 0,
            length: fall + NUISANCE_LAND_FRAMES,
        }
    }

    fn step_nuisance_dropping(&mut self, frame: u32, length: u32) -> Mode {
        let frame = frame + 1;
        if frame < length {
            Mode::NuisanceDropping { frame, length }
        } else {
            Mode::default()
        }
    }
}

impl std::fmt::Debug for GameEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameEngine")
            .field("mode", &self.mode.name())
            .field("frame", &self.frame)
            .field("score", &self.score)
            .field("result", &self.result)
            .finish()
    }
}

// ---- geometry -------------------------------------------------------------

/// Board column for an x coordinate, clamped to the board.
fn column_of(board: &Board, x: f64) -> usize {
    let max = board.cols().saturating_sub(1) as f64;
    x.round().clamp(0.0, max) as usize
}

/// Columns touched by an x coordinate that may sit between two columns.
fn columns_under(x: f64) -> (i64, i64) {
    ((x + EPSILON).floor() as i64, (x - EPSILON).ceil() as i64)
}

/// Whether every puyo of `drop` is inside the board and above the stack.
pub fn fits(board: &Board, drop: &Drop) -> bool {
    drop.puyos().iter().all(|(p, _)| point_fits(board, p))
}

fn point_fits(board: &Board, p: &Point) -> bool {
    let (left, right) = columns_under(p.x);
    if left < 0 || right >= board.cols() as i64 {
        return false;
    }
    (left..=right).all(|col| p.y + EPSILON >= board.height(col as usize) as f64)
}

/// Distance the drop can fall before any puyo meets the stack.
fn clearance(board: &Board, drop: &Drop) -> f64 {
    drop.puyos()
        .iter()
        .flat_map(|(p, _)| {
            let (left, right) = columns_under(p.x);
            (left..=right).map(move |col| (col, p.y))
        })
        .filter(|&(col, _)| col >= 0 && (col as usize) < board.cols())
        .map(|(col, y)| y - board.height(col as usize) as f64)
        .fold(f64::INFINITY, f64::min)
}

/// Whether a drop has come to rest.
///
/// A rotating drop compares the pivot and each satellite against the stack
/// according to the quadrant the satellite is sweeping through. A drop in
/// the middle of a 180° spin never locks.
pub fn check_lock(board: &Board, drop: &Drop) -> bool {
    if drop.rotating_180 > 0 {
        return false;
    }
    let h = |x: f64| board.height(column_of(board, x)) as f64;
    let a = drop.arle;
    let arle_rests = || h(a.x) >= a.y;

    match drop.rotating {
        Rotating::None => drop.puyos().iter().any(|(p, _)| h(p.x) >= p.y),
        Rotating::Cw => drop.satellites().iter().any(|s| {
            if s.x > a.x && s.y > a.y {
                h(s.x.ceil()) >= s.y || arle_rests()
            } else if s.x > a.x {
                h(a.x) > s.y
            } else if s.y < a.y {
                h(s.x.floor()) >= s.y || arle_rests()
            } else {
                h(a.x) > a.y
            }
        }),
        Rotating::Ccw => drop.satellites().iter().any(|s| {
            if s.x > a.x && s.y > a.y {
                h(a.x) > a.y
            } else if s.x > a.x {
                h(s.x.ceil()) >= s.y || arle_rests()
            } else if s.y < a.y {
                h(a.x) > s.y
            } else {
                h(s.x.floor()) >= s.y || arle_rests()
            }
        }),
    }
}

/// Resolve a rotation that may collide.
///
/// Tries the rotation in place, then shifted one column away from a blocked
/// side, then pushed up out of the stack. Returns the adjusted drop and
/// whether the kick forces lock delay.
pub fn check_kick(board: &Board, rotated: &Drop) -> Option<(Drop, bool)> {
    let finished = rotated.finished();
    if fits(board, &finished) {
        return Some((rotated.clone(), false));
    }

    let a = finished.arle;
    let blocked: Vec<Point> = finished
        .satellites()
        .into_iter()
        .filter(|s| !point_fits(board, s))
        .collect();

    let mut sideways = Vec::new();
    if blocked.iter().any(|s| s.x > a.x) {
        sideways.push(Direction::Left);
    }
    if blocked.iter().any(|s| s.x < a.x) {
        sideways.push(Direction::Right);
    }
    for dir in sideways {
        let mut shifted = rotated.clone();
        shifted.shift(dir, 1.0);
        if fits(board, &shifted.finished()) {
            return Some((shifted, false));
        }
    }

    let lift = blocked
        .iter()
        .filter(|s| s.y < a.y)
        .map(|s| board.height(column_of(board, s.x)) as f64 - s.y + KICK_CLEARANCE)
        .fold(0.0, f64::max);
    if lift > 0.0 {
        let mut raised = rotated.clone();
        raised.shift(Direction::Up, lift);
        if fits(board, &raised.finished()) {
            return Some((raised, true));
        }
    }

    None
}
