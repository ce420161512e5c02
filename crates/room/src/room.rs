//! Room - membership, rounds, and lockstep pacing
//!
//! A room owns its member lists, the server-driven CPU sessions of the current
//! round, and the frame counters used for pacing.
//!
//! # Pacing
//!
//! Every `sendState` advances the sender's frame counter by one. With
//! `min` the lowest counter among undefeated participants:
//!
//! | Condition | Effect |
//! |-----------|--------|
//! | sender leads `min` by more than `MAX_FRAME_DIFFERENCE` | sender is paused |
//! | everyone but the slowest is paused | timeout scheduled (shorter if the slowest is unfocused) |
//! | sender is at `min` | paused participants leading by less than `RESUME_FRAME_DIFFERENCE` resume |
//! | timeout fires | slowest is defeated as a disconnect, everyone resumes |
//!
//! A round ends when at most one undefeated participant remains (none, for a
//! solo round).

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use puyo_versus_engine::{cpu_from_name, CpuDriver, ParticipantMessage, Session};
use puyo_versus_types::{
    Clock, GameResult, ParticipantId, Settings, CPU_TICK_MICROS, MAX_FRAME_DIFFERENCE,
    PACING_TIMEOUT_MS, RESUME_FRAME_DIFFERENCE, UNFOCUSED_TIMEOUT_MS,
};

use crate::error::RoomError;
use crate::protocol::{CpuSpec, Outbound, RoomType, ServerMessage};
use crate::scheduler::{Scheduler, TimerHandle};

/// Timer event addressed to a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomTimer {
    pub room_id: String,
    pub kind: TimerKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    PacingTimeout,
    CpuTick,
}

/// A CPU participant's session for the current round.
struct CpuParticipant {
    id: ParticipantId,
    session: Session,
    driver: CpuDriver,
}

impl CpuParticipant {
    fn deliver(&mut self, message: &ServerMessage) {
        match *message {
            ServerMessage::Pause => self.session.set_paused(true),
            ServerMessage::Play => self.session.set_paused(false),
            ServerMessage::Timeout => self.session.stop(),
            ServerMessage::Nuisance {
                participant_id,
                nuisance_amount,
            } => self.session.receive(&ParticipantMessage::SendNuisance {
                participant_id,
                nuisance_amount,
            }),
            ServerMessage::ActivateNuisance { participant_id } => self
                .session
                .receive(&ParticipantMessage::ActivateNuisance { participant_id }),
            ServerMessage::WinnerResult {
                participant_id: Some(winner),
            } if winner == self.id => self.session.declare_result(GameResult::Win),
            _ => {}
        }
    }
}

pub struct Room {
    id: String,
    room_type: RoomType,
    size: usize,
    settings: Settings,
    password: Option<String>,
    host: Option<ParticipantId>,
    /// Human players, in join order.
    members: Vec<ParticipantId>,
    spectators: Vec<ParticipantId>,
    cpu_specs: Vec<(ParticipantId, CpuSpec)>,
    cpus: Vec<CpuParticipant>,
    in_game: bool,
    round_players: Vec<ParticipantId>,
    frames: BTreeMap<ParticipantId, u64>,
    paused: Vec<ParticipantId>,
    unfocused: HashSet<ParticipantId>,
    undefeated: Vec<ParticipantId>,
    wins: BTreeMap<ParticipantId, u32>,
    timeout: Option<TimerHandle>,
    cpu_tick: Option<TimerHandle>,
    clock: Arc<dyn Clock>,
    outbox: Vec<Outbound>,
}

impl Room {
    pub fn new(
        id: impl Into<String>,
        room_type: RoomType,
        size: usize,
        settings: Settings,
        password: Option<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            id: id.into(),
            room_type,
            size: size.max(1),
            settings,
            password: password.filter(|p| !p.is_empty()),
            host: None,
            members: Vec::new(),
            spectators: Vec::new(),
            cpu_specs: Vec::new(),
            cpus: Vec::new(),
            in_game: false,
            round_players: Vec::new(),
            frames: BTreeMap::new(),
            paused: Vec::new(),
            unfocused: HashSet::new(),
            undefeated: Vec::new(),
            wins: BTreeMap::new(),
            timeout: None,
            cpu_tick: None,
            clock,
            outbox: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn room_type(&self) -> RoomType {
        self.room_type
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn host(&self) -> Option<ParticipantId> {
        self.host
    }

    pub fn members(&self) -> &[ParticipantId] {
        &self.members
    }

    pub fn spectators(&self) -> &[ParticipantId] {
        &self.spectators
    }

    /// Playing participants: human members, then CPUs.
    pub fn players(&self) -> Vec<ParticipantId> {
        self.members
            .iter()
            .copied()
            .chain(self.cpu_specs.iter().map(|(id, _)| *id))
            .collect()
    }

    pub fn is_full(&self) -> bool {
        self.members.len() + self.cpu_specs.len() >= self.size
    }

    pub fn in_game(&self) -> bool {
        self.in_game
    }

    /// Humans still attached to the room.
    pub fn has_humans(&self) -> bool {
        !self.members.is_empty() || !self.spectators.is_empty()
    }

    pub fn contains(&self, participant: ParticipantId) -> bool {
        self.members.contains(&participant) || self.spectators.contains(&participant)
    }

    pub fn frames(&self, participant: ParticipantId) -> u64 {
        self.frames.get(&participant).copied().unwrap_or(0)
    }

    pub fn is_paused(&self, participant: ParticipantId) -> bool {
        self.paused.contains(&participant)
    }

    pub fn undefeated(&self) -> &[ParticipantId] {
        &self.undefeated
    }

    pub fn wins(&self) -> &BTreeMap<ParticipantId, u32> {
        &self.wins
    }

    pub fn timeout_pending(&self) -> bool {
        self.timeout.is_some()
    }

    /// Live session of a CPU participant during a round.
    pub fn cpu_session_mut(&mut self, participant: ParticipantId) -> Option<&mut Session> {
        self.cpus
            .iter_mut()
            .find(|c| c.id == participant)
            .map(|c| &mut c.session)
    }

    pub fn check_password(&self, password: Option<&str>) -> Result<(), RoomError> {
        match (&self.password, password) {
            (None, _) => Ok(()),
            (Some(_), None) => Err(RoomError::PasswordRequired(self.id.clone())),
            (Some(expected), Some(given)) if expected == given => Ok(()),
            (Some(_), Some(_)) => Err(RoomError::PasswordIncorrect(self.id.clone())),
        }
    }

    pub fn add_cpu(&mut self, participant: ParticipantId, spec: CpuSpec) {
        self.cpu_specs.push((participant, spec));
        self.broadcast_update();
    }

    /// Add a human. Returns false if they were seated as a spectator because
    /// the room is full or a round is running.
    pub fn join(&mut self, participant: ParticipantId) -> bool {
        if self.contains(participant) {
            return self.members.contains(&participant);
        }
        if self.in_game || self.is_full() {
            self.spectate(participant);
            return false;
        }
        self.members.push(participant);
        self.host.get_or_insert(participant);
        debug!(room = %self.id, participant, "joined");
        self.broadcast_update();
        true
    }

    pub fn spectate(&mut self, participant: ParticipantId) {
        if self.spectators.contains(&participant) {
            return;
        }
        self.members.retain(|&m| m != participant);
        self.spectators.push(participant);
        self.host.get_or_insert(participant);
        debug!(room = %self.id, participant, "spectating");
        if self.in_game {
            let message = self.start_message(participant, true);
            self.send(participant, message);
        }
        self.broadcast_update();
    }

    /// Remove a human. Leaving mid-round counts as a disconnect.
    pub fn leave(&mut self, participant: ParticipantId, sched: &mut dyn Scheduler<RoomTimer>) {
        if !self.contains(participant) {
            return;
        }
        self.members.retain(|&m| m != participant);
        self.spectators.retain(|&s| s != participant);
        self.unfocused.remove(&participant);

        if self.in_game && self.undefeated.contains(&participant) {
            info!(room = %self.id, participant, "player disconnected mid-round");
            self.broadcast(ServerMessage::PlayerDisconnect {
                participant_id: participant,
            });
            self.eliminate(participant, sched);
        }

        if self.host == Some(participant) {
            self.host = self
                .members
                .first()
                .or_else(|| self.spectators.first())
                .copied();
        }
        debug!(room = %self.id, participant, host = ?self.host, "left");
        self.broadcast_update();
    }

    /// Start a round. Returns false if one is already running or nobody plays.
    pub fn start(&mut self, sched: &mut dyn Scheduler<RoomTimer>) -> bool {
        let players = self.players();
        if self.in_game || players.is_empty() {
            return false;
        }

        self.in_game = true;
        self.round_players = players.clone();
        self.undefeated = players.clone();
        self.frames = players.iter().map(|&p| (p, 0)).collect();
        self.paused.clear();

        self.cpus = self
            .cpu_specs
            .iter()
            .enumerate()
            .filter_map(|(i, (id, spec))| {
                let Some(cpu) = cpu_from_name(&spec.strategy, self.settings.seed as u64 + i as u64)
                else {
                    warn!(room = %self.id, strategy = %spec.strategy, "unknown cpu strategy");
                    return None;
                };
                Some(CpuParticipant {
                    id: *id,
                    session: Session::new(*id, self.settings.clone(), Arc::clone(&self.clock)),
                    driver: CpuDriver::new(cpu, spec.speed),
                })
            })
            .collect();

        for member in self.members.clone() {
            let message = self.start_message(member, false);
            self.send(member, message);
        }
        for spectator in self.spectators.clone() {
            let message = self.start_message(spectator, true);
            self.send(spectator, message);
        }

        if !self.cpus.is_empty() {
            self.schedule_cpu_tick(sched);
        }
        info!(room = %self.id, players = ?players, settings = %self.settings, "round started");
        true
    }

    fn start_message(&self, to: ParticipantId, spectating: bool) -> ServerMessage {
        let participant_scores = self
            .round_players
            .iter()
            .map(|&p| (p, self.wins.get(&p).copied().unwrap_or(0)))
            .collect();
        let opponent_ids = self
            .round_players
            .iter()
            .copied()
            .filter(|&p| p != to)
            .collect();
        let room_id = self.id.clone();
        let settings_string = self.settings.to_string();
        if spectating {
            ServerMessage::Spectate {
                room_id,
                participant_scores,
                opponent_ids,
                settings_string,
            }
        } else {
            ServerMessage::Start {
                room_id,
                participant_scores,
                opponent_ids,
                settings_string,
            }
        }
    }

    /// Handle a report from a participant of the current round.
    pub fn handle(&mut self, message: ParticipantMessage, sched: &mut dyn Scheduler<RoomTimer>) {
        let sender = message.participant_id();
        if let ParticipantMessage::Focus { focused, .. } = message {
            if focused {
                self.unfocused.remove(&sender);
            } else {
                self.unfocused.insert(sender);
            }
            return;
        }
        if !self.in_game || !self.round_players.contains(&sender) {
            return;
        }

        if let Some(relay) = ServerMessage::relay(&message) {
            self.broadcast_except(sender, relay);
        }

        match message {
            ParticipantMessage::SendState { .. } => {
                *self.frames.entry(sender).or_default() += 1;
                if self.undefeated.contains(&sender) {
                    self.pace(sender, sched);
                }
            }
            ParticipantMessage::GameOver { .. } => {
                if self.undefeated.contains(&sender) {
                    info!(room = %self.id, participant = sender, frame = self.frames(sender), "defeated");
                    self.eliminate(sender, sched);
                }
            }
            _ => {}
        }
    }

    fn min_frames(&self) -> Option<u64> {
        self.undefeated.iter().map(|&p| self.frames(p)).min()
    }

    fn slowest(&self) -> Option<ParticipantId> {
        self.undefeated
            .iter()
            .copied()
            .min_by_key(|&p| self.frames(p))
    }

    fn all_but_slowest_paused(&self) -> bool {
        let Some(slowest) = self.slowest() else {
            return false;
        };
        self.undefeated.len() > 1
            && self
                .undefeated
                .iter()
                .filter(|&&p| p != slowest)
                .all(|p| self.paused.contains(p))
    }

    fn pace(&mut self, sender: ParticipantId, sched: &mut dyn Scheduler<RoomTimer>) {
        let Some(min) = self.min_frames() else {
            return;
        };
        let frames = self.frames(sender);

        if frames > min + MAX_FRAME_DIFFERENCE && !self.paused.contains(&sender) {
            debug!(room = %self.id, participant = sender, frames, min, "pausing leader");
            self.paused.push(sender);
            self.send(sender, ServerMessage::Pause);
            if self.all_but_slowest_paused() && self.timeout.is_none() {
                self.schedule_timeout(sched);
            }
        } else if frames == min {
            self.resume_caught_up(min, sched);
        }
    }

    fn resume_caught_up(&mut self, min: u64, sched: &mut dyn Scheduler<RoomTimer>) {
        let (resumed, still_paused): (Vec<_>, Vec<_>) = self
            .paused
            .iter()
            .copied()
            .partition(|&p| self.frames(p).saturating_sub(min) < RESUME_FRAME_DIFFERENCE);
        self.paused = still_paused;
        for participant in resumed {
            debug!(room = %self.id, participant, min, "resuming");
            self.send(participant, ServerMessage::Play);
        }

        if !self.all_but_slowest_paused() {
            if let Some(handle) = self.timeout.take() {
                debug!(room = %self.id, "pacing timeout cancelled");
                sched.cancel(handle);
            }
        }
    }

    fn schedule_timeout(&mut self, sched: &mut dyn Scheduler<RoomTimer>) {
        let unfocused = self
            .slowest()
            .is_some_and(|p| self.unfocused.contains(&p));
        let delay = if unfocused {
            UNFOCUSED_TIMEOUT_MS
        } else {
            PACING_TIMEOUT_MS
        };
        debug!(room = %self.id, delay_ms = delay, slowest = ?self.slowest(), "pacing timeout scheduled");
        self.timeout = Some(sched.after(
            Duration::from_millis(delay),
            RoomTimer {
                room_id: self.id.clone(),
                kind: TimerKind::PacingTimeout,
            },
        ));
    }

    fn schedule_cpu_tick(&mut self, sched: &mut dyn Scheduler<RoomTimer>) {
        self.cpu_tick = Some(sched.after(
            Duration::from_micros(CPU_TICK_MICROS),
            RoomTimer {
                room_id: self.id.clone(),
                kind: TimerKind::CpuTick,
            },
        ));
    }

    /// Handle a timer this room scheduled.
    pub fn fire(&mut self, kind: TimerKind, sched: &mut dyn Scheduler<RoomTimer>) {
        match kind {
            TimerKind::PacingTimeout => self.on_timeout(sched),
            TimerKind::CpuTick => self.on_cpu_tick(sched),
        }
    }

    fn on_timeout(&mut self, sched: &mut dyn Scheduler<RoomTimer>) {
        self.timeout = None;
        if !self.in_game {
            return;
        }
        let Some(slowest) = self.slowest() else {
            return;
        };
        warn!(room = %self.id, participant = slowest, frames = self.frames(slowest), "pacing timeout");

        self.send(slowest, ServerMessage::Timeout);
        self.broadcast_except(
            slowest,
            ServerMessage::PlayerDisconnect {
                participant_id: slowest,
            },
        );
        for participant in std::mem::take(&mut self.paused) {
            self.send(participant, ServerMessage::Play);
        }
        self.eliminate(slowest, sched);
    }

    fn on_cpu_tick(&mut self, sched: &mut dyn Scheduler<RoomTimer>) {
        self.cpu_tick = None;
        if !self.in_game {
            return;
        }

        let mut reports = Vec::new();
        for cpu in &mut self.cpus {
            if cpu.session.result().is_some() {
                continue;
            }
            let input = cpu.driver.next_input(cpu.session.engine());
            cpu.session.tick(&input.actions, input.soft_drop);
            reports.extend(cpu.session.take_outbox());
        }
        for report in reports {
            self.handle(report, sched);
        }

        if self.in_game {
            self.schedule_cpu_tick(sched);
        }
    }

    fn eliminate(&mut self, participant: ParticipantId, sched: &mut dyn Scheduler<RoomTimer>) {
        self.undefeated.retain(|&p| p != participant);
        self.paused.retain(|&p| p != participant);

        let over = self.undefeated.is_empty()
            || (self.undefeated.len() == 1 && self.round_players.len() > 1);
        if over {
            self.finish_round(sched);
        } else if let Some(min) = self.min_frames() {
            self.resume_caught_up(min, sched);
            if self.all_but_slowest_paused() && self.timeout.is_none() {
                self.schedule_timeout(sched);
            }
        }
    }

    fn finish_round(&mut self, sched: &mut dyn Scheduler<RoomTimer>) {
        let winner = self.undefeated.first().copied();
        if let Some(winner) = winner {
            *self.wins.entry(winner).or_default() += 1;
        }
        info!(room = %self.id, winner = ?winner, "round finished");
        self.broadcast(ServerMessage::WinnerResult {
            participant_id: winner,
        });
        self.end_round(sched);
    }

    /// Stop the round without a result and release its timers.
    pub fn end_round(&mut self, sched: &mut dyn Scheduler<RoomTimer>) {
        if let Some(handle) = self.timeout.take() {
            sched.cancel(handle);
        }
        if let Some(handle) = self.cpu_tick.take() {
            sched.cancel(handle);
        }
        for cpu in &self.cpus {
            cpu.session.stop();
        }
        self.cpus.clear();
        self.paused.clear();
        self.in_game = false;
    }

    fn send(&mut self, to: ParticipantId, message: ServerMessage) {
        match self.cpus.iter_mut().find(|c| c.id == to) {
            Some(cpu) => cpu.deliver(&message),
            None => self.outbox.push(Outbound::new(to, message)),
        }
    }

    fn recipients(&self) -> Vec<ParticipantId> {
        let mut all = self.members.clone();
        all.extend(&self.spectators);
        all.extend(self.cpus.iter().map(|c| c.id));
        all
    }

    fn broadcast(&mut self, message: ServerMessage) {
        for to in self.recipients() {
            self.send(to, message.clone());
        }
    }

    fn broadcast_except(&mut self, except: ParticipantId, message: ServerMessage) {
        for to in self.recipients().into_iter().filter(|&p| p != except) {
            self.send(to, message.clone());
        }
    }

    fn broadcast_update(&mut self) {
        let participant_ids = self.players();
        let humans: Vec<_> = self.members.iter().chain(&self.spectators).copied().collect();
        for to in humans {
            let message = ServerMessage::RoomUpdate {
                room_id: self.id.clone(),
                participant_ids: participant_ids.clone(),
                room_size: self.size,
                settings_string: self.settings.to_string(),
                room_type: self.room_type,
                is_host: self.host == Some(to),
                is_spectating: self.spectators.contains(&to),
            };
            self.outbox.push(Outbound::new(to, message));
        }
    }

    pub fn take_outbox(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("room_type", &self.room_type)
            .field("members", &self.members)
            .field("spectators", &self.spectators)
            .field("in_game", &self.in_game)
            .field("undefeated", &self.undefeated)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::VirtualScheduler;
    use puyo_versus_core::Board;
    use puyo_versus_types::ManualClock;

    fn room(size: usize) -> Room {
        Room::new(
            "test-room",
            RoomType::Default,
            size,
            Settings::default(),
            None,
            Arc::new(ManualClock::new(0)),
        )
    }

    fn started(players: &[ParticipantId]) -> (Room, VirtualScheduler<RoomTimer>) {
        let mut room = room(players.len().max(2));
        let mut sched = VirtualScheduler::new();
        for &p in players {
            assert!(room.join(p));
        }
        assert!(room.start(&mut sched));
        room.take_outbox();
        (room, sched)
    }

    fn report(room: &mut Room, sched: &mut VirtualScheduler<RoomTimer>, id: ParticipantId, n: u64) {
        for _ in 0..n {
            room.handle(
                ParticipantMessage::SendState {
                    participant_id: id,
                    board_state_hash: 0,
                    score: 0,
                    total_nuisance: 0,
                },
                sched,
            );
        }
    }

    fn sent_to(outbox: &[Outbound], to: ParticipantId, message: &ServerMessage) -> bool {
        outbox.iter().any(|o| o.to == to && &o.message == message)
    }

    #[test]
    fn test_leader_beyond_limit_is_paused() {
        let (mut room, mut sched) = started(&[1, 2, 3]);
        for _ in 0..100 {
            for id in [1, 2, 3] {
                report(&mut room, &mut sched, id, 1);
            }
        }
        report(&mut room, &mut sched, 3, 20);
        assert!(!room.is_paused(3));
        report(&mut room, &mut sched, 3, 1);
        assert_eq!(room.frames(3), 121);
        assert!(room.is_paused(3));
        assert!(!room.is_paused(1));
        assert!(!room.timeout_pending());
        assert!(sent_to(&room.take_outbox(), 3, &ServerMessage::Pause));

        // Resumes once the slowest brings the lead under the resume threshold.
        for _ in 0..6 {
            report(&mut room, &mut sched, 1, 1);
            report(&mut room, &mut sched, 2, 1);
        }
        assert!(room.is_paused(3));
        report(&mut room, &mut sched, 1, 1);
        report(&mut room, &mut sched, 2, 1);
        assert!(!room.is_paused(3));
        assert!(sent_to(&room.take_outbox(), 3, &ServerMessage::Play));
    }

    #[test]
    fn test_timeout_defeats_slowest() {
        let (mut room, mut sched) = started(&[1, 2]);
        report(&mut room, &mut sched, 1, 21);
        assert!(room.is_paused(1));
        assert!(room.timeout_pending());

        assert!(sched.advance(Duration::from_millis(PACING_TIMEOUT_MS - 1)).is_empty());
        let fired = sched.advance(Duration::from_millis(1));
        assert_eq!(fired.len(), 1);
        room.fire(fired[0].kind, &mut sched);

        let out = room.take_outbox();
        assert!(sent_to(&out, 2, &ServerMessage::Timeout));
        assert!(sent_to(&out, 1, &ServerMessage::PlayerDisconnect { participant_id: 2 }));
        assert!(sent_to(&out, 1, &ServerMessage::WinnerResult { participant_id: Some(1) }));
        assert!(!room.in_game());
        assert_eq!(room.wins().get(&1), Some(&1));
    }

    #[test]
    fn test_unfocused_slowest_times_out_sooner() {
        let (mut room, mut sched) = started(&[1, 2]);
        room.handle(
            ParticipantMessage::Focus {
                participant_id: 2,
                focused: false,
            },
            &mut sched,
        );
        report(&mut room, &mut sched, 1, 21);
        let fired = sched.advance(Duration::from_millis(UNFOCUSED_TIMEOUT_MS));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].kind, TimerKind::PacingTimeout);
    }

    #[test]
    fn test_catching_up_cancels_timeout() {
        let (mut room, mut sched) = started(&[1, 2]);
        report(&mut room, &mut sched, 1, 21);
        assert!(room.timeout_pending());
        report(&mut room, &mut sched, 2, 7);
        assert!(!room.is_paused(1));
        assert!(!room.timeout_pending());
        assert!(sched.advance(Duration::from_millis(PACING_TIMEOUT_MS * 2)).is_empty());
        assert!(room.in_game());
    }

    #[test]
    fn test_defeat_leaving_only_slowest_unpaused_starts_timeout() {
        let (mut room, mut sched) = started(&[1, 2, 3]);
        report(&mut room, &mut sched, 2, 21);
        report(&mut room, &mut sched, 3, 5);
        assert!(room.is_paused(2));
        assert!(!room.timeout_pending());

        room.handle(ParticipantMessage::GameOver { participant_id: 3 }, &mut sched);
        assert_eq!(room.undefeated(), &[1, 2]);
        assert!(room.is_paused(2));
        assert!(room.timeout_pending());

        let fired = sched.advance(Duration::from_millis(PACING_TIMEOUT_MS));
        assert_eq!(fired.len(), 1);
        room.fire(fired[0].kind, &mut sched);

        let out = room.take_outbox();
        assert!(sent_to(&out, 1, &ServerMessage::Timeout));
        assert!(sent_to(&out, 2, &ServerMessage::Play));
        assert!(sent_to(&out, 2, &ServerMessage::WinnerResult { participant_id: Some(2) }));
        assert!(!room.in_game());
    }

    #[test]
    fn test_game_over_declares_last_survivor() {
        let (mut room, mut sched) = started(&[1, 2, 3]);
        room.handle(ParticipantMessage::GameOver { participant_id: 2 }, &mut sched);
        assert!(room.in_game());
        let out = room.take_outbox();
        assert!(sent_to(&out, 1, &ServerMessage::GameOver { participant_id: 2 }));
        assert!(!sent_to(&out, 2, &ServerMessage::GameOver { participant_id: 2 }));

        room.handle(ParticipantMessage::GameOver { participant_id: 1 }, &mut sched);
        assert!(!room.in_game());
        assert!(sent_to(
            &room.take_outbox(),
            2,
            &ServerMessage::WinnerResult { participant_id: Some(3) }
        ));
    }

    #[test]
    fn test_solo_round_ends_on_loss_without_winner() {
        let (mut room, mut sched) = started(&[1]);
        report(&mut room, &mut sched, 1, 50);
        assert!(room.in_game());
        room.handle(ParticipantMessage::GameOver { participant_id: 1 }, &mut sched);
        assert!(sent_to(
            &room.take_outbox(),
            1,
            &ServerMessage::WinnerResult { participant_id: None }
        ));
    }

    #[test]
    fn test_leaving_mid_round_is_disconnect() {
        let (mut room, mut sched) = started(&[1, 2]);
        room.leave(2, &mut sched);
        let out = room.take_outbox();
        assert!(sent_to(&out, 1, &ServerMessage::PlayerDisconnect { participant_id: 2 }));
        assert!(sent_to(&out, 1, &ServerMessage::WinnerResult { participant_id: Some(1) }));
        assert_eq!(room.host(), Some(1));
    }

    #[test]
    fn test_join_when_full_spectates() {
        let mut room = room(2);
        assert!(room.join(1));
        assert!(room.join(2));
        assert!(!room.join(3));
        assert_eq!(room.spectators(), &[3]);
        let out = room.take_outbox();
        assert!(out.iter().any(|o| o.to == 3
            && matches!(o.message, ServerMessage::RoomUpdate { is_spectating: true, is_host: false, .. })));
    }

    #[test]
    fn test_password_check() {
        let room = Room::new(
            "locked",
            RoomType::Default,
            2,
            Settings::default(),
            Some("hunter2".into()),
            Arc::new(ManualClock::new(0)),
        );
        assert!(matches!(room.check_password(None), Err(RoomError::PasswordRequired(_))));
        assert!(matches!(
            room.check_password(Some("nope")),
            Err(RoomError::PasswordIncorrect(_))
        ));
        assert!(room.check_password(Some("hunter2")).is_ok());
    }

    fn cpu_room() -> (Room, VirtualScheduler<RoomTimer>) {
        let mut room = room(2);
        let mut sched = VirtualScheduler::new();
        let spec = CpuSpec {
            strategy: "flat".into(),
            speed: 1,
        };
        room.add_cpu(100, spec.clone());
        room.add_cpu(101, spec);
        assert!(room.start(&mut sched));
        (room, sched)
    }

    fn run(room: &mut Room, sched: &mut VirtualScheduler<RoomTimer>, by: Duration) {
        let deadline = sched.now() + by;
        while let Some(timer) = sched.pop_due(deadline) {
            room.fire(timer.kind, sched);
        }
        sched.set_now(deadline);
    }

    #[test]
    fn test_cpus_tick_and_stay_paced() {
        let (mut room, mut sched) = cpu_room();
        run(&mut room, &mut sched, Duration::from_secs(1));
        assert!(room.frames(100) >= 59);
        assert_eq!(room.frames(100), room.frames(101));
        assert!(room.in_game());
    }

    #[test]
    fn test_cpu_top_out_ends_round() {
        let (mut room, mut sched) = cpu_room();
        let settings = room.settings().clone();
        let column: Vec<u8> = (0..12).map(|i| (i % 4) as u8 + 1).collect();
        if let Some(session) = room.cpu_session_mut(100) {
            *session.engine_mut().board_mut() =
                Board::from_columns(&settings, vec![vec![], vec![], column]);
        }
        run(&mut room, &mut sched, Duration::from_millis(100));
        assert!(!room.in_game());
        assert_eq!(room.wins().get(&101), Some(&1));
        assert_eq!(sched.pending(), 0);
    }
}
