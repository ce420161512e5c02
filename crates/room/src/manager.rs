//! Room registry.
//!
//! [`RoomManager`] owns every room, the participant → room index, the id
//! generator and the scheduler. It has an explicit lifecycle: nothing is
//! accepted until [`RoomManager::open`], and [`RoomManager::close`] ends every
//! round and drops every room.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use puyo_versus_engine::{cpu_from_name, ParticipantMessage};
use puyo_versus_types::{Clock, ParticipantId, Settings};

use crate::error::RoomError;
use crate::protocol::{
    ClientMessage, CpuSpec, Outbound, QueueKind, RoomRequest, RoomType, ServerMessage,
};
use crate::room::{Room, RoomTimer};
use crate::scheduler::{Scheduler, VirtualScheduler};

pub const ROOM_ID_LEN: usize = 10;
pub const ROOM_ID_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// First id handed to CPU participants.
pub const CPU_ID_BASE: ParticipantId = 1_000_000;

/// Source of room ids. Collisions are retried by the manager.
pub trait IdGenerator: Send {
    fn next_id(&mut self) -> String;
}

/// Random ids of [`ROOM_ID_LEN`] alphanumeric characters.
#[derive(Debug)]
pub struct RandomIdGenerator {
    rng: StdRng,
}

impl RandomIdGenerator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for RandomIdGenerator {
    fn next_id(&mut self) -> String {
        (0..ROOM_ID_LEN)
            .map(|_| ROOM_ID_ALPHABET[self.rng.random_range(0..ROOM_ID_ALPHABET.len())] as char)
            .collect()
    }
}

/// `<prefix>-1`, `<prefix>-2`, ...
#[derive(Debug, Clone)]
pub struct SequentialIdGenerator {
    prefix: String,
    next: u64,
}

impl SequentialIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 1,
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&mut self) -> String {
        let id = format!("{}-{}", self.prefix, self.next);
        self.next += 1;
        id
    }
}

/// Parameters for a new room.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomOptions {
    pub room_type: RoomType,
    pub room_size: usize,
    pub settings: Settings,
    pub password: Option<String>,
    pub cpus: Vec<CpuSpec>,
}

impl Default for RoomOptions {
    fn default() -> Self {
        Self {
            room_type: RoomType::Default,
            room_size: 2,
            settings: Settings::default(),
            password: None,
            cpus: Vec::new(),
        }
    }
}

pub struct RoomManager<S = VirtualScheduler<RoomTimer>> {
    open: bool,
    rooms: HashMap<String, Room>,
    member_rooms: HashMap<ParticipantId, String>,
    ids: Box<dyn IdGenerator>,
    scheduler: S,
    clock: Arc<dyn Clock>,
    next_cpu_id: ParticipantId,
    outbox: Vec<Outbound>,
}

impl<S: Scheduler<RoomTimer>> RoomManager<S> {
    /// A closed manager. Call [`open`](Self::open) before use.
    pub fn new(ids: Box<dyn IdGenerator>, scheduler: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            open: false,
            rooms: HashMap::new(),
            member_rooms: HashMap::new(),
            ids,
            scheduler,
            clock,
            next_cpu_id: CPU_ID_BASE,
            outbox: Vec::new(),
        }
    }

    pub fn open(&mut self) {
        self.open = true;
        info!("room manager open");
    }

    /// End every round and drop every room.
    pub fn close(&mut self) {
        for room in self.rooms.values_mut() {
            room.end_round(&mut self.scheduler);
            self.outbox.extend(room.take_outbox());
        }
        info!(rooms = self.rooms.len(), "room manager closed");
        self.rooms.clear();
        self.member_rooms.clear();
        self.open = false;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    fn ensure_open(&self) -> Result<(), RoomError> {
        if self.open {
            Ok(())
        } else {
            Err(RoomError::ManagerClosed)
        }
    }

    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn room_mut(&mut self, room_id: &str) -> Option<&mut Room> {
        self.rooms.get_mut(room_id)
    }

    /// Room a participant currently belongs to.
    pub fn room_of(&self, participant: ParticipantId) -> Option<&Room> {
        self.member_rooms
            .get(&participant)
            .and_then(|id| self.rooms.get(id))
    }

    /// Sorted ids of every live room.
    pub fn room_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.rooms.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    fn unique_id(&mut self) -> String {
        loop {
            let id = self.ids.next_id();
            if !self.rooms.contains_key(&id) {
                return id;
            }
        }
    }

    pub fn create_room(
        &mut self,
        host: ParticipantId,
        options: RoomOptions,
    ) -> Result<String, RoomError> {
        self.ensure_open()?;
        options.settings.validate()?;
        if let Some(spec) = options
            .cpus
            .iter()
            .find(|spec| cpu_from_name(&spec.strategy, 0).is_none())
        {
            return Err(RoomError::UnknownCpu(spec.strategy.clone()));
        }
        self.detach(host);

        let id = self.unique_id();
        let mut room = Room::new(
            id.clone(),
            options.room_type,
            options.room_size,
            options.settings,
            options.password,
            Arc::clone(&self.clock),
        );
        for spec in options.cpus {
            room.add_cpu(self.next_cpu_id, spec);
            self.next_cpu_id += 1;
        }
        room.join(host);
        info!(room = %id, host, room_type = room.room_type().as_str(), "room created");

        self.rooms.insert(id.clone(), room);
        self.member_rooms.insert(host, id.clone());
        Ok(id)
    }

    /// Join as a player. Returns false if seated as a spectator instead.
    pub fn join_room(
        &mut self,
        participant: ParticipantId,
        room_id: &str,
        password: Option<&str>,
    ) -> Result<bool, RoomError> {
        self.ensure_open()?;
        let room = self
            .rooms
            .get(room_id)
            .ok_or_else(|| RoomError::RoomNotFound(room_id.to_string()))?;
        room.check_password(password)?;
        if room.contains(participant) {
            return Ok(room.members().contains(&participant));
        }

        self.detach(participant);
        let playing = match self.rooms.get_mut(room_id) {
            Some(room) => room.join(participant),
            None => return Err(RoomError::RoomNotFound(room_id.to_string())),
        };
        self.member_rooms.insert(participant, room_id.to_string());
        Ok(playing)
    }

    pub fn spectate_room(
        &mut self,
        participant: ParticipantId,
        room_id: &str,
    ) -> Result<(), RoomError> {
        self.ensure_open()?;
        if !self.rooms.contains_key(room_id) {
            return Err(RoomError::RoomNotFound(room_id.to_string()));
        }
        if self.member_rooms.get(&participant).map(String::as_str) != Some(room_id) {
            self.detach(participant);
        }
        if let Some(room) = self.rooms.get_mut(room_id) {
            room.spectate(participant);
        }
        self.member_rooms.insert(participant, room_id.to_string());
        Ok(())
    }

    pub fn leave_room(&mut self, participant: ParticipantId) -> Result<(), RoomError> {
        self.ensure_open()?;
        if self.detach(participant) {
            Ok(())
        } else {
            Err(RoomError::NotInRoom(participant))
        }
    }

    /// Remove a participant from whatever room they are in, destroying the
    /// room once no human is left.
    fn detach(&mut self, participant: ParticipantId) -> bool {
        let Some(room_id) = self.member_rooms.remove(&participant) else {
            return false;
        };
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return false;
        };
        room.leave(participant, &mut self.scheduler);
        if !room.has_humans() {
            room.end_round(&mut self.scheduler);
            self.outbox.extend(room.take_outbox());
            self.rooms.remove(&room_id);
            info!(room = %room_id, "room closed");
        }
        true
    }

    /// Seat a participant in a waiting queue room, creating one if needed.
    /// The room starts as soon as it fills.
    pub fn join_queue(
        &mut self,
        participant: ParticipantId,
        queue: QueueKind,
    ) -> Result<String, RoomError> {
        self.ensure_open()?;
        let room_type = queue.room_type();
        let waiting = self
            .rooms
            .values()
            .filter(|room| {
                room.room_type() == room_type
                    && !room.in_game()
                    && !room.is_full()
                    && !room.contains(participant)
            })
            .map(|room| room.id().to_string())
            .min();

        let room_id = match waiting {
            Some(room_id) => {
                self.join_room(participant, &room_id, None)?;
                room_id
            }
            None => self.create_room(
                participant,
                RoomOptions {
                    room_type,
                    room_size: queue.room_size(),
                    settings: Settings::random_seed(),
                    ..RoomOptions::default()
                },
            )?,
        };
        debug!(participant, room = %room_id, queue = room_type.as_str(), "queued");

        if let Some(room) = self.rooms.get_mut(&room_id) {
            if room.is_full() && !room.in_game() {
                room.start(&mut self.scheduler);
            }
        }
        Ok(room_id)
    }

    /// Start a round. Only the host may do this.
    pub fn start_room(&mut self, participant: ParticipantId) -> Result<(), RoomError> {
        self.ensure_open()?;
        let room_id = self
            .member_rooms
            .get(&participant)
            .cloned()
            .ok_or(RoomError::NotInRoom(participant))?;
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(RoomError::NotInRoom(participant))?;
        if room.host() != Some(participant) {
            return Err(RoomError::NotHost(participant));
        }
        if !room.start(&mut self.scheduler) {
            debug!(room = %room_id, "start ignored");
        }
        Ok(())
    }

    /// Route a game report to the sender's room.
    pub fn handle_message(
        &mut self,
        from: ParticipantId,
        message: ParticipantMessage,
    ) -> Result<(), RoomError> {
        self.ensure_open()?;
        if message.participant_id() != from {
            warn!(from, claimed = message.participant_id(), "report for another participant dropped");
            return Ok(());
        }
        let room = self
            .member_rooms
            .get(&from)
            .and_then(|id| self.rooms.get_mut(id))
            .ok_or(RoomError::NotInRoom(from))?;
        room.handle(message, &mut self.scheduler);
        Ok(())
    }

    pub fn handle_client(
        &mut self,
        from: ParticipantId,
        message: ClientMessage,
    ) -> Result<(), RoomError> {
        match message {
            ClientMessage::Game(message) => self.handle_message(from, message),
            ClientMessage::Room(request) => match request {
                RoomRequest::CreateRoom {
                    settings_string,
                    room_size,
                    password,
                    cpus,
                } => {
                    let settings: Settings = settings_string.parse()?;
                    self.create_room(
                        from,
                        RoomOptions {
                            room_type: RoomType::Default,
                            room_size,
                            settings,
                            password,
                            cpus,
                        },
                    )
                    .map(|_| ())
                }
                RoomRequest::JoinRoom { room_id, password } => self
                    .join_room(from, &room_id, password.as_deref())
                    .map(|_| ()),
                RoomRequest::SpectateRoom { room_id } => self.spectate_room(from, &room_id),
                RoomRequest::LeaveRoom => self.leave_room(from),
                RoomRequest::JoinQueue { queue } => self.join_queue(from, queue).map(|_| ()),
                RoomRequest::StartRoom => self.start_room(from),
            },
        }
    }

    /// Like [`handle_client`](Self::handle_client), but a failure is queued
    /// as an `error` message to the sender.
    pub fn dispatch(&mut self, from: ParticipantId, message: ClientMessage) {
        if let Err(err) = self.handle_client(from, message) {
            debug!(from, error = %err, "request rejected");
            self.outbox
                .push(Outbound::new(from, ServerMessage::error(&err)));
        }
    }

    /// Deliver a timer event to its room.
    pub fn fire(&mut self, timer: RoomTimer) {
        match self.rooms.get_mut(&timer.room_id) {
            Some(room) => room.fire(timer.kind, &mut self.scheduler),
            None => debug!(room = %timer.room_id, "timer for closed room"),
        }
    }

    /// Everything queued for clients, room by room in id order.
    pub fn take_outbox(&mut self) -> Vec<Outbound> {
        let mut out = std::mem::take(&mut self.outbox);
        for id in self.room_ids() {
            if let Some(room) = self.rooms.get_mut(&id) {
                out.extend(room.take_outbox());
            }
        }
        out
    }
}

impl RoomManager<VirtualScheduler<RoomTimer>> {
    /// Manager on virtual time.
    pub fn with_virtual_time(ids: Box<dyn IdGenerator>, clock: Arc<dyn Clock>) -> Self {
        Self::new(ids, VirtualScheduler::new(), clock)
    }

    /// Advance virtual time, firing timers (including ones rescheduled while
    /// firing) in due order.
    pub fn advance(&mut self, by: Duration) {
        let deadline = self.scheduler.now() + by;
        while let Some(timer) = self.scheduler.pop_due(deadline) {
            self.fire(timer);
        }
        self.scheduler.set_now(deadline);
    }
}

impl<S> std::fmt::Debug for RoomManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomManager")
            .field("open", &self.open)
            .field("rooms", &self.rooms.len())
            .field("members", &self.member_rooms.len())
            .finish()
    }
}
