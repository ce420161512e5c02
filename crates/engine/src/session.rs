//! Session - drives one engine on an external tick
//!
//! A session steps its engine once per [`Session::tick`], turns engine events
//! into [`ParticipantMessage`]s for the room, and settles on a final
//! [`GameResult`]:
//!
//! - the shared `force_stop` flag finalizes with `Disconnect` on the next tick;
//! - otherwise, once the engine reports a result, one more tick passes (so the
//!   last frame can be shown) before the session finalizes with that result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use puyo_versus_types::{Clock, GameAction, GameResult, ParticipantId, Settings};

use crate::game::{EngineEvent, GameEngine};

/// Messages a participant sends to its room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ParticipantMessage {
    #[serde(rename_all = "camelCase")]
    SendState {
        participant_id: ParticipantId,
        board_state_hash: u64,
        score: u32,
        total_nuisance: u32,
    },
    #[serde(rename_all = "camelCase")]
    SendNuisance {
        participant_id: ParticipantId,
        nuisance_amount: u32,
    },
    #[serde(rename_all = "camelCase")]
    ActivateNuisance { participant_id: ParticipantId },
    #[serde(rename_all = "camelCase")]
    GameOver { participant_id: ParticipantId },
    #[serde(rename_all = "camelCase")]
    Focus {
        participant_id: ParticipantId,
        focused: bool,
    },
}

impl ParticipantMessage {
    pub fn participant_id(&self) -> ParticipantId {
        match self {
            ParticipantMessage::SendState { participant_id, .. }
            | ParticipantMessage::SendNuisance { participant_id, .. }
            | ParticipantMessage::ActivateNuisance { participant_id }
            | ParticipantMessage::GameOver { participant_id }
            | ParticipantMessage::Focus { participant_id, .. } => *participant_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Running,
    Finished(GameResult),
}

pub struct Session {
    participant_id: ParticipantId,
    engine: GameEngine,
    force_stop: Arc<AtomicBool>,
    paused: bool,
    ending: Option<GameResult>,
    finished: Option<GameResult>,
    outbox: Vec<ParticipantMessage>,
}

impl Session {
    pub fn new(participant_id: ParticipantId, settings: Settings, clock: Arc<dyn Clock>) -> Self {
        Self::with_engine(participant_id, GameEngine::new(settings, clock))
    }

    pub fn with_engine(participant_id: ParticipantId, engine: GameEngine) -> Self {
        Self {
            participant_id,
            engine,
            force_stop: Arc::new(AtomicBool::new(false)),
            paused: false,
            ending: None,
            finished: None,
            outbox: Vec::new(),
        }
    }

    pub fn participant_id(&self) -> ParticipantId {
        self.participant_id
    }

    pub fn engine(&self) -> &GameEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut GameEngine {
        &mut self.engine
    }

    /// Cooperative stop flag; setting it ends the session on its next tick.
    pub fn force_stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.force_stop)
    }

    pub fn stop(&self) {
        self.force_stop.store(true, Ordering::SeqCst);
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn result(&self) -> Option<GameResult> {
        self.finished
    }

    /// Advance one tick, applying `actions` before the frame is stepped.
    pub fn tick(&mut self, actions: &[GameAction], soft_drop: bool) -> TickOutcome {
        if let Some(result) = self.finished {
            return TickOutcome::Finished(result);
        }
        if self.force_stop.load(Ordering::SeqCst) {
            return self.finalize(GameResult::Disconnect);
        }
        if let Some(result) = self.ending {
            return self.finalize(result);
        }
        if self.paused {
            return TickOutcome::Running;
        }

        for &action in actions {
            self.engine.apply_action(action);
        }
        self.engine.step(soft_drop);
        self.flush_events();

        if let Some(result) = self.engine.end() {
            debug!(participant = self.participant_id, result = result.as_str(), "engine ended");
            self.ending = Some(result);
        }
        TickOutcome::Running
    }

    fn finalize(&mut self, result: GameResult) -> TickOutcome {
        info!(
            participant = self.participant_id,
            result = result.as_str(),
            frame = self.engine.frame(),
            score = self.engine.score(),
            "session finished"
        );
        self.finished = Some(result);
        TickOutcome::Finished(result)
    }

    fn flush_events(&mut self) {
        let participant_id = self.participant_id;
        for event in self.engine.take_events() {
            match event {
                EngineEvent::NuisanceSent { amount } => {
                    self.outbox.push(ParticipantMessage::SendNuisance {
                        participant_id,
                        nuisance_amount: amount,
                    })
                }
                EngineEvent::ActivateNuisance => self
                    .outbox
                    .push(ParticipantMessage::ActivateNuisance { participant_id }),
                EngineEvent::GameOver => self
                    .outbox
                    .push(ParticipantMessage::GameOver { participant_id }),
                EngineEvent::Locked { .. } | EngineEvent::ChainStep { .. } => {}
            }
        }
        self.outbox.push(ParticipantMessage::SendState {
            participant_id,
            board_state_hash: self.engine.state_hash(),
            score: self.engine.score(),
            total_nuisance: self.engine.nuisance().total(),
        });
    }

    /// Apply a message relayed from an opponent.
    pub fn receive(&mut self, message: &ParticipantMessage) {
        match *message {
            ParticipantMessage::SendNuisance {
                participant_id,
                nuisance_amount,
            } => self.engine.receive_nuisance(participant_id, nuisance_amount),
            ParticipantMessage::ActivateNuisance { participant_id } => {
                self.engine.activate_nuisance(participant_id)
            }
            ParticipantMessage::SendState { .. }
            | ParticipantMessage::GameOver { .. }
            | ParticipantMessage::Focus { .. } => {}
        }
    }

    /// Result decided by the room (win, timeout, opponents gone).
    pub fn declare_result(&mut self, result: GameResult) {
        self.engine.declare_result(result);
    }

    pub fn take_outbox(&mut self) -> Vec<ParticipantMessage> {
        std::mem::take(&mut self.outbox)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("participant_id", &self.participant_id)
            .field("engine", &self.engine)
            .field("paused", &self.paused)
            .field("finished", &self.finished)
            .finish()
    }
}
