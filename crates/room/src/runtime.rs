//! Async runtime integration.
//!
//! Bridges the synchronous [`RoomManager`] with async transports. One task
//! owns the manager: it applies inbound commands as they arrive, advances
//! virtual time from a tokio interval, and pushes encoded lines out.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use puyo_versus_types::ParticipantId;

use crate::error::RoomError;
use crate::manager::RoomManager;
use crate::protocol::{decode_client, encode_line, ClientMessage, Outbound};

/// Command delivered to the room loop.
#[derive(Debug, Clone)]
pub struct InboundCommand {
    pub client_id: ParticipantId,
    pub message: ClientMessage,
}

impl InboundCommand {
    pub fn from_line(client_id: ParticipantId, line: &str) -> Result<Self, RoomError> {
        Ok(Self {
            client_id,
            message: decode_client(line)?,
        })
    }
}

/// Outbound line to be delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    ToClient { client_id: ParticipantId, line: String },
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// How often virtual time is advanced.
    pub tick: Duration,
    pub max_pending_commands: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(4),
            max_pending_commands: 256,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        use std::env;

        let defaults = Self::default();
        let tick = env::var("PUYO_TICK_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.tick);
        let max_pending_commands = env::var("PUYO_MAX_PENDING")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_pending_commands);

        Self {
            tick,
            max_pending_commands,
        }
    }
}

/// Running room loop.
pub struct RoomRuntime {
    cmd_tx: mpsc::Sender<InboundCommand>,
    out_rx: mpsc::UnboundedReceiver<OutboundMessage>,
    task: JoinHandle<RoomManager>,
}

impl RoomRuntime {
    /// Open `manager` and run it on the current tokio runtime.
    pub fn spawn(manager: RoomManager, config: RuntimeConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel::<InboundCommand>(config.max_pending_commands.max(1));
        let (out_tx, out_rx) = mpsc::unbounded_channel::<OutboundMessage>();
        let task = tokio::spawn(run_loop(manager, config, cmd_rx, out_tx));
        Self {
            cmd_tx,
            out_rx,
            task,
        }
    }

    pub fn sender(&self) -> mpsc::Sender<InboundCommand> {
        self.cmd_tx.clone()
    }

    pub async fn send(&self, command: InboundCommand) -> Result<(), RoomError> {
        self.cmd_tx
            .send(command)
            .await
            .map_err(|_| RoomError::ManagerClosed)
    }

    pub async fn recv(&mut self) -> Option<OutboundMessage> {
        self.out_rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<OutboundMessage> {
        self.out_rx.try_recv().ok()
    }

    /// Stop accepting commands, close every room, and hand the manager back.
    pub async fn shutdown(self) -> Option<RoomManager> {
        let Self {
            cmd_tx,
            out_rx,
            task,
        } = self;
        drop(cmd_tx);
        drop(out_rx);
        task.await.ok()
    }
}

async fn run_loop(
    mut manager: RoomManager,
    config: RuntimeConfig,
    mut cmd_rx: mpsc::Receiver<InboundCommand>,
    out_tx: mpsc::UnboundedSender<OutboundMessage>,
) -> RoomManager {
    manager.open();
    info!(tick_ms = config.tick.as_millis() as u64, "room runtime started");

    let mut interval = tokio::time::interval(config.tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = Instant::now();

    loop {
        tokio::select! {
            command = cmd_rx.recv() => match command {
                Some(command) => manager.dispatch(command.client_id, command.message),
                None => break,
            },
            _ = interval.tick() => {
                let now = Instant::now();
                manager.advance(now - last);
                last = now;
            }
        }
        flush(&mut manager, &out_tx);
    }

    manager.close();
    flush(&mut manager, &out_tx);
    info!("room runtime stopped");
    manager
}

fn flush(manager: &mut RoomManager, out_tx: &mpsc::UnboundedSender<OutboundMessage>) {
    for Outbound { to, message } in manager.take_outbox() {
        match encode_line(&message) {
            Ok(line) => {
                if out_tx
                    .send(OutboundMessage::ToClient { client_id: to, line })
                    .is_err()
                {
                    debug!(client = to, "outbound receiver gone");
                }
            }
            Err(err) => warn!(client = to, error = %err, "failed to encode message"),
        }
    }
}
