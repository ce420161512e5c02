//! Headless CPU match runner (default binary).
//!
//! Runs CPU participants against each other in a room on virtual time and
//! logs each round's winner. Configuration comes from the environment:
//!
//! - `PUYO_SETTINGS`: settings string (default: standard Tsu rules)
//! - `PUYO_SEED`: drop generator seed (default: random)
//! - `PUYO_CPUS`: comma-separated strategies (default: `flat,random`)
//! - `PUYO_ROUNDS`: rounds to play (default: 3)
//! - `PUYO_SPEED`: frames between CPU inputs (default: 4)
//! - `PUYO_ROUND_LIMIT_SECS`: virtual seconds before a round is abandoned (default: 900)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use puyo_versus::engine::cpu_from_name;
use puyo_versus::room::{
    CpuSpec, RoomManager, RoomOptions, RoomType, SequentialIdGenerator, ServerMessage,
};
use puyo_versus::types::{Clock, ManualClock, ParticipantId, Settings};

/// The runner joins its own room as a spectator under this id.
const OBSERVER: ParticipantId = 1;

/// Virtual time advanced per loop iteration.
const STEP_MS: u64 = 16;

#[derive(Debug, Clone)]
struct RunnerConfig {
    settings: Settings,
    cpus: Vec<String>,
    rounds: u32,
    speed: u32,
    round_limit: Duration,
}

impl RunnerConfig {
    fn from_env() -> Result<Self> {
        use std::env;

        let mut settings = match env::var("PUYO_SETTINGS") {
            Ok(s) if !s.trim().is_empty() => s
                .parse::<Settings>()
                .with_context(|| format!("invalid PUYO_SETTINGS {s:?}"))?,
            _ => Settings::random_seed(),
        };
        if let Some(seed) = env::var("PUYO_SEED").ok().and_then(|s| s.parse().ok()) {
            settings.seed = seed;
        }

        let cpus: Vec<String> = env::var("PUYO_CPUS")
            .unwrap_or_else(|_| "flat,random".to_string())
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        if let Some(unknown) = cpus.iter().find(|name| cpu_from_name(name, 0).is_none()) {
            bail!("unknown cpu strategy {unknown:?} (expected flat or random)");
        }
        if cpus.len() < 2 {
            bail!("need at least two cpus, got {}", cpus.len());
        }

        let rounds = env::var("PUYO_ROUNDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3);
        let speed = env::var("PUYO_SPEED")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(4);
        let round_limit = env::var("PUYO_ROUND_LIMIT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(900));

        Ok(Self {
            settings,
            cpus,
            rounds,
            speed,
            round_limit,
        })
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = RunnerConfig::from_env()?;
    info!(
        settings = %config.settings,
        seed = config.settings.seed,
        cpus = ?config.cpus,
        rounds = config.rounds,
        "starting cpu match"
    );

    let clock = ManualClock::new(0);
    let mut manager = RoomManager::with_virtual_time(
        Box::new(SequentialIdGenerator::new("match")),
        Arc::new(clock.clone()),
    );
    manager.open();

    let room_id = manager.create_room(
        OBSERVER,
        RoomOptions {
            room_type: RoomType::Default,
            room_size: config.cpus.len(),
            settings: config.settings.clone(),
            password: None,
            cpus: config
                .cpus
                .iter()
                .map(|strategy| CpuSpec {
                    strategy: strategy.clone(),
                    speed: config.speed,
                })
                .collect(),
        },
    )?;

    for round in 1..=config.rounds {
        manager.start_room(OBSERVER)?;
        let winner = play_round(&mut manager, &clock, config.round_limit)?;
        info!(round, winner = ?winner, elapsed_ms = clock.now_ms(), "round over");
    }

    match manager.room(&room_id) {
        Some(room) => {
            for (participant, wins) in room.wins() {
                info!(participant, wins, "final tally");
            }
        }
        None => warn!(room = %room_id, "room vanished before the tally"),
    }
    manager.close();
    Ok(())
}

fn play_round(
    manager: &mut RoomManager,
    clock: &ManualClock,
    limit: Duration,
) -> Result<Option<ParticipantId>> {
    let mut elapsed = Duration::ZERO;
    while elapsed < limit {
        manager.advance(Duration::from_millis(STEP_MS));
        clock.advance(STEP_MS);
        elapsed += Duration::from_millis(STEP_MS);

        for out in manager.take_outbox() {
            if out.to != OBSERVER {
                continue;
            }
            if let ServerMessage::WinnerResult { participant_id } = out.message {
                return Ok(participant_id);
            }
        }
    }
    bail!("round did not finish within {limit:?} of virtual time")
}
