//! Room tests - pacing, timeouts, queues and CPU rounds through the manager

use std::sync::Arc;
use std::time::Duration;

use puyo_versus::engine::ParticipantMessage;
use puyo_versus::room::{
    CpuSpec, Outbound, QueueKind, RoomError, RoomManager, RoomOptions, RoomType,
    SequentialIdGenerator, ServerMessage,
};
use puyo_versus::types::{ManualClock, ParticipantId, Settings, PACING_TIMEOUT_MS};

fn manager() -> RoomManager {
    let mut manager = RoomManager::with_virtual_time(
        Box::new(SequentialIdGenerator::new("room")),
        Arc::new(ManualClock::new(0)),
    );
    manager.open();
    manager
}

fn started(players: &[ParticipantId]) -> (RoomManager, String) {
    let mut manager = manager();
    let room_id = manager
        .create_room(
            players[0],
            RoomOptions {
                room_size: players.len(),
                ..RoomOptions::default()
            },
        )
        .unwrap();
    for &p in &players[1..] {
        assert!(manager.join_room(p, &room_id, None).unwrap());
    }
    manager.start_room(players[0]).unwrap();
    manager.take_outbox();
    (manager, room_id)
}

fn report(manager: &mut RoomManager, id: ParticipantId, frames: u64) {
    for _ in 0..frames {
        manager
            .handle_message(
                id,
                ParticipantMessage::SendState {
                    participant_id: id,
                    board_state_hash: 0,
                    score: 0,
                    total_nuisance: 0,
                },
            )
            .unwrap();
    }
}

fn received(out: &[Outbound], to: ParticipantId, message: &ServerMessage) -> bool {
    out.iter().any(|o| o.to == to && &o.message == message)
}

#[test]
fn test_start_tells_each_player_their_opponents() {
    let mut manager = manager();
    let room_id = manager.create_room(1, RoomOptions::default()).unwrap();
    manager.join_room(2, &room_id, None).unwrap();
    manager.take_outbox();
    manager.start_room(1).unwrap();

    let out = manager.take_outbox();
    let starts: Vec<_> = out
        .iter()
        .filter_map(|o| match &o.message {
            ServerMessage::Start { opponent_ids, .. } => Some((o.to, opponent_ids.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(starts, vec![(1, vec![2]), (2, vec![1])]);
}

#[test]
fn test_frame_lead_pauses_then_resumes() {
    let (mut manager, room_id) = started(&[1, 2, 3]);
    for _ in 0..100 {
        for id in [1, 2, 3] {
            report(&mut manager, id, 1);
        }
    }
    report(&mut manager, 3, 21);

    let room = manager.room(&room_id).unwrap();
    assert!(room.is_paused(3));
    assert!(!room.is_paused(1) && !room.is_paused(2));
    assert!(received(&manager.take_outbox(), 3, &ServerMessage::Pause));

    report(&mut manager, 1, 7);
    report(&mut manager, 2, 7);
    assert!(!manager.room(&room_id).unwrap().is_paused(3));
    assert!(received(&manager.take_outbox(), 3, &ServerMessage::Play));
}

#[test]
fn test_stalled_player_times_out() {
    let (mut manager, room_id) = started(&[1, 2]);
    report(&mut manager, 1, 21);
    manager.take_outbox();

    manager.advance(Duration::from_millis(PACING_TIMEOUT_MS - 1));
    assert!(manager.take_outbox().is_empty());
    manager.advance(Duration::from_millis(1));

    let out = manager.take_outbox();
    assert!(received(&out, 2, &ServerMessage::Timeout));
    assert!(received(
        &out,
        1,
        &ServerMessage::WinnerResult {
            participant_id: Some(1)
        }
    ));
    assert!(!manager.room(&room_id).unwrap().in_game());
}

#[test]
fn test_stalled_player_times_out_after_another_leaves() {
    let (mut manager, room_id) = started(&[1, 2, 3]);
    report(&mut manager, 2, 21);
    report(&mut manager, 3, 5);
    manager.leave_room(3).unwrap();
    manager.take_outbox();

    let room = manager.room(&room_id).unwrap();
    assert!(room.is_paused(2));
    assert!(room.timeout_pending());

    manager.advance(Duration::from_millis(PACING_TIMEOUT_MS));
    let out = manager.take_outbox();
    assert!(received(&out, 1, &ServerMessage::Timeout));
    assert!(received(
        &out,
        2,
        &ServerMessage::WinnerResult {
            participant_id: Some(2)
        }
    ));
    assert!(!manager.room(&room_id).unwrap().in_game());
}

#[test]
fn test_nuisance_is_relayed_to_opponents_only() {
    let (mut manager, _) = started(&[1, 2, 3]);
    manager
        .handle_message(
            2,
            ParticipantMessage::SendNuisance {
                participant_id: 2,
                nuisance_amount: 9,
            },
        )
        .unwrap();

    let out = manager.take_outbox();
    let nuisance = ServerMessage::Nuisance {
        participant_id: 2,
        nuisance_amount: 9,
    };
    assert!(received(&out, 1, &nuisance));
    assert!(received(&out, 3, &nuisance));
    assert!(!received(&out, 2, &nuisance));
}

#[test]
fn test_wrong_password_is_rejected() {
    let mut manager = manager();
    let room_id = manager
        .create_room(
            1,
            RoomOptions {
                password: Some("hunter2".to_string()),
                ..RoomOptions::default()
            },
        )
        .unwrap();

    assert!(matches!(
        manager.join_room(2, &room_id, None),
        Err(RoomError::PasswordRequired(_))
    ));
    assert!(matches!(
        manager.join_room(2, &room_id, Some("nope")),
        Err(RoomError::PasswordIncorrect(_))
    ));
    assert!(manager.join_room(2, &room_id, Some("hunter2")).unwrap());
}

#[test]
fn test_free_for_all_queue_fills_to_four() {
    let mut manager = manager();
    let first = manager.join_queue(10, QueueKind::FreeForAll).unwrap();
    for p in 11..13 {
        assert_eq!(manager.join_queue(p, QueueKind::FreeForAll).unwrap(), first);
    }
    assert!(!manager.room(&first).unwrap().in_game());

    assert_eq!(manager.join_queue(13, QueueKind::FreeForAll).unwrap(), first);
    let room = manager.room(&first).unwrap();
    assert!(room.in_game());
    assert_eq!(room.room_type(), RoomType::FreeForAll);

    let next = manager.join_queue(14, QueueKind::FreeForAll).unwrap();
    assert_ne!(next, first);
}

#[test]
fn test_cpu_round_finishes_on_virtual_time() {
    let clock = ManualClock::new(0);
    let mut manager = RoomManager::with_virtual_time(
        Box::new(SequentialIdGenerator::new("cpu")),
        Arc::new(clock.clone()),
    );
    manager.open();
    let room_id = manager
        .create_room(
            1,
            RoomOptions {
                room_size: 2,
                settings: Settings::default().with_seed(31),
                cpus: vec![
                    CpuSpec {
                        strategy: "flat".to_string(),
                        speed: 2,
                    },
                    CpuSpec {
                        strategy: "random".to_string(),
                        speed: 2,
                    },
                ],
                ..RoomOptions::default()
            },
        )
        .unwrap();
    assert!(manager.room(&room_id).unwrap().spectators().contains(&1));
    manager.start_room(1).unwrap();

    let mut winner = None;
    for _ in 0..60_000 {
        manager.advance(Duration::from_millis(16));
        clock.advance(16);
        if let Some(out) = manager
            .take_outbox()
            .into_iter()
            .find(|o| o.to == 1 && matches!(o.message, ServerMessage::WinnerResult { .. }))
        {
            winner = Some(out.message);
            break;
        }
    }
    assert!(matches!(
        winner,
        Some(ServerMessage::WinnerResult {
            participant_id: Some(_)
        })
    ));
    assert!(!manager.room(&room_id).unwrap().in_game());
}
