//! Runtime tests - the room loop on a tokio task

use std::sync::Arc;
use std::time::Duration;

use puyo_versus::room::{
    InboundCommand, OutboundMessage, RoomManager, RoomRuntime, RuntimeConfig,
    SequentialIdGenerator,
};
use puyo_versus::types::SystemClock;

fn spawn() -> RoomRuntime {
    let manager = RoomManager::with_virtual_time(
        Box::new(SequentialIdGenerator::new("live")),
        Arc::new(SystemClock::new()),
    );
    RoomRuntime::spawn(manager, RuntimeConfig::default())
}

async fn next_line_for(rt: &mut RoomRuntime, client: u32, needle: &str) -> String {
    let wait = async {
        loop {
            match rt.recv().await {
                Some(OutboundMessage::ToClient { client_id, line })
                    if client_id == client && line.contains(needle) =>
                {
                    return line;
                }
                Some(_) => continue,
                None => panic!("runtime stopped"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("no matching line")
}

#[tokio::test]
async fn test_two_clients_start_a_round() {
    let mut rt = spawn();
    let send = |client, line: &str| InboundCommand::from_line(client, line).unwrap();

    rt.send(send(
        1,
        r#"{"type":"createRoom","settingsString":"Tsu 0.036 12 6 0.375 4 70 96000 0","roomSize":2}"#,
    ))
    .await
    .unwrap();
    next_line_for(&mut rt, 1, r#""roomId":"live-1""#).await;

    rt.send(send(2, r#"{"type":"joinRoom","roomId":"live-1"}"#))
        .await
        .unwrap();
    next_line_for(&mut rt, 2, r#""type":"roomUpdate""#).await;

    rt.send(send(1, r#"{"type":"startRoom"}"#)).await.unwrap();
    let start = next_line_for(&mut rt, 2, r#""type":"start""#).await;
    assert!(start.contains(r#""opponentIds":[1]"#));

    let manager = rt.shutdown().await.unwrap();
    assert!(!manager.is_open());
}

#[tokio::test]
async fn test_reports_are_relayed() {
    let mut rt = spawn();
    let sender = rt.sender();
    for (client, line) in [
        (
            1,
            r#"{"type":"createRoom","settingsString":"Tsu 0.036 12 6 0.375 4 70 96000 0","roomSize":2}"#,
        ),
        (2, r#"{"type":"joinRoom","roomId":"live-1"}"#),
        (1, r#"{"type":"startRoom"}"#),
        (
            2,
            r#"{"type":"sendNuisance","participantId":2,"nuisanceAmount":4}"#,
        ),
    ] {
        sender
            .send(InboundCommand::from_line(client, line).unwrap())
            .await
            .unwrap();
    }

    let line = next_line_for(&mut rt, 1, r#""type":"nuisance""#).await;
    assert!(line.contains(r#""nuisanceAmount":4"#));
    drop(sender);
    rt.shutdown().await;
}
