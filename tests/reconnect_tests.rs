//! Disconnect, reconnect-within-window, and seat-expiry behavior.


use std::time::Duration;

use serde_json::json;
use test_helpers::{connect, disconnect, expect_event, expect_no_event, send, test_state, test_state_with};

#[tokio::test]
async fn test_reconnect_within_window_restores_seat() {
    let state = test_state();
    let room = state.room_or_spawn("RECNCT");
    let mut host = connect(&room, "host-1", "Hana").await;
    expect_event(&mut host, "CONNECTED").await;
    let mut guest = connect(&room, "guest-1", "Gil").await;
    expect_event(&mut guest, "CONNECTED").await;
    expect_event(&mut host, "PLAYER_JOINED").await;

    disconnect(&room, &guest).await;
    let gone = expect_event(&mut host, "PLAYER_DISCONNECTED").await;
    assert_eq!(gone["payload"]["userId"], "guest-1");
    assert!(gone["payload"]["reconnectDeadline"].is_string());

    // Same user returns inside the window
    let mut returned = connect(&room, "guest-1", "Gil").await;
    let connected = expect_event(&mut returned, "CONNECTED").await;
    assert_eq!(connected["payload"]["yourRole"], "player");
    // The payload carries enough to resume: players and chat history
    let players = connected["payload"]["players"].as_array().unwrap();
    assert_eq!(players.len(), 2);
    let seat = players.iter().find(|p| p["id"] == "guest-1").unwrap();
    assert_eq!(seat["isConnected"], true);
    assert!(!connected["payload"]["chatHistory"].as_array().unwrap().is_empty());

    let rejoined = expect_event(&mut host, "PLAYER_RECONNECTED").await;
    assert_eq!(rejoined["payload"]["userId"], "guest-1");
}

#[tokio::test]
async fn test_seat_expires_in_waiting_room() {
    let state = test_state_with(|config| {
        config.server.reconnect_window_secs = 1;
    });
    let room = state.room_or_spawn("EXPRES");
    let mut host = connect(&room, "host-1", "Hana").await;
    expect_event(&mut host, "CONNECTED").await;
    let guest = connect(&room, "guest-1", "Gil").await;
    expect_event(&mut host, "PLAYER_JOINED").await;

    disconnect(&room, &guest).await;
    expect_event(&mut host, "PLAYER_DISCONNECTED").await;

    // The 1-second window elapses and the seat is released
    let removed = expect_event(&mut host, "PLAYER_REMOVED").await;
    assert_eq!(removed["payload"]["userId"], "guest-1");

    // The released user reclaims a fresh seat on return
    let mut returned = connect(&room, "guest-1", "Gil").await;
    let connected = expect_event(&mut returned, "CONNECTED").await;
    assert_eq!(connected["payload"]["yourRole"], "player");
    expect_event(&mut host, "PLAYER_JOINED").await;
}

#[tokio::test]
async fn test_mid_game_expiry_forfeits_and_later_rejoin_spectates() {
    let state = test_state_with(|config| {
        config.server.reconnect_window_secs = 1;
        // Keep the humans' turns from timing out under the expiry window
        config.server.turn_timeout_secs = 120;
    });
    let room = state.room_or_spawn("FRFETS");
    let mut host = connect(&room, "host-1", "Hana").await;
    expect_event(&mut host, "CONNECTED").await;
    let guest = connect(&room, "guest-1", "Gil").await;
    expect_event(&mut host, "PLAYER_JOINED").await;

    send(&room, &host, json!({"type": "START_GAME"})).await;
    expect_event(&mut host, "GAME_STARTED").await;

    disconnect(&room, &guest).await;
    expect_event(&mut host, "PLAYER_DISCONNECTED").await;

    // After expiry the seat forfeits; if it was the current turn it is
    // skipped with reason=disconnect, otherwise the skip lands when the
    // turn rotation reaches the empty seat
    tokio::time::sleep(Duration::from_millis(2500)).await;

    // A post-expiry return is seated as a spectator
    let mut returned = connect(&room, "guest-1", "Gil").await;
    let connected = expect_event(&mut returned, "CONNECTED").await;
    assert_eq!(connected["payload"]["yourRole"], "spectator");
}

#[tokio::test]
async fn test_second_connection_supersedes_first() {
    let state = test_state();
    let room = state.room_or_spawn("SUPERS");
    let mut first = connect(&room, "host-1", "Hana").await;
    expect_event(&mut first, "CONNECTED").await;

    let mut second = connect(&room, "host-1", "Hana").await;
    expect_event(&mut second, "CONNECTED").await;

    // The older connection stops receiving events: a chat sent afterwards
    // reaches only the new connection
    send(&room, &second, json!({"type": "CHAT", "payload": {"content": "still here"}})).await;
    let message = expect_event(&mut second, "CHAT_MESSAGE").await;
    assert_eq!(message["payload"]["message"]["content"], "still here");
    expect_no_event(&mut first, "CHAT_MESSAGE", Duration::from_millis(500)).await;
}
