//! Chat engine and join-request behavior through the room actor.


use serde_json::json;
use test_helpers::{connect, expect_event, identity, send, test_state};
use tokio::sync::oneshot;

use dicehall_server::join_requests::JoinRequestError;
use dicehall_server::room::RoomMsg;

#[tokio::test]
async fn test_chat_broadcast_and_rate_limit() {
    let state = test_state();
    let room = state.room_or_spawn("CHATTY");
    let mut host = connect(&room, "host-1", "Hana").await;
    expect_event(&mut host, "CONNECTED").await;
    let mut guest = connect(&room, "guest-1", "Gil").await;
    expect_event(&mut guest, "CONNECTED").await;

    send(
        &room,
        &host,
        json!({"type": "CHAT", "payload": {"content": "hello room"}}),
    )
    .await;
    let message = expect_event(&mut guest, "CHAT_MESSAGE").await;
    assert_eq!(message["payload"]["message"]["content"], "hello room");
    assert_eq!(message["payload"]["message"]["authorId"], "host-1");
    assert_eq!(message["payload"]["message"]["kind"], "text");

    // An immediate follow-up trips the per-user interval
    send(
        &room,
        &host,
        json!({"type": "CHAT", "payload": {"content": "too fast"}}),
    )
    .await;
    let error = expect_event(&mut host, "CHAT_ERROR").await;
    assert_eq!(error["payload"]["code"], "RATE_LIMITED");

    // Another user is not throttled by it
    send(
        &room,
        &guest,
        json!({"type": "CHAT", "payload": {"content": "me too"}}),
    )
    .await;
    expect_event(&mut host, "CHAT_MESSAGE").await;
}

#[tokio::test]
async fn test_message_too_long_and_quick_chat() {
    let state = test_state();
    let room = state.room_or_spawn("MSGBGG");
    let mut host = connect(&room, "host-1", "Hana").await;
    expect_event(&mut host, "CONNECTED").await;

    let long = "x".repeat(600);
    send(&room, &host, json!({"type": "CHAT", "payload": {"content": long}})).await;
    let error = expect_event(&mut host, "CHAT_ERROR").await;
    assert_eq!(error["payload"]["code"], "MESSAGE_TOO_LONG");

    send(&room, &host, json!({"type": "QUICK_CHAT", "payload": {"key": "gg"}})).await;
    let message = expect_event(&mut host, "CHAT_MESSAGE").await;
    assert_eq!(message["payload"]["message"]["content"], "Good game!");
    assert_eq!(message["payload"]["message"]["kind"], "quick");

    send(
        &room,
        &host,
        json!({"type": "QUICK_CHAT", "payload": {"key": "not-a-preset"}}),
    )
    .await;
    let error = expect_event(&mut host, "CHAT_ERROR").await;
    assert_eq!(error["payload"]["code"], "INVALID_MESSAGE");
}

#[tokio::test]
async fn test_reactions_and_typing() {
    let state = test_state();
    let room = state.room_or_spawn("REACTS");
    let mut host = connect(&room, "host-1", "Hana").await;
    expect_event(&mut host, "CONNECTED").await;
    let mut guest = connect(&room, "guest-1", "Gil").await;
    expect_event(&mut guest, "CONNECTED").await;

    send(
        &room,
        &host,
        json!({"type": "CHAT", "payload": {"content": "react to this"}}),
    )
    .await;
    let message = expect_event(&mut guest, "CHAT_MESSAGE").await;
    let message_id = message["payload"]["message"]["id"].as_str().unwrap().to_string();

    send(
        &room,
        &guest,
        json!({"type": "REACTION", "payload": {"messageId": message_id, "token": "fire", "op": "add"}}),
    )
    .await;
    let update = expect_event(&mut host, "REACTION_UPDATE").await;
    assert_eq!(update["payload"]["reactions"]["fire"], json!(["guest-1"]));

    // Typing updates exclude the sender and reach everyone else
    send(&room, &guest, json!({"type": "TYPING_START"})).await;
    let typing = expect_event(&mut host, "TYPING_UPDATE").await;
    assert_eq!(typing["payload"]["userId"], "guest-1");
    assert_eq!(typing["payload"]["isTyping"], true);

    send(&room, &guest, json!({"type": "TYPING_STOP"})).await;
    let typing = expect_event(&mut host, "TYPING_UPDATE").await;
    assert_eq!(typing["payload"]["isTyping"], false);
}

async fn create_request(
    room: &dicehall_server::room::RoomHandle,
    user_id: &str,
    name: &str,
) -> Result<dicehall_server::join_requests::JoinRequest, JoinRequestError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    assert!(
        room.send(RoomMsg::CreateJoinRequest {
            requester: identity(user_id, name),
            reply: reply_tx,
        })
        .await
    );
    reply_rx.await.expect("room actor replies")
}

#[tokio::test]
async fn test_join_request_lifecycle() {
    let state = test_state();
    let room = state.room_or_spawn("JNRQST");
    let mut host = connect(&room, "host-1", "Hana").await;
    expect_event(&mut host, "CONNECTED").await;

    // Brokered request lands on the host's connection
    let request = create_request(&room, "wanter-1", "Wanda").await.unwrap();
    assert_eq!(request.room_code, "JNRQST");
    assert_eq!(request.status, dicehall_server::join_requests::JoinRequestStatus::Pending);
    let received = expect_event(&mut host, "JOIN_REQUEST_RECEIVED").await;
    assert_eq!(received["payload"]["request"]["requesterId"], "wanter-1");

    // One pending request per requester
    let duplicate = create_request(&room, "wanter-1", "Wanda").await;
    assert_eq!(duplicate, Err(JoinRequestError::DuplicateRequest));

    // Host approves; the terminal state is pushed back to the host
    send(
        &room,
        &host,
        json!({"type": "APPROVE_JOIN_REQUEST", "payload": {"requestId": request.id}}),
    )
    .await;
    let update = expect_event(&mut host, "JOIN_REQUEST_UPDATE").await;
    assert_eq!(update["payload"]["request"]["status"], "approved");

    // Terminal requests cannot be resolved again
    send(
        &room,
        &host,
        json!({"type": "DECLINE_JOIN_REQUEST", "payload": {"requestId": request.id}}),
    )
    .await;
    let error = expect_event(&mut host, "ERROR").await;
    assert_eq!(error["payload"]["code"], "INVALID_STATUS_TRANSITION");
}

#[tokio::test]
async fn test_join_request_cancel_requires_requester() {
    let state = test_state();
    let room = state.room_or_spawn("CNCREQ");
    let mut host = connect(&room, "host-1", "Hana").await;
    expect_event(&mut host, "CONNECTED").await;

    let request = create_request(&room, "wanter-1", "Wanda").await.unwrap();
    expect_event(&mut host, "JOIN_REQUEST_RECEIVED").await;

    let (reply_tx, reply_rx) = oneshot::channel();
    assert!(
        room.send(RoomMsg::CancelJoinRequest {
            request_id: request.id,
            requester_id: "intruder".to_string(),
            reply: reply_tx,
        })
        .await
    );
    assert_eq!(reply_rx.await.unwrap(), Err(JoinRequestError::NotRequester));

    let (reply_tx, reply_rx) = oneshot::channel();
    assert!(
        room.send(RoomMsg::CancelJoinRequest {
            request_id: request.id,
            requester_id: "wanter-1".to_string(),
            reply: reply_tx,
        })
        .await
    );
    let cancelled = reply_rx.await.unwrap().unwrap();
    assert_eq!(
        cancelled.status,
        dicehall_server::join_requests::JoinRequestStatus::Cancelled
    );

    // Only the host resolves requests from inside the room
    let request = create_request(&room, "wanter-2", "Willa").await.unwrap();
    expect_event(&mut host, "JOIN_REQUEST_RECEIVED").await;
    let mut guest = connect(&room, "guest-1", "Gil").await;
    expect_event(&mut guest, "CONNECTED").await;
    send(
        &room,
        &guest,
        json!({"type": "APPROVE_JOIN_REQUEST", "payload": {"requestId": request.id}}),
    )
    .await;
    let error = expect_event(&mut guest, "ERROR").await;
    assert_eq!(error["payload"]["code"], "NOT_HOST");
}
