//! End-to-end game flow through the room actor: quick play, full starts,
//! rolling, scoring, rejections, and turn timeouts.


use serde_json::json;
use test_helpers::{connect, expect_event, send, test_state, test_state_with};

#[tokio::test]
async fn test_quick_play_start_against_one_ai() {
    let state = test_state();
    let room = state.room_or_spawn("QPABCD");
    let mut host = connect(&room, "host-1", "Hana").await;

    let connected = expect_event(&mut host, "CONNECTED").await;
    assert_eq!(connected["payload"]["yourRole"], "player");
    assert_eq!(connected["payload"]["isHost"], true);
    assert_eq!(connected["payload"]["roomCode"], "QPABCD");

    send(
        &room,
        &host,
        json!({"type": "QUICK_PLAY_START", "payload": {"aiProfiles": ["carmen"]}}),
    )
    .await;

    let started = expect_event(&mut host, "QUICK_PLAY_STARTED").await;
    assert_eq!(
        started["payload"]["playerOrder"],
        json!(["host-1", "ai-carmen"])
    );
    assert_eq!(started["payload"]["currentPlayer"], "host-1");
    assert_eq!(started["payload"]["game"]["phase"], "turn_roll");
    assert_eq!(started["payload"]["game"]["currentPlayerIndex"], 0);

    let turn = expect_event(&mut host, "TURN_STARTED").await;
    assert_eq!(turn["payload"]["userId"], "host-1");
    assert_eq!(turn["payload"]["rollsRemaining"], 3);

    // The human may roll immediately
    send(&room, &host, json!({"type": "DICE_ROLL", "payload": {}})).await;
    let rolled = expect_event(&mut host, "DICE_ROLLED").await;
    assert_eq!(rolled["payload"]["userId"], "host-1");
    assert_eq!(rolled["payload"]["rollsRemaining"], 2);
    assert_eq!(rolled["payload"]["phase"], "turn_decide");
    let dice = rolled["payload"]["dice"].as_array().unwrap().clone();
    assert_eq!(dice.len(), 5);
    for die in &dice {
        let face = die.as_u64().unwrap();
        assert!((1..=6).contains(&face));
    }

    // Keeping everything makes the reroll a no-op on the dice values
    send(
        &room,
        &host,
        json!({"type": "DICE_ROLL", "payload": {"keptMask": [true, true, true, true, true]}}),
    )
    .await;
    let rerolled = expect_event(&mut host, "DICE_ROLLED").await;
    assert_eq!(rerolled["payload"]["rollsRemaining"], 1);
    assert_eq!(rerolled["payload"]["dice"], json!(dice));

    // Score chance: the sum of the dice in hand
    let expected_sum: u64 = dice.iter().map(|d| d.as_u64().unwrap()).sum();
    send(
        &room,
        &host,
        json!({"type": "CATEGORY_SCORE", "payload": {"category": "chance"}}),
    )
    .await;
    let scored = expect_event(&mut host, "CATEGORY_SCORED").await;
    assert_eq!(scored["payload"]["userId"], "host-1");
    assert_eq!(scored["payload"]["category"], "chance");
    assert_eq!(scored["payload"]["score"], expected_sum);
    assert_eq!(scored["payload"]["isRepeatBonus"], false);

    // The AI takes over and signals that it is thinking
    let changed = expect_event(&mut host, "TURN_CHANGED").await;
    assert_eq!(changed["payload"]["userId"], "ai-carmen");
    expect_event(&mut host, "AI_THINKING").await;
}

#[tokio::test]
async fn test_start_game_with_countdown() {
    let state = test_state();
    let room = state.room_or_spawn("STARTA");
    let mut host = connect(&room, "host-1", "Hana").await;
    expect_event(&mut host, "CONNECTED").await;
    let mut guest = connect(&room, "guest-1", "Gil").await;
    expect_event(&mut guest, "CONNECTED").await;
    expect_event(&mut host, "PLAYER_JOINED").await;

    send(&room, &host, json!({"type": "START_GAME"})).await;
    let starting = expect_event(&mut host, "GAME_STARTING").await;
    assert_eq!(starting["payload"]["countdownSecs"], 0);

    // Countdown alarm fires immediately with the test config
    let started = expect_event(&mut host, "GAME_STARTED").await;
    let order: Vec<String> = started["payload"]["playerOrder"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    let mut sorted = order.clone();
    sorted.sort();
    assert_eq!(sorted, vec!["guest-1".to_string(), "host-1".to_string()]);
    assert_eq!(started["payload"]["currentPlayer"], json!(order[0]));

    // Both connections observe the same first turn
    let host_turn = expect_event(&mut host, "TURN_STARTED").await;
    let guest_turn = expect_event(&mut guest, "TURN_STARTED").await;
    assert_eq!(host_turn["payload"]["userId"], guest_turn["payload"]["userId"]);

    // The current player can roll; the other cannot
    let (mut current, mut other) = if order[0] == "host-1" {
        (host, guest)
    } else {
        (guest, host)
    };
    send(&room, &current, json!({"type": "DICE_ROLL", "payload": {}})).await;
    expect_event(&mut current, "DICE_ROLLED").await;

    send(&room, &other, json!({"type": "DICE_ROLL", "payload": {}})).await;
    let error = expect_event(&mut other, "ERROR").await;
    assert_eq!(error["payload"]["code"], "NOT_YOUR_TURN");
}

#[tokio::test]
async fn test_host_only_and_phase_rejections() {
    let state = test_state();
    let room = state.room_or_spawn("REJECT");
    let mut host = connect(&room, "host-1", "Hana").await;
    expect_event(&mut host, "CONNECTED").await;
    let mut guest = connect(&room, "guest-1", "Gil").await;
    expect_event(&mut guest, "CONNECTED").await;

    // Non-host cannot start
    send(&room, &guest, json!({"type": "START_GAME"})).await;
    let error = expect_event(&mut guest, "ERROR").await;
    assert_eq!(error["payload"]["code"], "NOT_HOST");

    // Rolling before the game exists
    send(&room, &host, json!({"type": "DICE_ROLL", "payload": {}})).await;
    let error = expect_event(&mut host, "ERROR").await;
    assert_eq!(error["payload"]["code"], "GAME_NOT_STARTED");

    // Rematch only applies to finished games
    send(&room, &host, json!({"type": "REMATCH"})).await;
    let error = expect_event(&mut host, "ERROR").await;
    assert_eq!(error["payload"]["code"], "GAME_NOT_STARTED");

    // Unknown category is a game rejection, not a frame error
    send(
        &room,
        &host,
        json!({"type": "CATEGORY_SCORE", "payload": {"category": "yahtzee"}}),
    )
    .await;
    let error = expect_event(&mut host, "ERROR").await;
    assert_eq!(error["payload"]["code"], "UNKNOWN_CATEGORY");
}

#[tokio::test]
async fn test_invalid_frames() {
    let state = test_state();
    let room = state.room_or_spawn("FRAMES");
    let mut host = connect(&room, "host-1", "Hana").await;
    expect_event(&mut host, "CONNECTED").await;

    send(&room, &host, json!({"type": "TELEPORT"})).await;
    let error = expect_event(&mut host, "ERROR").await;
    assert_eq!(error["payload"]["code"], "UNKNOWN_COMMAND");

    assert!(
        room.send(dicehall_server::room::RoomMsg::Frame {
            conn_id: host.conn_id,
            text: "not json".to_string(),
        })
        .await
    );
    let error = expect_event(&mut host, "ERROR").await;
    assert_eq!(error["payload"]["code"], "INVALID_MESSAGE");
}

#[tokio::test]
async fn test_ping_pong_through_the_room() {
    let state = test_state();
    let room = state.room_or_spawn("PNGPNG");
    let mut host = connect(&room, "host-1", "Hana").await;
    expect_event(&mut host, "CONNECTED").await;

    send(&room, &host, json!({"type": "PING"})).await;
    expect_event(&mut host, "PONG").await;
}

#[tokio::test]
async fn test_turn_timeout_auto_scores_first_unscored() {
    let state = test_state();
    let room = state.room_or_spawn("AFKGNE");
    let mut host = connect(&room, "host-1", "Hana").await;
    expect_event(&mut host, "CONNECTED").await;

    send(
        &room,
        &host,
        json!({"type": "QUICK_PLAY_START", "payload": {"aiProfiles": ["carmen"]}}),
    )
    .await;
    expect_event(&mut host, "TURN_STARTED").await;

    // The 1-second test clock expires without any command
    let skipped = expect_event(&mut host, "TURN_SKIPPED").await;
    assert_eq!(skipped["payload"]["userId"], "host-1");
    assert_eq!(skipped["payload"]["reason"], "timeout");
    assert_eq!(skipped["payload"]["categoryScored"], "ones");
    assert_eq!(skipped["payload"]["score"], 0);

    let changed = expect_event(&mut host, "TURN_CHANGED").await;
    assert_eq!(changed["payload"]["userId"], "ai-carmen");
}

#[tokio::test]
async fn test_afk_warning_precedes_timeout() {
    // A 12-second clock puts the T-10s warning about two seconds in
    let state = test_state_with(|config| {
        config.server.turn_timeout_secs = 12;
    });
    let room = state.room_or_spawn("AFKWRN");
    let mut host = connect(&room, "host-1", "Hana").await;
    expect_event(&mut host, "CONNECTED").await;

    send(
        &room,
        &host,
        json!({"type": "QUICK_PLAY_START", "payload": {"aiProfiles": ["carmen"]}}),
    )
    .await;
    expect_event(&mut host, "TURN_STARTED").await;

    let warning = expect_event(&mut host, "PLAYER_AFK").await;
    assert_eq!(warning["payload"]["userId"], "host-1");
    let remaining = warning["payload"]["secondsRemaining"].as_u64().unwrap();
    assert!((8..=10).contains(&remaining), "remaining was {remaining}");

    // Acting after the warning cancels nothing retroactively; the roll is
    // still accepted
    send(&room, &host, json!({"type": "DICE_ROLL", "payload": {}})).await;
    expect_event(&mut host, "DICE_ROLLED").await;
}

#[tokio::test]
async fn test_add_ai_player_and_spectator_assignment() {
    let state = test_state();
    let room = state.room_or_spawn("ADDAAS");
    let mut host = connect(&room, "host-1", "Hana").await;
    expect_event(&mut host, "CONNECTED").await;

    send(
        &room,
        &host,
        json!({"type": "ADD_AI_PLAYER", "payload": {"profileId": "rusty"}}),
    )
    .await;
    let joined = expect_event(&mut host, "AI_PLAYER_JOINED").await;
    assert_eq!(joined["payload"]["player"]["id"], "ai-rusty");
    assert_eq!(joined["payload"]["player"]["type"], "ai");

    // Unknown profile id is rejected
    send(
        &room,
        &host,
        json!({"type": "ADD_AI_PLAYER", "payload": {"profileId": "nobody"}}),
    )
    .await;
    let error = expect_event(&mut host, "ERROR").await;
    assert_eq!(error["payload"]["code"], "INVALID_MESSAGE");

    // Start the game; a late joiner becomes a spectator
    send(&room, &host, json!({"type": "START_GAME"})).await;
    expect_event(&mut host, "GAME_STARTED").await;

    let mut late = connect(&room, "late-1", "Lena").await;
    let connected = expect_event(&mut late, "CONNECTED").await;
    assert_eq!(connected["payload"]["yourRole"], "spectator");
    assert_eq!(connected["payload"]["spectatorCount"], 1);
}
