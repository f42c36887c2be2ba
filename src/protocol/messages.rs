use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error_codes::ErrorCode;
use super::types::{
    PlayerSnapshot, Ranking, RoomPhase, RoomSettings, RoomSummary, SpectatorSnapshot, UserId,
};
use crate::chat::ChatMessage;
use crate::game::{Dice, GamePhase, GameState, KeepMask};
use crate::join_requests::JoinRequest;

/// Commands sent from client to server.
///
/// The set is closed: anything else fails frame validation with
/// `UNKNOWN_COMMAND`. Payload fields are camelCase on the wire, matching
/// the nested payload structs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ClientCommand {
    // Game commands (room connections)
    StartGame,
    QuickPlayStart {
        ai_profiles: Vec<String>,
    },
    DiceRoll {
        /// Positions to preserve; omitted on the first roll of a turn.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kept_mask: Option<KeepMask>,
    },
    DiceKeep {
        indices: Vec<u8>,
    },
    CategoryScore {
        /// Wire name of the category; parsed server-side so an unknown name
        /// surfaces as a game rejection rather than a frame error.
        category: String,
    },
    Rematch,
    AddAiPlayer {
        profile_id: String,
    },
    Ping,

    // Chat commands (room and lobby connections)
    Chat {
        content: String,
    },
    QuickChat {
        key: String,
    },
    Reaction {
        message_id: Uuid,
        token: String,
        op: ReactionOp,
    },
    TypingStart,
    TypingStop,

    // Join-request resolution (room host)
    ApproveJoinRequest {
        request_id: Uuid,
    },
    DeclineJoinRequest {
        request_id: Uuid,
    },

    // Lobby-only commands
    LobbyChat {
        content: String,
    },
    GetRooms,
    GetOnlineUsers,
    RequestJoin {
        room_code: String,
    },
    CancelJoinRequest {
        request_id: Uuid,
    },
    SendInvite {
        to_user_id: UserId,
        room_code: String,
    },
    CancelInvite {
        invite_id: Uuid,
    },
}

/// Add or remove a reaction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReactionOp {
    Add,
    Remove,
}

/// Why a turn was skipped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnSkipReason {
    Timeout,
    Disconnect,
}

/// Payload for the `CONNECTED` event: the full picture a joining or
/// reconnecting client needs. Boxed in [`ServerEvent`] to keep the enum small.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPayload {
    pub room_code: String,
    pub room_phase: RoomPhase,
    pub settings: RoomSettings,
    pub your_user_id: UserId,
    pub your_role: super::types::PlayerRole,
    pub is_host: bool,
    pub players: Vec<PlayerSnapshot>,
    pub spectator_count: usize,
    pub game: GameState,
    pub chat_history: Vec<ChatMessage>,
}

/// Payload for `INVITE_RECEIVED`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitePayload {
    pub id: Uuid,
    pub from_user_id: UserId,
    pub from_display_name: String,
    pub room_code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A lobby presence entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUser {
    pub user_id: UserId,
    pub display_name: String,
    pub avatar_seed: String,
}

/// Directory change kind for `LOBBY_ROOM_UPDATE`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoomUpdateAction {
    Created,
    Updated,
    Closed,
}

/// Events sent from server to client. Closed set; every outbound frame is
/// one of these wrapped in an [`OutboundFrame`]. Payload fields are
/// camelCase on the wire, matching the nested payload structs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    Connected(Box<ConnectedPayload>),
    PlayerJoined {
        player: PlayerSnapshot,
    },
    PlayerLeft {
        user_id: UserId,
    },
    PlayerDisconnected {
        user_id: UserId,
        reconnect_deadline: DateTime<Utc>,
    },
    PlayerReconnected {
        user_id: UserId,
    },
    PlayerRemoved {
        user_id: UserId,
    },
    SpectatorJoined {
        spectator: SpectatorSnapshot,
        spectator_count: usize,
    },
    AiPlayerJoined {
        player: PlayerSnapshot,
    },
    GameStarting {
        countdown_secs: u32,
    },
    GameStarted {
        player_order: Vec<UserId>,
        current_player: UserId,
        game: GameState,
    },
    QuickPlayStarted {
        player_order: Vec<UserId>,
        current_player: UserId,
        game: GameState,
        players: Vec<PlayerSnapshot>,
    },
    TurnStarted {
        user_id: UserId,
        turn_number: u32,
        round_number: u32,
        rolls_remaining: u8,
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout_secs: Option<u32>,
    },
    TurnChanged {
        user_id: UserId,
        round_number: u32,
    },
    DiceRolled {
        user_id: UserId,
        dice: Dice,
        kept_mask: KeepMask,
        rolls_remaining: u8,
        phase: GamePhase,
    },
    DiceKept {
        user_id: UserId,
        kept_mask: KeepMask,
    },
    CategoryScored {
        user_id: UserId,
        category: String,
        score: u32,
        is_repeat_bonus: bool,
        upper_bonus_awarded: bool,
        total_score: u32,
    },
    TurnSkipped {
        user_id: UserId,
        reason: TurnSkipReason,
        category_scored: String,
        score: u32,
    },
    PlayerAfk {
        user_id: UserId,
        seconds_remaining: u32,
    },
    GameOver {
        rankings: Vec<Ranking>,
        game: GameState,
    },
    RematchStarted {
        players: Vec<PlayerSnapshot>,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
    Pong,

    // AI presentation events
    AiThinking {
        user_id: UserId,
    },
    AiRolling {
        user_id: UserId,
    },
    AiKeeping {
        user_id: UserId,
        kept_mask: KeepMask,
    },
    AiScoring {
        user_id: UserId,
        category: String,
    },

    // Chat events
    ChatMessage {
        message: ChatMessage,
    },
    ChatHistory {
        messages: Vec<ChatMessage>,
    },
    ReactionUpdate {
        message_id: Uuid,
        reactions: std::collections::BTreeMap<String, Vec<UserId>>,
    },
    TypingUpdate {
        user_id: UserId,
        display_name: String,
        is_typing: bool,
    },
    ChatError {
        code: ErrorCode,
        message: String,
    },

    // Join-request events
    JoinRequestSent {
        request: JoinRequest,
    },
    JoinRequestReceived {
        request: JoinRequest,
    },
    JoinRequestUpdate {
        request: JoinRequest,
    },
    JoinRequestCancelled {
        request_id: Uuid,
    },
    JoinRequestError {
        code: ErrorCode,
        message: String,
    },

    // Lobby events
    PresenceInit {
        users: Vec<OnlineUser>,
    },
    PresenceJoin {
        user: OnlineUser,
    },
    PresenceLeave {
        user_id: UserId,
    },
    LobbyRoomsList {
        rooms: Vec<RoomSummary>,
    },
    LobbyRoomUpdate {
        action: RoomUpdateAction,
        room: RoomSummary,
    },
    LobbyChatMessage {
        message: ChatMessage,
    },
    LobbyChatHistory {
        messages: Vec<ChatMessage>,
    },
    LobbyOnlineUsers {
        users: Vec<OnlineUser>,
    },
    InviteReceived {
        invite: InvitePayload,
    },
    InviteCancelled {
        invite_id: Uuid,
    },
    LobbyHighlight {
        room_code: String,
    },
    LobbyError {
        code: ErrorCode,
        message: String,
    },
}

/// Outbound envelope: `{type, payload, timestamp}` with an ISO-8601 UTC
/// timestamp stamped at send time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundFrame {
    #[serde(flatten)]
    pub event: ServerEvent,
    pub timestamp: DateTime<Utc>,
}

impl OutboundFrame {
    pub fn new(event: ServerEvent) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
        }
    }

    /// Serialize to the text frame sent on the wire.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to serialize outbound frame");
            // A frame the client will surface as a protocol error
            format!(
                "{{\"type\":\"ERROR\",\"payload\":{{\"code\":\"INVALID_MESSAGE\",\"message\":\"serialization failure\"}},\"timestamp\":\"{}\"}}",
                self.timestamp.to_rfc3339()
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_command_wire_shape() {
        let cmd: ClientCommand = serde_json::from_str(
            r#"{"type":"DICE_ROLL","payload":{"keptMask":[true,false,false,true,true]}}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            ClientCommand::DiceRoll {
                kept_mask: Some([true, false, false, true, true])
            }
        );

        let cmd: ClientCommand = serde_json::from_str(r#"{"type":"START_GAME"}"#).unwrap();
        assert_eq!(cmd, ClientCommand::StartGame);

        let cmd: ClientCommand = serde_json::from_str(
            r#"{"type":"QUICK_PLAY_START","payload":{"aiProfiles":["carmen"]}}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            ClientCommand::QuickPlayStart {
                ai_profiles: vec!["carmen".to_string()]
            }
        );
    }

    #[test]
    fn test_outbound_frame_envelope() {
        let frame = OutboundFrame::new(ServerEvent::Pong);
        let json: serde_json::Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(json["type"], "PONG");
        assert!(json["timestamp"].is_string());

        let frame = OutboundFrame::new(ServerEvent::PlayerAfk {
            user_id: "u1".to_string(),
            seconds_remaining: 10,
        });
        let json: serde_json::Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(json["type"], "PLAYER_AFK");
        assert_eq!(json["payload"]["userId"], "u1");
        assert_eq!(json["payload"]["secondsRemaining"], 10);
    }

    #[test]
    fn test_inline_payload_fields_are_camel_case() {
        let frame = OutboundFrame::new(ServerEvent::CategoryScored {
            user_id: "u1".to_string(),
            category: "fives".to_string(),
            score: 25,
            is_repeat_bonus: true,
            upper_bonus_awarded: false,
            total_score: 100,
        });
        let json: serde_json::Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(json["payload"]["score"], 25);
        assert_eq!(json["payload"]["isRepeatBonus"], true);
        assert_eq!(json["payload"]["upperBonusAwarded"], false);
        assert_eq!(json["payload"]["totalScore"], 100);
        // The snake_case spellings must not leak onto the wire
        assert!(json["payload"].get("is_repeat_bonus").is_none());
        assert!(json["payload"].get("total_score").is_none());
    }

    #[test]
    fn test_error_event_shape() {
        let frame = OutboundFrame::new(ServerEvent::Error {
            code: ErrorCode::NotYourTurn,
            message: ErrorCode::NotYourTurn.description().to_string(),
        });
        let json: serde_json::Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(json["payload"]["code"], "NOT_YOUR_TURN");
    }
}
