use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::{Dice, Scorecard};

/// User identity as issued by the identity provider (JWT `sub` claim).
pub type UserId = String;

/// Default seat count for new rooms.
pub const DEFAULT_MAX_SEATS: u8 = 4;
/// Default turn timeout in seconds.
pub const DEFAULT_TURN_TIMEOUT_SECS: u32 = 60;
/// Reconnect window after an unexpected disconnect.
pub const RECONNECT_WINDOW_SECS: i64 = 300;
/// Countdown between `START_GAME` acceptance and the first turn.
pub const GAME_START_COUNTDOWN_SECS: i64 = 3;

/// Lifecycle phase of a room (distinct from the in-game phase).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoomPhase {
    Waiting,
    Starting,
    Playing,
    Completed,
    Abandoned,
}

/// Whether a seat is driven by a human connection or an AI profile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SeatType {
    Human,
    Ai,
}

/// Connection role assigned at upgrade time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlayerRole {
    Player,
    Spectator,
}

/// Host-configurable room settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettings {
    /// Number of seats, 2..=4.
    pub max_seats: u8,
    /// Public rooms appear in the lobby directory.
    pub is_public: bool,
    /// Seconds a human has to act before the turn is skipped.
    pub turn_timeout_secs: u32,
    pub allow_spectators: bool,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            max_seats: DEFAULT_MAX_SEATS,
            is_public: true,
            turn_timeout_secs: DEFAULT_TURN_TIMEOUT_SECS,
            allow_spectators: true,
        }
    }
}

/// Public view of a seated player, broadcast in `CONNECTED` and join events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub id: UserId,
    pub display_name: String,
    pub avatar_seed: String,
    #[serde(rename = "type")]
    pub seat_type: SeatType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_profile_id: Option<String>,
    pub is_host: bool,
    pub is_connected: bool,
    pub turn_order: usize,
    pub scorecard: Scorecard,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_dice: Option<Dice>,
    pub kept_mask: [bool; 5],
    pub rolls_remaining: u8,
    pub total_score: u32,
}

/// Public view of a spectator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SpectatorSnapshot {
    pub id: UserId,
    pub display_name: String,
    pub connected_at: DateTime<Utc>,
}

/// Directory entry published to the lobby on every room status change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub code: String,
    pub host_name: String,
    pub player_count: usize,
    pub max_players: u8,
    pub phase: RoomPhase,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

/// Final standing for one player, computed when the game completes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Ranking {
    pub user_id: UserId,
    pub display_name: String,
    pub total_score: u32,
    /// 1-based position; ties share a position.
    pub position: usize,
}
