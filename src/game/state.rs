use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::types::Ranking;
use crate::protocol::UserId;

/// Rolls available at the start of each turn.
pub const MAX_ROLLS_PER_TURN: u8 = 3;
/// A game is thirteen rounds: one per scoring category.
pub const ROUNDS_PER_GAME: u32 = 13;

/// Phase of an in-progress game.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    Waiting,
    Starting,
    TurnRoll,
    TurnDecide,
    GameOver,
}

/// Authoritative per-game state, persisted under the `game_state` key.
///
/// Seats (scorecards, dice in hand) live on the room record; this struct
/// tracks whose turn it is and where the game is in its thirteen rounds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub phase: GamePhase,
    /// Fixed at game start; exactly the seated players, in randomized order.
    pub player_order: Vec<UserId>,
    pub current_player_index: usize,
    /// 1-based turn counter within the current round's pass.
    pub turn_number: u32,
    /// 1-based round counter, increments when the turn cursor wraps.
    pub round_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_started_at: Option<DateTime<Utc>>,
    /// Absolute deadline for the current human turn; `None` while an AI
    /// plays or the clock is frozen by a disconnect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_deadline: Option<DateTime<Utc>>,
    /// Whether the T-10s warning for the current turn has been sent.
    #[serde(default)]
    pub afk_warning_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_completed_at: Option<DateTime<Utc>>,
    /// Remaining turn-clock seconds, captured when the current player
    /// disconnects and restored on reconnect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_clock_remaining_secs: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rankings: Vec<Ranking>,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            phase: GamePhase::Waiting,
            player_order: Vec::new(),
            current_player_index: 0,
            turn_number: 1,
            round_number: 1,
            turn_started_at: None,
            turn_deadline: None,
            afk_warning_sent: false,
            game_started_at: None,
            game_completed_at: None,
            turn_clock_remaining_secs: None,
            rankings: Vec::new(),
        }
    }
}

impl GameState {
    /// Id of the player whose turn it is, if a game is running.
    pub fn current_player_id(&self) -> Option<&UserId> {
        if matches!(self.phase, GamePhase::TurnRoll | GamePhase::TurnDecide) {
            self.player_order.get(self.current_player_index)
        } else {
            None
        }
    }

    /// Enter the starting countdown with a fixed player order.
    pub fn begin_countdown(&mut self, player_order: Vec<UserId>, now: DateTime<Utc>) {
        self.phase = GamePhase::Starting;
        self.player_order = player_order;
        self.current_player_index = 0;
        self.turn_number = 1;
        self.round_number = 1;
        self.game_started_at = Some(now);
        self.game_completed_at = None;
        self.rankings.clear();
    }

    /// Begin the first (or next) turn in the roll phase.
    pub fn begin_turn(&mut self, now: DateTime<Utc>) {
        self.phase = GamePhase::TurnRoll;
        self.turn_started_at = Some(now);
        self.turn_deadline = None;
        self.afk_warning_sent = false;
        self.turn_clock_remaining_secs = None;
    }

    /// Advance the cursor to the next player, wrapping and bumping the round
    /// counters at the end of a pass. Returns the new current player id.
    pub fn advance_turn(&mut self, now: DateTime<Utc>) -> Option<&UserId> {
        if self.player_order.is_empty() {
            return None;
        }
        self.current_player_index = (self.current_player_index + 1) % self.player_order.len();
        if self.current_player_index == 0 {
            self.round_number += 1;
            self.turn_number += 1;
        }
        self.begin_turn(now);
        self.player_order.get(self.current_player_index)
    }

    /// True when every listed round has been played.
    pub fn rounds_exhausted(&self) -> bool {
        self.round_number > ROUNDS_PER_GAME
    }

    /// Finish the game with final standings.
    pub fn complete(&mut self, rankings: Vec<Ranking>, now: DateTime<Utc>) {
        self.phase = GamePhase::GameOver;
        self.game_completed_at = Some(now);
        self.turn_started_at = None;
        self.turn_deadline = None;
        self.afk_warning_sent = false;
        self.turn_clock_remaining_secs = None;
        self.rankings = rankings;
    }

    /// Reset for a rematch: seats stay, everything per-game clears.
    pub fn reset_for_rematch(&mut self) {
        *self = Self::default();
    }
}
