use thiserror::Error;

use super::category::Category;
use super::scorecard::Scorecard;
use super::state::{GamePhase, GameState};
use crate::protocol::{ErrorCode, UserId};

/// Typed rejection for a game command. The set is closed; every variant maps
/// to exactly one wire error code.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GameRejection {
    #[error("it is not your turn")]
    NotYourTurn,
    #[error("command is not valid in the current phase")]
    InvalidPhase,
    #[error("no rolls remaining this turn")]
    NoRollsRemaining,
    #[error("category is already scored")]
    CategoryAlreadyScored,
    #[error("unknown category")]
    UnknownCategory,
    #[error("only the host can do that")]
    NotHost,
    #[error("at least two players are required")]
    NotEnoughPlayers,
    #[error("a game is already in progress")]
    GameInProgress,
    #[error("the game has not started")]
    GameNotStarted,
}

impl GameRejection {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotYourTurn => ErrorCode::NotYourTurn,
            Self::InvalidPhase => ErrorCode::InvalidPhase,
            Self::NoRollsRemaining => ErrorCode::NoRollsRemaining,
            Self::CategoryAlreadyScored => ErrorCode::CategoryAlreadyScored,
            Self::UnknownCategory => ErrorCode::UnknownCategory,
            Self::NotHost => ErrorCode::NotHost,
            Self::NotEnoughPlayers => ErrorCode::NotEnoughPlayers,
            Self::GameInProgress => ErrorCode::GameInProgress,
            Self::GameNotStarted => ErrorCode::GameNotStarted,
        }
    }
}

/// The slice of seat state the validator needs about the caller.
#[derive(Debug, Clone, Copy)]
pub struct SeatView<'a> {
    pub user_id: &'a UserId,
    pub is_host: bool,
    pub rolls_remaining: u8,
    pub scorecard: &'a Scorecard,
}

fn require_current_player(state: &GameState, caller: &SeatView<'_>) -> Result<(), GameRejection> {
    match state.current_player_id() {
        Some(current) if current == caller.user_id => Ok(()),
        Some(_) => Err(GameRejection::NotYourTurn),
        None => Err(GameRejection::GameNotStarted),
    }
}

/// `START_GAME`: waiting phase, host only, two or more seats filled.
pub fn validate_start_game(
    state: &GameState,
    caller: &SeatView<'_>,
    seated_players: usize,
) -> Result<(), GameRejection> {
    if state.phase != GamePhase::Waiting {
        return Err(GameRejection::GameInProgress);
    }
    if !caller.is_host {
        return Err(GameRejection::NotHost);
    }
    if seated_players < 2 {
        return Err(GameRejection::NotEnoughPlayers);
    }
    Ok(())
}

/// `QUICK_PLAY_START`: waiting phase, host only, no other humans seated, and
/// at least one AI profile requested.
pub fn validate_quick_play(
    state: &GameState,
    caller: &SeatView<'_>,
    other_humans: usize,
    requested_profiles: usize,
) -> Result<(), GameRejection> {
    if state.phase != GamePhase::Waiting {
        return Err(GameRejection::GameInProgress);
    }
    if !caller.is_host {
        return Err(GameRejection::NotHost);
    }
    if other_humans > 0 {
        return Err(GameRejection::GameInProgress);
    }
    if requested_profiles == 0 {
        return Err(GameRejection::NotEnoughPlayers);
    }
    Ok(())
}

/// `DICE_ROLL`: caller is current, a roll is available, and the turn is in a
/// rollable phase.
pub fn validate_dice_roll(state: &GameState, caller: &SeatView<'_>) -> Result<(), GameRejection> {
    if !matches!(state.phase, GamePhase::TurnRoll | GamePhase::TurnDecide) {
        return Err(phase_rejection(state));
    }
    require_current_player(state, caller)?;
    if caller.rolls_remaining == 0 {
        return Err(GameRejection::NoRollsRemaining);
    }
    Ok(())
}

/// `DICE_KEEP`: only meaningful while deciding between rolls.
pub fn validate_dice_keep(state: &GameState, caller: &SeatView<'_>) -> Result<(), GameRejection> {
    if state.phase != GamePhase::TurnDecide {
        return Err(phase_rejection(state));
    }
    require_current_player(state, caller)
}

/// `CATEGORY_SCORE`: deciding phase, caller is current, category unscored.
pub fn validate_category_score(
    state: &GameState,
    caller: &SeatView<'_>,
    category: Category,
) -> Result<(), GameRejection> {
    if state.phase != GamePhase::TurnDecide {
        return Err(phase_rejection(state));
    }
    require_current_player(state, caller)?;
    if caller.scorecard.is_scored(category) {
        return Err(GameRejection::CategoryAlreadyScored);
    }
    Ok(())
}

/// `REMATCH`: finished game, host only.
pub fn validate_rematch(state: &GameState, caller: &SeatView<'_>) -> Result<(), GameRejection> {
    if state.phase != GamePhase::GameOver {
        return Err(phase_rejection(state));
    }
    if !caller.is_host {
        return Err(GameRejection::NotHost);
    }
    Ok(())
}

/// `ADD_AI_PLAYER`: waiting phase, host only. Seat capacity and profile
/// existence are checked by the room, which owns both.
pub fn validate_add_ai(state: &GameState, caller: &SeatView<'_>) -> Result<(), GameRejection> {
    if state.phase != GamePhase::Waiting {
        return Err(GameRejection::GameInProgress);
    }
    if !caller.is_host {
        return Err(GameRejection::NotHost);
    }
    Ok(())
}

/// The most informative phase rejection: commands that need a running game
/// get `GameNotStarted` while the room is waiting, `InvalidPhase` otherwise.
fn phase_rejection(state: &GameState) -> GameRejection {
    match state.phase {
        GamePhase::Waiting | GamePhase::Starting => GameRejection::GameNotStarted,
        _ => GameRejection::InvalidPhase,
    }
}
