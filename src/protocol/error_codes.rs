use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of wire error codes, grouped by subsystem.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Auth
    MissingToken,
    InvalidToken,
    ExpiredToken,
    JwksUnavailable,

    // Transport
    BinaryUnsupported,
    InvalidMessage,
    UnknownCommand,

    // Game
    NotYourTurn,
    InvalidPhase,
    NoRollsRemaining,
    CategoryAlreadyScored,
    UnknownCategory,
    NotHost,
    NotEnoughPlayers,
    GameInProgress,
    GameNotStarted,

    // Chat
    RateLimited,
    MessageTooLong,
    MessageNotFound,

    // Join requests
    RequestExpired,
    InvalidStatusTransition,
    NotRequester,
    RequestNotFound,
    DuplicateRequest,
    MaxRequestsExceeded,

    // Room
    RoomFull,
    RoomNotFound,
}

impl ErrorCode {
    /// Human-readable description suitable for client display.
    pub fn description(self) -> &'static str {
        match self {
            Self::MissingToken => "No bearer token was provided with the connection request.",
            Self::InvalidToken => "The bearer token is invalid or malformed.",
            Self::ExpiredToken => "The bearer token has expired. Obtain a new one and reconnect.",
            Self::JwksUnavailable => {
                "The identity provider is temporarily unreachable. Try again shortly."
            }
            Self::BinaryUnsupported => "Binary frames are not supported on this connection.",
            Self::InvalidMessage => "The message could not be parsed or failed validation.",
            Self::UnknownCommand => "The command type is not part of the protocol.",
            Self::NotYourTurn => "It is another player's turn.",
            Self::InvalidPhase => "That command is not valid in the current game phase.",
            Self::NoRollsRemaining => "All three rolls for this turn have been used.",
            Self::CategoryAlreadyScored => "That category has already been scored this game.",
            Self::UnknownCategory => "The category name is not recognized.",
            Self::NotHost => "Only the room host can perform that action.",
            Self::NotEnoughPlayers => "At least two seated players are required to start.",
            Self::GameInProgress => "A game is already in progress in this room.",
            Self::GameNotStarted => "The game has not started yet.",
            Self::RateLimited => "Too many messages in a short time. Slow down and retry.",
            Self::MessageTooLong => "The message exceeds the maximum allowed length.",
            Self::MessageNotFound => "The referenced chat message no longer exists.",
            Self::RequestExpired => "The join request has expired.",
            Self::InvalidStatusTransition => "The join request is already resolved.",
            Self::NotRequester => "Only the requester can cancel a join request.",
            Self::RequestNotFound => "The join request could not be found.",
            Self::DuplicateRequest => "A pending join request for this room already exists.",
            Self::MaxRequestsExceeded => "This room has too many pending join requests.",
            Self::RoomFull => "The room has no free seats.",
            Self::RoomNotFound => "No room exists with that code.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}
