//! Wire protocol definitions.
//!
//! The command and event sets are closed: every inbound frame must parse to
//! one of [`ClientCommand`]'s variants and every outbound frame is one of
//! [`ServerEvent`]'s variants wrapped in an [`OutboundFrame`] envelope.

pub mod error_codes;
pub mod messages;
pub mod room_codes;
pub mod types;
pub mod validation;

pub use error_codes::ErrorCode;
pub use messages::{
    ClientCommand, ConnectedPayload, InvitePayload, OnlineUser, OutboundFrame, ReactionOp,
    RoomUpdateAction, ServerEvent, TurnSkipReason,
};
pub use room_codes::{generate_room_code, is_valid_room_code, ROOM_CODE_ALPHABET, ROOM_CODE_LEN};
pub use types::{
    PlayerRole, PlayerSnapshot, Ranking, RoomPhase, RoomSettings, RoomSummary, SeatType,
    SpectatorSnapshot, UserId,
};
pub use validation::{parse_client_frame, FrameError};
