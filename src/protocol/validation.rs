use thiserror::Error;

use super::error_codes::ErrorCode;
use super::messages::ClientCommand;

/// Frame-level failures, reported to the originator as `ERROR` and never
/// broadcast.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("message exceeds the {limit} byte limit")]
    TooLarge { limit: usize },
    #[error("message is not a valid command frame: {0}")]
    Invalid(String),
    #[error("unknown command type `{0}`")]
    UnknownCommand(String),
}

impl FrameError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::TooLarge { .. } | Self::Invalid(_) => ErrorCode::InvalidMessage,
            Self::UnknownCommand(_) => ErrorCode::UnknownCommand,
        }
    }
}

/// Parse one inbound text frame into a command.
///
/// Distinguishes an unknown `type` (closed-set violation) from a malformed
/// frame so the client gets the more specific error code.
pub fn parse_client_frame(text: &str, max_size: usize) -> Result<ClientCommand, FrameError> {
    if text.len() > max_size {
        return Err(FrameError::TooLarge { limit: max_size });
    }

    match serde_json::from_str::<ClientCommand>(text) {
        Ok(command) => Ok(command),
        Err(parse_err) => {
            // A structurally valid frame with an unrecognized type gets
            // UNKNOWN_COMMAND; everything else is INVALID_MESSAGE.
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
                if let Some(kind) = value.get("type").and_then(|t| t.as_str()) {
                    if !known_command_type(kind) {
                        return Err(FrameError::UnknownCommand(kind.to_string()));
                    }
                }
            }
            Err(FrameError::Invalid(parse_err.to_string()))
        }
    }
}

fn known_command_type(kind: &str) -> bool {
    const KNOWN: &[&str] = &[
        "START_GAME",
        "QUICK_PLAY_START",
        "DICE_ROLL",
        "DICE_KEEP",
        "CATEGORY_SCORE",
        "REMATCH",
        "ADD_AI_PLAYER",
        "PING",
        "CHAT",
        "QUICK_CHAT",
        "REACTION",
        "TYPING_START",
        "TYPING_STOP",
        "APPROVE_JOIN_REQUEST",
        "DECLINE_JOIN_REQUEST",
        "LOBBY_CHAT",
        "GET_ROOMS",
        "GET_ONLINE_USERS",
        "REQUEST_JOIN",
        "CANCEL_JOIN_REQUEST",
        "SEND_INVITE",
        "CANCEL_INVITE",
    ];
    KNOWN.contains(&kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_frames_parse() {
        let cmd = parse_client_frame(r#"{"type":"PING"}"#, 1024).unwrap();
        assert_eq!(cmd, ClientCommand::Ping);

        let cmd = parse_client_frame(
            r#"{"type":"CHAT","payload":{"content":"hello"}}"#,
            1024,
        )
        .unwrap();
        assert_eq!(
            cmd,
            ClientCommand::Chat {
                content: "hello".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_type_is_unknown_command() {
        let err = parse_client_frame(r#"{"type":"TELEPORT"}"#, 1024).unwrap_err();
        assert_eq!(err, FrameError::UnknownCommand("TELEPORT".to_string()));
        assert_eq!(err.code(), ErrorCode::UnknownCommand);
    }

    #[test]
    fn test_malformed_payload_is_invalid_message() {
        let err =
            parse_client_frame(r#"{"type":"CHAT","payload":{"content":42}}"#, 1024).unwrap_err();
        assert!(matches!(err, FrameError::Invalid(_)));
        assert_eq!(err.code(), ErrorCode::InvalidMessage);
    }

    #[test]
    fn test_non_json_is_invalid_message() {
        let err = parse_client_frame("not json at all", 1024).unwrap_err();
        assert!(matches!(err, FrameError::Invalid(_)));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let big = format!(r#"{{"type":"CHAT","payload":{{"content":"{}"}}}}"#, "x".repeat(100));
        let err = parse_client_frame(&big, 64).unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { .. }));
    }
}
