//! Chat engine shared by rooms and the lobby.
//!
//! Holds a bounded message history plus per-user rate-limit state. All
//! mutations take the current time as a parameter so the single-writer
//! owner controls the clock and tests can drive it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use thiserror::Error;
use uuid::Uuid;

use crate::protocol::ErrorCode;
use crate::protocol::UserId;

/// Author id used for server-generated lines.
pub const SYSTEM_AUTHOR: &str = "system";

/// Closed set of reaction tokens.
pub const REACTION_TOKENS: &[&str] = &["thumbs_up", "laugh", "wow", "sad", "fire", "clap"];

/// Closed set of quick-chat keys and their server-side text.
pub const QUICK_CHAT_PRESETS: &[(&str, &str)] = &[
    ("nice_roll", "Nice roll!"),
    ("good_luck", "Good luck!"),
    ("wow", "Wow!"),
    ("ouch", "Ouch..."),
    ("thinking", "Hmm, let me think..."),
    ("hurry_up", "Hurry up!"),
    ("gg", "Good game!"),
    ("one_more", "One more?"),
];

/// Chat limits; defaults match the room configuration shipped with the
/// server and may be overridden from the config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ChatLimits {
    pub max_messages: usize,
    pub max_message_length: usize,
    pub message_interval_ms: i64,
    pub typing_interval_ms: i64,
    pub reactions_per_window: u32,
    pub reaction_window_ms: i64,
    pub typing_timeout_ms: i64,
}

impl Default for ChatLimits {
    fn default() -> Self {
        Self {
            max_messages: 100,
            max_message_length: 500,
            message_interval_ms: 750,
            typing_interval_ms: 2500,
            reactions_per_window: 15,
            reaction_window_ms: 30_000,
            typing_timeout_ms: 4000,
        }
    }
}

/// Message kind as seen on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Text,
    Quick,
    System,
}

/// One chat message with its reactions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub author_id: String,
    pub display_name: String,
    pub kind: ChatKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub reactions: BTreeMap<String, Vec<UserId>>,
}

/// Per-user throttling state, persisted with the room.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_typing_at: Option<DateTime<Utc>>,
    pub reaction_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reaction_window_start: Option<DateTime<Utc>>,
}

/// Typed chat failure; reported to the originator only.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("rate limited, retry in {retry_after_ms} ms")]
    RateLimited { retry_after_ms: i64 },
    #[error("message exceeds {max} characters")]
    MessageTooLong { max: usize },
    #[error("message rejected: {0}")]
    InvalidMessage(String),
    #[error("message not found")]
    MessageNotFound,
}

impl ChatError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::RateLimited { .. } => ErrorCode::RateLimited,
            Self::MessageTooLong { .. } => ErrorCode::MessageTooLong,
            Self::InvalidMessage(_) => ErrorCode::InvalidMessage,
            Self::MessageNotFound => ErrorCode::MessageNotFound,
        }
    }
}

/// Result of a typing-indicator update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingChange {
    Broadcast,
    /// Throttled or redundant; nothing to send.
    Suppressed,
}

/// The chat engine. Owned by a room actor (or the lobby); never shared.
#[derive(Debug, Default)]
pub struct ChatEngine {
    limits: ChatLimits,
    messages: VecDeque<ChatMessage>,
    rate_limits: HashMap<UserId, RateLimitState>,
    /// Ephemeral: user -> (display name, last typing signal).
    typing: HashMap<UserId, (String, DateTime<Utc>)>,
}

impl ChatEngine {
    pub fn new(limits: ChatLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    /// Restore from persisted parts after a resume.
    pub fn restore(
        limits: ChatLimits,
        messages: Vec<ChatMessage>,
        rate_limits: HashMap<UserId, RateLimitState>,
    ) -> Self {
        let mut engine = Self::new(limits);
        engine.messages = messages.into();
        engine.truncate();
        engine.rate_limits = rate_limits;
        engine
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    pub fn rate_limits(&self) -> &HashMap<UserId, RateLimitState> {
        &self.rate_limits
    }

    /// A user-authored text message.
    pub fn handle_text(
        &mut self,
        user_id: &UserId,
        display_name: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<ChatMessage, ChatError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::InvalidMessage("empty message".to_string()));
        }
        if content.chars().count() > self.limits.max_message_length {
            return Err(ChatError::MessageTooLong {
                max: self.limits.max_message_length,
            });
        }
        self.check_message_interval(user_id, now)?;

        let message = self.push_message(ChatMessage {
            id: Uuid::new_v4(),
            author_id: user_id.clone(),
            display_name: display_name.to_string(),
            kind: ChatKind::Text,
            content: content.to_string(),
            timestamp: now,
            reactions: BTreeMap::new(),
        });
        self.entry(user_id).last_message_at = Some(now);
        // A sent message supersedes any typing indicator
        self.typing.remove(user_id);
        Ok(message)
    }

    /// A quick-chat preset; content is formatted server-side.
    pub fn handle_quick(
        &mut self,
        user_id: &UserId,
        display_name: &str,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<ChatMessage, ChatError> {
        let content = QUICK_CHAT_PRESETS
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, text)| (*text).to_string())
            .ok_or_else(|| ChatError::InvalidMessage(format!("unknown quick chat key `{key}`")))?;
        self.check_message_interval(user_id, now)?;

        let message = self.push_message(ChatMessage {
            id: Uuid::new_v4(),
            author_id: user_id.clone(),
            display_name: display_name.to_string(),
            kind: ChatKind::Quick,
            content,
            timestamp: now,
            reactions: BTreeMap::new(),
        });
        self.entry(user_id).last_message_at = Some(now);
        self.typing.remove(user_id);
        Ok(message)
    }

    /// Add or remove a reaction; returns the message's updated reactions.
    pub fn handle_reaction(
        &mut self,
        user_id: &UserId,
        message_id: Uuid,
        token: &str,
        add: bool,
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<String, Vec<UserId>>, ChatError> {
        if !REACTION_TOKENS.contains(&token) {
            return Err(ChatError::InvalidMessage(format!(
                "unknown reaction token `{token}`"
            )));
        }
        self.check_reaction_window(user_id, now)?;

        let message = self
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or(ChatError::MessageNotFound)?;

        let users = message.reactions.entry(token.to_string()).or_default();
        if add {
            if !users.contains(user_id) {
                users.push(user_id.clone());
            }
        } else {
            users.retain(|u| u != user_id);
        }
        if users.is_empty() {
            message.reactions.remove(token);
        }
        Ok(message.reactions.clone())
    }

    /// Typing-start signal, throttled per user.
    pub fn typing_start(
        &mut self,
        user_id: &UserId,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> TypingChange {
        let throttle = Duration::milliseconds(self.limits.typing_interval_ms);
        let last = self
            .rate_limits
            .get(user_id)
            .and_then(|state| state.last_typing_at);
        if last.is_some_and(|last| now - last < throttle) {
            // Refresh the expiry without rebroadcasting
            if let Some(entry) = self.typing.get_mut(user_id) {
                entry.1 = now;
            }
            return TypingChange::Suppressed;
        }
        self.entry(user_id).last_typing_at = Some(now);
        self.typing
            .insert(user_id.clone(), (display_name.to_string(), now));
        TypingChange::Broadcast
    }

    /// Typing-stop signal; suppressed when the user was not marked typing.
    pub fn typing_stop(&mut self, user_id: &UserId) -> TypingChange {
        if self.typing.remove(user_id).is_some() {
            TypingChange::Broadcast
        } else {
            TypingChange::Suppressed
        }
    }

    /// Drop typing indicators older than the timeout; returns expired users.
    pub fn expire_typing(&mut self, now: DateTime<Utc>) -> Vec<(UserId, String)> {
        let timeout = Duration::milliseconds(self.limits.typing_timeout_ms);
        let expired: Vec<(UserId, String)> = self
            .typing
            .iter()
            .filter(|(_, (_, at))| now - *at >= timeout)
            .map(|(id, (name, _))| (id.clone(), name.clone()))
            .collect();
        for (id, _) in &expired {
            self.typing.remove(id);
        }
        expired
    }

    /// Server-generated system line; exempt from rate limits.
    pub fn create_system(&mut self, content: &str, now: DateTime<Utc>) -> ChatMessage {
        self.push_message(ChatMessage {
            id: Uuid::new_v4(),
            author_id: SYSTEM_AUTHOR.to_string(),
            display_name: SYSTEM_AUTHOR.to_string(),
            kind: ChatKind::System,
            content: content.to_string(),
            timestamp: now,
            reactions: BTreeMap::new(),
        })
    }

    fn push_message(&mut self, message: ChatMessage) -> ChatMessage {
        self.messages.push_back(message.clone());
        self.truncate();
        message
    }

    fn truncate(&mut self) {
        while self.messages.len() > self.limits.max_messages {
            self.messages.pop_front();
        }
    }

    fn entry(&mut self, user_id: &UserId) -> &mut RateLimitState {
        self.rate_limits.entry(user_id.clone()).or_default()
    }

    fn check_message_interval(
        &mut self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<(), ChatError> {
        let interval = Duration::milliseconds(self.limits.message_interval_ms);
        if let Some(last) = self.entry(user_id).last_message_at {
            let elapsed = now - last;
            if elapsed < interval {
                return Err(ChatError::RateLimited {
                    retry_after_ms: (interval - elapsed).num_milliseconds(),
                });
            }
        }
        Ok(())
    }

    fn check_reaction_window(
        &mut self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<(), ChatError> {
        let window = Duration::milliseconds(self.limits.reaction_window_ms);
        let per_window = self.limits.reactions_per_window;
        let state = self.entry(user_id);

        match state.reaction_window_start {
            Some(start) if now - start < window => {
                if state.reaction_count >= per_window {
                    let retry = window - (now - start);
                    return Err(ChatError::RateLimited {
                        retry_after_ms: retry.num_milliseconds(),
                    });
                }
                state.reaction_count += 1;
            }
            _ => {
                state.reaction_window_start = Some(now);
                state.reaction_count = 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> ChatEngine {
        ChatEngine::new(ChatLimits::default())
    }

    fn uid(s: &str) -> UserId {
        s.to_string()
    }

    #[test]
    fn test_text_message_accepted() {
        let mut chat = engine();
        let msg = chat
            .handle_text(&uid("u1"), "Ana", "  hello there  ", Utc::now())
            .unwrap();
        assert_eq!(msg.content, "hello there");
        assert_eq!(msg.kind, ChatKind::Text);
        assert_eq!(chat.messages().len(), 1);
    }

    #[test]
    fn test_message_interval_enforced() {
        let mut chat = engine();
        let t0 = Utc::now();
        chat.handle_text(&uid("u1"), "Ana", "one", t0).unwrap();
        let err = chat.handle_text(&uid("u1"), "Ana", "two", t0 + Duration::milliseconds(100));
        assert!(matches!(err, Err(ChatError::RateLimited { .. })));
        // A different user is unaffected
        chat.handle_text(&uid("u2"), "Ben", "hi", t0 + Duration::milliseconds(100))
            .unwrap();
        // And the first user recovers after the interval
        chat.handle_text(&uid("u1"), "Ana", "two", t0 + Duration::milliseconds(800))
            .unwrap();
    }

    #[test]
    fn test_message_too_long() {
        let mut chat = engine();
        let long = "x".repeat(501);
        let err = chat.handle_text(&uid("u1"), "Ana", &long, Utc::now());
        assert_eq!(err, Err(ChatError::MessageTooLong { max: 500 }));
    }

    #[test]
    fn test_history_cap_evicts_oldest() {
        let mut chat = engine();
        let t0 = Utc::now();
        for i in 0..120 {
            chat.handle_text(
                &uid("u1"),
                "Ana",
                &format!("msg {i}"),
                t0 + Duration::seconds(i),
            )
            .unwrap();
        }
        let messages = chat.messages();
        assert_eq!(messages.len(), 100);
        assert_eq!(messages.first().unwrap().content, "msg 20");
        assert_eq!(messages.last().unwrap().content, "msg 119");
    }

    #[test]
    fn test_quick_chat_formats_server_side() {
        let mut chat = engine();
        let msg = chat
            .handle_quick(&uid("u1"), "Ana", "gg", Utc::now())
            .unwrap();
        assert_eq!(msg.content, "Good game!");
        assert_eq!(msg.kind, ChatKind::Quick);

        let err = chat.handle_quick(&uid("u1"), "Ana", "nope", Utc::now() + Duration::seconds(2));
        assert!(matches!(err, Err(ChatError::InvalidMessage(_))));
    }

    #[test]
    fn test_reactions_add_remove() {
        let mut chat = engine();
        let t0 = Utc::now();
        let msg = chat.handle_text(&uid("u1"), "Ana", "react to me", t0).unwrap();

        let reactions = chat
            .handle_reaction(&uid("u2"), msg.id, "fire", true, t0)
            .unwrap();
        assert_eq!(reactions["fire"], vec![uid("u2")]);

        // Adding twice is idempotent
        let reactions = chat
            .handle_reaction(&uid("u2"), msg.id, "fire", true, t0)
            .unwrap();
        assert_eq!(reactions["fire"].len(), 1);

        let reactions = chat
            .handle_reaction(&uid("u2"), msg.id, "fire", false, t0)
            .unwrap();
        assert!(reactions.is_empty());
    }

    #[test]
    fn test_reaction_unknown_token_and_missing_message() {
        let mut chat = engine();
        let t0 = Utc::now();
        let msg = chat.handle_text(&uid("u1"), "Ana", "hello", t0).unwrap();
        let err = chat.handle_reaction(&uid("u2"), msg.id, "eggplant", true, t0);
        assert!(matches!(err, Err(ChatError::InvalidMessage(_))));
        let err = chat.handle_reaction(&uid("u2"), Uuid::new_v4(), "fire", true, t0);
        assert_eq!(err, Err(ChatError::MessageNotFound));
    }

    #[test]
    fn test_reaction_window_limit() {
        let mut chat = engine();
        let t0 = Utc::now();
        let msg = chat.handle_text(&uid("u1"), "Ana", "popular", t0).unwrap();
        for i in 0..15 {
            let token = REACTION_TOKENS[i % REACTION_TOKENS.len()];
            let add = i < REACTION_TOKENS.len();
            chat.handle_reaction(&uid("u2"), msg.id, token, add, t0 + Duration::seconds(1))
                .unwrap();
        }
        let err = chat.handle_reaction(&uid("u2"), msg.id, "wow", true, t0 + Duration::seconds(2));
        assert!(matches!(err, Err(ChatError::RateLimited { .. })));
        // Window rolls over
        chat.handle_reaction(&uid("u2"), msg.id, "wow", true, t0 + Duration::seconds(40))
            .unwrap();
    }

    #[test]
    fn test_typing_throttle_and_expiry() {
        let mut chat = engine();
        let t0 = Utc::now();
        assert_eq!(chat.typing_start(&uid("u1"), "Ana", t0), TypingChange::Broadcast);
        assert_eq!(
            chat.typing_start(&uid("u1"), "Ana", t0 + Duration::milliseconds(500)),
            TypingChange::Suppressed
        );
        assert_eq!(
            chat.typing_start(&uid("u1"), "Ana", t0 + Duration::seconds(3)),
            TypingChange::Broadcast
        );

        let expired = chat.expire_typing(t0 + Duration::seconds(10));
        assert_eq!(expired, vec![(uid("u1"), "Ana".to_string())]);
        assert_eq!(chat.typing_stop(&uid("u1")), TypingChange::Suppressed);
    }

    #[test]
    fn test_system_lines_skip_rate_limits() {
        let mut chat = engine();
        let t0 = Utc::now();
        for _ in 0..5 {
            chat.create_system("player joined", t0);
        }
        assert_eq!(chat.messages().len(), 5);
        assert!(chat
            .messages()
            .iter()
            .all(|m| m.author_id == SYSTEM_AUTHOR && m.kind == ChatKind::System));
    }

    #[test]
    fn test_restore_truncates_overlong_history() {
        let mut chat = engine();
        let t0 = Utc::now();
        for i in 0..50 {
            chat.handle_text(&uid("u1"), "Ana", &format!("m{i}"), t0 + Duration::seconds(i))
                .unwrap();
        }
        let restored = ChatEngine::restore(
            ChatLimits {
                max_messages: 10,
                ..ChatLimits::default()
            },
            chat.messages(),
            chat.rate_limits().clone(),
        );
        assert_eq!(restored.messages().len(), 10);
        assert_eq!(restored.messages().first().unwrap().content, "m40");
    }
}
