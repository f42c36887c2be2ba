#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_excessive_bools,
    clippy::too_many_arguments,
    clippy::too_many_lines,
    clippy::similar_names
)]

//! # Dicehall Server
//!
//! Authoritative WebSocket server for a 13-round multiplayer dice game.
//!
//! Every room is a single-writer actor: all mutations are serialized through
//! one task, persisted before broadcast, and recoverable from storage alone.

/// AI participants: profiles, brains, and the per-alarm turn driver
pub mod ai;

/// Bearer token verification against the identity provider
pub mod auth;

/// Chat engine shared by rooms and the lobby
pub mod chat;

/// Server configuration and environment variables
pub mod config;

/// Pure game rules, state model, and command validation
pub mod game;

/// Join-request lifecycle management
pub mod join_requests;

/// Lobby presence, room directory, and invite brokerage
pub mod lobby;

/// Structured logging configuration
pub mod logging;

/// Wire protocol: commands, events, error codes, room codes
pub mod protocol;

/// Per-room authoritative state machine
pub mod room;

/// Process-wide state and room registry
pub mod server;

/// Persistence and alarm abstraction (in-memory implementation)
pub mod storage;

/// WebSocket upgrade and connection handling
pub mod websocket;
