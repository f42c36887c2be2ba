//! Process-wide state: the room registry, the lobby handle, and the token
//! verifier. Rooms are actors created on first connection to a code and
//! evicted when their cleanup alarm fires.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::auth::{StaticKeyProvider, TokenVerifier};
use crate::config::Config;
use crate::lobby::{spawn_lobby, LobbyHandle};
use crate::protocol::generate_room_code;
use crate::room::{spawn_room, RoomConfig, RoomHandle};
use crate::storage::MemoryStore;

/// Shared application state handed to every request handler.
pub struct AppState {
    pub config: Arc<Config>,
    pub verifier: Arc<TokenVerifier>,
    pub lobby: LobbyHandle,
    rooms: Arc<DashMap<String, RoomHandle>>,
    room_config: RoomConfig,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: Arc<Config>) -> Arc<Self> {
        let rooms: Arc<DashMap<String, RoomHandle>> = Arc::new(DashMap::new());
        let room_config = RoomConfig {
            turn_timeout_secs: config.server.turn_timeout_secs,
            reconnect_window_secs: config.server.reconnect_window_secs,
            countdown_secs: config.server.countdown_secs,
            afk_warning_lead_secs: config.server.afk_warning_lead_secs,
            cleanup_after_secs: config.server.cleanup_after_secs,
            max_frame_bytes: config.server.max_frame_bytes,
            outbound_queue_frames: config.server.outbound_queue_frames,
            chat: config.chat.clone(),
        };
        let lobby = spawn_lobby(
            Arc::clone(&rooms),
            config.chat.clone(),
            config.server.max_frame_bytes,
        );

        let secret = config.security.jwt_secret.clone().unwrap_or_default();
        let verifier = Arc::new(TokenVerifier::new(Arc::new(StaticKeyProvider::new(secret))));

        Arc::new(Self {
            config,
            verifier,
            lobby,
            rooms,
            room_config,
            started_at: Utc::now(),
        })
    }

    /// Fetch the actor for a room code, creating it on first connection.
    pub fn room_or_spawn(&self, code: &str) -> RoomHandle {
        if let Some(handle) = self.rooms.get(code) {
            return handle.value().clone();
        }
        let (alarm_tx, alarm_rx) = mpsc::unbounded_channel();
        let store = Arc::new(MemoryStore::new(alarm_tx));
        spawn_room(
            code.to_string(),
            store,
            alarm_rx,
            self.lobby.clone(),
            Arc::clone(&self.rooms),
            self.room_config.clone(),
        )
    }

    pub fn room(&self, code: &str) -> Option<RoomHandle> {
        self.rooms.get(code).map(|r| r.value().clone())
    }

    /// Allocate an unused room code.
    pub fn allocate_room_code(&self) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let code = generate_room_code(&mut rng);
            if !self.rooms.contains_key(&code) {
                return code;
            }
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn health(&self) -> serde_json::Value {
        serde_json::json!({
            "status": "ok",
            "rooms": self.room_count(),
            "uptime_secs": (Utc::now() - self.started_at).num_seconds(),
        })
    }
}
