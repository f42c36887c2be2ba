//! Per-room authoritative state machine.
//!
//! Each room is a single-writer actor: one spawned task consumes an inbox
//! of connection events, parsed frames, alarm firings, and lobby RPCs. All
//! mutation, persistence, and broadcast for one inbox message complete
//! before the next is taken, so no handler ever observes a half-applied
//! state. Persistence always happens before broadcast.

pub mod model;

mod alarms;
mod chat_commands;
mod commands;
mod connections;

pub use alarms::{AlarmData, AlarmKind};
pub use model::{ConnectionAttachment, RoomRecord, Seat};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::auth::Identity;
use crate::chat::{ChatEngine, ChatLimits, ChatMessage, RateLimitState};
use crate::game::GameState;
use crate::join_requests::{JoinRequest, JoinRequestError, JoinRequestManager};
use crate::lobby::LobbyHandle;
use crate::protocol::{
    ErrorCode, OutboundFrame, RoomSettings, RoomSummary, ServerEvent, UserId,
};
use crate::storage::{keys, AlarmFired, RoomStore, RoomStoreExt};

/// Runtime knobs for room behavior, derived from the loaded configuration.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    pub turn_timeout_secs: u32,
    pub reconnect_window_secs: i64,
    pub countdown_secs: i64,
    pub afk_warning_lead_secs: i64,
    pub cleanup_after_secs: i64,
    pub max_frame_bytes: usize,
    pub outbound_queue_frames: usize,
    pub chat: ChatLimits,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            turn_timeout_secs: crate::protocol::types::DEFAULT_TURN_TIMEOUT_SECS,
            reconnect_window_secs: crate::protocol::types::RECONNECT_WINDOW_SECS,
            countdown_secs: crate::protocol::types::GAME_START_COUNTDOWN_SECS,
            afk_warning_lead_secs: 10,
            cleanup_after_secs: 300,
            max_frame_bytes: 16 * 1024,
            outbound_queue_frames: 64,
            chat: ChatLimits::default(),
        }
    }
}

/// Inbox messages for a room actor.
pub enum RoomMsg {
    /// A verified connection finished its upgrade.
    Open {
        conn_id: Uuid,
        identity: Identity,
        rejoin: bool,
        outbound: mpsc::Sender<Arc<str>>,
    },
    /// A text frame arrived on a connection.
    Frame { conn_id: Uuid, text: String },
    /// The transport closed or errored.
    Closed { conn_id: Uuid },
    /// The persistent alarm fired.
    Alarm(AlarmFired),
    /// Lobby RPC: broker a join request to this room.
    CreateJoinRequest {
        requester: Identity,
        reply: oneshot::Sender<Result<JoinRequest, JoinRequestError>>,
    },
    /// Lobby RPC: requester cancelled from the lobby.
    CancelJoinRequest {
        request_id: Uuid,
        requester_id: UserId,
        reply: oneshot::Sender<Result<JoinRequest, JoinRequestError>>,
    },
    /// Lobby RPC: rebuild directory state on demand.
    Summary {
        reply: oneshot::Sender<RoomSummary>,
    },
}

/// Cheap cloneable address of a live room actor.
#[derive(Clone)]
pub struct RoomHandle {
    pub code: String,
    tx: mpsc::Sender<RoomMsg>,
}

impl RoomHandle {
    pub async fn send(&self, msg: RoomMsg) -> bool {
        self.tx.send(msg).await.is_ok()
    }
}

/// A live connection owned by the room.
pub(crate) struct ConnectionEntry {
    outbound: mpsc::Sender<Arc<str>>,
    attachment: Vec<u8>,
}

impl ConnectionEntry {
    /// Attach the serialized context (≤ 2 KB); the sole identity source
    /// after a resume.
    pub fn attach(&mut self, bytes: Vec<u8>) {
        self.attachment = bytes;
    }

    pub fn read_attachment(&self) -> Option<ConnectionAttachment> {
        crate::storage::decode_attachment(&self.attachment).ok()
    }
}

/// The single-writer actor state.
pub struct RoomActor {
    code: String,
    config: RoomConfig,
    store: Arc<dyn RoomStore>,
    lobby: LobbyHandle,
    rooms: Arc<DashMap<String, RoomHandle>>,

    room: RoomRecord,
    game: GameState,
    chat: ChatEngine,
    join_requests: JoinRequestManager,

    connections: HashMap<Uuid, ConnectionEntry>,
    /// Set when the last connection left; drives the cleanup alarm.
    idle_since: Option<DateTime<Utc>>,
    /// Mirror of the persisted `ai_turn_data` wake time.
    ai_wake_at: Option<DateTime<Utc>>,
    rng: StdRng,
    shutting_down: bool,
}

/// Spawn a room actor and register its handle.
///
/// The store's alarm sink must be wired to `alarm_rx`; firings are forwarded
/// into the inbox so alarms and frames serialize through the same writer.
pub fn spawn_room(
    code: String,
    store: Arc<dyn RoomStore>,
    alarm_rx: mpsc::UnboundedReceiver<AlarmFired>,
    lobby: LobbyHandle,
    rooms: Arc<DashMap<String, RoomHandle>>,
    config: RoomConfig,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(256);
    let handle = RoomHandle {
        code: code.clone(),
        tx: tx.clone(),
    };
    rooms.insert(code.clone(), handle.clone());

    // Forward alarm firings into the inbox
    let alarm_tx = tx;
    let mut alarm_rx = alarm_rx;
    tokio::spawn(async move {
        while let Some(fired) = alarm_rx.recv().await {
            if alarm_tx.send(RoomMsg::Alarm(fired)).await.is_err() {
                break;
            }
        }
    });

    tokio::spawn(run_room(code, store, rx, lobby, rooms, config));
    handle
}

async fn run_room(
    code: String,
    store: Arc<dyn RoomStore>,
    mut inbox: mpsc::Receiver<RoomMsg>,
    lobby: LobbyHandle,
    rooms: Arc<DashMap<String, RoomHandle>>,
    config: RoomConfig,
) {
    let mut actor = match RoomActor::load_or_create(code, store, lobby, rooms, config).await {
        Ok(actor) => actor,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize room actor");
            return;
        }
    };

    while let Some(msg) = inbox.recv().await {
        actor.handle(msg).await;
        if actor.shutting_down {
            break;
        }
    }
    actor.terminate().await;
}

impl RoomActor {
    async fn load_or_create(
        code: String,
        store: Arc<dyn RoomStore>,
        lobby: LobbyHandle,
        rooms: Arc<DashMap<String, RoomHandle>>,
        config: RoomConfig,
    ) -> anyhow::Result<Self> {
        let now = Utc::now();
        let room: RoomRecord = match store.load(keys::ROOM).await? {
            Some(room) => room,
            None => {
                let settings = RoomSettings {
                    turn_timeout_secs: config.turn_timeout_secs,
                    ..RoomSettings::default()
                };
                RoomRecord::new(code.clone(), UserId::new(), settings, now)
            }
        };
        let game: GameState = store.load(keys::GAME_STATE).await?.unwrap_or_default();
        let messages: Vec<ChatMessage> =
            store.load(keys::CHAT_MESSAGES).await?.unwrap_or_default();
        let rate_limits: HashMap<UserId, RateLimitState> =
            store.load(keys::CHAT_RATE_LIMITS).await?.unwrap_or_default();
        let requests: HashMap<Uuid, JoinRequest> =
            store.load(keys::JOIN_REQUESTS).await?.unwrap_or_default();
        let ai_wake_at = store
            .load::<crate::ai::AiTurnState>(keys::AI_TURN_DATA)
            .await?
            .map(|s| s.scheduled_at);

        Ok(Self {
            code,
            config: config.clone(),
            store,
            lobby,
            rooms,
            room,
            game,
            chat: ChatEngine::restore(config.chat, messages, rate_limits),
            join_requests: JoinRequestManager::restore(requests),
            connections: HashMap::new(),
            idle_since: Some(now),
            ai_wake_at,
            rng: StdRng::from_entropy(),
            shutting_down: false,
        })
    }

    async fn handle(&mut self, msg: RoomMsg) {
        match msg {
            RoomMsg::Open {
                conn_id,
                identity,
                rejoin,
                outbound,
            } => self.handle_open(conn_id, identity, rejoin, outbound).await,
            RoomMsg::Frame { conn_id, text } => self.handle_frame(conn_id, text).await,
            RoomMsg::Closed { conn_id } => self.handle_closed(conn_id).await,
            RoomMsg::Alarm(fired) => self.handle_alarm(fired).await,
            RoomMsg::CreateJoinRequest { requester, reply } => {
                let result = self.handle_create_join_request(&requester).await;
                let _ = reply.send(result);
            }
            RoomMsg::CancelJoinRequest {
                request_id,
                requester_id,
                reply,
            } => {
                let result = self
                    .handle_cancel_join_request(request_id, &requester_id)
                    .await;
                let _ = reply.send(result);
            }
            RoomMsg::Summary { reply } => {
                let _ = reply.send(self.room.summary());
            }
        }
    }

    /// Broadcast one event to every live connection, optionally excluding
    /// one. Frames are serialized once and shared.
    fn broadcast(&mut self, event: ServerEvent, exclude: Option<Uuid>) {
        let frame: Arc<str> = Arc::from(OutboundFrame::new(event).to_json());
        let mut dead = Vec::new();
        for (conn_id, entry) in &self.connections {
            if Some(*conn_id) == exclude {
                continue;
            }
            // Slow readers never block the writer; a full queue closes the
            // connection instead
            if entry.outbound.try_send(Arc::clone(&frame)).is_err() {
                dead.push(*conn_id);
            }
        }
        for conn_id in dead {
            tracing::warn!(room = %self.code, %conn_id, "Outbound queue overflow, dropping connection");
            self.drop_connection(conn_id);
        }
    }

    /// Send one event to every connection tagged with the given user.
    fn send_to_user(&mut self, user_id: &UserId, event: ServerEvent) {
        let frame: Arc<str> = Arc::from(OutboundFrame::new(event).to_json());
        let mut dead = Vec::new();
        for (conn_id, entry) in &self.connections {
            let matches = entry
                .read_attachment()
                .is_some_and(|a| &a.user_id == user_id);
            if matches && entry.outbound.try_send(Arc::clone(&frame)).is_err() {
                dead.push(*conn_id);
            }
        }
        for conn_id in dead {
            self.drop_connection(conn_id);
        }
    }

    fn send_to_conn(&mut self, conn_id: Uuid, event: ServerEvent) {
        let frame: Arc<str> = Arc::from(OutboundFrame::new(event).to_json());
        if let Some(entry) = self.connections.get(&conn_id) {
            if entry.outbound.try_send(frame).is_err() {
                self.drop_connection(conn_id);
            }
        }
    }

    fn send_error(&mut self, conn_id: Uuid, code: ErrorCode) {
        self.send_to_conn(
            conn_id,
            ServerEvent::Error {
                code,
                message: code.description().to_string(),
            },
        );
    }

    /// Remove a connection entry without running disconnect seat logic;
    /// the transport close event performs the full path.
    fn drop_connection(&mut self, conn_id: Uuid) {
        self.connections.remove(&conn_id);
        if self.connections.is_empty() && self.idle_since.is_none() {
            self.idle_since = Some(Utc::now());
        }
    }

    fn conn_attachment(&self, conn_id: Uuid) -> Option<ConnectionAttachment> {
        self.connections
            .get(&conn_id)
            .and_then(ConnectionEntry::read_attachment)
    }

    async fn persist_room(&self) {
        if let Err(e) = self.store.save(keys::ROOM, &self.room).await {
            tracing::error!(room = %self.code, error = %e, "Failed to persist room record");
        }
    }

    async fn persist_game(&self) {
        if let Err(e) = self.store.save(keys::GAME_STATE, &self.game).await {
            tracing::error!(room = %self.code, error = %e, "Failed to persist game state");
        }
    }

    async fn persist_chat(&self) {
        if let Err(e) = self
            .store
            .save(keys::CHAT_MESSAGES, &self.chat.messages())
            .await
        {
            tracing::error!(room = %self.code, error = %e, "Failed to persist chat messages");
        }
        if let Err(e) = self
            .store
            .save(keys::CHAT_RATE_LIMITS, self.chat.rate_limits())
            .await
        {
            tracing::error!(room = %self.code, error = %e, "Failed to persist chat rate limits");
        }
    }

    async fn persist_join_requests(&self) {
        if let Err(e) = self
            .store
            .save(keys::JOIN_REQUESTS, self.join_requests.snapshot())
            .await
        {
            tracing::error!(room = %self.code, error = %e, "Failed to persist join requests");
        }
    }

    /// Push the current directory entry to the lobby.
    async fn publish_status(&self, action: crate::protocol::RoomUpdateAction) {
        self.lobby.room_status(self.room.summary(), action).await;
    }

    async fn terminate(&mut self) {
        self.rooms.remove(&self.code);
        let _ = self.store.delete_alarm().await;
        self.lobby
            .room_status(self.room.summary(), crate::protocol::RoomUpdateAction::Closed)
            .await;
        tracing::info!(room = %self.code, "Room actor terminated");
    }
}
