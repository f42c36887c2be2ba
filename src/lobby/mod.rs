//! Lobby core: presence, room directory, lobby chat, invites, and
//! join-request brokerage.
//!
//! A singleton actor with the same single-writer discipline as rooms. The
//! directory is an in-memory cache fed by room status pushes; after a
//! restart it is rebuilt on demand by querying live room actors.

use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::auth::Identity;
use crate::chat::{ChatEngine, ChatLimits, TypingChange};
use crate::join_requests::JoinRequest;
use crate::protocol::{
    ClientCommand, ErrorCode, InvitePayload, OnlineUser, OutboundFrame, ReactionOp,
    RoomSummary, RoomUpdateAction, ServerEvent, UserId,
};
use crate::room::{RoomHandle, RoomMsg};

/// Lifetime of an invite before it silently lapses.
pub const INVITE_TTL_SECS: i64 = 120;

/// Messages consumed by the lobby actor.
pub enum LobbyMsg {
    Open {
        conn_id: Uuid,
        identity: Identity,
        outbound: mpsc::Sender<Arc<str>>,
    },
    Frame {
        conn_id: Uuid,
        text: String,
    },
    Closed {
        conn_id: Uuid,
    },
    /// Push from a room actor on any status change.
    RoomStatus {
        summary: RoomSummary,
        action: RoomUpdateAction,
    },
    /// A join request reached a terminal state inside its room.
    JoinRequestResolved {
        request: JoinRequest,
    },
    /// Periodic housekeeping (invite expiry, typing expiry).
    Tick,
}

/// Cloneable address of the lobby actor.
#[derive(Clone)]
pub struct LobbyHandle {
    tx: mpsc::Sender<LobbyMsg>,
}

impl LobbyHandle {
    pub async fn send(&self, msg: LobbyMsg) -> bool {
        self.tx.send(msg).await.is_ok()
    }

    /// Non-blocking push: a room must never wait on the lobby, since the
    /// lobby may itself be waiting on a room RPC reply. A full lobby inbox
    /// only costs a directory refresh.
    pub async fn room_status(&self, summary: RoomSummary, action: RoomUpdateAction) {
        if self
            .tx
            .try_send(LobbyMsg::RoomStatus { summary, action })
            .is_err()
        {
            tracing::warn!("Lobby inbox full, dropping room status update");
        }
    }

    pub async fn join_request_resolved(&self, request: JoinRequest) {
        if self
            .tx
            .try_send(LobbyMsg::JoinRequestResolved { request })
            .is_err()
        {
            tracing::warn!("Lobby inbox full, dropping join request resolution");
        }
    }
}

struct LobbyConnection {
    outbound: mpsc::Sender<Arc<str>>,
    identity: Identity,
}

struct PendingInvite {
    payload: InvitePayload,
    to_user_id: UserId,
}

/// The lobby actor state.
pub struct LobbyActor {
    connections: HashMap<Uuid, LobbyConnection>,
    directory: HashMap<String, RoomSummary>,
    chat: ChatEngine,
    invites: HashMap<Uuid, PendingInvite>,
    /// Routing table: request id -> room code, for lobby-side cancels.
    join_requests: HashMap<Uuid, (String, UserId)>,
    rooms: Arc<DashMap<String, RoomHandle>>,
    max_frame_bytes: usize,
}

/// Spawn the lobby actor with a periodic housekeeping tick.
pub fn spawn_lobby(
    rooms: Arc<DashMap<String, RoomHandle>>,
    chat_limits: ChatLimits,
    max_frame_bytes: usize,
) -> LobbyHandle {
    let (tx, mut rx) = mpsc::channel(512);
    let handle = LobbyHandle { tx: tx.clone() };

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(15));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if tx.send(LobbyMsg::Tick).await.is_err() {
                break;
            }
        }
    });

    tokio::spawn(async move {
        let mut actor = LobbyActor {
            connections: HashMap::new(),
            directory: HashMap::new(),
            chat: ChatEngine::new(chat_limits),
            invites: HashMap::new(),
            join_requests: HashMap::new(),
            rooms,
            max_frame_bytes,
        };
        while let Some(msg) = rx.recv().await {
            actor.handle(msg).await;
        }
    });

    handle
}

impl LobbyActor {
    async fn handle(&mut self, msg: LobbyMsg) {
        match msg {
            LobbyMsg::Open {
                conn_id,
                identity,
                outbound,
            } => self.handle_open(conn_id, identity, outbound),
            LobbyMsg::Frame { conn_id, text } => self.handle_frame(conn_id, text).await,
            LobbyMsg::Closed { conn_id } => self.handle_closed(conn_id),
            LobbyMsg::RoomStatus { summary, action } => self.handle_room_status(summary, action),
            LobbyMsg::JoinRequestResolved { request } => self.handle_request_resolved(request),
            LobbyMsg::Tick => self.handle_tick(),
        }
    }

    fn online_users(&self) -> Vec<OnlineUser> {
        let mut seen: HashMap<&UserId, &Identity> = HashMap::new();
        for conn in self.connections.values() {
            seen.entry(&conn.identity.user_id).or_insert(&conn.identity);
        }
        seen.values()
            .map(|identity| OnlineUser {
                user_id: identity.user_id.clone(),
                display_name: identity.display_name.clone(),
                avatar_seed: identity.avatar_seed.clone(),
            })
            .collect()
    }

    fn user_online(&self, user_id: &UserId) -> bool {
        self.connections
            .values()
            .any(|c| &c.identity.user_id == user_id)
    }

    fn broadcast(&mut self, event: ServerEvent, exclude: Option<Uuid>) {
        let frame: Arc<str> = Arc::from(OutboundFrame::new(event).to_json());
        let mut dead = Vec::new();
        for (conn_id, conn) in &self.connections {
            if Some(*conn_id) == exclude {
                continue;
            }
            if conn.outbound.try_send(Arc::clone(&frame)).is_err() {
                dead.push(*conn_id);
            }
        }
        for conn_id in dead {
            self.connections.remove(&conn_id);
        }
    }

    fn send_to_user(&mut self, user_id: &UserId, event: ServerEvent) {
        let frame: Arc<str> = Arc::from(OutboundFrame::new(event).to_json());
        let mut dead = Vec::new();
        for (conn_id, conn) in &self.connections {
            if &conn.identity.user_id == user_id
                && conn.outbound.try_send(Arc::clone(&frame)).is_err()
            {
                dead.push(*conn_id);
            }
        }
        for conn_id in dead {
            self.connections.remove(&conn_id);
        }
    }

    fn send_to_conn(&mut self, conn_id: Uuid, event: ServerEvent) {
        let frame: Arc<str> = Arc::from(OutboundFrame::new(event).to_json());
        if let Some(conn) = self.connections.get(&conn_id) {
            if conn.outbound.try_send(frame).is_err() {
                self.connections.remove(&conn_id);
            }
        }
    }

    fn public_rooms(&self) -> Vec<RoomSummary> {
        let mut rooms: Vec<RoomSummary> = self
            .directory
            .values()
            .filter(|r| r.is_public)
            .cloned()
            .collect();
        rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rooms
    }

    fn handle_open(
        &mut self,
        conn_id: Uuid,
        identity: Identity,
        outbound: mpsc::Sender<Arc<str>>,
    ) {
        let first_for_user = !self.user_online(&identity.user_id);
        self.connections.insert(
            conn_id,
            LobbyConnection {
                outbound,
                identity: identity.clone(),
            },
        );

        self.send_to_conn(
            conn_id,
            ServerEvent::PresenceInit {
                users: self.online_users(),
            },
        );
        self.send_to_conn(
            conn_id,
            ServerEvent::LobbyChatHistory {
                messages: self.chat.messages(),
            },
        );
        self.send_to_conn(
            conn_id,
            ServerEvent::LobbyRoomsList {
                rooms: self.public_rooms(),
            },
        );

        if first_for_user {
            self.broadcast(
                ServerEvent::PresenceJoin {
                    user: OnlineUser {
                        user_id: identity.user_id.clone(),
                        display_name: identity.display_name.clone(),
                        avatar_seed: identity.avatar_seed.clone(),
                    },
                },
                Some(conn_id),
            );
        }
        tracing::info!(user_id = %identity.user_id, "Lobby connection established");
    }

    fn handle_closed(&mut self, conn_id: Uuid) {
        let Some(conn) = self.connections.remove(&conn_id) else {
            return;
        };
        let user_id = conn.identity.user_id;
        if !self.user_online(&user_id) {
            if self.chat.typing_stop(&user_id) == TypingChange::Broadcast {
                self.broadcast(
                    ServerEvent::TypingUpdate {
                        user_id: user_id.clone(),
                        display_name: conn.identity.display_name.clone(),
                        is_typing: false,
                    },
                    None,
                );
            }
            self.broadcast(ServerEvent::PresenceLeave { user_id }, None);
        }
    }

    async fn handle_frame(&mut self, conn_id: Uuid, text: String) {
        let command = match crate::protocol::parse_client_frame(&text, self.max_frame_bytes) {
            Ok(command) => command,
            Err(e) => {
                self.send_to_conn(
                    conn_id,
                    ServerEvent::Error {
                        code: e.code(),
                        message: e.to_string(),
                    },
                );
                return;
            }
        };
        let Some(identity) = self.connections.get(&conn_id).map(|c| c.identity.clone()) else {
            return;
        };

        match command {
            ClientCommand::Ping => self.send_to_conn(conn_id, ServerEvent::Pong),
            ClientCommand::LobbyChat { content } => {
                match self.chat.handle_text(
                    &identity.user_id,
                    &identity.display_name,
                    &content,
                    Utc::now(),
                ) {
                    Ok(message) => self.broadcast(ServerEvent::LobbyChatMessage { message }, None),
                    Err(e) => self.send_to_conn(
                        conn_id,
                        ServerEvent::ChatError {
                            code: e.code(),
                            message: e.to_string(),
                        },
                    ),
                }
            }
            ClientCommand::QuickChat { key } => {
                match self.chat.handle_quick(
                    &identity.user_id,
                    &identity.display_name,
                    &key,
                    Utc::now(),
                ) {
                    Ok(message) => self.broadcast(ServerEvent::LobbyChatMessage { message }, None),
                    Err(e) => self.send_to_conn(
                        conn_id,
                        ServerEvent::ChatError {
                            code: e.code(),
                            message: e.to_string(),
                        },
                    ),
                }
            }
            ClientCommand::Reaction {
                message_id,
                token,
                op,
            } => {
                let add = op == ReactionOp::Add;
                match self
                    .chat
                    .handle_reaction(&identity.user_id, message_id, &token, add, Utc::now())
                {
                    Ok(reactions) => self.broadcast(
                        ServerEvent::ReactionUpdate {
                            message_id,
                            reactions,
                        },
                        None,
                    ),
                    Err(e) => self.send_to_conn(
                        conn_id,
                        ServerEvent::ChatError {
                            code: e.code(),
                            message: e.to_string(),
                        },
                    ),
                }
            }
            ClientCommand::TypingStart => {
                if self.chat.typing_start(&identity.user_id, &identity.display_name, Utc::now())
                    == TypingChange::Broadcast
                {
                    self.broadcast(
                        ServerEvent::TypingUpdate {
                            user_id: identity.user_id,
                            display_name: identity.display_name,
                            is_typing: true,
                        },
                        Some(conn_id),
                    );
                }
            }
            ClientCommand::TypingStop => {
                if self.chat.typing_stop(&identity.user_id) == TypingChange::Broadcast {
                    self.broadcast(
                        ServerEvent::TypingUpdate {
                            user_id: identity.user_id,
                            display_name: identity.display_name,
                            is_typing: false,
                        },
                        Some(conn_id),
                    );
                }
            }
            ClientCommand::GetRooms => {
                self.refresh_directory_if_empty().await;
                self.send_to_conn(
                    conn_id,
                    ServerEvent::LobbyRoomsList {
                        rooms: self.public_rooms(),
                    },
                );
            }
            ClientCommand::GetOnlineUsers => {
                self.send_to_conn(
                    conn_id,
                    ServerEvent::LobbyOnlineUsers {
                        users: self.online_users(),
                    },
                );
            }
            ClientCommand::RequestJoin { room_code } => {
                self.handle_request_join(conn_id, &identity, &room_code).await;
            }
            ClientCommand::CancelJoinRequest { request_id } => {
                self.handle_cancel_request(conn_id, &identity, request_id).await;
            }
            ClientCommand::SendInvite {
                to_user_id,
                room_code,
            } => self.handle_send_invite(conn_id, &identity, &to_user_id, &room_code),
            ClientCommand::CancelInvite { invite_id } => {
                self.handle_cancel_invite(conn_id, &identity, invite_id);
            }
            // Room-scoped commands have no meaning on a lobby connection
            _ => {
                self.send_to_conn(
                    conn_id,
                    ServerEvent::LobbyError {
                        code: ErrorCode::InvalidMessage,
                        message: "command is not valid on a lobby connection".to_string(),
                    },
                );
            }
        }
    }

    async fn handle_request_join(&mut self, conn_id: Uuid, identity: &Identity, room_code: &str) {
        let code = room_code.to_uppercase();
        if !crate::protocol::is_valid_room_code(&code) {
            self.send_join_error(conn_id, ErrorCode::RoomNotFound);
            return;
        }
        let Some(handle) = self.rooms.get(&code).map(|r| r.value().clone()) else {
            self.send_join_error(conn_id, ErrorCode::RoomNotFound);
            return;
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = handle
            .send(RoomMsg::CreateJoinRequest {
                requester: identity.clone(),
                reply: reply_tx,
            })
            .await;
        if !sent {
            self.send_join_error(conn_id, ErrorCode::RoomNotFound);
            return;
        }
        match reply_rx.await {
            Ok(Ok(request)) => {
                self.join_requests
                    .insert(request.id, (code, identity.user_id.clone()));
                self.send_to_conn(conn_id, ServerEvent::JoinRequestSent { request });
            }
            Ok(Err(e)) => self.send_join_error(conn_id, e.code()),
            Err(_) => self.send_join_error(conn_id, ErrorCode::RoomNotFound),
        }
    }

    async fn handle_cancel_request(
        &mut self,
        conn_id: Uuid,
        identity: &Identity,
        request_id: Uuid,
    ) {
        let Some((room_code, requester_id)) = self.join_requests.get(&request_id).cloned() else {
            self.send_join_error(conn_id, ErrorCode::RequestNotFound);
            return;
        };
        if requester_id != identity.user_id {
            self.send_join_error(conn_id, ErrorCode::NotRequester);
            return;
        }
        let Some(handle) = self.rooms.get(&room_code).map(|r| r.value().clone()) else {
            self.join_requests.remove(&request_id);
            self.send_join_error(conn_id, ErrorCode::RequestNotFound);
            return;
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = handle
            .send(RoomMsg::CancelJoinRequest {
                request_id,
                requester_id: identity.user_id.clone(),
                reply: reply_tx,
            })
            .await;
        if !sent {
            self.send_join_error(conn_id, ErrorCode::RequestNotFound);
            return;
        }
        match reply_rx.await {
            Ok(Ok(_request)) => {
                self.join_requests.remove(&request_id);
                self.send_to_conn(conn_id, ServerEvent::JoinRequestCancelled { request_id });
            }
            Ok(Err(e)) => self.send_join_error(conn_id, e.code()),
            Err(_) => self.send_join_error(conn_id, ErrorCode::RequestNotFound),
        }
    }

    fn handle_send_invite(
        &mut self,
        conn_id: Uuid,
        identity: &Identity,
        to_user_id: &UserId,
        room_code: &str,
    ) {
        let code = room_code.to_uppercase();
        if !self.directory.contains_key(&code) && !self.rooms.contains_key(&code) {
            self.send_to_conn(
                conn_id,
                ServerEvent::LobbyError {
                    code: ErrorCode::RoomNotFound,
                    message: ErrorCode::RoomNotFound.description().to_string(),
                },
            );
            return;
        }
        let now = Utc::now();
        let payload = InvitePayload {
            id: Uuid::new_v4(),
            from_user_id: identity.user_id.clone(),
            from_display_name: identity.display_name.clone(),
            room_code: code,
            created_at: now,
            expires_at: now + Duration::seconds(INVITE_TTL_SECS),
        };
        self.invites.insert(
            payload.id,
            PendingInvite {
                payload: payload.clone(),
                to_user_id: to_user_id.clone(),
            },
        );
        self.send_to_user(to_user_id, ServerEvent::InviteReceived { invite: payload });
    }

    fn handle_cancel_invite(&mut self, conn_id: Uuid, identity: &Identity, invite_id: Uuid) {
        let Some(invite) = self.invites.get(&invite_id) else {
            return;
        };
        if invite.payload.from_user_id != identity.user_id {
            self.send_to_conn(
                conn_id,
                ServerEvent::LobbyError {
                    code: ErrorCode::InvalidMessage,
                    message: "only the sender can cancel an invite".to_string(),
                },
            );
            return;
        }
        let Some(invite) = self.invites.remove(&invite_id) else {
            return;
        };
        self.send_to_user(
            &invite.to_user_id,
            ServerEvent::InviteCancelled { invite_id },
        );
    }

    fn handle_room_status(&mut self, summary: RoomSummary, action: RoomUpdateAction) {
        match action {
            RoomUpdateAction::Closed => {
                self.directory.remove(&summary.code);
            }
            RoomUpdateAction::Created | RoomUpdateAction::Updated => {
                self.directory.insert(summary.code.clone(), summary.clone());
            }
        }
        if summary.is_public {
            self.broadcast(ServerEvent::LobbyRoomUpdate { action, room: summary }, None);
        }
    }

    fn handle_request_resolved(&mut self, request: JoinRequest) {
        self.join_requests.remove(&request.id);
        let requester = request.requester_id.clone();
        let approved = request.status == crate::join_requests::JoinRequestStatus::Approved;
        let room_code = request.room_code.clone();
        self.send_to_user(&requester, ServerEvent::JoinRequestUpdate { request });
        if approved {
            // Nudge the requester's client toward the room that let them in
            self.send_to_user(&requester, ServerEvent::LobbyHighlight { room_code });
        }
    }

    fn handle_tick(&mut self) {
        let now = Utc::now();
        // Lapsed invites disappear from the recipient's screen
        let expired: Vec<Uuid> = self
            .invites
            .iter()
            .filter(|(_, i)| now >= i.payload.expires_at)
            .map(|(id, _)| *id)
            .collect();
        for invite_id in expired {
            if let Some(invite) = self.invites.remove(&invite_id) {
                self.send_to_user(
                    &invite.to_user_id,
                    ServerEvent::InviteCancelled { invite_id },
                );
            }
        }

        for (user_id, display_name) in self.chat.expire_typing(now) {
            self.broadcast(
                ServerEvent::TypingUpdate {
                    user_id,
                    display_name,
                    is_typing: false,
                },
                None,
            );
        }
    }

    /// Rebuild the directory from live rooms after a lobby restart.
    async fn refresh_directory_if_empty(&mut self) {
        if !self.directory.is_empty() || self.rooms.is_empty() {
            return;
        }
        let handles: Vec<RoomHandle> = self.rooms.iter().map(|r| r.value().clone()).collect();
        for handle in handles {
            let (reply_tx, reply_rx) = oneshot::channel();
            if handle.send(RoomMsg::Summary { reply: reply_tx }).await {
                if let Ok(summary) = reply_rx.await {
                    self.directory.insert(summary.code.clone(), summary);
                }
            }
        }
    }

    fn send_join_error(&mut self, conn_id: Uuid, code: ErrorCode) {
        self.send_to_conn(
            conn_id,
            ServerEvent::JoinRequestError {
                code,
                message: code.description().to_string(),
            },
        );
    }
}
