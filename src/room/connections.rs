use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::Identity;
use crate::game::GamePhase;
use crate::protocol::{
    ClientCommand, ConnectedPayload, ErrorCode, PlayerRole, RoomPhase, RoomUpdateAction,
    ServerEvent,
};
use crate::storage::encode_attachment;

use super::model::{ConnectionAttachment, Seat};
use super::{ConnectionEntry, RoomActor};

impl RoomActor {
    pub(super) async fn handle_open(
        &mut self,
        conn_id: Uuid,
        identity: Identity,
        rejoin: bool,
        outbound: mpsc::Sender<Arc<str>>,
    ) {
        let now = Utc::now();
        let user_id = identity.user_id.clone();

        // First connection ever: the creator becomes host
        let creating = self.room.seats.is_empty() && self.room.host_id.is_empty();
        if creating {
            self.room.host_id = user_id.clone();
        }

        // At most one current connection per (room, user): close older ones
        let stale: Vec<Uuid> = self
            .connections
            .iter()
            .filter(|(_, e)| {
                e.read_attachment()
                    .is_some_and(|a| a.user_id == user_id)
            })
            .map(|(id, _)| *id)
            .collect();
        for stale_id in stale {
            tracing::debug!(%stale_id, "Superseding older connection for user");
            self.drop_connection(stale_id);
        }

        // Seat assignment
        enum Assignment {
            Reconnect,
            NewSeat,
            Spectate,
        }
        let assignment = match self.room.seat(&user_id) {
            Some(seat) if seat.has_forfeited => Assignment::Spectate,
            Some(_) => Assignment::Reconnect,
            None if self.room.phase == RoomPhase::Waiting && self.room.has_free_seat() => {
                Assignment::NewSeat
            }
            None => Assignment::Spectate,
        };
        let (role, reconnecting) = match assignment {
            Assignment::Reconnect => (PlayerRole::Player, true),
            Assignment::NewSeat => {
                let turn_order = self.room.seats.len();
                let seat = Seat::human(
                    user_id.clone(),
                    identity.display_name.clone(),
                    identity.avatar_seed.clone(),
                    user_id == self.room.host_id,
                    turn_order,
                );
                self.room.seats.push(seat);
                (PlayerRole::Player, false)
            }
            Assignment::Spectate => (PlayerRole::Spectator, false),
        };

        if role == PlayerRole::Spectator && !self.room.settings.allow_spectators {
            // No seat and spectating disabled; refuse and drop
            let frame: Arc<str> = Arc::from(
                crate::protocol::OutboundFrame::new(ServerEvent::Error {
                    code: ErrorCode::RoomFull,
                    message: ErrorCode::RoomFull.description().to_string(),
                })
                .to_json(),
            );
            let _ = outbound.try_send(frame);
            return;
        }

        let is_host = user_id == self.room.host_id;
        let attachment = ConnectionAttachment {
            user_id: user_id.clone(),
            display_name: identity.display_name.clone(),
            avatar_seed: identity.avatar_seed.clone(),
            role,
            connected_at: now,
            is_host,
        };
        let mut entry = ConnectionEntry {
            outbound,
            attachment: Vec::new(),
        };
        match encode_attachment(&attachment) {
            Ok(bytes) => entry.attach(bytes),
            Err(e) => {
                tracing::error!(error = %e, "Connection attachment rejected");
                return;
            }
        }
        self.connections.insert(conn_id, entry);
        self.idle_since = None;

        // Apply seat-side effects of the (re)connect
        let mut clock_restored = false;
        if reconnecting {
            if let Some(seat) = self.room.seat_mut(&user_id) {
                seat.mark_reconnected();
            }
            // Restore a frozen turn clock for the returning current player
            if self.game.phase == GamePhase::TurnRoll || self.game.phase == GamePhase::TurnDecide {
                if self.game.current_player_id() == Some(&user_id) {
                    if let Some(remaining) = self.game.turn_clock_remaining_secs.take() {
                        self.game.turn_deadline =
                            Some(now + Duration::seconds(i64::from(remaining)));
                        clock_restored = true;
                    }
                }
            }
        }
        if role == PlayerRole::Spectator
            && !self
                .room
                .spectators
                .iter()
                .any(|s| s.id == user_id)
        {
            self.room.spectators.push(crate::protocol::SpectatorSnapshot {
                id: user_id.clone(),
                display_name: identity.display_name.clone(),
                connected_at: now,
            });
        }

        // System chat line for the arrival
        let line = match (role, reconnecting) {
            (PlayerRole::Player, true) => format!("{} reconnected", identity.display_name),
            (PlayerRole::Player, false) => format!("{} joined the room", identity.display_name),
            (PlayerRole::Spectator, _) => {
                format!("{} is watching", identity.display_name)
            }
        };
        let system_line = self.chat.create_system(&line, now);

        // Persist before anything is sent
        self.persist_room().await;
        if clock_restored {
            self.persist_game().await;
        }
        self.persist_chat().await;

        // Full state to the new connection
        self.send_to_conn(
            conn_id,
            ServerEvent::Connected(Box::new(ConnectedPayload {
                room_code: self.room.code.clone(),
                room_phase: self.room.phase,
                settings: self.room.settings.clone(),
                your_user_id: user_id.clone(),
                your_role: role,
                is_host,
                players: self.room.player_snapshots(),
                spectator_count: self.room.spectators.len(),
                game: self.game.clone(),
                chat_history: self.chat.messages(),
            })),
        );

        // Tell everyone else
        match (role, reconnecting) {
            (PlayerRole::Player, true) => {
                self.broadcast(
                    ServerEvent::PlayerReconnected {
                        user_id: user_id.clone(),
                    },
                    Some(conn_id),
                );
            }
            (PlayerRole::Player, false) => {
                let player = self
                    .room
                    .seat(&user_id)
                    .map(Seat::snapshot);
                if let Some(player) = player {
                    self.broadcast(ServerEvent::PlayerJoined { player }, Some(conn_id));
                }
            }
            (PlayerRole::Spectator, _) => {
                let spectator = self
                    .room
                    .spectators
                    .iter()
                    .find(|s| s.id == user_id)
                    .cloned();
                if let Some(spectator) = spectator {
                    let count = self.room.spectators.len();
                    self.broadcast(
                        ServerEvent::SpectatorJoined {
                            spectator,
                            spectator_count: count,
                        },
                        Some(conn_id),
                    );
                }
            }
        }
        self.broadcast(
            ServerEvent::ChatMessage {
                message: system_line,
            },
            None,
        );

        tracing::info!(
            room = %self.code,
            %user_id,
            role = ?role,
            reconnecting,
            rejoin,
            "Connection established"
        );
        self.publish_status(if creating {
            RoomUpdateAction::Created
        } else {
            RoomUpdateAction::Updated
        })
        .await;
        self.reschedule_alarm().await;
    }

    pub(super) async fn handle_closed(&mut self, conn_id: Uuid) {
        let Some(entry) = self.connections.remove(&conn_id) else {
            return;
        };
        let now = Utc::now();
        if self.connections.is_empty() {
            self.idle_since = Some(now);
        }
        let Some(attachment) = entry.read_attachment() else {
            return;
        };
        let user_id = attachment.user_id;

        // Another connection for the same user keeps the seat live
        let still_connected = self
            .connections
            .values()
            .any(|e| e.read_attachment().is_some_and(|a| a.user_id == user_id));
        if still_connected {
            return;
        }

        if attachment.role == PlayerRole::Spectator {
            self.room.spectators.retain(|s| s.id != user_id);
            self.persist_room().await;
            self.broadcast(
                ServerEvent::PlayerLeft {
                    user_id: user_id.clone(),
                },
                None,
            );
            self.publish_status(RoomUpdateAction::Updated).await;
            self.reschedule_alarm().await;
            return;
        }

        // Clear any typing indicator the user left behind
        if self.chat.typing_stop(&user_id) == crate::chat::TypingChange::Broadcast {
            self.persist_chat().await;
            self.broadcast(
                ServerEvent::TypingUpdate {
                    user_id: user_id.clone(),
                    display_name: attachment.display_name.clone(),
                    is_typing: false,
                },
                None,
            );
        }

        let deadline = now + Duration::seconds(self.config.reconnect_window_secs);
        let Some(seat) = self.room.seat_mut(&user_id) else {
            return;
        };
        if seat.has_forfeited {
            return;
        }
        seat.mark_disconnected(now, deadline);
        let display_name = seat.display_name.clone();

        // Freeze the turn clock if the current player walked away mid-game
        if self.room.phase == RoomPhase::Playing
            && self.game.current_player_id() == Some(&user_id)
        {
            if let Some(turn_deadline) = self.game.turn_deadline.take() {
                let remaining = (turn_deadline - now).num_seconds().max(0);
                self.game.turn_clock_remaining_secs =
                    Some(u32::try_from(remaining).unwrap_or(0));
            }
        }

        let system_line = self
            .chat
            .create_system(&format!("{display_name} disconnected"), now);

        self.persist_room().await;
        self.persist_game().await;
        self.persist_chat().await;

        self.broadcast(
            ServerEvent::PlayerDisconnected {
                user_id: user_id.clone(),
                reconnect_deadline: deadline,
            },
            None,
        );
        self.broadcast(
            ServerEvent::ChatMessage {
                message: system_line,
            },
            None,
        );

        tracing::info!(room = %self.code, %user_id, "Player disconnected, reconnect window open");
        self.publish_status(RoomUpdateAction::Updated).await;
        self.reschedule_alarm().await;
    }

    pub(super) async fn handle_frame(&mut self, conn_id: Uuid, text: String) {
        let command = match crate::protocol::parse_client_frame(&text, self.config.max_frame_bytes)
        {
            Ok(command) => command,
            Err(e) => {
                tracing::debug!(room = %self.code, error = %e, "Rejected inbound frame");
                self.send_error(conn_id, e.code());
                return;
            }
        };

        match command {
            ClientCommand::Ping => {
                self.send_to_conn(conn_id, ServerEvent::Pong);
            }
            ClientCommand::StartGame => self.handle_start_game(conn_id).await,
            ClientCommand::QuickPlayStart { ai_profiles } => {
                self.handle_quick_play(conn_id, &ai_profiles).await;
            }
            ClientCommand::DiceRoll { kept_mask } => {
                self.handle_dice_roll(conn_id, kept_mask).await;
            }
            ClientCommand::DiceKeep { indices } => {
                self.handle_dice_keep(conn_id, &indices).await;
            }
            ClientCommand::CategoryScore { category } => {
                self.handle_category_score(conn_id, &category).await;
            }
            ClientCommand::Rematch => self.handle_rematch(conn_id).await,
            ClientCommand::AddAiPlayer { profile_id } => {
                self.handle_add_ai_player(conn_id, &profile_id).await;
            }
            ClientCommand::Chat { content } => self.handle_chat(conn_id, &content).await,
            ClientCommand::QuickChat { key } => self.handle_quick_chat(conn_id, &key).await,
            ClientCommand::Reaction {
                message_id,
                token,
                op,
            } => self.handle_reaction(conn_id, message_id, &token, op).await,
            ClientCommand::TypingStart => self.handle_typing(conn_id, true).await,
            ClientCommand::TypingStop => self.handle_typing(conn_id, false).await,
            ClientCommand::ApproveJoinRequest { request_id } => {
                self.handle_resolve_join_request(conn_id, request_id, true).await;
            }
            ClientCommand::DeclineJoinRequest { request_id } => {
                self.handle_resolve_join_request(conn_id, request_id, false).await;
            }
            // Lobby-only commands have no meaning on a room connection
            ClientCommand::LobbyChat { .. }
            | ClientCommand::GetRooms
            | ClientCommand::GetOnlineUsers
            | ClientCommand::RequestJoin { .. }
            | ClientCommand::CancelJoinRequest { .. }
            | ClientCommand::SendInvite { .. }
            | ClientCommand::CancelInvite { .. } => {
                self.send_error(conn_id, ErrorCode::InvalidMessage);
            }
        }
    }
}
