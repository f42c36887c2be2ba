use chrono::Utc;
use uuid::Uuid;

use crate::auth::Identity;
use crate::chat::TypingChange;
use crate::join_requests::{JoinRequest, JoinRequestError};
use crate::protocol::{ErrorCode, ReactionOp, ServerEvent};

use super::RoomActor;

impl RoomActor {
    pub(super) async fn handle_chat(&mut self, conn_id: Uuid, content: &str) {
        let Some(attachment) = self.conn_attachment(conn_id) else {
            return;
        };
        let now = Utc::now();
        match self
            .chat
            .handle_text(&attachment.user_id, &attachment.display_name, content, now)
        {
            Ok(message) => {
                self.persist_chat().await;
                self.broadcast(ServerEvent::ChatMessage { message }, None);
            }
            Err(e) => {
                self.send_to_conn(
                    conn_id,
                    ServerEvent::ChatError {
                        code: e.code(),
                        message: e.to_string(),
                    },
                );
            }
        }
    }

    pub(super) async fn handle_quick_chat(&mut self, conn_id: Uuid, key: &str) {
        let Some(attachment) = self.conn_attachment(conn_id) else {
            return;
        };
        let now = Utc::now();
        match self
            .chat
            .handle_quick(&attachment.user_id, &attachment.display_name, key, now)
        {
            Ok(message) => {
                self.persist_chat().await;
                self.broadcast(ServerEvent::ChatMessage { message }, None);
            }
            Err(e) => {
                self.send_to_conn(
                    conn_id,
                    ServerEvent::ChatError {
                        code: e.code(),
                        message: e.to_string(),
                    },
                );
            }
        }
    }

    pub(super) async fn handle_reaction(
        &mut self,
        conn_id: Uuid,
        message_id: Uuid,
        token: &str,
        op: ReactionOp,
    ) {
        let Some(attachment) = self.conn_attachment(conn_id) else {
            return;
        };
        let now = Utc::now();
        let add = op == ReactionOp::Add;
        match self
            .chat
            .handle_reaction(&attachment.user_id, message_id, token, add, now)
        {
            Ok(reactions) => {
                self.persist_chat().await;
                self.broadcast(
                    ServerEvent::ReactionUpdate {
                        message_id,
                        reactions,
                    },
                    None,
                );
            }
            Err(e) => {
                self.send_to_conn(
                    conn_id,
                    ServerEvent::ChatError {
                        code: e.code(),
                        message: e.to_string(),
                    },
                );
            }
        }
    }

    pub(super) async fn handle_typing(&mut self, conn_id: Uuid, is_typing: bool) {
        let Some(attachment) = self.conn_attachment(conn_id) else {
            return;
        };
        let change = if is_typing {
            self.chat
                .typing_start(&attachment.user_id, &attachment.display_name, Utc::now())
        } else {
            self.chat.typing_stop(&attachment.user_id)
        };
        if change == TypingChange::Broadcast {
            self.broadcast(
                ServerEvent::TypingUpdate {
                    user_id: attachment.user_id,
                    display_name: attachment.display_name,
                    is_typing,
                },
                Some(conn_id),
            );
        }
    }

    /// Host resolves a pending join request from inside the room.
    pub(super) async fn handle_resolve_join_request(
        &mut self,
        conn_id: Uuid,
        request_id: Uuid,
        approve: bool,
    ) {
        let Some(attachment) = self.conn_attachment(conn_id) else {
            return;
        };
        if attachment.user_id != self.room.host_id {
            self.send_error(conn_id, ErrorCode::NotHost);
            return;
        }

        let now = Utc::now();
        let result = if approve {
            self.join_requests.approve(request_id, now)
        } else {
            self.join_requests.decline(request_id, now)
        };
        match result {
            Ok(request) => {
                self.persist_join_requests().await;
                self.send_to_conn(
                    conn_id,
                    ServerEvent::JoinRequestUpdate {
                        request: request.clone(),
                    },
                );
                // The requester is waiting on their lobby connection
                self.lobby.join_request_resolved(request).await;
            }
            Err(e) => {
                self.send_to_conn(
                    conn_id,
                    ServerEvent::Error {
                        code: e.code(),
                        message: e.to_string(),
                    },
                );
            }
        }
    }

    /// Lobby RPC: a user asked to join this room.
    pub(super) async fn handle_create_join_request(
        &mut self,
        requester: &Identity,
    ) -> Result<JoinRequest, JoinRequestError> {
        let now = Utc::now();
        // Expire stale entries before enforcing the pending caps
        self.sweep_join_requests(now).await;

        let request = self.join_requests.create(
            &self.room.code,
            &requester.user_id,
            &requester.display_name,
            &requester.avatar_seed,
            now,
        )?;
        self.persist_join_requests().await;

        let host_id = self.room.host_id.clone();
        self.send_to_user(
            &host_id,
            ServerEvent::JoinRequestReceived {
                request: request.clone(),
            },
        );
        tracing::info!(
            room = %self.code,
            requester = %requester.user_id,
            request_id = %request.id,
            "Join request received"
        );
        Ok(request)
    }

    /// Lobby RPC: the requester cancelled from the lobby.
    pub(super) async fn handle_cancel_join_request(
        &mut self,
        request_id: Uuid,
        requester_id: &crate::protocol::UserId,
    ) -> Result<JoinRequest, JoinRequestError> {
        let now = Utc::now();
        let request = self.join_requests.cancel(request_id, requester_id, now)?;
        self.persist_join_requests().await;

        let host_id = self.room.host_id.clone();
        self.send_to_user(
            &host_id,
            ServerEvent::JoinRequestUpdate {
                request: request.clone(),
            },
        );
        Ok(request)
    }
}
