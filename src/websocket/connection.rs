use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::auth::Identity;
use crate::lobby::{LobbyHandle, LobbyMsg};
use crate::protocol::{OutboundFrame, ServerEvent};
use crate::room::{RoomHandle, RoomMsg};

/// Close code for unsupported (binary) data.
const CLOSE_UNSUPPORTED_DATA: u16 = 1003;

/// Where a verified connection's traffic goes.
pub enum ConnTarget {
    Room(RoomHandle),
    Lobby(LobbyHandle),
}

impl ConnTarget {
    async fn open(
        &self,
        conn_id: Uuid,
        identity: Identity,
        rejoin: bool,
        outbound: mpsc::Sender<Arc<str>>,
    ) -> bool {
        match self {
            Self::Room(room) => {
                room.send(RoomMsg::Open {
                    conn_id,
                    identity,
                    rejoin,
                    outbound,
                })
                .await
            }
            Self::Lobby(lobby) => {
                lobby
                    .send(LobbyMsg::Open {
                        conn_id,
                        identity,
                        outbound,
                    })
                    .await
            }
        }
    }

    async fn frame(&self, conn_id: Uuid, text: String) -> bool {
        match self {
            Self::Room(room) => room.send(RoomMsg::Frame { conn_id, text }).await,
            Self::Lobby(lobby) => lobby.send(LobbyMsg::Frame { conn_id, text }).await,
        }
    }

    async fn closed(&self, conn_id: Uuid) {
        match self {
            Self::Room(room) => {
                room.send(RoomMsg::Closed { conn_id }).await;
            }
            Self::Lobby(lobby) => {
                lobby.send(LobbyMsg::Closed { conn_id }).await;
            }
        }
    }
}

/// Pump one upgraded socket: outbound frames drain from the actor's queue,
/// inbound text frames go to the actor's inbox. PING is answered here
/// without waking the writer; binary frames close the connection with 1003.
pub async fn pump_socket(
    socket: WebSocket,
    identity: Identity,
    rejoin: bool,
    target: ConnTarget,
    outbound_queue: usize,
) {
    let conn_id = Uuid::new_v4();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Arc<str>>(outbound_queue.max(1));
    let (close_tx, mut close_rx) = oneshot::channel::<CloseFrame>();

    if !target
        .open(conn_id, identity.clone(), rejoin, tx.clone())
        .await
    {
        tracing::warn!(%conn_id, "Target actor is gone, dropping fresh connection");
        let _ = sink.close().await;
        return;
    }
    tracing::debug!(%conn_id, user_id = %identity.user_id, "WebSocket connection established");

    // Outbound task: drain the actor's queue onto the wire, or terminate
    // with an explicit close frame when told to
    let send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = rx.recv() => match frame {
                    Some(frame) => {
                        if sink
                            .send(Message::Text(frame.as_ref().to_string().into()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    None => break,
                },
                close = &mut close_rx => {
                    if let Ok(close) = close {
                        let _ = sink.send(Message::Close(Some(close))).await;
                    }
                    break;
                }
            }
        }
        let _ = sink.close().await;
    });

    // Inbound loop: text frames only
    let mut close_tx = Some(close_tx);
    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "WebSocket read error");
                break;
            }
        };
        match message {
            Message::Text(text) => {
                let text = text.to_string();
                // Heartbeats are answered at the transport without waking
                // the room writer
                if is_ping_frame(&text) {
                    let pong: Arc<str> = Arc::from(OutboundFrame::new(ServerEvent::Pong).to_json());
                    if tx.send(pong).await.is_err() {
                        break;
                    }
                    continue;
                }
                if !target.frame(conn_id, text).await {
                    break;
                }
            }
            Message::Binary(_) => {
                tracing::debug!(%conn_id, "Binary frame rejected");
                if let Some(close_tx) = close_tx.take() {
                    let _ = close_tx.send(CloseFrame {
                        code: CLOSE_UNSUPPORTED_DATA,
                        reason: "binary messages not supported".into(),
                    });
                }
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                // Protocol-level ping/pong handled by the stack
            }
            Message::Close(_) => break,
        }
    }

    target.closed(conn_id).await;
    drop(tx);
    let _ = send_task.await;
    tracing::debug!(%conn_id, "WebSocket connection closed");
}

/// Cheap structural check for `{"type":"PING"}` frames before full parsing.
fn is_ping_frame(text: &str) -> bool {
    text.len() <= 64
        && serde_json::from_str::<serde_json::Value>(text)
            .ok()
            .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(|t| t == "PING"))
            .unwrap_or(false)
}
