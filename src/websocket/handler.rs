use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::Identity;
use crate::server::AppState;

use super::connection::{pump_socket, ConnTarget};

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Deserialize)]
pub struct UpgradeQuery {
    #[serde(default)]
    token: Option<String>,
    /// Hint that the client is attempting a reconnect.
    #[serde(default)]
    rejoin: Option<bool>,
}

/// Upgrade handler for room connections at `/rooms/{code}/ws`.
pub async fn room_ws_handler(
    ws: WebSocketUpgrade,
    Path(code): Path<String>,
    Query(query): Query<UpgradeQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let code = code.to_uppercase();
    if !crate::protocol::is_valid_room_code(&code) {
        return (StatusCode::NOT_FOUND, "unknown room code").into_response();
    }

    let identity = match authenticate(&state, query.token.as_deref()).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };

    let rejoin = query.rejoin.unwrap_or(false);
    let room = state.room_or_spawn(&code);
    let queue = state.config.server.outbound_queue_frames;
    ws.on_upgrade(move |socket| {
        pump_socket(socket, identity, rejoin, ConnTarget::Room(room), queue)
    })
}

/// Upgrade handler for the lobby connection at `/lobby/ws`.
pub async fn lobby_ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<UpgradeQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let identity = match authenticate(&state, query.token.as_deref()).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };

    let lobby = state.lobby.clone();
    let queue = state.config.server.outbound_queue_frames;
    ws.on_upgrade(move |socket| {
        pump_socket(socket, identity, false, ConnTarget::Lobby(lobby), queue)
    })
}

/// Verify the bearer token, mapping failures to the upgrade status codes.
async fn authenticate(
    state: &AppState,
    token: Option<&str>,
) -> Result<Identity, Response> {
    if !state.config.security.require_auth {
        // Development mode: a synthetic identity derived from the token
        // string keeps multi-client testing possible without a provider
        let raw = token.unwrap_or("guest").trim();
        let user = if raw.is_empty() { "guest" } else { raw };
        return Ok(Identity {
            user_id: format!("dev-{user}"),
            display_name: user.to_string(),
            avatar_seed: user.to_string(),
        });
    }

    let Some(token) = token else {
        return Err((StatusCode::UNAUTHORIZED, "missing token").into_response());
    };
    state.verifier.verify(token).await.map_err(|e| {
        tracing::debug!(error = %e, "Upgrade rejected");
        (e.http_status(), e.to_string()).into_response()
    })
}
