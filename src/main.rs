#![cfg_attr(not(test), deny(clippy::panic))]

use axum::extract::State;
use axum::routing::{any, get, post};
use axum::{Json, Router};
use clap::Parser;
use dicehall_server::config;
use dicehall_server::logging;
use dicehall_server::server::AppState;
use dicehall_server::websocket::{lobby_ws_handler, room_ws_handler};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Dicehall -- authoritative WebSocket server for a 13-round multiplayer
/// dice game
#[derive(Parser, Debug)]
#[command(name = "dicehall-server")]
#[command(about = "Authoritative WebSocket server for a 13-round multiplayer dice game")]
#[command(version)]
struct Cli {
    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines and pre-deployment checks.
    #[arg(long, short = 'c', conflicts_with = "print_config")]
    validate_config: bool,

    /// Print the loaded configuration to stdout (as JSON) and exit.
    #[arg(long, conflicts_with = "validate_config")]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration from config.json if present; otherwise use code
    // defaults plus environment overrides.
    let cfg = Arc::new(config::load());

    if cli.print_config {
        let json = serde_json::to_string_pretty(&*cfg)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    let validation_result = config::validate_config(&cfg);
    if cli.validate_config {
        match validation_result {
            Ok(()) => {
                println!("Configuration validation passed");
                println!();
                println!("Configuration summary:");
                println!("  Port: {}", cfg.port);
                println!("  Auth required: {}", cfg.security.require_auth);
                println!("  Turn timeout: {}s", cfg.server.turn_timeout_secs);
                println!("  Reconnect window: {}s", cfg.server.reconnect_window_secs);
                return Ok(());
            }
            Err(e) => {
                eprintln!("Configuration validation failed:\n{e}");
                std::process::exit(1);
            }
        }
    }
    validation_result.map_err(|e| anyhow::anyhow!("invalid configuration:\n{e}"))?;

    logging::init_with_config(&cfg.logging);

    let port = cfg.port;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "Starting Dicehall server");

    let state = AppState::new(cfg);
    let app = Router::new()
        .route("/health", get(health))
        .route("/rooms", post(create_room))
        .route("/rooms/{code}/ws", any(room_ws_handler))
        .route("/lobby/ws", any(lobby_ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(state.health())
}

/// Allocate a fresh room code. The room itself is created lazily on the
/// first WebSocket connection to it.
async fn create_room(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let code = state.allocate_room_code();
    Json(serde_json::json!({ "code": code }))
}
