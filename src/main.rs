//! Lesson Tasks · Exercise Backend
//!
//! - Task model, document codec and answer evaluation for lesson exercises
//! - Axum HTTP + WebSocket API driving per-lesson exercise sessions
//! - In-memory document store seeded with demo lessons (+ optional TOML bank)
//!
//! Important env variables:
//!   PORT              : u16 (default 3000)
//!   TASKS_CONFIG_PATH : path to TOML config (feedback copy + optional lesson bank)
//!   LOG_LEVEL         : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT        : "pretty" (default) or "json"

mod telemetry;
mod util;
mod error;
mod domain;
mod codec;
mod config;
mod evaluator;
mod seeds;
mod store;
mod repository;
mod session;
mod state;
mod protocol;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared application state (document store, live sessions, feedback copy).
  let state = Arc::new(AppState::new());
  state.spawn_idle_sweeper();

  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "lesson_tasks", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "lesson_tasks", error = %e, "Failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
  info!(target: "lesson_tasks", "Shutdown signal received");
}
