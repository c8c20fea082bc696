//! PAW Quiz · Level-Run Backend
//!
//! - Axum HTTP API: level list, run start/resume/question/answer
//! - Signed, expiring run tokens (the token *is* the session)
//! - Deterministic levels derived from the dataset bytes
//! - Static SPA fallback (./static/index.html) and /media image serving
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   DATA_JSON_PATH      : character dataset JSON
//!   DATA_BASE_DIR       : media root for character images
//!   APP_SECRET          : token signing secret (default: derived from dataset)
//!   RUN_TOKEN_MAX_AGE_S : run token lifetime (default 30 days)
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod error;
mod config;
mod dataset;
mod levels;
mod token;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::config::QuizConfig;
use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state. Dataset and levels are loaded lazily on
  // first request so a broken dataset surfaces via /api/health, not a crash.
  let state = Arc::new(AppState::new(QuizConfig::from_env()));

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "paw_quiz_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
