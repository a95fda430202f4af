//! Two players each put an image into a room, the audience votes for one,
//! and the tally updates live.
//!
//! The interesting part is [`engine`]: rooms move through
//! `EMPTY → COLLECTING → VOTE_ELIGIBLE → CLOSED`, hold at most two entries,
//! and count every voter exactly once no matter how requests interleave.

pub mod appresult;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod images;
pub mod model;
pub mod results;
pub mod rooms;
pub mod session;

use std::sync::Arc;

use axum::{
    Json, Router, debug_handler,
    extract::{DefaultBodyLimit, FromRef},
    response::IntoResponse,
    routing::get,
};
use serde_json::json;
use tower_sessions::{SessionManagerLayer, SessionStore};

pub use appresult::{AppError, AppResult};
use engine::Engine;

/// Multipart framing on top of the image itself.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

pub fn app<S: SessionStore + Clone>(app_state: AppState, sessions: SessionManagerLayer<S>) -> Router {
    let body_limit = app_state.engine.max_image_bytes() + FORM_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(health))
        .route("/voter", get(session::voter))
        .nest("/r", rooms::router())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(app_state)
        .layer(sessions)
}

#[debug_handler]
async fn health() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}
