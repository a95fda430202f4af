mod new;
mod room;
mod upload;
mod vote;
mod ws;

use axum::{
    Router,
    routing::{get, post},
};

use crate::{AppResult, AppState, model::RoomId};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/new", post(new::new_room))
        .route("/{room_id}", get(room::room))
        .route("/{room_id}/entries", post(upload::upload_entry))
        .route("/{room_id}/votes", post(vote::cast_vote))
        .route("/{room_id}/close", post(room::close))
        .route("/{room_id}/results", get(room::results))
        .route("/{room_id}/ws", get(ws::room_ws))
}

/// Path segments arrive as plain strings so a malformed id surfaces as an
/// invalid-argument error rather than an extractor rejection.
pub(crate) fn room_id(raw: String) -> AppResult<RoomId> {
    Ok(RoomId::parse(raw)?)
}
