use std::sync::Arc;

use axum::{debug_handler, extract::State, http::StatusCode, response::IntoResponse};

use crate::{AppResult, AppState, engine::Engine};

use super::room::room_json;

#[debug_handler(state = AppState)]
pub(crate) async fn new_room(State(engine): State<Arc<Engine>>) -> AppResult<impl IntoResponse> {
    let room = engine.create_room().await?;
    Ok((StatusCode::CREATED, room_json(&room)?))
}
