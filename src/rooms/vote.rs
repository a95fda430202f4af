use std::sync::Arc;

use axum::{
    Json, debug_handler,
    extract::{Path, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use tower_sessions::Session;

use crate::{AppResult, AppState, engine::Engine, model::EntryId, session::get_or_create_voter_id};

use super::room_id;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CastVoteQuery {
    entry_id: EntryId,
}

/// The voter is whoever this session says it is.
#[debug_handler(state = AppState)]
pub(crate) async fn cast_vote(
    State(engine): State<Arc<Engine>>,
    Path(raw_id): Path<String>,
    session: Session,
    Json(CastVoteQuery { entry_id }): Json<CastVoteQuery>,
) -> AppResult<impl IntoResponse> {
    let room_id = room_id(raw_id)?;
    let voter_id = get_or_create_voter_id(&session).await?;

    engine.vote(&room_id, &entry_id, &voter_id).await?;
    Ok(Json(json!({ "ok": true })))
}
