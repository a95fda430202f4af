use std::sync::Arc;

use axum::{
    Json, debug_handler,
    extract::{Path, State},
    response::IntoResponse,
};
use serde::Serialize;
use serde_json::Value;

use crate::{
    AppResult, AppState,
    engine::Engine,
    model::{Entry, Room, RoomId, RoomState},
};

use super::room_id;

#[derive(Serialize)]
struct EntryView<'a> {
    #[serde(flatten)]
    entry: &'a Entry,
    slot: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RoomView<'a> {
    id: &'a RoomId,
    created_at: i64,
    entries: Vec<EntryView<'a>>,
    voting_open: bool,
    voting_closed: bool,
    state: RoomState,
}

pub(crate) fn room_json(room: &Room) -> AppResult<Json<Value>> {
    let view = RoomView {
        id: &room.id,
        created_at: room.created_at,
        entries: room
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| EntryView { entry, slot: i + 1 })
            .collect(),
        voting_open: room.voting_open,
        voting_closed: room.voting_closed,
        state: room.state(),
    };
    Ok(Json(serde_json::to_value(view)?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn room(
    State(engine): State<Arc<Engine>>,
    Path(raw_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let room = engine.get_room(&room_id(raw_id)?).await?;
    room_json(&room)
}

#[debug_handler(state = AppState)]
pub(crate) async fn close(
    State(engine): State<Arc<Engine>>,
    Path(raw_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let room = engine.close_voting(&room_id(raw_id)?).await?;
    room_json(&room)
}

#[debug_handler(state = AppState)]
pub(crate) async fn results(
    State(engine): State<Arc<Engine>>,
    Path(raw_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let results = engine.results(&room_id(raw_id)?).await?;
    Ok(Json(results))
}
