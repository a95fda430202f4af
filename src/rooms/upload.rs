use std::sync::Arc;

use axum::{
    Json, debug_handler,
    extract::{Multipart, Path, State},
    response::IntoResponse,
};

use crate::{AppResult, AppState, engine::Engine, error::BattleError, images::ImagePayload};

use super::room_id;

/// Multipart form: `owner_name` plus either a `file` part or an `image_ref`.
#[debug_handler(state = AppState)]
pub(crate) async fn upload_entry(
    State(engine): State<Arc<Engine>>,
    Path(raw_id): Path<String>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let room_id = room_id(raw_id)?;

    let mut owner_name = None;
    let mut payload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| BattleError::invalid(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            // playerName is what older clients send
            "owner_name" | "ownerName" | "playerName" => {
                owner_name = Some(field.text().await.map_err(|e| BattleError::invalid(e.body_text()))?);
            }
            "file" | "image" => {
                let content_type = field.content_type().map(str::to_owned);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| BattleError::invalid(e.body_text()))?;
                payload = Some(ImagePayload::Bytes { data, content_type });
            }
            "image_ref" | "imageRef" => {
                let raw = field.text().await.map_err(|e| BattleError::invalid(e.body_text()))?;
                payload = Some(ImagePayload::Ref(raw));
            }
            _ => {}
        }
    }

    let owner_name = owner_name.ok_or_else(|| BattleError::invalid("owner_name is required"))?;
    let payload = payload.ok_or_else(|| BattleError::invalid("file or image_ref is required"))?;

    let entry = engine.upload_entry(&room_id, &owner_name, payload).await?;
    Ok(Json(entry))
}
