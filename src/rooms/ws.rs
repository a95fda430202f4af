use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::{
    AppResult, AppState,
    engine::Engine,
    model::RoomId,
    results::{Results, tally},
};

use super::room_id;

fn encode<T: Serialize>(room_id: &RoomId, value: &T) -> Result<Message, axum::Error> {
    match serde_json::to_string(value) {
        Ok(text) => Ok(Message::Text(text.into())),
        Err(e) => {
            warn!("could not encode live results for {room_id}: {e}");
            Err(axum::Error::new(e))
        }
    }
}

async fn send_results(
    sender: &mut SplitSink<WebSocket, Message>,
    results: &Results,
) -> Result<(), axum::Error> {
    sender.send(encode(&results.room_id, results)?).await
}

/// Pushes the room's results now and again after every committed change.
#[debug_handler(state = AppState)]
pub(crate) async fn room_ws(
    Path(raw_id): Path<String>,
    State(engine): State<Arc<Engine>>,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let room_id = room_id(raw_id)?;
    // subscribe first so nothing committed after the snapshot is missed
    let mut rx = engine.subscribe();
    let initial = engine.results(&room_id).await?;

    Ok(ws.on_upgrade(move |stream| async move {
        let (mut sender, mut receiver) = stream.split();

        let mut broadcast_task = tokio::spawn(async move {
            if send_results(&mut sender, &initial).await.is_err() {
                return;
            }
            loop {
                let results = match rx.recv().await {
                    Ok(room) if room.id == room_id => tally(&room),
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("live results for {room_id} skipped {skipped} updates");
                        match engine.results(&room_id).await {
                            Ok(results) => results,
                            Err(_) => break,
                        }
                    }
                    Err(RecvError::Closed) => break,
                };
                if send_results(&mut sender, &results).await.is_err() {
                    break;
                }
            }
            debug!("live results for {room_id} ended");
        });

        let mut recv_task = tokio::spawn(async move {
            while let Some(Ok(msg)) = receiver.next().await {
                if matches!(msg, Message::Close(_)) {
                    break;
                }
            }
        });

        tokio::select! {
            _ = &mut broadcast_task => recv_task.abort(),
            _ = &mut recv_task => broadcast_task.abort(),
        };
    }))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn unencodable_results_end_the_stream() {
        let room_id = RoomId::parse("r1").unwrap();
        // json object keys must be strings
        let bad: HashMap<(u8, u8), u8> = HashMap::from([((1, 2), 3)]);
        assert!(encode(&room_id, &bad).is_err());

        let good = encode(&room_id, &HashMap::from([("ok", true)])).unwrap();
        assert!(matches!(good, Message::Text(text) if text.as_str() == r#"{"ok":true}"#));
    }
}
