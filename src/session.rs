//! Per-client voter identity, kept in the session cookie's server-side store.
//!
//! With a database configured the store is the rooms' SQLite file, so a
//! voter keeps their id (and their "already voted") across restarts.

use axum::{Json, debug_handler, response::IntoResponse};
use serde_json::json;
use tower_sessions::{Expiry, Session, SessionManagerLayer, SessionStore, cookie::SameSite};
use tracing::info;

use crate::{AppResult, model::VoterId};

pub const VOTER_ID: &str = "voter_id";

pub fn layer<S: SessionStore + Clone>(store: S, lifetime_days: i64) -> SessionManagerLayer<S> {
    SessionManagerLayer::new(store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::days(lifetime_days)))
}

/// First call mints an id for this client; every later call returns it.
pub async fn get_or_create_voter_id(session: &Session) -> AppResult<VoterId> {
    if let Some(voter_id) = session.get::<VoterId>(VOTER_ID).await? {
        return Ok(voter_id);
    }

    let voter_id = VoterId::generate();
    session.insert(VOTER_ID, &voter_id).await?;
    info!("new voter {voter_id}");
    Ok(voter_id)
}

#[debug_handler]
pub async fn voter(session: Session) -> AppResult<impl IntoResponse> {
    let voter_id = get_or_create_voter_id(&session).await?;
    Ok(Json(json!({ "voterId": voter_id })))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tower_sessions::MemoryStore;

    use super::*;

    #[tokio::test]
    async fn voter_id_is_minted_once() {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);
        let first = get_or_create_voter_id(&session).await.unwrap();
        let second = get_or_create_voter_id(&session).await.unwrap();
        assert_eq!(first, second);
        // uuid v4, hyphenated
        assert_eq!(first.as_str().len(), 36);
    }

    #[tokio::test]
    async fn clients_get_different_ids() {
        let store = Arc::new(MemoryStore::default());
        let a = Session::new(None, store.clone(), None);
        let b = Session::new(None, store, None);
        assert_ne!(
            get_or_create_voter_id(&a).await.unwrap(),
            get_or_create_voter_id(&b).await.unwrap()
        );
    }
}
