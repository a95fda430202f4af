use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use http_body_util::BodyExt;
use memebattle::{
    AppState, app,
    db::{MemoryRoomRepository, SqliteRoomRepository},
    engine::Engine,
    images::MemoryImageStore,
    session,
};
use serde_json::{Value, json};
use tower::ServiceExt;
use tower_sessions::MemoryStore;
use tower_sessions_sqlx_store::SqliteStore;

const BOUNDARY: &str = "battle-boundary";

fn test_app() -> Router {
    let engine = Engine::new(
        Arc::new(MemoryRoomRepository::new()),
        Arc::new(MemoryImageStore::new()),
    );
    app(
        AppState {
            engine: Arc::new(engine),
        },
        session::layer(MemoryStore::default(), 1),
    )
}

/// A fresh process over the same database file.
async fn durable_app(database_url: &str) -> Router {
    let repo = SqliteRoomRepository::connect(database_url).await.unwrap();
    let sessions = SqliteStore::new(repo.pool().clone());
    sessions.migrate().await.unwrap();
    let engine = Engine::new(Arc::new(repo), Arc::new(MemoryImageStore::new()));
    app(
        AppState {
            engine: Arc::new(engine),
        },
        session::layer(sessions, 1),
    )
}

async fn json_body(res: Response) -> Value {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn session_cookie(res: &Response) -> Option<String> {
    let raw = res.headers().get(header::SET_COOKIE)?.to_str().ok()?;
    raw.split(';').next().map(str::to_owned)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn upload(room: &str, owner: &str, file: Option<&[u8]>, image_ref: Option<&str>) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"owner_name\"\r\n\r\n{owner}\r\n"
        )
        .as_bytes(),
    );
    if let Some(file) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"m.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(file);
        body.extend_from_slice(b"\r\n");
    }
    if let Some(image_ref) = image_ref {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image_ref\"\r\n\r\n{image_ref}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(format!("/r/{room}/entries"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn vote(room: &str, entry_id: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(format!("/r/{room}/votes"))
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder
        .body(Body::from(json!({ "entryId": entry_id }).to_string()))
        .unwrap()
}

#[tokio::test]
async fn full_battle_over_http() {
    let app = test_app();

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/r/new")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created = json_body(res).await;
    let room = created["id"].as_str().unwrap().to_owned();
    assert_eq!(created["state"], "EMPTY");

    let res = app
        .clone()
        .oneshot(upload(&room, "Ann", Some(b"\x89PNG"), None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let ann = json_body(res).await;
    assert!(ann["imageRef"].as_str().unwrap().starts_with("mem:"));

    let res = app
        .clone()
        .oneshot(upload(&room, "Bob", None, Some("/images/bob.png")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let bob = json_body(res).await;

    let res = app
        .clone()
        .oneshot(upload(&room, "Cid", None, Some("/images/cid.png")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(res).await["error"], "room_full");

    let res = app.clone().oneshot(get(&format!("/r/{room}"))).await.unwrap();
    let view = json_body(res).await;
    assert_eq!(view["votingOpen"], true);
    assert_eq!(view["state"], "VOTE_ELIGIBLE");
    assert_eq!(view["entries"][1]["slot"], 2);

    let ann_id = ann["id"].as_str().unwrap();
    let res = app.clone().oneshot(vote(&room, ann_id, None)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let cookie = session_cookie(&res).expect("voting sets a session cookie");
    assert_eq!(json_body(res).await, json!({ "ok": true }));

    let res = app
        .clone()
        .oneshot(vote(&room, ann_id, Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(res).await["error"], "already_voted");

    let res = app
        .clone()
        .oneshot(vote(&room, bob["id"].as_str().unwrap(), None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .clone()
        .oneshot(get(&format!("/r/{room}/results")))
        .await
        .unwrap();
    let results = json_body(res).await;
    assert_eq!(results["totalVotes"], 2);
    assert_eq!(results["outcome"], json!({ "kind": "tie", "score": 1 }));
}

#[tokio::test]
async fn voter_id_sticks_to_the_session() {
    let app = test_app();

    let res = app.clone().oneshot(get("/voter")).await.unwrap();
    let cookie = session_cookie(&res).unwrap();
    let first = json_body(res).await["voterId"].clone();

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/voter")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(json_body(res).await["voterId"], first);
}

#[tokio::test]
async fn business_errors_have_distinct_statuses() {
    let app = test_app();

    let res = app.clone().oneshot(get("/r/bad%20id")).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(res).await["error"], "invalid_argument");

    let res = app
        .clone()
        .oneshot(upload("r1", "   ", None, Some("/images/x.png")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app.clone().oneshot(vote("r1", "nope", None)).await.unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(res).await["error"], "voting_not_active");

    app.clone()
        .oneshot(upload("r1", "Ann", None, Some("/images/a.png")))
        .await
        .unwrap();
    app.clone()
        .oneshot(upload("r1", "Bob", None, Some("/images/b.png")))
        .await
        .unwrap();
    let res = app.clone().oneshot(vote("r1", "nope", None)).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(res).await["error"], "entry_not_found");

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/r/r1/close")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await["state"], "CLOSED");

    let res = app
        .clone()
        .oneshot(upload("r1", "Ann", None, Some("/images/a2.png")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(res).await["error"], "room_closed");
}

#[tokio::test]
async fn voters_keep_their_ballot_across_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let database_url = format!("sqlite://{}", dir.path().join("battle.db").display());

    let before = durable_app(&database_url).await;
    for (owner, image) in [("Ann", "/images/a.png"), ("Bob", "/images/b.png")] {
        let res = before
            .clone()
            .oneshot(upload("r1", owner, None, Some(image)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
    let room = json_body(before.clone().oneshot(get("/r/r1")).await.unwrap()).await;
    let ann_id = room["entries"][0]["id"].as_str().unwrap().to_owned();

    let res = before.clone().oneshot(vote("r1", &ann_id, None)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let cookie = session_cookie(&res).unwrap();
    let res = before
        .clone()
        .oneshot(
            Request::builder()
                .uri("/voter")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let voter_id = json_body(res).await["voterId"].clone();
    drop(before);

    let after = durable_app(&database_url).await;
    let res = after
        .clone()
        .oneshot(
            Request::builder()
                .uri("/voter")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(json_body(res).await["voterId"], voter_id);

    let res = after
        .clone()
        .oneshot(vote("r1", &ann_id, Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(res).await["error"], "already_voted");

    let results = json_body(after.oneshot(get("/r/r1/results")).await.unwrap()).await;
    assert_eq!(results["totalVotes"], 1);
}
