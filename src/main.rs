use std::{sync::Arc, time::Duration};

use axum::http::{Method, header::CONTENT_TYPE};
use memebattle::{
    AppState, app,
    config::Config,
    db::{DynRoomRepository, MemoryRoomRepository, SqliteRoomRepository},
    engine::Engine,
    images::{IMAGE_ROUTE, LocalImageStore},
    session,
};
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tower_sessions::{MemoryStore, SessionManagerLayer, SessionStore};
use tower_sessions_sqlx_store::SqliteStore;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("memebattle=info,tower_http=info")),
        )
        .init();

    let config = Config::load()?;

    match config.database_url.clone() {
        Some(url) => {
            let repo = SqliteRoomRepository::connect(&url).await?;
            let sessions = SqliteStore::new(repo.pool().clone());
            sessions.migrate().await?;
            let sessions = session::layer(sessions, config.voter_session_days);
            serve(config, Arc::new(repo), sessions).await
        }
        None => {
            warn!("DATABASE_URL not set, rooms and voters will not survive a restart");
            let sessions = session::layer(MemoryStore::default(), config.voter_session_days);
            serve(config, Arc::new(MemoryRoomRepository::new()), sessions).await
        }
    }
}

async fn serve<S: SessionStore + Clone>(
    config: Config,
    repo: Arc<DynRoomRepository>,
    sessions: SessionManagerLayer<S>,
) -> anyhow::Result<()> {
    let images = LocalImageStore::new(&config.image_dir).await?;
    info!("Storing images in {}", images.root().display());

    let engine = Engine::new(repo, Arc::new(images)).with_max_image_bytes(config.max_image_bytes);
    let app_state = AppState {
        engine: Arc::new(engine),
    };

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let app = app(app_state, sessions)
        .nest_service(IMAGE_ROUTE, ServeDir::new(&config.image_dir))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let address = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
