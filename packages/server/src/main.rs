use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::{HeaderValue, Method, header};
use common::storage::filesystem::FilesystemBlobStore;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use skin_server::config::{AppConfig, CorsConfig};
use skin_server::database::{ensure_indexes, init_db};
use skin_server::service::SkinService;
use skin_server::service::skin::spawn_orphan_sweeper;
use skin_server::state::AppState;
use skin_server::store::DbMetadataStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = Arc::new(AppConfig::load().context("Failed to load config")?);

    let db = init_db(&config.database.url)
        .await
        .context("Failed to connect to database")?;
    if let Err(e) = ensure_indexes(&db).await {
        warn!(error = %e, "Continuing without secondary indexes");
    }

    let blobs = FilesystemBlobStore::new(
        config.storage.root.clone(),
        config.storage.max_blob_size,
    )
    .await
    .with_context(|| format!("Failed to open blob root {}", config.storage.root.display()))?;
    info!(
        root = %config.storage.root.display(),
        max_blob_size = config.storage.max_blob_size,
        "Blob store ready"
    );

    let skins = Arc::new(SkinService::new(
        Arc::new(blobs),
        Arc::new(DbMetadataStore::new(db.clone())),
        config.storage.request_timeout(),
    ));

    // TODO: abort the sweeper once axum::serve gets a graceful shutdown signal.
    let _sweeper = (config.storage.sweep_interval_secs > 0).then(|| {
        spawn_orphan_sweeper(
            Arc::clone(&skins),
            Duration::from_secs(config.storage.sweep_interval_secs),
            config.storage.sweep_grace(),
        )
    });

    let state = AppState {
        db,
        config: Arc::clone(&config),
        skins,
    };

    let app = skin_server::build_router(state).layer(cors_layer(&config.server.cors));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    info!("Server running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cors
        .allow_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(cors.max_age))
}
