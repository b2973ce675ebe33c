use anyhow::Result;
use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, io::ErrorKind, path::Path, path::PathBuf, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod clients;
mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use clients::{
    caption::{CaptionService, HttpCaptionClient},
    fs_store::{self, FsObjectStore},
    store::ObjectStore,
    vector_index::{CaptionIndex, HttpVectorIndex},
};
use services::{enrichment::EnrichmentPipeline, search::SearchService, storage::StorageManager};
use state::AppState;

/// Upper bound on one enrichment run end to end (URL issuance, caption
/// fetch, index write).
const ENRICHMENT_RUN_TIMEOUT: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;

    tracing::info!(
        storage_dir = %cfg.storage_dir,
        database_url = %cfg.database_url,
        caption_service = %cfg.caption_service_url,
        vector_index = %cfg.vector_index_url,
        enrichment_jobs = cfg.enrichment_jobs,
        "Starting image-store"
    );

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    tracing::debug!("Connecting using raw URL => {}", db_url);

    // Extract the local file path SQLx will use
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");

    // Create parent directory and the database file if needed
    if !db_path.contains(":memory:") {
        let db_path_obj = Path::new(db_path);
        if let Some(parent) = db_path_obj.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }
        if let Err(e) = fs::OpenOptions::new().create(true).write(true).open(db_path) {
            tracing::warn!("Failed to pre-create database file: {}", e);
        }
    }

    let db: Arc<sqlx::Pool<sqlx::Sqlite>> = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await?,
    );

    // --- Apply schema (idempotent) ---
    fs_store::init_schema(&db).await?;

    // --- Long-lived outbound HTTP client, shared by both service clients ---
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.http_timeout_secs))
        .build()?;

    // --- Construct clients and services ---
    let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(
        db.clone(),
        cfg.storage_dir.clone(),
        cfg.public_url.clone(),
        cfg.url_secret.clone(),
    ));
    let captioner: Arc<dyn CaptionService> = Arc::new(HttpCaptionClient::new(
        http.clone(),
        cfg.caption_service_url.clone(),
    ));
    let index: Arc<dyn CaptionIndex> =
        Arc::new(HttpVectorIndex::new(http, cfg.vector_index_url.clone()));

    let pipeline = EnrichmentPipeline::new(
        store.clone(),
        captioner,
        index.clone(),
        cfg.enrichment_jobs,
        ENRICHMENT_RUN_TIMEOUT,
    );
    let manager = StorageManager::new(store.clone(), pipeline);
    let search = SearchService::new(store.clone(), index);

    let app_state = AppState {
        manager,
        search,
        store,
        db,
        storage_dir: PathBuf::from(&cfg.storage_dir),
    };

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(app_state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
