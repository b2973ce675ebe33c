use anyhow::{Context, Result};
use clap::Parser;
use std::env;
use uuid::Uuid;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Base URL under which this service is reachable from the caption
    /// service; presigned retrieval links are rooted here.
    pub public_url: String,
    pub caption_service_url: String,
    pub vector_index_url: String,
    /// Secret used to sign time-limited retrieval URLs.
    pub url_secret: String,
    /// Maximum number of enrichment runs in flight at once.
    pub enrichment_jobs: usize,
    /// Timeout applied to each outbound HTTP request.
    pub http_timeout_secs: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Image storage facade with caption search")]
pub struct Args {
    /// Host to bind to (overrides IMAGE_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides IMAGE_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where object payloads are stored (overrides IMAGE_STORE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides IMAGE_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Externally reachable base URL (overrides IMAGE_STORE_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Caption service base URL (overrides IMAGE_STORE_CAPTION_URL)
    #[arg(long)]
    pub caption_url: Option<String>,

    /// Vector index base URL (overrides VECTOR_STORE_URL)
    #[arg(long)]
    pub vector_index_url: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("IMAGE_STORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("IMAGE_STORE_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing IMAGE_STORE_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading IMAGE_STORE_PORT"),
        };
        let env_storage =
            env::var("IMAGE_STORE_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("IMAGE_STORE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/image_store.db".into());
        let env_caption = env::var("IMAGE_STORE_CAPTION_URL")
            .unwrap_or_else(|_| "http://image-caption-service:8000".into());
        let env_index = env::var("VECTOR_STORE_URL")
            .unwrap_or_else(|_| "http://caption-vector-store:8000".into());

        let host = args.host.unwrap_or(env_host);
        let port = args.port.unwrap_or(env_port);

        let env_public = env::var("IMAGE_STORE_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", host, port));

        // Without a configured secret, presigned links only stay valid for
        // the lifetime of this process.
        let url_secret = match env::var("IMAGE_STORE_URL_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                tracing::debug!("IMAGE_STORE_URL_SECRET not set; using a per-process secret");
                Uuid::new_v4().to_string()
            }
        };

        let enrichment_jobs = match env::var("IMAGE_STORE_ENRICHMENT_JOBS") {
            Ok(value) => value
                .parse::<usize>()
                .with_context(|| format!("parsing IMAGE_STORE_ENRICHMENT_JOBS value `{}`", value))?
                .max(1),
            Err(_) => 8,
        };

        let http_timeout_secs = match env::var("IMAGE_STORE_HTTP_TIMEOUT_SECS") {
            Ok(value) => value.parse::<u64>().with_context(|| {
                format!("parsing IMAGE_STORE_HTTP_TIMEOUT_SECS value `{}`", value)
            })?,
            Err(_) => 30,
        };

        Ok(Self {
            host,
            port,
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            public_url: args.public_url.unwrap_or(env_public),
            caption_service_url: args.caption_url.unwrap_or(env_caption),
            vector_index_url: args.vector_index_url.unwrap_or(env_index),
            url_secret,
            enrichment_jobs,
            http_timeout_secs,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
