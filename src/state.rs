//! Shared handler state: the long-lived clients and services, constructed
//! once at startup and cloned per request.

use crate::{
    clients::store::ObjectStore,
    services::{search::SearchService, storage::StorageManager},
};
use sqlx::SqlitePool;
use std::{path::PathBuf, sync::Arc};

#[derive(Clone)]
pub struct AppState {
    pub manager: StorageManager,
    pub search: SearchService,
    pub store: Arc<dyn ObjectStore>,
    /// Kept for the readiness probe.
    pub db: Arc<SqlitePool>,
    pub storage_dir: PathBuf,
}
