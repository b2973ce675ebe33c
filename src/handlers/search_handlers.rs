//! Semantic search handler.

use crate::{errors::ApiError, models::search::SearchMatch, state::AppState};
use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

const DEFAULT_SEARCH_LIMIT: usize = 5;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
    pub limit: Option<usize>,
}

/// GET `/search?query=&limit=` — rank indexed captions against the query and
/// join each hit with live object metadata.
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<SearchMatch>>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    Ok(Json(state.search.search(&params.query, limit).await?))
}
