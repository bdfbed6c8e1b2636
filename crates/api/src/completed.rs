use {
    axum::{
        Json,
        extract::{Path, Query, State, rejection::QueryRejection},
    },
    serde::Deserialize,
    tocsin_scheduler::types::CompletedJob,
};

use crate::{
    AppState,
    error::{ApiError, ApiResult},
};

const DEFAULT_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct Page {
    #[serde(default)]
    offset: usize,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

/// Archived executions, newest first.
pub async fn list_completed(
    State(state): State<AppState>,
    page: Result<Query<Page>, QueryRejection>,
) -> ApiResult<Json<Vec<CompletedJob>>> {
    let Query(page) = page?;
    Ok(Json(state.archive.list(page.offset, page.limit).await?))
}

/// Most recent archived execution for a job id.
pub async fn get_completed(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<CompletedJob>> {
    state
        .archive
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("completed job not found: {id}")))
}
