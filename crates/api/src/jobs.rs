use {
    axum::{
        Json,
        extract::{Path, State, rejection::JsonRejection},
        http::StatusCode,
        response::IntoResponse,
    },
    tocsin_scheduler::types::{Job, JobCreate, JobUpdate},
};

use crate::{AppState, error::ApiResult};

/// Register a job. 201 with the job snapshot.
pub async fn create_job(
    State(state): State<AppState>,
    body: Result<Json<JobCreate>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(create) = body?;
    let job = state.dispatcher.create(create).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// Live jobs, oldest first.
pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<Job>> {
    Json(state.dispatcher.list().await)
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Job>> {
    Ok(Json(state.dispatcher.get(&id).await?))
}

pub async fn update_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<JobUpdate>, JsonRejection>,
) -> ApiResult<Json<Job>> {
    let Json(update) = body?;
    Ok(Json(state.dispatcher.update(&id, update).await?))
}

pub async fn pause_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Job>> {
    Ok(Json(state.dispatcher.pause(&id).await?))
}

pub async fn resume_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Job>> {
    Ok(Json(state.dispatcher.resume(&id).await?))
}

pub async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.dispatcher.remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
