// src/handlers/catalog.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::{
    error::AppError,
    models::scheduled_test::ScheduledTestResponse,
    state::AppState,
    store::Store,
};

/// Distinct topic labels in the question bank.
pub async fn list_topics(
    State(store): State<Arc<dyn Store>>,
) -> Result<impl IntoResponse, AppError> {
    let topics = store.all_topics().await?;
    Ok(Json(topics))
}

/// Scheduled tests a student can take right now.
pub async fn list_active_tests(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let now = state.clock.now();
    let tests: Vec<ScheduledTestResponse> = state
        .store
        .active_scheduled_tests(now)
        .await?
        .into_iter()
        .map(|t| ScheduledTestResponse::at(t, now))
        .collect();

    Ok(Json(tests))
}

/// One scheduled test, with whether (and why not) it can be taken now.
pub async fn get_test(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let test = state
        .store
        .scheduled_test_by_id(id)
        .await?
        .ok_or(AppError::NotFound("Scheduled test not found".to_string()))?;

    Ok(Json(ScheduledTestResponse::at(test, state.clock.now())))
}
