// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use serde_json::json;

use crate::{
    error::AppError,
    models::{
        question::{CreateQuestionRequest, UpdateQuestionRequest},
        scheduled_test::{
            CreateScheduledTestRequest, ScheduledTestResponse, UpdateScheduledTestRequest,
        },
        test_result::ResultsQuery,
        user::ROLE_STUDENT,
    },
    state::AppState,
};

/// Lists every question in the bank, answer keys included.
/// Admin only.
pub async fn list_questions(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let questions = state.store.list_questions().await?;
    Ok(Json(questions))
}

/// Creates a new question.
/// Admin only. Text fields are sanitized before they are stored.
pub async fn create_question(
    State(state): State<AppState>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let question = state
        .store
        .create_question(payload.into_new_question()?)
        .await?;

    tracing::info!("Created question {}", question.id);
    Ok((StatusCode::CREATED, Json(question)))
}

/// Imports a batch of questions. Either every question is inserted or none.
/// Admin only.
pub async fn bulk_create_questions(
    State(state): State<AppState>,
    Json(payload): Json<Vec<CreateQuestionRequest>>,
) -> Result<impl IntoResponse, AppError> {
    if payload.is_empty() {
        return Err(AppError::BadRequest("No questions supplied".to_string()));
    }

    let questions = payload
        .into_iter()
        .enumerate()
        .map(|(i, q)| {
            q.into_new_question()
                .map_err(|e| AppError::BadRequest(format!("Question {}: {}", i + 1, e)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let ids = state.store.create_questions(questions).await?;

    tracing::info!("Imported {} questions", ids.len());
    Ok((
        StatusCode::CREATED,
        Json(json!({ "created": ids.len(), "ids": ids })),
    ))
}

/// Updates an existing question. Only supplied fields change.
/// Admin only.
pub async fn update_question(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let patch = payload.into_patch()?;
    if patch.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    let question = state
        .store
        .update_question(id, patch)
        .await?
        .ok_or(AppError::NotFound("Question not found".to_string()))?;

    Ok(Json(question))
}

/// Deletes a question.
/// Admin only.
pub async fn delete_question(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if !state.store.delete_question(id).await? {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    tracing::info!("Deleted question {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// Lists every scheduled test, newest first, with its current availability.
/// Admin only.
pub async fn list_scheduled_tests(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let now = state.clock.now();
    let tests: Vec<ScheduledTestResponse> = state
        .store
        .list_scheduled_tests()
        .await?
        .into_iter()
        .map(|t| ScheduledTestResponse::at(t, now))
        .collect();

    Ok(Json(tests))
}

/// Schedules a new test.
/// Admin only.
pub async fn create_scheduled_test(
    State(state): State<AppState>,
    Json(payload): Json<CreateScheduledTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    let new_test = payload.into_new_test().map_err(AppError::BadRequest)?;
    let test = state.store.create_scheduled_test(new_test).await?;

    tracing::info!("Scheduled test {} '{}'", test.id, test.title);
    Ok((
        StatusCode::CREATED,
        Json(ScheduledTestResponse::at(test, state.clock.now())),
    ))
}

/// Updates a scheduled test, including the `is_active` toggle.
/// Admin only.
pub async fn update_scheduled_test(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateScheduledTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    let patch = payload.into_patch().map_err(AppError::BadRequest)?;
    if patch.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    let current = state
        .store
        .scheduled_test_by_id(id)
        .await?
        .ok_or(AppError::NotFound("Scheduled test not found".to_string()))?;

    let merged = patch.apply_to(&current);
    if merged.start_date >= merged.end_date {
        return Err(AppError::BadRequest(
            "End date must be after start date".to_string(),
        ));
    }

    let test = state
        .store
        .update_scheduled_test(id, patch)
        .await?
        .ok_or(AppError::NotFound("Scheduled test not found".to_string()))?;

    tracing::info!("Updated scheduled test {} (active: {})", test.id, test.is_active);
    Ok(Json(ScheduledTestResponse::at(test, state.clock.now())))
}

/// Deletes a scheduled test.
/// Admin only.
pub async fn delete_scheduled_test(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if !state.store.delete_scheduled_test(id).await? {
        return Err(AppError::NotFound("Scheduled test not found".to_string()));
    }

    tracing::info!("Deleted scheduled test {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// Lists results of all users, or of one user with `?user_id=`.
/// Admin only.
pub async fn list_results(
    State(state): State<AppState>,
    Query(query): Query<ResultsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let results = state.store.list_results(query.user_id).await?;
    Ok(Json(results))
}

/// Lists all users in the system.
/// Admin only.
pub async fn list_users(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let users = state.store.list_users().await?;
    Ok(Json(users))
}

/// Deletes a student account together with its results.
/// Admin only. Administrator accounts cannot be removed this way.
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .store
        .user_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if user.role != ROLE_STUDENT {
        return Err(AppError::Forbidden(
            "Only student accounts can be deleted".to_string(),
        ));
    }

    if !state.store.delete_user(id).await? {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    tracing::info!("Deleted student {} ({})", user.username, id);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub questions: i64,
    pub students: i64,
    pub results: i64,
    pub scheduled_tests: i64,
    pub active_tests: usize,
}

/// Counts shown on the admin dashboard.
/// Admin only.
pub async fn stats(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let store = &state.store;
    let now = state.clock.now();

    let stats = DashboardStats {
        questions: store.count_questions().await?,
        students: store.count_users(ROLE_STUDENT).await?,
        results: store.count_results().await?,
        scheduled_tests: store.count_scheduled_tests().await?,
        active_tests: store.active_scheduled_tests(now).await?.len(),
    };

    Ok(Json(stats))
}
