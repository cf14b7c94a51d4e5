// src/handlers/session.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    engine::{
        launch::{SessionRequest, launch},
        registry::SessionRegistry,
    },
    error::AppError,
    models::user::Identity,
    state::AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    /// Omit for a practice run.
    pub test_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub option: usize,
}

#[derive(Debug, Deserialize)]
pub struct GoToRequest {
    pub index: usize,
}

/// Selects questions and opens a session for the caller.
///
/// Returns 201 Created with the (not yet started) session view, including any
/// selection warnings.
pub async fn create_session(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let request = match payload.test_id {
        Some(test_id) => SessionRequest::Scheduled { test_id },
        None => SessionRequest::Practice {
            question_count: state.config.practice_question_count,
        },
    };

    let launched = launch(
        state.store.as_ref(),
        identity,
        request,
        state.config.question_limit(),
        state.clock.now(),
    )
    .await?;

    let view = state
        .sessions
        .open(launched.session, launched.warnings)
        .await;

    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_session(
    State(sessions): State<SessionRegistry>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(sessions.view(id, identity.user_id).await?))
}

/// Starts both timers.
pub async fn start_session(
    State(sessions): State<SessionRegistry>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(sessions.start(id, identity.user_id).await?))
}

/// Records an answer for the current question.
pub async fn answer(
    State(sessions): State<SessionRegistry>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        sessions
            .select_option(id, identity.user_id, payload.option)
            .await?,
    ))
}

pub async fn toggle_review(
    State(sessions): State<SessionRegistry>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(sessions.toggle_review(id, identity.user_id).await?))
}

pub async fn go_to(
    State(sessions): State<SessionRegistry>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(payload): Json<GoToRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        sessions.go_to(id, identity.user_id, payload.index).await?,
    ))
}

/// Moves to the next question. On the last question this finishes the test,
/// saves the result and returns the outcome.
pub async fn next(
    State(sessions): State<SessionRegistry>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(sessions.next(id, identity.user_id).await?))
}

/// Abandons the session. Nothing is saved.
pub async fn abandon(
    State(sessions): State<SessionRegistry>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    sessions.abandon(id, identity.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
