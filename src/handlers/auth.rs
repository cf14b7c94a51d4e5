// src/handlers/auth.rs

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::user::{CreateUserRequest, LoginRequest, NewUser, ROLE_STUDENT},
    store::Store,
    utils::{
        hash::{hash_password, verify_password},
        jwt::sign_jwt,
    },
};

/// Registers a new student account.
///
/// Hashes the password using Argon2 before storing it.
/// Returns 201 Created and the user object (excluding password).
pub async fn register(
    State(store): State<Arc<dyn Store>>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let hashed_password = hash_password(&payload.password)?;

    let user = store
        .create_user(NewUser {
            username: payload.username.trim().to_string(),
            password_hash: hashed_password,
            name: payload
                .name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            role: ROLE_STUDENT.to_string(),
        })
        .await?;

    tracing::info!("Registered user {} ({})", user.username, user.id);
    Ok((StatusCode::CREATED, Json(user)))
}

/// Authenticates a user and returns a JWT token.
///
/// If the credentials match, signs a token carrying the user's id, display
/// name and role.
pub async fn login(
    State(store): State<Arc<dyn Store>>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let user = store
        .user_by_username(payload.username.trim())
        .await?
        .ok_or(AppError::AuthError("Invalid username or password".to_string()))?;

    if !verify_password(&payload.password, &user.password)? {
        tracing::warn!("Failed login for {}", user.username);
        return Err(AppError::AuthError(
            "Invalid username or password".to_string(),
        ));
    }

    let token = sign_jwt(&user, &config.jwt_secret, config.jwt_expiration)?;

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "user": user,
    })))
}
