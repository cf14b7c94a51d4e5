// src/handlers/results.rs

use std::sync::Arc;

use axum::{Extension, Json, extract::State, response::IntoResponse};

use crate::{
    error::AppError,
    models::user::Identity,
    store::Store,
};

/// The caller's own results, newest first.
pub async fn my_results(
    State(store): State<Arc<dyn Store>>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, AppError> {
    let results = store.list_results(Some(identity.user_id)).await?;
    Ok(Json(results))
}
