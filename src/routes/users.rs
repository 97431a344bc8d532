use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::operations::users;
use crate::response::AppError;
use crate::routes::require_db;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(me).put(update_profile))
        .route("/me/password", put(update_password))
}

#[derive(Serialize)]
struct SuccessResponse<T> {
    success: bool,
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateProfileRequest {
    username: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePasswordRequest {
    current_password: String,
    new_password: String,
}

async fn me(Extension(user): Extension<AuthUser>) -> impl IntoResponse {
    Json(SuccessResponse {
        success: true,
        data: user,
    })
}

async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    let username = payload.username.trim();
    if username.is_empty() {
        return Err(AppError::validation("username must not be empty"));
    }

    let db = require_db(&state)?;
    users::update_username(db.pool(), &user.id, username)
        .await
        .map_err(internal)?;

    let updated = users::find_user_by_id(db.pool(), &user.id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("user does not exist"))?;

    Ok(Json(SuccessResponse {
        success: true,
        data: updated,
    }))
}

async fn update_password(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<UpdatePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.new_password.len() < 8 {
        return Err(AppError::validation(
            "password must be at least 8 characters",
        ));
    }

    let db = require_db(&state)?;

    let record = users::find_user_by_id(db.pool(), &user.id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("user does not exist"))?;

    let current_ok =
        bcrypt::verify(&payload.current_password, &record.password_hash).unwrap_or(false);
    if !current_ok {
        return Err(AppError::unauthorized("current password is incorrect"));
    }

    let new_hash = bcrypt::hash(&payload.new_password, 10)
        .map_err(|_| AppError::internal("password hashing failed"))?;

    users::update_password_hash(db.pool(), &user.id, &new_hash)
        .await
        .map_err(internal)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: serde_json::json!({ "updated": true }),
    }))
}

fn internal(err: sqlx::Error) -> AppError {
    tracing::warn!(error = %err, "users query failed");
    AppError::internal("internal server error")
}
