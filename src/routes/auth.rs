use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::{self, ROLE_LEARNER};
use crate::db::operations::users;
use crate::response::{json_error, AppError};
use crate::routes::require_db;
use crate::state::AppState;

const BCRYPT_COST: u32 = 10;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
}

#[derive(Serialize)]
struct SuccessResponse<T> {
    success: bool,
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    email: String,
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthPayload {
    user: users::UserRecord,
    token: String,
}

async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Response, AppError> {
    let email = payload.email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(AppError::validation("a valid email address is required"));
    }
    if payload.username.trim().is_empty() {
        return Err(AppError::validation("username must not be empty"));
    }
    if payload.password.len() < 8 {
        return Err(AppError::validation(
            "password must be at least 8 characters",
        ));
    }

    let db = require_db(&state)?;

    if users::find_user_by_email(db.pool(), &email)
        .await
        .map_err(sql_error)?
        .is_some()
    {
        return Err(AppError::conflict("email is already registered"));
    }

    let password_hash = bcrypt::hash(&payload.password, BCRYPT_COST)
        .map_err(|_| AppError::internal("password hashing failed"))?;

    let user = users::create_user(
        db.pool(),
        &email,
        payload.username.trim(),
        &password_hash,
        ROLE_LEARNER,
    )
    .await
    .map_err(sql_error)?;

    issue_session(&state, user).await
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let db = require_db(&state)?;

    let email = payload.email.trim().to_lowercase();
    let user = users::find_user_by_email(db.pool(), &email)
        .await
        .map_err(sql_error)?
        .ok_or_else(|| AppError::unauthorized("invalid email or password"))?;

    let password_ok = bcrypt::verify(&payload.password, &user.password_hash).unwrap_or(false);
    if !password_ok {
        return Err(AppError::unauthorized("invalid email or password"));
    }

    users::touch_last_login(db.pool(), &user.id)
        .await
        .map_err(sql_error)?;

    issue_session(&state, user).await
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, AppError> {
    if let Some(token) = auth::extract_token(&headers) {
        let db = require_db(&state)?;
        let token_hash = auth::hash_token(&token);
        users::delete_session_by_token_hash(db.pool(), &token_hash)
            .await
            .map_err(sql_error)?;
    }

    let mut response = Json(SuccessResponse {
        success: true,
        data: serde_json::json!({ "loggedOut": true }),
    })
    .into_response();

    if let Ok(cookie) =
        header::HeaderValue::from_str("auth_token=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
    {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }

    Ok(response)
}

async fn issue_session(state: &AppState, user: users::UserRecord) -> Result<Response, AppError> {
    let db = require_db(state)?;

    let (token, expires_at) = auth::sign_jwt_for_user(&user.id).map_err(|err| {
        tracing::error!(error = %err, "token signing failed");
        AppError::internal("token signing failed")
    })?;

    let token_hash = auth::hash_token(&token);
    users::create_session(db.pool(), &user.id, &token_hash, expires_at)
        .await
        .map_err(sql_error)?;

    let max_age = (expires_at - chrono::Utc::now().naive_utc())
        .num_seconds()
        .max(0);

    let mut response = (
        StatusCode::OK,
        Json(SuccessResponse {
            success: true,
            data: AuthPayload {
                user,
                token: token.clone(),
            },
        }),
    )
        .into_response();

    let cookie = format!("auth_token={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if let Ok(value) = header::HeaderValue::from_str(&cookie) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }

    Ok(response)
}

fn sql_error(err: sqlx::Error) -> AppError {
    tracing::warn!(error = %err, "auth query failed");
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "internal server error",
    )
}
