use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::operations::news;
use crate::response::AppError;
use crate::routes::require_db;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_published).post(create_news))
        .route("/all", get(list_all))
        .route(
            "/:newsId",
            get(get_news).put(update_news).delete(delete_news),
        )
}

#[derive(Serialize)]
struct SuccessResponse<T> {
    success: bool,
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateNewsRequest {
    title: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateNewsRequest {
    title: String,
    #[serde(default)]
    content: String,
    status: String,
}

async fn list_published(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    let items = news::list_published(db.pool()).await.map_err(internal)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: items,
    }))
}

async fn list_all(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
) -> Result<impl IntoResponse, AppError> {
    let user = required_user(user)?;
    require_publisher_role(&user)?;

    let db = require_db(&state)?;
    let items = news::list_all(db.pool()).await.map_err(internal)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: items,
    }))
}

async fn get_news(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(news_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    let item = news::find_news(db.pool(), &news_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("article does not exist"))?;

    if item.status != "published" {
        let can_view = user
            .map(|Extension(user)| user.is_admin() || user.id == item.author_id)
            .unwrap_or(false);
        if !can_view {
            return Err(AppError::not_found("article does not exist"));
        }
    }

    Ok(Json(SuccessResponse {
        success: true,
        data: item,
    }))
}

async fn create_news(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
    Json(payload): Json<CreateNewsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = required_user(user)?;
    require_publisher_role(&user)?;

    if payload.title.trim().is_empty() {
        return Err(AppError::validation("title must not be empty"));
    }

    let db = require_db(&state)?;
    let item = news::insert_news(db.pool(), payload.title.trim(), &payload.content, &user.id)
        .await
        .map_err(internal)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: item,
    }))
}

async fn update_news(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(news_id): Path<String>,
    Json(payload): Json<UpdateNewsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = required_user(user)?;

    if payload.title.trim().is_empty() {
        return Err(AppError::validation("title must not be empty"));
    }
    if !matches!(payload.status.as_str(), "draft" | "published") {
        return Err(AppError::validation("invalid article status"));
    }

    let db = require_db(&state)?;

    let existing = news::find_news(db.pool(), &news_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("article does not exist"))?;

    if !user.is_admin() && user.id != existing.author_id {
        return Err(AppError::forbidden(
            "only the author or an admin may edit this article",
        ));
    }

    // The publish date is stamped on the first transition to published.
    let stamp_published_at = payload.status == "published" && existing.published_at.is_none();

    news::update_news(
        db.pool(),
        &news_id,
        payload.title.trim(),
        &payload.content,
        &payload.status,
        stamp_published_at,
    )
    .await
    .map_err(internal)?;

    let updated = news::find_news(db.pool(), &news_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("article does not exist"))?;

    Ok(Json(SuccessResponse {
        success: true,
        data: updated,
    }))
}

async fn delete_news(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(news_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = required_user(user)?;
    let db = require_db(&state)?;

    let existing = news::find_news(db.pool(), &news_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("article does not exist"))?;

    if !user.is_admin() && user.id != existing.author_id {
        return Err(AppError::forbidden(
            "only the author or an admin may delete this article",
        ));
    }

    news::delete_news(db.pool(), &news_id)
        .await
        .map_err(internal)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: serde_json::json!({ "deleted": true }),
    }))
}

fn required_user(user: Option<Extension<AuthUser>>) -> Result<AuthUser, AppError> {
    user.map(|Extension(user)| user)
        .ok_or_else(|| AppError::unauthorized("missing auth token"))
}

fn require_publisher_role(user: &AuthUser) -> Result<(), AppError> {
    if user.is_instructor() || user.is_admin() {
        Ok(())
    } else {
        Err(AppError::forbidden(
            "only instructors and admins may publish news",
        ))
    }
}

fn internal(err: sqlx::Error) -> AppError {
    tracing::warn!(error = %err, "news query failed");
    AppError::internal("internal server error")
}
