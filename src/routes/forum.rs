use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::operations::forum::{self, PostRow, TopicRow};
use crate::response::AppError;
use crate::routes::require_db;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/:categoryId", delete(delete_category))
        .route("/categories/:categoryId/topics", get(list_topics).post(create_topic))
        .route("/topics/:topicId", get(get_topic).delete(delete_topic))
        .route("/topics/:topicId/flags", put(set_topic_flags))
        .route("/topics/:topicId/posts", post(create_post))
        .route("/posts/:postId", put(update_post).delete(delete_post))
}

#[derive(Serialize)]
struct SuccessResponse<T> {
    success: bool,
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCategoryRequest {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    position: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTopicRequest {
    title: String,
    #[serde(default)]
    course_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopicFlagsRequest {
    is_pinned: bool,
    is_locked: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePostRequest {
    content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TopicDetail {
    #[serde(flatten)]
    topic: TopicRow,
    posts: Vec<PostRow>,
}

async fn list_categories(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;
    let categories = forum::list_categories(db.pool()).await.map_err(internal)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: categories,
    }))
}

async fn create_category(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateCategoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !user.is_admin() {
        return Err(AppError::forbidden("only admins may manage categories"));
    }
    if payload.name.trim().is_empty() {
        return Err(AppError::validation("name must not be empty"));
    }

    let db = require_db(&state)?;
    let category = forum::insert_category(
        db.pool(),
        payload.name.trim(),
        &payload.description,
        payload.position,
    )
    .await
    .map_err(internal)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: category,
    }))
}

async fn delete_category(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(category_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !user.is_admin() {
        return Err(AppError::forbidden("only admins may manage categories"));
    }

    let db = require_db(&state)?;
    let deleted = forum::delete_category(db.pool(), &category_id)
        .await
        .map_err(internal)?;

    if deleted == 0 {
        return Err(AppError::not_found("category does not exist"));
    }

    Ok(Json(SuccessResponse {
        success: true,
        data: serde_json::json!({ "deleted": true }),
    }))
}

async fn list_topics(
    State(state): State<AppState>,
    Path(category_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    forum::find_category(db.pool(), &category_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("category does not exist"))?;

    let topics = forum::list_topics(db.pool(), &category_id)
        .await
        .map_err(internal)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: topics,
    }))
}

async fn create_topic(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(category_id): Path<String>,
    Json(payload): Json<CreateTopicRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.title.trim().is_empty() {
        return Err(AppError::validation("title must not be empty"));
    }

    let db = require_db(&state)?;

    forum::find_category(db.pool(), &category_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("category does not exist"))?;

    let topic = forum::insert_topic(
        db.pool(),
        &category_id,
        payload.course_id.as_deref(),
        &user.id,
        payload.title.trim(),
    )
    .await
    .map_err(internal)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: topic,
    }))
}

async fn get_topic(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    let topic = forum::find_topic(db.pool(), &topic_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("topic does not exist"))?;

    let posts = forum::list_posts(db.pool(), &topic_id)
        .await
        .map_err(internal)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: TopicDetail { topic, posts },
    }))
}

async fn set_topic_flags(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(topic_id): Path<String>,
    Json(payload): Json<TopicFlagsRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !user.is_admin() && !user.is_instructor() {
        return Err(AppError::forbidden(
            "only instructors and admins may moderate topics",
        ));
    }

    let db = require_db(&state)?;

    forum::find_topic(db.pool(), &topic_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("topic does not exist"))?;

    forum::set_topic_flags(db.pool(), &topic_id, payload.is_pinned, payload.is_locked)
        .await
        .map_err(internal)?;

    let updated = forum::find_topic(db.pool(), &topic_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("topic does not exist"))?;

    Ok(Json(SuccessResponse {
        success: true,
        data: updated,
    }))
}

async fn delete_topic(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(topic_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    let topic = forum::find_topic(db.pool(), &topic_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("topic does not exist"))?;

    if !user.is_admin() && user.id != topic.author_id {
        return Err(AppError::forbidden(
            "only the author or an admin may delete this topic",
        ));
    }

    forum::delete_topic(db.pool(), &topic_id)
        .await
        .map_err(internal)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: serde_json::json!({ "deleted": true }),
    }))
}

async fn create_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(topic_id): Path<String>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.content.trim().is_empty() {
        return Err(AppError::validation("content must not be empty"));
    }

    let db = require_db(&state)?;

    let topic = forum::find_topic(db.pool(), &topic_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("topic does not exist"))?;

    if topic.is_locked && !user.is_admin() && !user.is_instructor() {
        return Err(AppError::forbidden("topic is locked"));
    }

    let post = forum::insert_post(db.pool(), &topic_id, &user.id, payload.content.trim())
        .await
        .map_err(internal)?;

    forum::touch_topic(db.pool(), &topic_id)
        .await
        .map_err(internal)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: post,
    }))
}

async fn update_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(post_id): Path<String>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.content.trim().is_empty() {
        return Err(AppError::validation("content must not be empty"));
    }

    let db = require_db(&state)?;

    let post = forum::find_post(db.pool(), &post_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("post does not exist"))?;

    if !user.is_admin() && user.id != post.author_id {
        return Err(AppError::forbidden(
            "only the author or an admin may edit this post",
        ));
    }

    forum::update_post(db.pool(), &post_id, payload.content.trim())
        .await
        .map_err(internal)?;

    let updated = forum::find_post(db.pool(), &post_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("post does not exist"))?;

    Ok(Json(SuccessResponse {
        success: true,
        data: updated,
    }))
}

async fn delete_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(post_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    let post = forum::find_post(db.pool(), &post_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("post does not exist"))?;

    if !user.is_admin() && user.id != post.author_id {
        return Err(AppError::forbidden(
            "only the author or an admin may delete this post",
        ));
    }

    forum::delete_post(db.pool(), &post_id)
        .await
        .map_err(internal)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: serde_json::json!({ "deleted": true }),
    }))
}

fn internal(err: sqlx::Error) -> AppError {
    tracing::warn!(error = %err, "forum query failed");
    AppError::internal("internal server error")
}
