use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::routing::put;
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::operations::progress as progress_ops;
use crate::response::AppError;
use crate::routes::require_db;
use crate::services::progress::{self, LessonProgressPatch, ProgressError, ProgressStatus};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/lessons/:lessonId",
            get(get_lesson_progress).put(record_lesson_progress),
        )
        .route("/modules/:moduleId", get(get_module_progress))
        .route("/courses/:courseId", get(get_course_progress))
        .route("/lessons/:lessonId/complete", put(complete_lesson))
}

#[derive(Serialize)]
struct SuccessResponse<T> {
    success: bool,
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordProgressRequest {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    time_spent_delta: Option<i64>,
}

async fn record_lesson_progress(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(lesson_id): Path<String>,
    Json(payload): Json<RecordProgressRequest>,
) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    let status = match payload.status.as_deref() {
        Some(raw) => Some(
            ProgressStatus::parse(raw)
                .ok_or_else(|| AppError::validation("invalid lesson progress status"))?,
        ),
        None => None,
    };

    let outcome = progress::record_lesson_progress(
        db.as_ref(),
        &user.id,
        &lesson_id,
        LessonProgressPatch {
            status,
            time_spent_delta: payload.time_spent_delta,
        },
    )
    .await
    .map_err(map_progress_error)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: outcome,
    }))
}

/// Convenience shorthand for the common "mark done" action.
async fn complete_lesson(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(lesson_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    let outcome = progress::record_lesson_progress(
        db.as_ref(),
        &user.id,
        &lesson_id,
        LessonProgressPatch {
            status: Some(ProgressStatus::Completed),
            time_spent_delta: None,
        },
    )
    .await
    .map_err(map_progress_error)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: outcome,
    }))
}

async fn get_lesson_progress(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(lesson_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    let row = progress_ops::get_lesson_progress(db.pool(), &user.id, &lesson_id)
        .await
        .map_err(|err| {
            tracing::warn!(error = %err, "lesson progress query failed");
            AppError::internal("internal server error")
        })?;

    let data = match row {
        Some(row) => serde_json::to_value(row).unwrap_or_default(),
        None => serde_json::json!({
            "lessonId": lesson_id,
            "status": ProgressStatus::NotStarted.as_str(),
            "timeSpent": 0,
            "completedAt": null,
        }),
    };

    Ok(Json(SuccessResponse {
        success: true,
        data,
    }))
}

async fn get_module_progress(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(module_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    let view = progress::get_module_progress(db.as_ref(), &user.id, &module_id)
        .await
        .map_err(map_progress_error)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: view,
    }))
}

async fn get_course_progress(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(course_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    let view = progress::get_course_progress(db.as_ref(), &user.id, &course_id)
        .await
        .map_err(map_progress_error)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: view,
    }))
}

fn map_progress_error(err: ProgressError) -> AppError {
    match err {
        ProgressError::Validation(message) => AppError::validation(message),
        ProgressError::NotFound(message) => AppError::not_found(message),
        ProgressError::NotEnrolled(message) => AppError::not_enrolled(message),
        ProgressError::Sql(err) => {
            tracing::warn!(error = %err, "progress query failed");
            AppError::internal("internal server error")
        }
    }
}
