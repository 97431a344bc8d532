use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::response::AppError;
use crate::routes::require_db;
use crate::services::enrollment::{self, EnrollmentError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_enrollments).post(enroll))
        .route("/:courseId", delete(unenroll))
}

#[derive(Serialize)]
struct SuccessResponse<T> {
    success: bool,
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnrollRequest {
    course_id: String,
}

async fn enroll(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<EnrollRequest>,
) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    let enrollment = enrollment::enroll(db.as_ref(), &user.id, &payload.course_id)
        .await
        .map_err(map_enrollment_error)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: enrollment,
    }))
}

async fn list_enrollments(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    let enrollments = enrollment::list_for_user(db.as_ref(), &user.id)
        .await
        .map_err(map_enrollment_error)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: enrollments,
    }))
}

async fn unenroll(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(course_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    enrollment::unenroll(db.as_ref(), &user.id, &course_id)
        .await
        .map_err(map_enrollment_error)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: serde_json::json!({ "unenrolled": true }),
    }))
}

fn map_enrollment_error(err: EnrollmentError) -> AppError {
    match err {
        EnrollmentError::NotFound(message) => AppError::not_found(message),
        EnrollmentError::AlreadyEnrolled => {
            AppError::conflict("user is already enrolled in this course")
        }
        EnrollmentError::Validation(message) => AppError::validation(message),
        EnrollmentError::Sql(err) => {
            tracing::warn!(error = %err, "enrollment query failed");
            AppError::internal("internal server error")
        }
    }
}
