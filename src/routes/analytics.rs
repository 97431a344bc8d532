use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::operations::courses;
use crate::response::AppError;
use crate::routes::require_db;
use crate::services::analytics::{self, ActivityWindow, AnalyticsError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/platform", get(platform))
        .route("/courses/top", get(top_courses))
        .route("/courses/:courseId", get(course_stats))
        .route("/lessons/:lessonId", get(lesson_stats))
        .route("/instructor", get(instructor_dashboard))
}

#[derive(Serialize)]
struct SuccessResponse<T> {
    success: bool,
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlatformQuery {
    #[serde(default)]
    window: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopCoursesQuery {
    #[serde(default)]
    by: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

async fn platform(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<PlatformQuery>,
) -> Result<impl IntoResponse, AppError> {
    if !user.is_admin() {
        return Err(AppError::forbidden("only admins may view platform analytics"));
    }

    let window = match query.window.as_deref() {
        Some(raw) => ActivityWindow::parse(raw)
            .ok_or_else(|| AppError::validation("window must be one of 7d, 30d, 90d, all"))?,
        None => ActivityWindow::Days(30),
    };

    let db = require_db(&state)?;
    let stats = analytics::platform_statistics(db.as_ref(), window)
        .await
        .map_err(map_analytics_error)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: stats,
    }))
}

async fn top_courses(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<TopCoursesQuery>,
) -> Result<impl IntoResponse, AppError> {
    if !user.is_admin() {
        return Err(AppError::forbidden("only admins may view platform analytics"));
    }

    let limit = query.limit.unwrap_or(10).clamp(1, 50);
    let db = require_db(&state)?;

    let ranking = match query.by.as_deref().unwrap_or("enrollments") {
        "enrollments" => analytics::top_courses_by_enrollments(db.as_ref(), limit)
            .await
            .map_err(map_analytics_error)?,
        "progress" => analytics::top_courses_by_average_progress(db.as_ref(), limit)
            .await
            .map_err(map_analytics_error)?,
        _ => {
            return Err(AppError::validation(
                "by must be one of enrollments, progress",
            ))
        }
    };

    Ok(Json(SuccessResponse {
        success: true,
        data: ranking,
    }))
}

async fn course_stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(course_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    let course = courses::find_course(db.pool(), &course_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("course does not exist"))?;

    if !user.is_course_staff(&course.instructor_id) {
        return Err(AppError::forbidden(
            "only the course instructor or an admin may view course analytics",
        ));
    }

    let stats = analytics::course_statistics(db.as_ref(), &course_id)
        .await
        .map_err(map_analytics_error)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: stats,
    }))
}

async fn lesson_stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(lesson_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    let lesson = courses::find_lesson(db.pool(), &lesson_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("lesson does not exist"))?;
    let module = courses::find_module(db.pool(), &lesson.module_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("module does not exist"))?;
    let course = courses::find_course(db.pool(), &module.course_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("course does not exist"))?;

    if !user.is_course_staff(&course.instructor_id) {
        return Err(AppError::forbidden(
            "only the course instructor or an admin may view lesson analytics",
        ));
    }

    let stats = analytics::lesson_statistics(db.as_ref(), &lesson_id)
        .await
        .map_err(map_analytics_error)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: stats,
    }))
}

async fn instructor_dashboard(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    if !user.is_instructor() && !user.is_admin() {
        return Err(AppError::forbidden(
            "only instructors and admins may view the instructor dashboard",
        ));
    }

    let db = require_db(&state)?;
    let dashboard = analytics::instructor_dashboard(db.as_ref(), &user.id)
        .await
        .map_err(map_analytics_error)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: dashboard,
    }))
}

fn map_analytics_error(err: AnalyticsError) -> AppError {
    match err {
        AnalyticsError::NotFound(message) => AppError::not_found(message),
        AnalyticsError::Validation(message) => AppError::validation(message),
        AnalyticsError::Sql(err) => {
            tracing::warn!(error = %err, "analytics query failed");
            AppError::internal("internal server error")
        }
    }
}

fn internal(err: sqlx::Error) -> AppError {
    tracing::warn!(error = %err, "analytics query failed");
    AppError::internal("internal server error")
}
