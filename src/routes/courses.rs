use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::operations::courses::{self, CourseRow, LessonRow, ModuleRow};
use crate::db::operations::enrollments;
use crate::response::AppError;
use crate::routes::require_db;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_courses).post(create_course))
        .route("/mine", get(list_my_courses))
        .route(
            "/:courseId",
            get(get_course).put(update_course).delete(delete_course),
        )
        .route("/:courseId/modules", post(create_module))
        .route(
            "/modules/:moduleId",
            put(update_module).delete(delete_module),
        )
        .route("/modules/:moduleId/lessons", post(create_lesson))
        .route(
            "/lessons/:lessonId",
            get(get_lesson).put(update_lesson).delete(delete_lesson),
        )
}

#[derive(Serialize)]
struct SuccessResponse<T> {
    success: bool,
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCourseRequest {
    title: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateCourseRequest {
    title: String,
    #[serde(default)]
    description: String,
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateModuleRequest {
    title: String,
    #[serde(default)]
    position: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateLessonRequest {
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    position: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModuleWithLessons {
    #[serde(flatten)]
    module: ModuleRow,
    lessons: Vec<LessonRow>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CourseDetail {
    #[serde(flatten)]
    course: CourseRow,
    modules: Vec<ModuleWithLessons>,
}

async fn list_courses(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    let courses = courses::list_courses_by_status(db.pool(), "published")
        .await
        .map_err(internal)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: courses,
    }))
}

async fn list_my_courses(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
) -> Result<impl IntoResponse, AppError> {
    let user = required_user(user)?;
    require_author_role(&user)?;

    let db = require_db(&state)?;
    let courses = courses::list_courses_by_instructor(db.pool(), &user.id)
        .await
        .map_err(internal)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: courses,
    }))
}

async fn create_course(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
    Json(payload): Json<CreateCourseRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = required_user(user)?;
    require_author_role(&user)?;

    if payload.title.trim().is_empty() {
        return Err(AppError::validation("title must not be empty"));
    }

    let db = require_db(&state)?;
    let course = courses::insert_course(
        db.pool(),
        payload.title.trim(),
        &payload.description,
        &user.id,
        "draft",
    )
    .await
    .map_err(internal)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: course,
    }))
}

async fn get_course(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(course_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    let course = courses::find_course(db.pool(), &course_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("course does not exist"))?;

    // Drafts are visible to course staff only.
    if course.status != "published" {
        let staff = user
            .as_ref()
            .map(|Extension(u)| u.is_course_staff(&course.instructor_id))
            .unwrap_or(false);
        if !staff {
            return Err(AppError::not_found("course does not exist"));
        }
    }

    let modules = courses::list_modules(db.pool(), &course_id)
        .await
        .map_err(internal)?;

    let mut out = Vec::with_capacity(modules.len());
    for module in modules {
        let lessons = courses::list_lessons(db.pool(), &module.id)
            .await
            .map_err(internal)?;
        out.push(ModuleWithLessons { module, lessons });
    }

    Ok(Json(SuccessResponse {
        success: true,
        data: CourseDetail {
            course,
            modules: out,
        },
    }))
}

async fn update_course(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(course_id): Path<String>,
    Json(payload): Json<UpdateCourseRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = required_user(user)?;
    let db = require_db(&state)?;
    let course = staff_course(&state, &course_id, &user).await?;

    if !matches!(payload.status.as_str(), "draft" | "published" | "archived") {
        return Err(AppError::validation("invalid course status"));
    }
    if payload.title.trim().is_empty() {
        return Err(AppError::validation("title must not be empty"));
    }

    courses::update_course(
        db.pool(),
        &course.id,
        payload.title.trim(),
        &payload.description,
        &payload.status,
    )
    .await
    .map_err(internal)?;

    let updated = courses::find_course(db.pool(), &course.id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("course does not exist"))?;

    Ok(Json(SuccessResponse {
        success: true,
        data: updated,
    }))
}

async fn delete_course(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(course_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = required_user(user)?;
    let db = require_db(&state)?;
    let course = staff_course(&state, &course_id, &user).await?;

    courses::delete_course(db.pool(), &course.id)
        .await
        .map_err(internal)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: serde_json::json!({ "deleted": true }),
    }))
}

async fn create_module(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(course_id): Path<String>,
    Json(payload): Json<CreateModuleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = required_user(user)?;
    let db = require_db(&state)?;
    let course = staff_course(&state, &course_id, &user).await?;

    if payload.title.trim().is_empty() {
        return Err(AppError::validation("title must not be empty"));
    }

    let module = courses::insert_module(db.pool(), &course.id, payload.title.trim(), payload.position)
        .await
        .map_err(internal)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: module,
    }))
}

async fn update_module(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(module_id): Path<String>,
    Json(payload): Json<CreateModuleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = required_user(user)?;
    let db = require_db(&state)?;
    let module = staff_module(&state, &module_id, &user).await?;

    if payload.title.trim().is_empty() {
        return Err(AppError::validation("title must not be empty"));
    }

    courses::update_module(db.pool(), &module.id, payload.title.trim(), payload.position)
        .await
        .map_err(internal)?;

    let updated = courses::find_module(db.pool(), &module.id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("module does not exist"))?;

    Ok(Json(SuccessResponse {
        success: true,
        data: updated,
    }))
}

async fn delete_module(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(module_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = required_user(user)?;
    let db = require_db(&state)?;
    let module = staff_module(&state, &module_id, &user).await?;

    courses::delete_module(db.pool(), &module.id)
        .await
        .map_err(internal)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: serde_json::json!({ "deleted": true }),
    }))
}

async fn create_lesson(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(module_id): Path<String>,
    Json(payload): Json<CreateLessonRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = required_user(user)?;
    let db = require_db(&state)?;
    let module = staff_module(&state, &module_id, &user).await?;

    if payload.title.trim().is_empty() {
        return Err(AppError::validation("title must not be empty"));
    }

    let lesson = courses::insert_lesson(
        db.pool(),
        &module.id,
        payload.title.trim(),
        &payload.content,
        payload.position,
    )
    .await
    .map_err(internal)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: lesson,
    }))
}

async fn get_lesson(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(lesson_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = required_user(user)?;
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
        let mut conn = db.pool().acquire().await.map_err(internal)?;
        let enrolled = enrollments::find_enrollment(&mut conn, &user.id, &course.id)
            .await
            .map_err(internal)?
            .is_some();
        if !enrolled {
            return Err(AppError::not_enrolled(
                "enroll in the course to read its lessons",
            ));
        }
    }

    Ok(Json(SuccessResponse {
        success: true,
        data: lesson,
    }))
}

async fn update_lesson(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(lesson_id): Path<String>,
    Json(payload): Json<CreateLessonRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = required_user(user)?;
    let db = require_db(&state)?;
    let lesson = staff_lesson(&state, &lesson_id, &user).await?;

    if payload.title.trim().is_empty() {
        return Err(AppError::validation("title must not be empty"));
    }

    courses::update_lesson(
        db.pool(),
        &lesson.id,
        payload.title.trim(),
        &payload.content,
        payload.position,
    )
    .await
    .map_err(internal)?;

    let updated = courses::find_lesson(db.pool(), &lesson.id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("lesson does not exist"))?;

    Ok(Json(SuccessResponse {
        success: true,
        data: updated,
    }))
}

async fn delete_lesson(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(lesson_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = required_user(user)?;
    let db = require_db(&state)?;
    let lesson = staff_lesson(&state, &lesson_id, &user).await?;

    courses::delete_lesson(db.pool(), &lesson.id)
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

fn require_author_role(user: &AuthUser) -> Result<(), AppError> {
    if user.is_instructor() || user.is_admin() {
        Ok(())
    } else {
        Err(AppError::forbidden(
            "only instructors and admins may author courses",
        ))
    }
}

async fn staff_course(
    state: &AppState,
    course_id: &str,
    user: &AuthUser,
) -> Result<CourseRow, AppError> {
    let db = require_db(state)?;

    let course = courses::find_course(db.pool(), course_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("course does not exist"))?;

    if !user.is_course_staff(&course.instructor_id) {
        return Err(AppError::forbidden(
            "only the course instructor or an admin may do this",
        ));
    }

    Ok(course)
}

async fn staff_module(
    state: &AppState,
    module_id: &str,
    user: &AuthUser,
) -> Result<ModuleRow, AppError> {
    let db = require_db(state)?;

    let module = courses::find_module(db.pool(), module_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("module does not exist"))?;

    staff_course(state, &module.course_id, user).await?;

    Ok(module)
}

async fn staff_lesson(
    state: &AppState,
    lesson_id: &str,
    user: &AuthUser,
) -> Result<LessonRow, AppError> {
    let db = require_db(state)?;

    let lesson = courses::find_lesson(db.pool(), lesson_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("lesson does not exist"))?;

    staff_module(state, &lesson.module_id, user).await?;

    Ok(lesson)
}

fn internal(err: sqlx::Error) -> AppError {
    tracing::warn!(error = %err, "courses query failed");
    AppError::internal("internal server error")
}
