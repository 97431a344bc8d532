use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::operations::courses;
use crate::db::operations::quizzes::{self, OptionRow, QuestionRow, QuizRow};
use crate::response::AppError;
use crate::routes::require_db;
use crate::services::quiz::{self, AnswerPayload, QuestionType, QuizError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_quiz))
        .route("/course/:courseId", get(list_course_quizzes))
        .route(
            "/:quizId",
            get(get_quiz).put(update_quiz).delete(delete_quiz),
        )
        .route("/:quizId/questions", post(create_question))
        .route("/questions/:questionId", axum::routing::delete(delete_question))
        .route("/options/:optionId", axum::routing::delete(delete_option))
        .route("/:quizId/attempts", get(list_my_attempts).post(start_attempt))
        .route("/:quizId/attempts/all", get(list_all_attempts))
        .route("/attempts/:attemptId", get(get_attempt))
        .route("/attempts/:attemptId/answers", put(submit_answer))
        .route("/attempts/:attemptId/submit", post(submit_attempt))
}

#[derive(Serialize)]
struct SuccessResponse<T> {
    success: bool,
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateQuizRequest {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    module_id: Option<String>,
    #[serde(default)]
    course_id: Option<String>,
    #[serde(default)]
    lesson_id: Option<String>,
    #[serde(default = "default_passing_score")]
    passing_score: f64,
    #[serde(default)]
    max_attempts: Option<i32>,
    #[serde(default)]
    time_limit: Option<i32>,
    #[serde(default)]
    shuffle_questions: bool,
    #[serde(default)]
    shuffle_options: bool,
}

fn default_passing_score() -> f64 {
    60.0
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateQuizRequest {
    title: String,
    #[serde(default)]
    description: String,
    status: String,
    passing_score: f64,
    #[serde(default)]
    max_attempts: Option<i32>,
    #[serde(default)]
    time_limit: Option<i32>,
    #[serde(default)]
    shuffle_questions: bool,
    #[serde(default)]
    shuffle_options: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOptionRequest {
    text: String,
    #[serde(default)]
    is_correct: bool,
    #[serde(default)]
    position: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateQuestionRequest {
    #[serde(rename = "type")]
    question_type: String,
    text: String,
    #[serde(default = "default_points")]
    points: i32,
    #[serde(default = "default_required")]
    is_required: bool,
    #[serde(default)]
    position: i32,
    #[serde(default)]
    options: Vec<CreateOptionRequest>,
}

fn default_points() -> i32 {
    1
}

fn default_required() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitAnswerRequest {
    question_id: String,
    #[serde(default)]
    selected_option_id: Option<String>,
    #[serde(default)]
    text_answer: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuestionWithOptions {
    #[serde(flatten)]
    question: QuestionRow,
    options: Vec<OptionRow>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuizDetail {
    #[serde(flatten)]
    quiz: QuizRow,
    questions: Option<Vec<QuestionWithOptions>>,
}

async fn create_quiz(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    if payload.title.trim().is_empty() {
        return Err(AppError::validation("title must not be empty"));
    }
    if !(0.0..=100.0).contains(&payload.passing_score) {
        return Err(AppError::validation("passingScore must be between 0 and 100"));
    }

    // Resolve the owning course up front and gate on its staff.
    let course_id = match (&payload.module_id, &payload.course_id) {
        (Some(module_id), _) => {
            let module = courses::find_module(db.pool(), module_id)
                .await
                .map_err(internal)?
                .ok_or_else(|| AppError::not_found("module does not exist"))?;
            module.course_id
        }
        (None, Some(course_id)) => course_id.clone(),
        (None, None) => {
            return Err(AppError::validation(
                "a quiz must be attached to a module or a course",
            ))
        }
    };

    let course = courses::find_course(db.pool(), &course_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("course does not exist"))?;

    if !user.is_course_staff(&course.instructor_id) {
        return Err(AppError::forbidden(
            "only the course instructor or an admin may author quizzes",
        ));
    }

    if let Some(lesson_id) = &payload.lesson_id {
        let lesson = courses::find_lesson(db.pool(), lesson_id)
            .await
            .map_err(internal)?
            .ok_or_else(|| AppError::not_found("lesson does not exist"))?;
        if Some(&lesson.module_id) != payload.module_id.as_ref() {
            return Err(AppError::validation(
                "lessonId must belong to the quiz's module",
            ));
        }
    }

    let quiz = quizzes::insert_quiz(
        db.pool(),
        payload.title.trim(),
        &payload.description,
        payload.module_id.as_deref(),
        payload.course_id.as_deref(),
        payload.lesson_id.as_deref(),
        payload.passing_score,
        payload.max_attempts,
        payload.time_limit,
        payload.shuffle_questions,
        payload.shuffle_options,
    )
    .await
    .map_err(internal)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: quiz,
    }))
}

async fn list_course_quizzes(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(course_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    let course = courses::find_course(db.pool(), &course_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("course does not exist"))?;

    let mut quizzes = quizzes::list_quizzes_for_course(db.pool(), &course_id)
        .await
        .map_err(internal)?;

    // Learners only see published quizzes.
    if !user.is_course_staff(&course.instructor_id) {
        quizzes.retain(|quiz| quiz.status == "published");
    }

    Ok(Json(SuccessResponse {
        success: true,
        data: quizzes,
    }))
}

async fn get_quiz(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    let quiz_row = quizzes::find_quiz(db.pool(), &quiz_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("quiz does not exist"))?;

    let is_staff = quiz::ensure_quiz_staff(db.as_ref(), &user, &quiz_id)
        .await
        .is_ok();

    if !is_staff && quiz_row.status != "published" {
        return Err(AppError::not_found("quiz does not exist"));
    }

    // Staff get the full question set including answer keys; learners get
    // quiz metadata only and receive questions when they start an attempt.
    let questions = if is_staff {
        let question_rows = quizzes::list_questions(db.pool(), &quiz_id)
            .await
            .map_err(internal)?;
        let option_rows = quizzes::list_options_for_quiz(db.pool(), &quiz_id)
            .await
            .map_err(internal)?;

        Some(
            question_rows
                .into_iter()
                .map(|question| {
                    let options = option_rows
                        .iter()
                        .filter(|option| option.question_id == question.id)
                        .cloned()
                        .collect();
                    QuestionWithOptions { question, options }
                })
                .collect(),
        )
    } else {
        None
    };

    Ok(Json(SuccessResponse {
        success: true,
        data: QuizDetail {
            quiz: quiz_row,
            questions,
        },
    }))
}

async fn update_quiz(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(quiz_id): Path<String>,
    Json(payload): Json<UpdateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    quiz::ensure_quiz_staff(db.as_ref(), &user, &quiz_id)
        .await
        .map_err(map_quiz_error)?;

    if payload.title.trim().is_empty() {
        return Err(AppError::validation("title must not be empty"));
    }
    if !matches!(payload.status.as_str(), "draft" | "published" | "archived") {
        return Err(AppError::validation("invalid quiz status"));
    }
    if !(0.0..=100.0).contains(&payload.passing_score) {
        return Err(AppError::validation("passingScore must be between 0 and 100"));
    }

    quizzes::update_quiz(
        db.pool(),
        &quiz_id,
        payload.title.trim(),
        &payload.description,
        &payload.status,
        payload.passing_score,
        payload.max_attempts,
        payload.time_limit,
        payload.shuffle_questions,
        payload.shuffle_options,
    )
    .await
    .map_err(internal)?;

    let updated = quizzes::find_quiz(db.pool(), &quiz_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("quiz does not exist"))?;

    Ok(Json(SuccessResponse {
        success: true,
        data: updated,
    }))
}

async fn delete_quiz(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    quiz::ensure_quiz_staff(db.as_ref(), &user, &quiz_id)
        .await
        .map_err(map_quiz_error)?;

    quizzes::delete_quiz(db.pool(), &quiz_id)
        .await
        .map_err(internal)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: serde_json::json!({ "deleted": true }),
    }))
}

async fn create_question(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(quiz_id): Path<String>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    quiz::ensure_quiz_staff(db.as_ref(), &user, &quiz_id)
        .await
        .map_err(map_quiz_error)?;

    let question_type = QuestionType::parse(&payload.question_type)
        .ok_or_else(|| AppError::validation("invalid question type"))?;

    if payload.text.trim().is_empty() {
        return Err(AppError::validation("question text must not be empty"));
    }
    if payload.points < 1 {
        return Err(AppError::validation("points must be at least 1"));
    }

    match question_type {
        QuestionType::MultipleChoice | QuestionType::TrueFalse => {
            if payload.options.len() < 2 {
                return Err(AppError::validation(
                    "choice questions need at least two options",
                ));
            }
            if !payload.options.iter().any(|option| option.is_correct) {
                return Err(AppError::validation(
                    "choice questions need a correct option",
                ));
            }
        }
        QuestionType::ShortAnswer => {
            if !payload.options.iter().any(|option| option.is_correct) {
                return Err(AppError::validation(
                    "short answer questions need at least one accepted answer",
                ));
            }
        }
        QuestionType::Essay => {}
    }

    let question = quizzes::insert_question(
        db.pool(),
        &quiz_id,
        question_type.as_str(),
        payload.text.trim(),
        payload.points,
        payload.is_required,
        payload.position,
    )
    .await
    .map_err(internal)?;

    let mut options = Vec::with_capacity(payload.options.len());
    for option in &payload.options {
        let row = quizzes::insert_option(
            db.pool(),
            &question.id,
            option.text.trim(),
            option.is_correct,
            option.position,
        )
        .await
        .map_err(internal)?;
        options.push(row);
    }

    Ok(Json(SuccessResponse {
        success: true,
        data: QuestionWithOptions { question, options },
    }))
}

async fn delete_question(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(question_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    let question = quizzes::find_question(db.pool(), &question_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("question does not exist"))?;

    quiz::ensure_quiz_staff(db.as_ref(), &user, &question.quiz_id)
        .await
        .map_err(map_quiz_error)?;

    quizzes::delete_question(db.pool(), &question_id)
        .await
        .map_err(internal)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: serde_json::json!({ "deleted": true }),
    }))
}

async fn delete_option(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(option_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    let option_row = quizzes::find_option(db.pool(), &option_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("option does not exist"))?;

    let question = quizzes::find_question(db.pool(), &option_row.question_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::not_found("question does not exist"))?;

    quiz::ensure_quiz_staff(db.as_ref(), &user, &question.quiz_id)
        .await
        .map_err(map_quiz_error)?;

    quizzes::delete_option(db.pool(), &option_id)
        .await
        .map_err(internal)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: serde_json::json!({ "deleted": true }),
    }))
}

async fn start_attempt(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    let started = quiz::start_attempt(db.as_ref(), &user, &quiz_id)
        .await
        .map_err(map_quiz_error)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: started,
    }))
}

async fn list_my_attempts(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    let attempts = quiz::list_user_attempts(db.as_ref(), &user, &quiz_id)
        .await
        .map_err(map_quiz_error)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: attempts,
    }))
}

async fn list_all_attempts(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    let attempts = quiz::list_quiz_attempts(db.as_ref(), &user, &quiz_id)
        .await
        .map_err(map_quiz_error)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: attempts,
    }))
}

async fn get_attempt(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(attempt_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    let attempt = quiz::get_attempt(db.as_ref(), &user, &attempt_id)
        .await
        .map_err(map_quiz_error)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: attempt,
    }))
}

async fn submit_answer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(attempt_id): Path<String>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let db = require_db(&state)?;

    let answer = quiz::submit_answer(
        db.as_ref(),
        &user,
        &attempt_id,
        &payload.question_id,
        AnswerPayload {
            selected_option_id: payload.selected_option_id,
            text_answer: payload.text_answer,
        },
    )
    .await
    .map_err(map_quiz_error)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: answer,
    }))
}

async fn submit_attempt(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(attempt_id): Path<String>,
) -> Result<Response, AppError> {
    let db = require_db(&state)?;

    match quiz::submit_attempt(db.as_ref(), &user, &attempt_id).await {
        Ok(result) => Ok(Json(SuccessResponse {
            success: true,
            data: result,
        })
        .into_response()),
        Err(QuizError::IncompleteRequiredAnswers(missing)) => Ok((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "success": false,
                "error": "required questions are unanswered",
                "code": "INCOMPLETE_REQUIRED_ANSWERS",
                "missingQuestionIds": missing,
            })),
        )
            .into_response()),
        Err(err) => Err(map_quiz_error(err)),
    }
}

fn map_quiz_error(err: QuizError) -> AppError {
    match err {
        QuizError::NotFound(message) => AppError::not_found(message),
        QuizError::NotEnrolled(message) => AppError::not_enrolled(message),
        QuizError::Forbidden(message) => AppError::forbidden(message),
        QuizError::MaxAttemptsReached => {
            AppError::conflict("maximum number of attempts reached for this quiz")
        }
        QuizError::AttemptInProgress => {
            AppError::conflict("an attempt for this quiz is already in progress")
        }
        QuizError::AttemptAlreadyFinalized => crate::response::json_error(
            StatusCode::CONFLICT,
            "ATTEMPT_FINALIZED",
            "this attempt has already been finalized",
        ),
        QuizError::QuestionNotInQuiz => crate::response::json_error(
            StatusCode::BAD_REQUEST,
            "QUESTION_NOT_IN_QUIZ",
            "question does not belong to this quiz",
        ),
        QuizError::IncompleteRequiredAnswers(missing) => crate::response::json_error(
            StatusCode::BAD_REQUEST,
            "INCOMPLETE_REQUIRED_ANSWERS",
            format!("required questions are unanswered: {}", missing.join(", ")),
        ),
        QuizError::Validation(message) => AppError::validation(message),
        QuizError::Sql(err) => {
            tracing::warn!(error = %err, "quiz query failed");
            AppError::internal("internal server error")
        }
        QuizError::Progress(err) => {
            tracing::warn!(error = %err, "quiz progress propagation failed");
            AppError::internal("internal server error")
        }
    }
}

fn internal(err: sqlx::Error) -> AppError {
    tracing::warn!(error = %err, "quiz query failed");
    AppError::internal("internal server error")
}
