use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::Serialize;

use crate::auth::AuthUser;
use crate::db::operations::attempts::{self, AnswerRow, AttemptRow};
use crate::db::operations::courses;
use crate::db::operations::enrollments;
use crate::db::operations::quizzes::{self, OptionRow, QuestionRow, QuizOwner, QuizRow};
use crate::db::Database;
use crate::services::progress::{self, LessonProgressPatch, ProgressError, ProgressStatus};

pub const STATUS_IN_PROGRESS: &str = "in_progress";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
    Essay,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::TrueFalse => "true_false",
            QuestionType::ShortAnswer => "short_answer",
            QuestionType::Essay => "essay",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "multiple_choice" => Some(QuestionType::MultipleChoice),
            "true_false" => Some(QuestionType::TrueFalse),
            "short_answer" => Some(QuestionType::ShortAnswer),
            "essay" => Some(QuestionType::Essay),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QuizError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not enrolled: {0}")]
    NotEnrolled(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("max attempts reached")]
    MaxAttemptsReached,
    #[error("an attempt is already in progress")]
    AttemptInProgress,
    #[error("attempt already finalized")]
    AttemptAlreadyFinalized,
    #[error("question does not belong to this quiz")]
    QuestionNotInQuiz,
    #[error("required questions unanswered")]
    IncompleteRequiredAnswers(Vec<String>),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),
    #[error(transparent)]
    Progress(#[from] ProgressError),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionView {
    pub id: String,
    pub text: String,
    pub position: i32,
}

/// Question as handed to a learner: correctness flags stripped.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub id: String,
    #[serde(rename = "type")]
    pub question_type: String,
    pub text: String,
    pub points: i32,
    pub is_required: bool,
    pub options: Vec<OptionView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizMeta {
    pub id: String,
    pub title: String,
    pub description: String,
    pub passing_score: f64,
    pub max_attempts: Option<i32>,
    pub time_limit: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedAttempt {
    pub attempt: AttemptRow,
    pub quiz: QuizMeta,
    pub questions: Vec<QuestionView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptWithAnswers {
    pub attempt: AttemptRow,
    pub answers: Vec<AnswerRow>,
}

#[derive(Debug, Clone, Default)]
pub struct AnswerPayload {
    pub selected_option_id: Option<String>,
    pub text_answer: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradedAnswer {
    pub is_correct: Option<bool>,
    pub score: Option<f64>,
}

pub fn grade_selected_option(option_is_correct: bool, points: i32) -> GradedAnswer {
    GradedAnswer {
        is_correct: Some(option_is_correct),
        score: Some(if option_is_correct {
            f64::from(points)
        } else {
            0.0
        }),
    }
}

/// Case-insensitive exact match against any option flagged correct.
pub fn short_answer_matches(correct_texts: &[String], answer: &str) -> bool {
    let normalized = answer.trim().to_lowercase();
    correct_texts
        .iter()
        .any(|text| text.trim().to_lowercase() == normalized)
}

pub fn score_percentage(earned_points: f64, total_points: f64) -> f64 {
    if total_points > 0.0 {
        100.0 * earned_points / total_points
    } else {
        0.0
    }
}

pub fn missing_required_questions(
    questions: &[QuestionRow],
    answered_question_ids: &[String],
) -> Vec<String> {
    questions
        .iter()
        .filter(|question| question.is_required)
        .filter(|question| !answered_question_ids.contains(&question.id))
        .map(|question| question.id.clone())
        .collect()
}

/// Starts a new attempt: published quiz, enrolled caller (course staff are
/// exempt), no attempt currently open, attempt count under the cap. The
/// returned question set has correctness stripped and is shuffled when the
/// quiz asks for it.
pub async fn start_attempt(
    db: &Database,
    user: &AuthUser,
    quiz_id: &str,
) -> Result<StartedAttempt, QuizError> {
    let quiz = quizzes::find_quiz(db.pool(), quiz_id)
        .await?
        .ok_or_else(|| QuizError::NotFound("quiz does not exist".to_string()))?;

    if quiz.status != "published" {
        return Err(QuizError::NotFound("quiz is not available".to_string()));
    }

    let questions = quizzes::list_questions(db.pool(), quiz_id).await?;
    let options = quizzes::list_options_for_quiz(db.pool(), quiz_id).await?;
    let max_score: f64 = questions.iter().map(|q| f64::from(q.points)).sum();

    let mut tx = db.pool().begin().await?;

    let owner = quizzes::resolve_owner(&mut tx, &quiz).await?;
    authorize_attempt(&mut tx, user, owner.as_ref()).await?;

    if attempts::find_in_progress_attempt(&mut tx, quiz_id, &user.id)
        .await?
        .is_some()
    {
        return Err(QuizError::AttemptInProgress);
    }

    if let Some(max_attempts) = quiz.max_attempts {
        let prior = attempts::count_attempts(&mut tx, quiz_id, &user.id).await?;
        if prior >= i64::from(max_attempts) {
            return Err(QuizError::MaxAttemptsReached);
        }
    }

    let attempt_number = attempts::next_attempt_number(&mut tx, quiz_id, &user.id).await?;
    let attempt =
        attempts::insert_attempt(&mut tx, quiz_id, &user.id, attempt_number, max_score).await?;

    tx.commit().await?;

    let questions = build_question_views(&quiz, questions, options);

    Ok(StartedAttempt {
        attempt,
        quiz: QuizMeta {
            id: quiz.id,
            title: quiz.title,
            description: quiz.description,
            passing_score: quiz.passing_score,
            max_attempts: quiz.max_attempts,
            time_limit: quiz.time_limit,
        },
        questions,
    })
}

async fn authorize_attempt(
    conn: &mut sqlx::PgConnection,
    user: &AuthUser,
    owner: Option<&QuizOwner>,
) -> Result<(), QuizError> {
    if user.is_admin() {
        return Ok(());
    }

    let Some(owner) = owner else {
        return Err(QuizError::NotEnrolled(
            "quiz is not attached to any course".to_string(),
        ));
    };

    let course_id = owner.course_id();

    if let Some(instructor_id) = courses::course_instructor_id(conn, course_id).await? {
        if instructor_id == user.id {
            return Ok(());
        }
    }

    if enrollments::find_enrollment(conn, &user.id, course_id)
        .await?
        .is_none()
    {
        return Err(QuizError::NotEnrolled(
            "user is not enrolled in the course this quiz belongs to".to_string(),
        ));
    }

    Ok(())
}

fn build_question_views(
    quiz: &QuizRow,
    questions: Vec<QuestionRow>,
    options: Vec<OptionRow>,
) -> Vec<QuestionView> {
    let mut views: Vec<QuestionView> = questions
        .into_iter()
        .map(|question| {
            let mut question_options: Vec<OptionView> = options
                .iter()
                .filter(|option| option.question_id == question.id)
                .map(|option| OptionView {
                    id: option.id.clone(),
                    text: option.text.clone(),
                    position: option.position,
                })
                .collect();

            if quiz.shuffle_options {
                question_options.shuffle(&mut rand::rng());
            }

            QuestionView {
                id: question.id,
                question_type: question.question_type,
                text: question.text,
                points: question.points,
                is_required: question.is_required,
                options: question_options,
            }
        })
        .collect();

    if quiz.shuffle_questions {
        views.shuffle(&mut rand::rng());
    }

    views
}

/// Records (or overwrites) the caller's answer to one question of an open
/// attempt. Graded immediately for everything except essays.
pub async fn submit_answer(
    db: &Database,
    user: &AuthUser,
    attempt_id: &str,
    question_id: &str,
    payload: AnswerPayload,
) -> Result<AnswerRow, QuizError> {
    let attempt = attempts::find_attempt(db.pool(), attempt_id)
        .await?
        .ok_or_else(|| QuizError::NotFound("attempt does not exist".to_string()))?;

    if attempt.user_id != user.id {
        return Err(QuizError::Forbidden(
            "attempt belongs to another user".to_string(),
        ));
    }

    if attempt.status != STATUS_IN_PROGRESS {
        return Err(QuizError::AttemptAlreadyFinalized);
    }

    let question = quizzes::find_question(db.pool(), question_id)
        .await?
        .ok_or_else(|| QuizError::NotFound("question does not exist".to_string()))?;

    if question.quiz_id != attempt.quiz_id {
        return Err(QuizError::QuestionNotInQuiz);
    }

    let question_type = QuestionType::parse(&question.question_type).ok_or_else(|| {
        QuizError::Validation(format!(
            "unknown question type: {}",
            question.question_type
        ))
    })?;

    let (selected_option_id, text_answer, graded) = match question_type {
        QuestionType::MultipleChoice | QuestionType::TrueFalse => {
            let option_id = payload.selected_option_id.as_deref().ok_or_else(|| {
                QuizError::Validation("selectedOptionId is required for this question".to_string())
            })?;

            let options = quizzes::list_options_for_question(db.pool(), question_id).await?;
            let option = options
                .iter()
                .find(|option| option.id == option_id)
                .ok_or_else(|| {
                    QuizError::Validation(
                        "selected option does not belong to this question".to_string(),
                    )
                })?;

            (
                Some(option.id.clone()),
                None,
                grade_selected_option(option.is_correct, question.points),
            )
        }
        QuestionType::ShortAnswer => {
            let answer = payload.text_answer.as_deref().ok_or_else(|| {
                QuizError::Validation("textAnswer is required for this question".to_string())
            })?;

            let options = quizzes::list_options_for_question(db.pool(), question_id).await?;
            let correct_texts: Vec<String> = options
                .into_iter()
                .filter(|option| option.is_correct)
                .map(|option| option.text)
                .collect();

            let is_correct = short_answer_matches(&correct_texts, answer);

            (
                None,
                Some(answer.to_string()),
                grade_selected_option(is_correct, question.points),
            )
        }
        QuestionType::Essay => {
            let answer = payload.text_answer.as_deref().ok_or_else(|| {
                QuizError::Validation("textAnswer is required for this question".to_string())
            })?;

            // Essays are graded out of band.
            (
                None,
                Some(answer.to_string()),
                GradedAnswer {
                    is_correct: None,
                    score: None,
                },
            )
        }
    };

    let answer = attempts::upsert_answer(
        db.pool(),
        attempt_id,
        question_id,
        selected_option_id.as_deref(),
        text_answer.as_deref(),
        graded.is_correct,
        graded.score,
    )
    .await?;

    Ok(answer)
}

/// Finalizes an open attempt: gates on unanswered required questions, scores
/// it against the quiz's live question set, and — for lesson-bound quizzes —
/// pushes the result into the lesson progress rollup chain, all in one
/// transaction.
pub async fn submit_attempt(
    db: &Database,
    user: &AuthUser,
    attempt_id: &str,
) -> Result<AttemptWithAnswers, QuizError> {
    let attempt = attempts::find_attempt(db.pool(), attempt_id)
        .await?
        .ok_or_else(|| QuizError::NotFound("attempt does not exist".to_string()))?;

    if attempt.user_id != user.id {
        return Err(QuizError::Forbidden(
            "attempt belongs to another user".to_string(),
        ));
    }

    if attempt.status != STATUS_IN_PROGRESS {
        return Err(QuizError::AttemptAlreadyFinalized);
    }

    let quiz = quizzes::find_quiz(db.pool(), &attempt.quiz_id)
        .await?
        .ok_or_else(|| QuizError::NotFound("quiz does not exist".to_string()))?;

    let questions = quizzes::list_questions(db.pool(), &attempt.quiz_id).await?;

    let mut tx = db.pool().begin().await?;

    let answers = attempts::list_answers(&mut tx, attempt_id).await?;
    let answered_ids: Vec<String> = answers
        .iter()
        .map(|answer| answer.question_id.clone())
        .collect();

    let missing = missing_required_questions(&questions, &answered_ids);
    if !missing.is_empty() {
        return Err(QuizError::IncompleteRequiredAnswers(missing));
    }

    let total_points: f64 = questions.iter().map(|q| f64::from(q.points)).sum();
    let earned_points: f64 = answers.iter().map(|a| a.score.unwrap_or(0.0)).sum();
    let percentage = score_percentage(earned_points, total_points);
    let is_passed = percentage >= quiz.passing_score;

    let end_time = Utc::now();
    let start_time = DateTime::parse_from_rfc3339(&attempt.start_time)
        .map(|value| value.with_timezone(&Utc))
        .unwrap_or(end_time);
    let time_spent = (end_time - start_time).num_seconds().max(0) as i32;

    attempts::finalize_attempt(
        &mut tx,
        attempt_id,
        percentage,
        total_points,
        is_passed,
        end_time.naive_utc(),
        time_spent,
    )
    .await?;

    // A lesson-bound quiz feeds the lesson progress chain: pass completes
    // the lesson, fail marks it in progress. A lesson the learner already
    // completed is never regressed.
    if let Some(lesson_id) = &quiz.lesson_id {
        if let Some(ctx) = courses::find_lesson_context(&mut tx, lesson_id).await? {
            let current =
                crate::db::operations::progress::ensure_lesson_progress(&mut tx, &user.id, lesson_id)
                    .await?;

            if current.status != ProgressStatus::Completed.as_str() {
                let desired = if is_passed {
                    ProgressStatus::Completed
                } else {
                    ProgressStatus::InProgress
                };

                progress::apply_lesson_patch(
                    &mut tx,
                    &user.id,
                    &ctx,
                    &LessonProgressPatch {
                        status: Some(desired),
                        time_spent_delta: None,
                    },
                )
                .await?;
            }
        }
    }

    let finalized = attempts::find_attempt_tx(&mut tx, attempt_id)
        .await?
        .ok_or_else(|| QuizError::NotFound("attempt does not exist".to_string()))?;
    let answers = attempts::list_answers(&mut tx, attempt_id).await?;

    tx.commit().await?;

    Ok(AttemptWithAnswers {
        attempt: finalized,
        answers,
    })
}

/// Read path: the attempt's owner, the owning course's instructor, and
/// admins may look.
pub async fn get_attempt(
    db: &Database,
    user: &AuthUser,
    attempt_id: &str,
) -> Result<AttemptWithAnswers, QuizError> {
    let attempt = attempts::find_attempt(db.pool(), attempt_id)
        .await?
        .ok_or_else(|| QuizError::NotFound("attempt does not exist".to_string()))?;

    if attempt.user_id != user.id {
        ensure_quiz_staff(db, user, &attempt.quiz_id).await?;
    }

    let answers = attempts::list_answers_pool(db.pool(), attempt_id).await?;

    Ok(AttemptWithAnswers { attempt, answers })
}

pub async fn list_user_attempts(
    db: &Database,
    user: &AuthUser,
    quiz_id: &str,
) -> Result<Vec<AttemptRow>, QuizError> {
    quizzes::find_quiz(db.pool(), quiz_id)
        .await?
        .ok_or_else(|| QuizError::NotFound("quiz does not exist".to_string()))?;

    Ok(attempts::list_attempts_for_user(db.pool(), quiz_id, &user.id).await?)
}

pub async fn list_quiz_attempts(
    db: &Database,
    user: &AuthUser,
    quiz_id: &str,
) -> Result<Vec<AttemptRow>, QuizError> {
    ensure_quiz_staff(db, user, quiz_id).await?;
    Ok(attempts::list_attempts_for_quiz(db.pool(), quiz_id).await?)
}

pub async fn ensure_quiz_staff(
    db: &Database,
    user: &AuthUser,
    quiz_id: &str,
) -> Result<(), QuizError> {
    if user.is_admin() {
        return Ok(());
    }

    let quiz = quizzes::find_quiz(db.pool(), quiz_id)
        .await?
        .ok_or_else(|| QuizError::NotFound("quiz does not exist".to_string()))?;

    let mut conn = db.pool().acquire().await?;
    let owner = quizzes::resolve_owner(&mut conn, &quiz).await?;

    if let Some(owner) = owner {
        if let Some(instructor_id) =
            courses::course_instructor_id(&mut conn, owner.course_id()).await?
        {
            if instructor_id == user.id {
                return Ok(());
            }
        }
    }

    Err(QuizError::Forbidden(
        "only the course instructor or an admin may access this".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: &str, points: i32, required: bool) -> QuestionRow {
        QuestionRow {
            id: id.to_string(),
            quiz_id: "quiz-1".to_string(),
            question_type: "multiple_choice".to_string(),
            text: String::new(),
            points,
            is_required: required,
            position: 0,
        }
    }

    #[test]
    fn scoring_example_from_dashboard() {
        // Points [1,1,2], answer scores [1,0,2] => 75%.
        let earned = 1.0 + 0.0 + 2.0;
        let total = 1.0 + 1.0 + 2.0;
        assert_eq!(score_percentage(earned, total), 75.0);
    }

    #[test]
    fn score_percentage_zero_total() {
        assert_eq!(score_percentage(0.0, 0.0), 0.0);
    }

    #[test]
    fn pass_threshold_is_inclusive() {
        let pct = score_percentage(6.0, 10.0);
        assert!(pct >= 60.0);
        assert!(!(score_percentage(5.0, 10.0) >= 60.0));
    }

    #[test]
    fn grading_selected_options() {
        assert_eq!(
            grade_selected_option(true, 3),
            GradedAnswer {
                is_correct: Some(true),
                score: Some(3.0),
            }
        );
        assert_eq!(
            grade_selected_option(false, 3),
            GradedAnswer {
                is_correct: Some(false),
                score: Some(0.0),
            }
        );
    }

    #[test]
    fn short_answer_match_is_case_insensitive() {
        let correct = vec!["Paris".to_string(), "city of light".to_string()];
        assert!(short_answer_matches(&correct, "paris"));
        assert!(short_answer_matches(&correct, "  PARIS  "));
        assert!(short_answer_matches(&correct, "City Of Light"));
        assert!(!short_answer_matches(&correct, "pariss"));
        assert!(!short_answer_matches(&correct, ""));
    }

    #[test]
    fn missing_required_lists_only_unanswered_required() {
        let questions = vec![
            question("q1", 1, true),
            question("q2", 1, false),
            question("q3", 2, true),
        ];
        let answered = vec!["q1".to_string()];

        let missing = missing_required_questions(&questions, &answered);
        assert_eq!(missing, vec!["q3".to_string()]);

        let all_answered = vec!["q1".to_string(), "q3".to_string()];
        assert!(missing_required_questions(&questions, &all_answered).is_empty());
    }

    #[test]
    fn question_type_round_trip() {
        for question_type in [
            QuestionType::MultipleChoice,
            QuestionType::TrueFalse,
            QuestionType::ShortAnswer,
            QuestionType::Essay,
        ] {
            assert_eq!(
                QuestionType::parse(question_type.as_str()),
                Some(question_type)
            );
        }
        assert_eq!(QuestionType::parse("matching"), None);
    }
}
