use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::auth::format_naive_datetime_iso_millis;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub module_id: Option<String>,
    pub course_id: Option<String>,
    pub lesson_id: Option<String>,
    pub status: String,
    pub passing_score: f64,
    pub max_attempts: Option<i32>,
    pub time_limit: Option<i32>,
    pub shuffle_questions: bool,
    pub shuffle_options: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Placement of a quiz in the catalog, resolved once at load time instead of
/// re-checking the nullable foreign keys at every call site. A quiz with
/// neither association is unreachable for learners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizOwner {
    ModuleLesson {
        module_id: String,
        course_id: String,
    },
    DirectCourse {
        course_id: String,
    },
}

impl QuizOwner {
    pub fn course_id(&self) -> &str {
        match self {
            QuizOwner::ModuleLesson { course_id, .. } => course_id,
            QuizOwner::DirectCourse { course_id } => course_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRow {
    pub id: String,
    pub quiz_id: String,
    #[serde(rename = "type")]
    pub question_type: String,
    pub text: String,
    pub points: i32,
    pub is_required: bool,
    pub position: i32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionRow {
    pub id: String,
    pub question_id: String,
    pub text: String,
    pub is_correct: bool,
    pub position: i32,
}

fn map_quiz_row(row: &sqlx::postgres::PgRow) -> Result<QuizRow, sqlx::Error> {
    let created_at: NaiveDateTime = row.try_get("createdAt")?;
    let updated_at: NaiveDateTime = row.try_get("updatedAt")?;

    Ok(QuizRow {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        module_id: row.try_get("moduleId")?,
        course_id: row.try_get("courseId")?,
        lesson_id: row.try_get("lessonId")?,
        status: row.try_get("status")?,
        passing_score: row.try_get("passingScore")?,
        max_attempts: row.try_get("maxAttempts")?,
        time_limit: row.try_get("timeLimit")?,
        shuffle_questions: row.try_get("shuffleQuestions")?,
        shuffle_options: row.try_get("shuffleOptions")?,
        created_at: format_naive_datetime_iso_millis(created_at),
        updated_at: format_naive_datetime_iso_millis(updated_at),
    })
}

fn map_question_row(row: &sqlx::postgres::PgRow) -> Result<QuestionRow, sqlx::Error> {
    Ok(QuestionRow {
        id: row.try_get("id")?,
        quiz_id: row.try_get("quizId")?,
        question_type: row.try_get("type")?,
        text: row.try_get("text")?,
        points: row.try_get("points")?,
        is_required: row.try_get("isRequired")?,
        position: row.try_get("position")?,
    })
}

fn map_option_row(row: &sqlx::postgres::PgRow) -> Result<OptionRow, sqlx::Error> {
    Ok(OptionRow {
        id: row.try_get("id")?,
        question_id: row.try_get("questionId")?,
        text: row.try_get("text")?,
        is_correct: row.try_get("isCorrect")?,
        position: row.try_get("position")?,
    })
}

pub async fn find_quiz(pool: &PgPool, id: &str) -> Result<Option<QuizRow>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT * FROM "quizzes" WHERE "id" = $1 LIMIT 1"#)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(map_quiz_row).transpose()
}

pub async fn resolve_owner(
    conn: &mut PgConnection,
    quiz: &QuizRow,
) -> Result<Option<QuizOwner>, sqlx::Error> {
    if let Some(module_id) = &quiz.module_id {
        let course_id: Option<String> =
            sqlx::query_scalar(r#"SELECT "courseId" FROM "modules" WHERE "id" = $1"#)
                .bind(module_id)
                .fetch_optional(&mut *conn)
                .await?;

        return Ok(course_id.map(|course_id| QuizOwner::ModuleLesson {
            module_id: module_id.clone(),
            course_id,
        }));
    }

    if let Some(course_id) = &quiz.course_id {
        return Ok(Some(QuizOwner::DirectCourse {
            course_id: course_id.clone(),
        }));
    }

    Ok(None)
}

pub async fn list_quizzes_for_course(
    pool: &PgPool,
    course_id: &str,
) -> Result<Vec<QuizRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT q.*
        FROM "quizzes" q
        LEFT JOIN "modules" m ON m."id" = q."moduleId"
        WHERE q."courseId" = $1 OR m."courseId" = $1
        ORDER BY q."createdAt" ASC
        "#,
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(map_quiz_row).collect()
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_quiz(
    pool: &PgPool,
    title: &str,
    description: &str,
    module_id: Option<&str>,
    course_id: Option<&str>,
    lesson_id: Option<&str>,
    passing_score: f64,
    max_attempts: Option<i32>,
    time_limit: Option<i32>,
    shuffle_questions: bool,
    shuffle_options: bool,
) -> Result<QuizRow, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().naive_utc();

    sqlx::query(
        r#"
        INSERT INTO "quizzes"
          ("id", "title", "description", "moduleId", "courseId", "lessonId", "passingScore",
           "maxAttempts", "timeLimit", "shuffleQuestions", "shuffleOptions", "createdAt", "updatedAt")
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
        "#,
    )
    .bind(&id)
    .bind(title)
    .bind(description)
    .bind(module_id)
    .bind(course_id)
    .bind(lesson_id)
    .bind(passing_score)
    .bind(max_attempts)
    .bind(time_limit)
    .bind(shuffle_questions)
    .bind(shuffle_options)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(QuizRow {
        id,
        title: title.to_string(),
        description: description.to_string(),
        module_id: module_id.map(str::to_string),
        course_id: course_id.map(str::to_string),
        lesson_id: lesson_id.map(str::to_string),
        status: "draft".to_string(),
        passing_score,
        max_attempts,
        time_limit,
        shuffle_questions,
        shuffle_options,
        created_at: format_naive_datetime_iso_millis(now),
        updated_at: format_naive_datetime_iso_millis(now),
    })
}

#[allow(clippy::too_many_arguments)]
pub async fn update_quiz(
    pool: &PgPool,
    id: &str,
    title: &str,
    description: &str,
    status: &str,
    passing_score: f64,
    max_attempts: Option<i32>,
    time_limit: Option<i32>,
    shuffle_questions: bool,
    shuffle_options: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE "quizzes"
        SET "title" = $2, "description" = $3, "status" = $4, "passingScore" = $5,
            "maxAttempts" = $6, "timeLimit" = $7, "shuffleQuestions" = $8,
            "shuffleOptions" = $9, "updatedAt" = $10
        WHERE "id" = $1
        "#,
    )
    .bind(id)
    .bind(title)
    .bind(description)
    .bind(status)
    .bind(passing_score)
    .bind(max_attempts)
    .bind(time_limit)
    .bind(shuffle_questions)
    .bind(shuffle_options)
    .bind(Utc::now().naive_utc())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_quiz(pool: &PgPool, id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(r#"DELETE FROM "quizzes" WHERE "id" = $1"#)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn find_question(
    pool: &PgPool,
    id: &str,
) -> Result<Option<QuestionRow>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT * FROM "questions" WHERE "id" = $1 LIMIT 1"#)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(map_question_row).transpose()
}

pub async fn list_questions(pool: &PgPool, quiz_id: &str) -> Result<Vec<QuestionRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT * FROM "questions" WHERE "quizId" = $1 ORDER BY "position" ASC"#,
    )
    .bind(quiz_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(map_question_row).collect()
}

pub async fn list_options_for_question(
    pool: &PgPool,
    question_id: &str,
) -> Result<Vec<OptionRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT * FROM "options" WHERE "questionId" = $1 ORDER BY "position" ASC"#,
    )
    .bind(question_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(map_option_row).collect()
}

pub async fn list_options_for_quiz(
    pool: &PgPool,
    quiz_id: &str,
) -> Result<Vec<OptionRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT o.*
        FROM "options" o
        JOIN "questions" q ON q."id" = o."questionId"
        WHERE q."quizId" = $1
        ORDER BY o."position" ASC
        "#,
    )
    .bind(quiz_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(map_option_row).collect()
}

pub async fn insert_question(
    pool: &PgPool,
    quiz_id: &str,
    question_type: &str,
    text: &str,
    points: i32,
    is_required: bool,
    position: i32,
) -> Result<QuestionRow, sqlx::Error> {
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO "questions" ("id", "quizId", "type", "text", "points", "isRequired", "position")
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(&id)
    .bind(quiz_id)
    .bind(question_type)
    .bind(text)
    .bind(points)
    .bind(is_required)
    .bind(position)
    .execute(pool)
    .await?;

    Ok(QuestionRow {
        id,
        quiz_id: quiz_id.to_string(),
        question_type: question_type.to_string(),
        text: text.to_string(),
        points,
        is_required,
        position,
    })
}

pub async fn delete_question(pool: &PgPool, id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(r#"DELETE FROM "questions" WHERE "id" = $1"#)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn find_option(pool: &PgPool, id: &str) -> Result<Option<OptionRow>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT * FROM "options" WHERE "id" = $1 LIMIT 1"#)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(map_option_row).transpose()
}

pub async fn insert_option(
    pool: &PgPool,
    question_id: &str,
    text: &str,
    is_correct: bool,
    position: i32,
) -> Result<OptionRow, sqlx::Error> {
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO "options" ("id", "questionId", "text", "isCorrect", "position")
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(&id)
    .bind(question_id)
    .bind(text)
    .bind(is_correct)
    .bind(position)
    .execute(pool)
    .await?;

    Ok(OptionRow {
        id,
        question_id: question_id.to_string(),
        text: text.to_string(),
        is_correct,
        position,
    })
}

pub async fn delete_option(pool: &PgPool, id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(r#"DELETE FROM "options" WHERE "id" = $1"#)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
