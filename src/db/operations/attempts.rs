use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::auth::format_naive_datetime_iso_millis;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRow {
    pub id: String,
    pub quiz_id: String,
    pub user_id: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub score: Option<f64>,
    pub max_score: f64,
    pub status: String,
    pub is_passed: Option<bool>,
    pub attempt_number: i32,
    pub time_spent: i32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRow {
    pub id: String,
    pub quiz_attempt_id: String,
    pub question_id: String,
    pub selected_option_id: Option<String>,
    pub text_answer: Option<String>,
    pub is_correct: Option<bool>,
    pub score: Option<f64>,
}

fn map_attempt_row(row: &sqlx::postgres::PgRow) -> Result<AttemptRow, sqlx::Error> {
    let start_time: NaiveDateTime = row.try_get("startTime")?;
    let end_time: Option<NaiveDateTime> = row.try_get("endTime")?;

    Ok(AttemptRow {
        id: row.try_get("id")?,
        quiz_id: row.try_get("quizId")?,
        user_id: row.try_get("userId")?,
        start_time: format_naive_datetime_iso_millis(start_time),
        end_time: end_time.map(format_naive_datetime_iso_millis),
        score: row.try_get("score")?,
        max_score: row.try_get("maxScore")?,
        status: row.try_get("status")?,
        is_passed: row.try_get("isPassed")?,
        attempt_number: row.try_get("attemptNumber")?,
        time_spent: row.try_get("timeSpent")?,
    })
}

fn map_answer_row(row: &sqlx::postgres::PgRow) -> Result<AnswerRow, sqlx::Error> {
    Ok(AnswerRow {
        id: row.try_get("id")?,
        quiz_attempt_id: row.try_get("quizAttemptId")?,
        question_id: row.try_get("questionId")?,
        selected_option_id: row.try_get("selectedOptionId")?,
        text_answer: row.try_get("textAnswer")?,
        is_correct: row.try_get("isCorrect")?,
        score: row.try_get("score")?,
    })
}

pub async fn count_attempts(
    conn: &mut PgConnection,
    quiz_id: &str,
    user_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "quiz_attempts" WHERE "quizId" = $1 AND "userId" = $2"#,
    )
    .bind(quiz_id)
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await
}

/// Attempt numbers survive deletion of earlier attempts, so allocation is
/// MAX+1 rather than COUNT+1.
pub async fn next_attempt_number(
    conn: &mut PgConnection,
    quiz_id: &str,
    user_id: &str,
) -> Result<i32, sqlx::Error> {
    let max: Option<i32> = sqlx::query_scalar(
        r#"SELECT MAX("attemptNumber") FROM "quiz_attempts" WHERE "quizId" = $1 AND "userId" = $2"#,
    )
    .bind(quiz_id)
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(max.unwrap_or(0) + 1)
}

pub async fn find_in_progress_attempt(
    conn: &mut PgConnection,
    quiz_id: &str,
    user_id: &str,
) -> Result<Option<AttemptRow>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT * FROM "quiz_attempts"
        WHERE "quizId" = $1 AND "userId" = $2 AND "status" = 'in_progress'
        LIMIT 1
        "#,
    )
    .bind(quiz_id)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(map_attempt_row).transpose()
}

pub async fn insert_attempt(
    conn: &mut PgConnection,
    quiz_id: &str,
    user_id: &str,
    attempt_number: i32,
    max_score: f64,
) -> Result<AttemptRow, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().naive_utc();

    sqlx::query(
        r#"
        INSERT INTO "quiz_attempts"
          ("id", "quizId", "userId", "startTime", "maxScore", "attemptNumber")
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(&id)
    .bind(quiz_id)
    .bind(user_id)
    .bind(now)
    .bind(max_score)
    .bind(attempt_number)
    .execute(&mut *conn)
    .await?;

    Ok(AttemptRow {
        id,
        quiz_id: quiz_id.to_string(),
        user_id: user_id.to_string(),
        start_time: format_naive_datetime_iso_millis(now),
        end_time: None,
        score: None,
        max_score,
        status: "in_progress".to_string(),
        is_passed: None,
        attempt_number,
        time_spent: 0,
    })
}

pub async fn find_attempt(pool: &PgPool, id: &str) -> Result<Option<AttemptRow>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT * FROM "quiz_attempts" WHERE "id" = $1 LIMIT 1"#)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(map_attempt_row).transpose()
}

pub async fn find_attempt_tx(
    conn: &mut PgConnection,
    id: &str,
) -> Result<Option<AttemptRow>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT * FROM "quiz_attempts" WHERE "id" = $1 LIMIT 1"#)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(map_attempt_row).transpose()
}

pub async fn upsert_answer(
    pool: &PgPool,
    attempt_id: &str,
    question_id: &str,
    selected_option_id: Option<&str>,
    text_answer: Option<&str>,
    is_correct: Option<bool>,
    score: Option<f64>,
) -> Result<AnswerRow, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO "answers"
          ("id", "quizAttemptId", "questionId", "selectedOptionId", "textAnswer", "isCorrect", "score")
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT ("quizAttemptId", "questionId") DO UPDATE SET
          "selectedOptionId" = EXCLUDED."selectedOptionId",
          "textAnswer" = EXCLUDED."textAnswer",
          "isCorrect" = EXCLUDED."isCorrect",
          "score" = EXCLUDED."score"
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(attempt_id)
    .bind(question_id)
    .bind(selected_option_id)
    .bind(text_answer)
    .bind(is_correct)
    .bind(score)
    .fetch_one(pool)
    .await?;

    map_answer_row(&row)
}

pub async fn list_answers(
    conn: &mut PgConnection,
    attempt_id: &str,
) -> Result<Vec<AnswerRow>, sqlx::Error> {
    let rows = sqlx::query(r#"SELECT * FROM "answers" WHERE "quizAttemptId" = $1"#)
        .bind(attempt_id)
        .fetch_all(&mut *conn)
        .await?;

    rows.iter().map(map_answer_row).collect()
}

pub async fn list_answers_pool(
    pool: &PgPool,
    attempt_id: &str,
) -> Result<Vec<AnswerRow>, sqlx::Error> {
    let rows = sqlx::query(r#"SELECT * FROM "answers" WHERE "quizAttemptId" = $1"#)
        .bind(attempt_id)
        .fetch_all(pool)
        .await?;

    rows.iter().map(map_answer_row).collect()
}

pub async fn finalize_attempt(
    conn: &mut PgConnection,
    id: &str,
    score: f64,
    max_score: f64,
    is_passed: bool,
    end_time: NaiveDateTime,
    time_spent: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE "quiz_attempts"
        SET "score" = $2, "maxScore" = $3, "isPassed" = $4, "endTime" = $5,
            "timeSpent" = $6, "status" = 'completed'
        WHERE "id" = $1
        "#,
    )
    .bind(id)
    .bind(score)
    .bind(max_score)
    .bind(is_passed)
    .bind(end_time)
    .bind(time_spent)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn list_attempts_for_user(
    pool: &PgPool,
    quiz_id: &str,
    user_id: &str,
) -> Result<Vec<AttemptRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM "quiz_attempts"
        WHERE "quizId" = $1 AND "userId" = $2
        ORDER BY "attemptNumber" ASC
        "#,
    )
    .bind(quiz_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(map_attempt_row).collect()
}

pub async fn list_attempts_for_quiz(
    pool: &PgPool,
    quiz_id: &str,
) -> Result<Vec<AttemptRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM "quiz_attempts"
        WHERE "quizId" = $1
        ORDER BY "startTime" DESC
        "#,
    )
    .bind(quiz_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(map_attempt_row).collect()
}
