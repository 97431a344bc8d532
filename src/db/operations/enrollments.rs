use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::auth::format_naive_datetime_iso_millis;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentRow {
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub progress: f64,
    pub is_completed: bool,
    pub completion_date: Option<String>,
    pub enrolled_at: String,
    pub last_accessed_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentWithCourse {
    #[serde(flatten)]
    pub enrollment: EnrollmentRow,
    pub course_title: String,
    pub course_status: String,
}

fn map_enrollment_row(row: &sqlx::postgres::PgRow) -> Result<EnrollmentRow, sqlx::Error> {
    let completion_date: Option<NaiveDateTime> = row.try_get("completionDate")?;
    let enrolled_at: NaiveDateTime = row.try_get("enrolledAt")?;
    let last_accessed_at: NaiveDateTime = row.try_get("lastAccessedAt")?;

    Ok(EnrollmentRow {
        id: row.try_get("id")?,
        user_id: row.try_get("userId")?,
        course_id: row.try_get("courseId")?,
        progress: row.try_get("progress")?,
        is_completed: row.try_get("isCompleted")?,
        completion_date: completion_date.map(format_naive_datetime_iso_millis),
        enrolled_at: format_naive_datetime_iso_millis(enrolled_at),
        last_accessed_at: format_naive_datetime_iso_millis(last_accessed_at),
    })
}

pub async fn find_enrollment(
    conn: &mut PgConnection,
    user_id: &str,
    course_id: &str,
) -> Result<Option<EnrollmentRow>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT * FROM "enrollments" WHERE "userId" = $1 AND "courseId" = $2 LIMIT 1"#,
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(map_enrollment_row).transpose()
}

pub async fn insert_enrollment(
    conn: &mut PgConnection,
    user_id: &str,
    course_id: &str,
) -> Result<EnrollmentRow, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().naive_utc();

    sqlx::query(
        r#"
        INSERT INTO "enrollments" ("id", "userId", "courseId", "enrolledAt", "lastAccessedAt")
        VALUES ($1, $2, $3, $4, $4)
        "#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(course_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(EnrollmentRow {
        id,
        user_id: user_id.to_string(),
        course_id: course_id.to_string(),
        progress: 0.0,
        is_completed: false,
        completion_date: None,
        enrolled_at: format_naive_datetime_iso_millis(now),
        last_accessed_at: format_naive_datetime_iso_millis(now),
    })
}

/// Rollup write. `newly_completed` stamps the completion date once; an
/// already-completed enrollment keeps its original date.
pub async fn update_enrollment_rollup(
    conn: &mut PgConnection,
    id: &str,
    progress: f64,
    is_completed: bool,
    newly_completed: bool,
) -> Result<(), sqlx::Error> {
    let now = Utc::now().naive_utc();

    if newly_completed {
        sqlx::query(
            r#"
            UPDATE "enrollments"
            SET "progress" = $2, "isCompleted" = $3, "completionDate" = $4, "lastAccessedAt" = $4
            WHERE "id" = $1
            "#,
        )
        .bind(id)
        .bind(progress)
        .bind(is_completed)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    } else {
        sqlx::query(
            r#"
            UPDATE "enrollments"
            SET "progress" = $2, "isCompleted" = $3, "lastAccessedAt" = $4
            WHERE "id" = $1
            "#,
        )
        .bind(id)
        .bind(progress)
        .bind(is_completed)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

pub async fn delete_enrollment(
    conn: &mut PgConnection,
    user_id: &str,
    course_id: &str,
) -> Result<u64, sqlx::Error> {
    let result =
        sqlx::query(r#"DELETE FROM "enrollments" WHERE "userId" = $1 AND "courseId" = $2"#)
            .bind(user_id)
            .bind(course_id)
            .execute(&mut *conn)
            .await?;
    Ok(result.rows_affected())
}

pub async fn list_enrollments_for_user(
    pool: &PgPool,
    user_id: &str,
) -> Result<Vec<EnrollmentWithCourse>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT e.*, c."title" AS "courseTitle", c."status" AS "courseStatus"
        FROM "enrollments" e
        JOIN "courses" c ON c."id" = e."courseId"
        WHERE e."userId" = $1
        ORDER BY e."enrolledAt" DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(EnrollmentWithCourse {
                enrollment: map_enrollment_row(row)?,
                course_title: row.try_get("courseTitle")?,
                course_status: row.try_get("courseStatus")?,
            })
        })
        .collect()
}
