use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool, QueryBuilder, Row};
use uuid::Uuid;

use crate::auth::format_naive_datetime_iso_millis;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonProgressRow {
    pub id: String,
    pub user_id: String,
    pub lesson_id: String,
    pub status: String,
    pub time_spent: i32,
    pub completed_at: Option<String>,
    pub last_accessed_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleProgressRow {
    pub id: String,
    pub user_id: String,
    pub module_id: String,
    pub status: String,
    pub progress: f64,
    pub completed_at: Option<String>,
    pub last_accessed_at: String,
}

fn map_lesson_progress_row(row: &sqlx::postgres::PgRow) -> Result<LessonProgressRow, sqlx::Error> {
    let completed_at: Option<NaiveDateTime> = row.try_get("completedAt")?;
    let last_accessed_at: NaiveDateTime = row.try_get("lastAccessedAt")?;

    Ok(LessonProgressRow {
        id: row.try_get("id")?,
        user_id: row.try_get("userId")?,
        lesson_id: row.try_get("lessonId")?,
        status: row.try_get("status")?,
        time_spent: row.try_get("timeSpent")?,
        completed_at: completed_at.map(format_naive_datetime_iso_millis),
        last_accessed_at: format_naive_datetime_iso_millis(last_accessed_at),
    })
}

fn map_module_progress_row(row: &sqlx::postgres::PgRow) -> Result<ModuleProgressRow, sqlx::Error> {
    let completed_at: Option<NaiveDateTime> = row.try_get("completedAt")?;
    let last_accessed_at: NaiveDateTime = row.try_get("lastAccessedAt")?;

    Ok(ModuleProgressRow {
        id: row.try_get("id")?,
        user_id: row.try_get("userId")?,
        module_id: row.try_get("moduleId")?,
        status: row.try_get("status")?,
        progress: row.try_get("progress")?,
        completed_at: completed_at.map(format_naive_datetime_iso_millis),
        last_accessed_at: format_naive_datetime_iso_millis(last_accessed_at),
    })
}

/// Idempotent row creation: INSERT .. ON CONFLICT DO NOTHING, then read
/// whichever row is there. Called at the top of every mutation entry point.
pub async fn ensure_lesson_progress(
    conn: &mut PgConnection,
    user_id: &str,
    lesson_id: &str,
) -> Result<LessonProgressRow, sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO "lesson_progress" ("id", "userId", "lessonId", "lastAccessedAt")
        VALUES ($1, $2, $3, $4)
        ON CONFLICT ("userId", "lessonId") DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(lesson_id)
    .bind(Utc::now().naive_utc())
    .execute(&mut *conn)
    .await?;

    let row = sqlx::query(
        r#"SELECT * FROM "lesson_progress" WHERE "userId" = $1 AND "lessonId" = $2 LIMIT 1"#,
    )
    .bind(user_id)
    .bind(lesson_id)
    .fetch_one(&mut *conn)
    .await?;

    map_lesson_progress_row(&row)
}

pub async fn ensure_module_progress(
    conn: &mut PgConnection,
    user_id: &str,
    module_id: &str,
) -> Result<ModuleProgressRow, sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO "module_progress" ("id", "userId", "moduleId", "lastAccessedAt")
        VALUES ($1, $2, $3, $4)
        ON CONFLICT ("userId", "moduleId") DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(module_id)
    .bind(Utc::now().naive_utc())
    .execute(&mut *conn)
    .await?;

    let row = sqlx::query(
        r#"SELECT * FROM "module_progress" WHERE "userId" = $1 AND "moduleId" = $2 LIMIT 1"#,
    )
    .bind(user_id)
    .bind(module_id)
    .fetch_one(&mut *conn)
    .await?;

    map_module_progress_row(&row)
}

/// `completed_at` semantics: `Some(Some(ts))` stamps, `Some(None)` clears,
/// `None` leaves the column untouched.
pub async fn update_lesson_progress(
    conn: &mut PgConnection,
    id: &str,
    status: &str,
    time_spent: i32,
    completed_at: Option<Option<NaiveDateTime>>,
) -> Result<(), sqlx::Error> {
    let now = Utc::now().naive_utc();

    match completed_at {
        Some(value) => {
            sqlx::query(
                r#"
                UPDATE "lesson_progress"
                SET "status" = $2, "timeSpent" = $3, "completedAt" = $4, "lastAccessedAt" = $5
                WHERE "id" = $1
                "#,
            )
            .bind(id)
            .bind(status)
            .bind(time_spent)
            .bind(value)
            .bind(now)
            .execute(&mut *conn)
            .await?;
        }
        None => {
            sqlx::query(
                r#"
                UPDATE "lesson_progress"
                SET "status" = $2, "timeSpent" = $3, "lastAccessedAt" = $4
                WHERE "id" = $1
                "#,
            )
            .bind(id)
            .bind(status)
            .bind(time_spent)
            .bind(now)
            .execute(&mut *conn)
            .await?;
        }
    }

    Ok(())
}

pub async fn update_module_progress(
    conn: &mut PgConnection,
    id: &str,
    status: &str,
    progress: f64,
    newly_completed: bool,
) -> Result<(), sqlx::Error> {
    let now = Utc::now().naive_utc();

    if newly_completed {
        sqlx::query(
            r#"
            UPDATE "module_progress"
            SET "status" = $2, "progress" = $3, "completedAt" = $4, "lastAccessedAt" = $4
            WHERE "id" = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(progress)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    } else {
        sqlx::query(
            r#"
            UPDATE "module_progress"
            SET "status" = $2, "progress" = $3, "lastAccessedAt" = $4
            WHERE "id" = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(progress)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

pub async fn list_lesson_progress_for_module(
    conn: &mut PgConnection,
    user_id: &str,
    module_id: &str,
) -> Result<Vec<LessonProgressRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT lp.*
        FROM "lesson_progress" lp
        JOIN "lessons" l ON l."id" = lp."lessonId"
        WHERE lp."userId" = $1 AND l."moduleId" = $2
        "#,
    )
    .bind(user_id)
    .bind(module_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(map_lesson_progress_row).collect()
}

pub async fn list_module_progress_for_course(
    conn: &mut PgConnection,
    user_id: &str,
    course_id: &str,
) -> Result<Vec<ModuleProgressRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT mp.*
        FROM "module_progress" mp
        JOIN "modules" m ON m."id" = mp."moduleId"
        WHERE mp."userId" = $1 AND m."courseId" = $2
        "#,
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(map_module_progress_row).collect()
}

pub async fn get_lesson_progress(
    pool: &PgPool,
    user_id: &str,
    lesson_id: &str,
) -> Result<Option<LessonProgressRow>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT * FROM "lesson_progress" WHERE "userId" = $1 AND "lessonId" = $2 LIMIT 1"#,
    )
    .bind(user_id)
    .bind(lesson_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(map_lesson_progress_row).transpose()
}

pub async fn get_module_progress(
    pool: &PgPool,
    user_id: &str,
    module_id: &str,
) -> Result<Option<ModuleProgressRow>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT * FROM "module_progress" WHERE "userId" = $1 AND "moduleId" = $2 LIMIT 1"#,
    )
    .bind(user_id)
    .bind(module_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(map_module_progress_row).transpose()
}

/// Bulk seeding at enrollment time. Rows that already exist (from an earlier
/// enrollment that was since removed and re-created) are left alone.
pub async fn seed_lesson_progress(
    conn: &mut PgConnection,
    user_id: &str,
    lesson_ids: &[String],
) -> Result<(), sqlx::Error> {
    if lesson_ids.is_empty() {
        return Ok(());
    }

    let now = Utc::now().naive_utc();
    let mut qb = QueryBuilder::<sqlx::Postgres>::new(
        r#"INSERT INTO "lesson_progress" ("id", "userId", "lessonId", "lastAccessedAt") "#,
    );
    qb.push_values(lesson_ids.iter(), |mut b, lesson_id| {
        b.push_bind(Uuid::new_v4().to_string());
        b.push_bind(user_id);
        b.push_bind(lesson_id);
        b.push_bind(now);
    });
    qb.push(r#" ON CONFLICT ("userId", "lessonId") DO NOTHING"#);
    qb.build().execute(&mut *conn).await?;

    Ok(())
}

pub async fn seed_module_progress(
    conn: &mut PgConnection,
    user_id: &str,
    module_ids: &[String],
) -> Result<(), sqlx::Error> {
    if module_ids.is_empty() {
        return Ok(());
    }

    let now = Utc::now().naive_utc();
    let mut qb = QueryBuilder::<sqlx::Postgres>::new(
        r#"INSERT INTO "module_progress" ("id", "userId", "moduleId", "lastAccessedAt") "#,
    );
    qb.push_values(module_ids.iter(), |mut b, module_id| {
        b.push_bind(Uuid::new_v4().to_string());
        b.push_bind(user_id);
        b.push_bind(module_id);
        b.push_bind(now);
    });
    qb.push(r#" ON CONFLICT ("userId", "moduleId") DO NOTHING"#);
    qb.build().execute(&mut *conn).await?;

    Ok(())
}

/// Unenroll cleanup: drops every progress row the user holds for content in
/// the course.
pub async fn delete_progress_for_course(
    conn: &mut PgConnection,
    user_id: &str,
    course_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        DELETE FROM "lesson_progress"
        WHERE "userId" = $1 AND "lessonId" IN (
            SELECT l."id" FROM "lessons" l
            JOIN "modules" m ON m."id" = l."moduleId"
            WHERE m."courseId" = $2
        )
        "#,
    )
    .bind(user_id)
    .bind(course_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        DELETE FROM "module_progress"
        WHERE "userId" = $1 AND "moduleId" IN (
            SELECT "id" FROM "modules" WHERE "courseId" = $2
        )
        "#,
    )
    .bind(user_id)
    .bind(course_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
