use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::auth::format_naive_datetime_iso_millis;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub instructor_id: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRow {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub position: i32,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonRow {
    pub id: String,
    pub module_id: String,
    pub title: String,
    pub content: String,
    pub position: i32,
    pub created_at: String,
    pub updated_at: String,
}

/// Resolved placement of a lesson inside the catalog, used by the rollup
/// chain to find the owning module and course in one query.
#[derive(Debug, Clone)]
pub struct LessonContext {
    pub lesson_id: String,
    pub module_id: String,
    pub course_id: String,
}

fn map_course_row(row: &sqlx::postgres::PgRow) -> Result<CourseRow, sqlx::Error> {
    let created_at: NaiveDateTime = row.try_get("createdAt")?;
    let updated_at: NaiveDateTime = row.try_get("updatedAt")?;

    Ok(CourseRow {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        instructor_id: row.try_get("instructorId")?,
        status: row.try_get("status")?,
        created_at: format_naive_datetime_iso_millis(created_at),
        updated_at: format_naive_datetime_iso_millis(updated_at),
    })
}

fn map_module_row(row: &sqlx::postgres::PgRow) -> Result<ModuleRow, sqlx::Error> {
    let created_at: NaiveDateTime = row.try_get("createdAt")?;
    let updated_at: NaiveDateTime = row.try_get("updatedAt")?;

    Ok(ModuleRow {
        id: row.try_get("id")?,
        course_id: row.try_get("courseId")?,
        title: row.try_get("title")?,
        position: row.try_get("position")?,
        created_at: format_naive_datetime_iso_millis(created_at),
        updated_at: format_naive_datetime_iso_millis(updated_at),
    })
}

fn map_lesson_row(row: &sqlx::postgres::PgRow) -> Result<LessonRow, sqlx::Error> {
    let created_at: NaiveDateTime = row.try_get("createdAt")?;
    let updated_at: NaiveDateTime = row.try_get("updatedAt")?;

    Ok(LessonRow {
        id: row.try_get("id")?,
        module_id: row.try_get("moduleId")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        position: row.try_get("position")?,
        created_at: format_naive_datetime_iso_millis(created_at),
        updated_at: format_naive_datetime_iso_millis(updated_at),
    })
}

pub async fn find_course(pool: &PgPool, id: &str) -> Result<Option<CourseRow>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT * FROM "courses" WHERE "id" = $1 LIMIT 1"#)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(map_course_row).transpose()
}

pub async fn list_courses_by_status(
    pool: &PgPool,
    status: &str,
) -> Result<Vec<CourseRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT * FROM "courses" WHERE "status" = $1 ORDER BY "createdAt" DESC"#,
    )
    .bind(status)
    .fetch_all(pool)
    .await?;

    rows.iter().map(map_course_row).collect()
}

pub async fn list_courses_by_instructor(
    pool: &PgPool,
    instructor_id: &str,
) -> Result<Vec<CourseRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT * FROM "courses" WHERE "instructorId" = $1 ORDER BY "createdAt" DESC"#,
    )
    .bind(instructor_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(map_course_row).collect()
}

pub async fn insert_course(
    pool: &PgPool,
    title: &str,
    description: &str,
    instructor_id: &str,
    status: &str,
) -> Result<CourseRow, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().naive_utc();

    sqlx::query(
        r#"
        INSERT INTO "courses" ("id", "title", "description", "instructorId", "status", "createdAt", "updatedAt")
        VALUES ($1, $2, $3, $4, $5, $6, $6)
        "#,
    )
    .bind(&id)
    .bind(title)
    .bind(description)
    .bind(instructor_id)
    .bind(status)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(CourseRow {
        id,
        title: title.to_string(),
        description: description.to_string(),
        instructor_id: instructor_id.to_string(),
        status: status.to_string(),
        created_at: format_naive_datetime_iso_millis(now),
        updated_at: format_naive_datetime_iso_millis(now),
    })
}

pub async fn update_course(
    pool: &PgPool,
    id: &str,
    title: &str,
    description: &str,
    status: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE "courses"
        SET "title" = $2, "description" = $3, "status" = $4, "updatedAt" = $5
        WHERE "id" = $1
        "#,
    )
    .bind(id)
    .bind(title)
    .bind(description)
    .bind(status)
    .bind(Utc::now().naive_utc())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_course(pool: &PgPool, id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(r#"DELETE FROM "courses" WHERE "id" = $1"#)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn find_module(pool: &PgPool, id: &str) -> Result<Option<ModuleRow>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT * FROM "modules" WHERE "id" = $1 LIMIT 1"#)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(map_module_row).transpose()
}

pub async fn list_modules(pool: &PgPool, course_id: &str) -> Result<Vec<ModuleRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT * FROM "modules" WHERE "courseId" = $1 ORDER BY "position" ASC, "createdAt" ASC"#,
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(map_module_row).collect()
}

pub async fn insert_module(
    pool: &PgPool,
    course_id: &str,
    title: &str,
    position: i32,
) -> Result<ModuleRow, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().naive_utc();

    sqlx::query(
        r#"
        INSERT INTO "modules" ("id", "courseId", "title", "position", "createdAt", "updatedAt")
        VALUES ($1, $2, $3, $4, $5, $5)
        "#,
    )
    .bind(&id)
    .bind(course_id)
    .bind(title)
    .bind(position)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(ModuleRow {
        id,
        course_id: course_id.to_string(),
        title: title.to_string(),
        position,
        created_at: format_naive_datetime_iso_millis(now),
        updated_at: format_naive_datetime_iso_millis(now),
    })
}

pub async fn update_module(
    pool: &PgPool,
    id: &str,
    title: &str,
    position: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE "modules" SET "title" = $2, "position" = $3, "updatedAt" = $4 WHERE "id" = $1"#,
    )
    .bind(id)
    .bind(title)
    .bind(position)
    .bind(Utc::now().naive_utc())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_module(pool: &PgPool, id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(r#"DELETE FROM "modules" WHERE "id" = $1"#)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn find_lesson(pool: &PgPool, id: &str) -> Result<Option<LessonRow>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT * FROM "lessons" WHERE "id" = $1 LIMIT 1"#)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(map_lesson_row).transpose()
}

pub async fn list_lessons(pool: &PgPool, module_id: &str) -> Result<Vec<LessonRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT * FROM "lessons" WHERE "moduleId" = $1 ORDER BY "position" ASC, "createdAt" ASC"#,
    )
    .bind(module_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(map_lesson_row).collect()
}

pub async fn insert_lesson(
    pool: &PgPool,
    module_id: &str,
    title: &str,
    content: &str,
    position: i32,
) -> Result<LessonRow, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().naive_utc();

    sqlx::query(
        r#"
        INSERT INTO "lessons" ("id", "moduleId", "title", "content", "position", "createdAt", "updatedAt")
        VALUES ($1, $2, $3, $4, $5, $6, $6)
        "#,
    )
    .bind(&id)
    .bind(module_id)
    .bind(title)
    .bind(content)
    .bind(position)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(LessonRow {
        id,
        module_id: module_id.to_string(),
        title: title.to_string(),
        content: content.to_string(),
        position,
        created_at: format_naive_datetime_iso_millis(now),
        updated_at: format_naive_datetime_iso_millis(now),
    })
}

pub async fn update_lesson(
    pool: &PgPool,
    id: &str,
    title: &str,
    content: &str,
    position: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE "lessons"
        SET "title" = $2, "content" = $3, "position" = $4, "updatedAt" = $5
        WHERE "id" = $1
        "#,
    )
    .bind(id)
    .bind(title)
    .bind(content)
    .bind(position)
    .bind(Utc::now().naive_utc())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_lesson(pool: &PgPool, id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(r#"DELETE FROM "lessons" WHERE "id" = $1"#)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn find_lesson_context(
    conn: &mut PgConnection,
    lesson_id: &str,
) -> Result<Option<LessonContext>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT l."id" AS "lessonId", l."moduleId", m."courseId"
        FROM "lessons" l
        JOIN "modules" m ON m."id" = l."moduleId"
        WHERE l."id" = $1
        LIMIT 1
        "#,
    )
    .bind(lesson_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|r| {
        Ok(LessonContext {
            lesson_id: r.try_get("lessonId")?,
            module_id: r.try_get("moduleId")?,
            course_id: r.try_get("courseId")?,
        })
    })
    .transpose()
}

pub async fn list_course_lesson_ids(
    conn: &mut PgConnection,
    course_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT l."id"
        FROM "lessons" l
        JOIN "modules" m ON m."id" = l."moduleId"
        WHERE m."courseId" = $1
        "#,
    )
    .bind(course_id)
    .fetch_all(&mut *conn)
    .await
}

pub async fn list_course_module_ids(
    conn: &mut PgConnection,
    course_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(r#"SELECT "id" FROM "modules" WHERE "courseId" = $1"#)
        .bind(course_id)
        .fetch_all(&mut *conn)
        .await
}

pub async fn course_instructor_id(
    conn: &mut PgConnection,
    course_id: &str,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar(r#"SELECT "instructorId" FROM "courses" WHERE "id" = $1"#)
        .bind(course_id)
        .fetch_optional(&mut *conn)
        .await
}

pub async fn count_module_lessons(
    conn: &mut PgConnection,
    module_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(r#"SELECT COUNT(*) FROM "lessons" WHERE "moduleId" = $1"#)
        .bind(module_id)
        .fetch_one(&mut *conn)
        .await
}

pub async fn count_course_modules(
    conn: &mut PgConnection,
    course_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(r#"SELECT COUNT(*) FROM "modules" WHERE "courseId" = $1"#)
        .bind(course_id)
        .fetch_one(&mut *conn)
        .await
}
