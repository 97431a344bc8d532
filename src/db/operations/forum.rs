use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::auth::format_naive_datetime_iso_millis;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub position: i32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicRow {
    pub id: String,
    pub category_id: String,
    pub course_id: Option<String>,
    pub author_id: String,
    pub title: String,
    pub is_pinned: bool,
    pub is_locked: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicWithPostCount {
    #[serde(flatten)]
    pub topic: TopicRow,
    pub post_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRow {
    pub id: String,
    pub topic_id: String,
    pub author_id: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

fn map_topic_row(row: &sqlx::postgres::PgRow) -> Result<TopicRow, sqlx::Error> {
    let created_at: NaiveDateTime = row.try_get("createdAt")?;
    let updated_at: NaiveDateTime = row.try_get("updatedAt")?;

    Ok(TopicRow {
        id: row.try_get("id")?,
        category_id: row.try_get("categoryId")?,
        course_id: row.try_get("courseId")?,
        author_id: row.try_get("authorId")?,
        title: row.try_get("title")?,
        is_pinned: row.try_get("isPinned")?,
        is_locked: row.try_get("isLocked")?,
        created_at: format_naive_datetime_iso_millis(created_at),
        updated_at: format_naive_datetime_iso_millis(updated_at),
    })
}

fn map_post_row(row: &sqlx::postgres::PgRow) -> Result<PostRow, sqlx::Error> {
    let created_at: NaiveDateTime = row.try_get("createdAt")?;
    let updated_at: NaiveDateTime = row.try_get("updatedAt")?;

    Ok(PostRow {
        id: row.try_get("id")?,
        topic_id: row.try_get("topicId")?,
        author_id: row.try_get("authorId")?,
        content: row.try_get("content")?,
        created_at: format_naive_datetime_iso_millis(created_at),
        updated_at: format_naive_datetime_iso_millis(updated_at),
    })
}

pub async fn list_categories(pool: &PgPool) -> Result<Vec<CategoryRow>, sqlx::Error> {
    let rows = sqlx::query(r#"SELECT * FROM "forum_categories" ORDER BY "position" ASC"#)
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|row| {
            Ok(CategoryRow {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                description: row.try_get("description")?,
                position: row.try_get("position")?,
            })
        })
        .collect()
}

pub async fn find_category(pool: &PgPool, id: &str) -> Result<Option<CategoryRow>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT * FROM "forum_categories" WHERE "id" = $1 LIMIT 1"#)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.map(|row| {
        Ok(CategoryRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            position: row.try_get("position")?,
        })
    })
    .transpose()
}

pub async fn insert_category(
    pool: &PgPool,
    name: &str,
    description: &str,
    position: i32,
) -> Result<CategoryRow, sqlx::Error> {
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO "forum_categories" ("id", "name", "description", "position")
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(&id)
    .bind(name)
    .bind(description)
    .bind(position)
    .execute(pool)
    .await?;

    Ok(CategoryRow {
        id,
        name: name.to_string(),
        description: description.to_string(),
        position,
    })
}

pub async fn delete_category(pool: &PgPool, id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(r#"DELETE FROM "forum_categories" WHERE "id" = $1"#)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn list_topics(
    pool: &PgPool,
    category_id: &str,
) -> Result<Vec<TopicWithPostCount>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT t.*, COUNT(p."id") AS "postCount"
        FROM "forum_topics" t
        LEFT JOIN "forum_posts" p ON p."topicId" = t."id"
        WHERE t."categoryId" = $1
        GROUP BY t."id"
        ORDER BY t."isPinned" DESC, t."updatedAt" DESC
        "#,
    )
    .bind(category_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(TopicWithPostCount {
                topic: map_topic_row(row)?,
                post_count: row.try_get("postCount")?,
            })
        })
        .collect()
}

pub async fn find_topic(pool: &PgPool, id: &str) -> Result<Option<TopicRow>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT * FROM "forum_topics" WHERE "id" = $1 LIMIT 1"#)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(map_topic_row).transpose()
}

pub async fn insert_topic(
    pool: &PgPool,
    category_id: &str,
    course_id: Option<&str>,
    author_id: &str,
    title: &str,
) -> Result<TopicRow, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().naive_utc();

    sqlx::query(
        r#"
        INSERT INTO "forum_topics"
          ("id", "categoryId", "courseId", "authorId", "title", "createdAt", "updatedAt")
        VALUES ($1, $2, $3, $4, $5, $6, $6)
        "#,
    )
    .bind(&id)
    .bind(category_id)
    .bind(course_id)
    .bind(author_id)
    .bind(title)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(TopicRow {
        id,
        category_id: category_id.to_string(),
        course_id: course_id.map(str::to_string),
        author_id: author_id.to_string(),
        title: title.to_string(),
        is_pinned: false,
        is_locked: false,
        created_at: format_naive_datetime_iso_millis(now),
        updated_at: format_naive_datetime_iso_millis(now),
    })
}

pub async fn set_topic_flags(
    pool: &PgPool,
    id: &str,
    is_pinned: bool,
    is_locked: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE "forum_topics"
        SET "isPinned" = $2, "isLocked" = $3, "updatedAt" = $4
        WHERE "id" = $1
        "#,
    )
    .bind(id)
    .bind(is_pinned)
    .bind(is_locked)
    .bind(Utc::now().naive_utc())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_topic(pool: &PgPool, id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(r#"DELETE FROM "forum_topics" WHERE "id" = $1"#)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn touch_topic(pool: &PgPool, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query(r#"UPDATE "forum_topics" SET "updatedAt" = $2 WHERE "id" = $1"#)
        .bind(id)
        .bind(Utc::now().naive_utc())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn list_posts(pool: &PgPool, topic_id: &str) -> Result<Vec<PostRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT * FROM "forum_posts" WHERE "topicId" = $1 ORDER BY "createdAt" ASC"#,
    )
    .bind(topic_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(map_post_row).collect()
}

pub async fn find_post(pool: &PgPool, id: &str) -> Result<Option<PostRow>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT * FROM "forum_posts" WHERE "id" = $1 LIMIT 1"#)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(map_post_row).transpose()
}

pub async fn insert_post(
    pool: &PgPool,
    topic_id: &str,
    author_id: &str,
    content: &str,
) -> Result<PostRow, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().naive_utc();

    sqlx::query(
        r#"
        INSERT INTO "forum_posts" ("id", "topicId", "authorId", "content", "createdAt", "updatedAt")
        VALUES ($1, $2, $3, $4, $5, $5)
        "#,
    )
    .bind(&id)
    .bind(topic_id)
    .bind(author_id)
    .bind(content)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(PostRow {
        id,
        topic_id: topic_id.to_string(),
        author_id: author_id.to_string(),
        content: content.to_string(),
        created_at: format_naive_datetime_iso_millis(now),
        updated_at: format_naive_datetime_iso_millis(now),
    })
}

pub async fn update_post(pool: &PgPool, id: &str, content: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE "forum_posts" SET "content" = $2, "updatedAt" = $3 WHERE "id" = $1"#,
    )
    .bind(id)
    .bind(content)
    .bind(Utc::now().naive_utc())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_post(pool: &PgPool, id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(r#"DELETE FROM "forum_posts" WHERE "id" = $1"#)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
