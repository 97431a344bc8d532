use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::auth::format_naive_datetime_iso_millis;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsRow {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author_id: String,
    pub status: String,
    pub published_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

fn map_news_row(row: &sqlx::postgres::PgRow) -> Result<NewsRow, sqlx::Error> {
    let published_at: Option<NaiveDateTime> = row.try_get("publishedAt")?;
    let created_at: NaiveDateTime = row.try_get("createdAt")?;
    let updated_at: NaiveDateTime = row.try_get("updatedAt")?;

    Ok(NewsRow {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        author_id: row.try_get("authorId")?,
        status: row.try_get("status")?,
        published_at: published_at.map(format_naive_datetime_iso_millis),
        created_at: format_naive_datetime_iso_millis(created_at),
        updated_at: format_naive_datetime_iso_millis(updated_at),
    })
}

pub async fn list_published(pool: &PgPool) -> Result<Vec<NewsRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT * FROM "news" WHERE "status" = 'published' ORDER BY "publishedAt" DESC"#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(map_news_row).collect()
}

pub async fn list_all(pool: &PgPool) -> Result<Vec<NewsRow>, sqlx::Error> {
    let rows = sqlx::query(r#"SELECT * FROM "news" ORDER BY "createdAt" DESC"#)
        .fetch_all(pool)
        .await?;

    rows.iter().map(map_news_row).collect()
}

pub async fn find_news(pool: &PgPool, id: &str) -> Result<Option<NewsRow>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT * FROM "news" WHERE "id" = $1 LIMIT 1"#)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(map_news_row).transpose()
}

pub async fn insert_news(
    pool: &PgPool,
    title: &str,
    content: &str,
    author_id: &str,
) -> Result<NewsRow, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().naive_utc();

    sqlx::query(
        r#"
        INSERT INTO "news" ("id", "title", "content", "authorId", "createdAt", "updatedAt")
        VALUES ($1, $2, $3, $4, $5, $5)
        "#,
    )
    .bind(&id)
    .bind(title)
    .bind(content)
    .bind(author_id)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(NewsRow {
        id,
        title: title.to_string(),
        content: content.to_string(),
        author_id: author_id.to_string(),
        status: "draft".to_string(),
        published_at: None,
        created_at: format_naive_datetime_iso_millis(now),
        updated_at: format_naive_datetime_iso_millis(now),
    })
}

/// `publish` stamps `publishedAt` on the first transition only; republishing
/// an article keeps the original date.
pub async fn update_news(
    pool: &PgPool,
    id: &str,
    title: &str,
    content: &str,
    status: &str,
    stamp_published_at: bool,
) -> Result<(), sqlx::Error> {
    let now = Utc::now().naive_utc();

    if stamp_published_at {
        sqlx::query(
            r#"
            UPDATE "news"
            SET "title" = $2, "content" = $3, "status" = $4, "publishedAt" = $5, "updatedAt" = $5
            WHERE "id" = $1
            "#,
        )
        .bind(id)
        .bind(title)
        .bind(content)
        .bind(status)
        .bind(now)
        .execute(pool)
        .await?;
    } else {
        sqlx::query(
            r#"
            UPDATE "news"
            SET "title" = $2, "content" = $3, "status" = $4, "updatedAt" = $5
            WHERE "id" = $1
            "#,
        )
        .bind(id)
        .bind(title)
        .bind(content)
        .bind(status)
        .bind(now)
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn delete_news(pool: &PgPool, id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(r#"DELETE FROM "news" WHERE "id" = $1"#)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
