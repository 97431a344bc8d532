use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::auth::format_naive_datetime_iso_millis;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub created_at: String,
    pub updated_at: String,
    pub last_login_at: Option<String>,
}

fn map_user_row(row: &sqlx::postgres::PgRow) -> Result<UserRecord, sqlx::Error> {
    let created_at: NaiveDateTime = row.try_get("createdAt")?;
    let updated_at: NaiveDateTime = row.try_get("updatedAt")?;
    let last_login_at: Option<NaiveDateTime> = row.try_get("lastLoginAt")?;

    Ok(UserRecord {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("passwordHash")?,
        role: row.try_get("role")?,
        created_at: format_naive_datetime_iso_millis(created_at),
        updated_at: format_naive_datetime_iso_millis(updated_at),
        last_login_at: last_login_at.map(format_naive_datetime_iso_millis),
    })
}

pub async fn find_user_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<UserRecord>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT * FROM "users" WHERE "email" = $1 LIMIT 1"#)
        .bind(email)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(map_user_row).transpose()
}

pub async fn find_user_by_id(pool: &PgPool, id: &str) -> Result<Option<UserRecord>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT * FROM "users" WHERE "id" = $1 LIMIT 1"#)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(map_user_row).transpose()
}

pub async fn create_user(
    pool: &PgPool,
    email: &str,
    username: &str,
    password_hash: &str,
    role: &str,
) -> Result<UserRecord, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().naive_utc();

    sqlx::query(
        r#"
        INSERT INTO "users" ("id", "email", "username", "passwordHash", "role", "createdAt", "updatedAt")
        VALUES ($1, $2, $3, $4, $5, $6, $6)
        "#,
    )
    .bind(&id)
    .bind(email)
    .bind(username)
    .bind(password_hash)
    .bind(role)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(UserRecord {
        id,
        email: email.to_string(),
        username: username.to_string(),
        password_hash: password_hash.to_string(),
        role: role.to_string(),
        created_at: format_naive_datetime_iso_millis(now),
        updated_at: format_naive_datetime_iso_millis(now),
        last_login_at: None,
    })
}

pub async fn update_username(pool: &PgPool, id: &str, username: &str) -> Result<(), sqlx::Error> {
    sqlx::query(r#"UPDATE "users" SET "username" = $2, "updatedAt" = $3 WHERE "id" = $1"#)
        .bind(id)
        .bind(username)
        .bind(Utc::now().naive_utc())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn update_password_hash(
    pool: &PgPool,
    id: &str,
    password_hash: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(r#"UPDATE "users" SET "passwordHash" = $2, "updatedAt" = $3 WHERE "id" = $1"#)
        .bind(id)
        .bind(password_hash)
        .bind(Utc::now().naive_utc())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn touch_last_login(pool: &PgPool, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query(r#"UPDATE "users" SET "lastLoginAt" = $2 WHERE "id" = $1"#)
        .bind(id)
        .bind(Utc::now().naive_utc())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn create_session(
    pool: &PgPool,
    user_id: &str,
    token_hash: &str,
    expires_at: NaiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO "sessions" ("id", "userId", "token", "expiresAt")
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(token_hash)
    .bind(expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_session_by_token_hash(
    pool: &PgPool,
    token_hash: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(r#"DELETE FROM "sessions" WHERE "token" = $1"#)
        .bind(token_hash)
        .execute(pool)
        .await?;
    Ok(())
}
