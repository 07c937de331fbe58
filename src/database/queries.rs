use chrono::Utc;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::{AppError, Result};
use crate::models::*;

const FILE_COLUMNS: &str = "id, owner_id, name, size_bytes, location, sha256, created_at";

pub struct UserQueries;

impl UserQueries {
    /// Inserts a new user; a taken username surfaces as `AppError::Conflict`.
    pub async fn create_user(
        pool: &SqlitePool,
        username: &str,
        password_hash: &str,
    ) -> Result<User> {
        let result = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, password_hash, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, username, password_hash, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(password_hash)
        .bind(Utc::now())
        .fetch_one(pool)
        .await;

        match result {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(AppError::Conflict("Username already exists".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_by_username(pool: &SqlitePool, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, password_hash, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, password_hash, created_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }
}

pub struct NewFileRecord<'a> {
    pub owner_id: Uuid,
    pub name: &'a str,
    pub size_bytes: i64,
    pub location: &'a str,
    pub sha256: &'a str,
}

pub struct FileQueries;

impl FileQueries {
    /// Creates the record, or replaces the one with the same owner and name.
    pub async fn upsert(pool: &SqlitePool, record: &NewFileRecord<'_>) -> Result<StoredFile> {
        let sql = format!(
            r#"
            INSERT INTO files (owner_id, name, size_bytes, location, sha256, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(owner_id, name) DO UPDATE SET
                size_bytes = excluded.size_bytes,
                location = excluded.location,
                sha256 = excluded.sha256,
                created_at = excluded.created_at
            RETURNING {}
            "#,
            FILE_COLUMNS
        );

        let file = sqlx::query_as::<_, StoredFile>(&sql)
            .bind(record.owner_id)
            .bind(record.name)
            .bind(record.size_bytes)
            .bind(record.location)
            .bind(record.sha256)
            .bind(Utc::now())
            .fetch_one(pool)
            .await?;

        Ok(file)
    }

    pub async fn find_by_name(
        pool: &SqlitePool,
        owner_id: Uuid,
        name: &str,
    ) -> Result<Option<StoredFile>> {
        let sql = format!("SELECT {} FROM files WHERE owner_id = ? AND name = ?", FILE_COLUMNS);
        let file = sqlx::query_as::<_, StoredFile>(&sql)
            .bind(owner_id)
            .bind(name)
            .fetch_optional(pool)
            .await?;

        Ok(file)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<StoredFile>> {
        let sql = format!("SELECT {} FROM files WHERE id = ?", FILE_COLUMNS);
        let file = sqlx::query_as::<_, StoredFile>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(file)
    }

    /// Rows are yielded in insertion order while the stream is polled.
    pub fn stream_for_owner(
        pool: &SqlitePool,
        owner_id: Uuid,
    ) -> BoxStream<'_, Result<StoredFile>> {
        sqlx::query_as::<_, StoredFile>(
            "SELECT id, owner_id, name, size_bytes, location, sha256, created_at \
             FROM files WHERE owner_id = ? ORDER BY id",
        )
        .bind(owner_id)
        .fetch(pool)
        .map_err(AppError::from)
        .boxed()
    }

    pub async fn total_size_for_owner(pool: &SqlitePool, owner_id: Uuid) -> Result<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(size_bytes), 0) FROM files WHERE owner_id = ?",
        )
        .bind(owner_id)
        .fetch_one(pool)
        .await?;

        Ok(total)
    }

    pub async fn delete_by_id(pool: &SqlitePool, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
