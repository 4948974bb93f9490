//! Append-only log of conversation turns per user.

use serde::Serialize;
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqlitePool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    db::{from_millis, to_millis},
    AppError, AppResult,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub user_id: String,
    pub text: String,
    pub is_from_user: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl FromRow<'_, SqliteRow> for Message {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Message {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            text: row.try_get("content")?,
            is_from_user: row.try_get("is_from_user")?,
            timestamp: from_millis(row.try_get("timestamp")?),
        })
    }
}

pub async fn append(
    db_pool: &SqlitePool,
    user_id: &str,
    text: &str,
    is_from_user: bool,
    timestamp: OffsetDateTime,
) -> sqlx::Result<Message> {
    let message = Message {
        id: Uuid::now_v7().to_string(),
        user_id: user_id.to_owned(),
        text: text.to_owned(),
        is_from_user,
        timestamp,
    };

    sqlx::query("INSERT INTO messages (id,user_id,content,is_from_user,timestamp) VALUES (?,?,?,?,?)")
        .bind(&message.id)
        .bind(&message.user_id)
        .bind(&message.text)
        .bind(message.is_from_user)
        .bind(to_millis(message.timestamp))
        .execute(db_pool)
        .await?;

    Ok(message)
}

/// One page of turns, selected newest-first and returned oldest to newest.
pub async fn list(db_pool: &SqlitePool, user_id: &str, page: u32, page_size: u32) -> sqlx::Result<Vec<Message>> {
    let page_size = page_size.max(1) as i64;
    let mut messages: Vec<Message> = sqlx::query_as(
        "SELECT * FROM messages WHERE user_id=? ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?",
    )
    .bind(user_id)
    .bind(page_size)
    .bind(page as i64 * page_size)
    .fetch_all(db_pool)
    .await?;

    messages.reverse();
    Ok(messages)
}

/// The last `n` turns, oldest first.
pub async fn recent(db_pool: &SqlitePool, user_id: &str, n: u32) -> sqlx::Result<Vec<Message>> {
    list(db_pool, user_id, 0, n).await
}

/// Turns with `start <= timestamp <= end`, oldest first.
pub async fn between(
    db_pool: &SqlitePool,
    user_id: &str,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> sqlx::Result<Vec<Message>> {
    sqlx::query_as(
        "SELECT * FROM messages WHERE user_id=? AND timestamp>=? AND timestamp<=? ORDER BY timestamp, id",
    )
    .bind(user_id)
    .bind(to_millis(start))
    .bind(to_millis(end))
    .fetch_all(db_pool)
    .await
}

/// Deletes one of the caller's turns.
pub async fn delete_by_id(db_pool: &SqlitePool, user_id: &str, id: &str) -> AppResult<()> {
    let deleted = sqlx::query("DELETE FROM messages WHERE id=? AND user_id=?")
        .bind(id)
        .bind(user_id)
        .execute(db_pool)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(AppError::not_found("Message not found"));
    }
    Ok(())
}
