//! Cognitive games hosted by the text model, one conversation log per
//! session.

mod routes;
mod service;

use axum::{
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqlitePool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    db::{from_millis, to_millis},
    AppError, AppResult, AppState,
};

pub use service::{create, parse_game_json, play_turn, preview, Preview, CATEGORIES};

/// Turns of game history fed to the game master.
pub const CONTEXT_TURNS: i64 = 10;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/preview", post(routes::preview))
        .route("/create", post(routes::create))
        .route("/sessions", get(routes::sessions))
        .route("/sessions/{id}", get(routes::session).delete(routes::remove))
        .route("/sessions/{id}/message", post(routes::message))
        .route("/sessions/{id}/messages", get(routes::messages))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    Generated,
    Custom,
}

impl GameType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameType::Generated => "generated",
            GameType::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSession {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub game_type: GameType,
    pub initial_prompt: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_activity: OffsetDateTime,
    pub is_active: bool,
}

impl FromRow<'_, SqliteRow> for GameSession {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let game_type: String = row.try_get("game_type")?;
        Ok(GameSession {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            game_type: if game_type == "custom" { GameType::Custom } else { GameType::Generated },
            initial_prompt: row.try_get("initial_prompt")?,
            created_at: from_millis(row.try_get("created_at")?),
            last_activity: from_millis(row.try_get("last_activity")?),
            is_active: row.try_get("is_active")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameMessage {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub text: String,
    pub is_from_user: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl FromRow<'_, SqliteRow> for GameMessage {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(GameMessage {
            id: row.try_get("id")?,
            session_id: row.try_get("session_id")?,
            user_id: row.try_get("user_id")?,
            text: row.try_get("content")?,
            is_from_user: row.try_get("is_from_user")?,
            timestamp: from_millis(row.try_get("timestamp")?),
        })
    }
}

pub async fn insert_session(
    db_pool: &SqlitePool,
    user_id: &str,
    title: &str,
    description: &str,
    game_type: GameType,
    initial_prompt: &str,
) -> sqlx::Result<GameSession> {
    let now = OffsetDateTime::now_utc();
    let session = GameSession {
        id: Uuid::now_v7().to_string(),
        user_id: user_id.to_owned(),
        title: title.to_owned(),
        description: description.to_owned(),
        game_type,
        initial_prompt: initial_prompt.to_owned(),
        created_at: now,
        last_activity: now,
        is_active: true,
    };

    sqlx::query(
        "INSERT INTO game_sessions (id,user_id,title,description,game_type,initial_prompt,created_at,last_activity,is_active) \
         VALUES (?,?,?,?,?,?,?,?,1)",
    )
    .bind(&session.id)
    .bind(&session.user_id)
    .bind(&session.title)
    .bind(&session.description)
    .bind(session.game_type.as_str())
    .bind(&session.initial_prompt)
    .bind(to_millis(session.created_at))
    .bind(to_millis(session.last_activity))
    .execute(db_pool)
    .await?;

    Ok(session)
}

/// The session if it exists and belongs to `user_id`.
pub async fn get_owned(db_pool: &SqlitePool, user_id: &str, id: &str) -> AppResult<GameSession> {
    sqlx::query_as("SELECT * FROM game_sessions WHERE id=? AND user_id=?")
        .bind(id)
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?
        .ok_or_else(|| AppError::not_found("Game session not found"))
}

pub async fn list_sessions(db_pool: &SqlitePool, user_id: &str) -> sqlx::Result<Vec<GameSession>> {
    sqlx::query_as("SELECT * FROM game_sessions WHERE user_id=? ORDER BY last_activity DESC, id DESC")
        .bind(user_id)
        .fetch_all(db_pool)
        .await
}

pub async fn touch(db_pool: &SqlitePool, id: &str, at: OffsetDateTime) -> sqlx::Result<()> {
    sqlx::query("UPDATE game_sessions SET last_activity=? WHERE id=?")
        .bind(to_millis(at))
        .bind(id)
        .execute(db_pool)
        .await?;
    Ok(())
}

pub async fn append_message(
    db_pool: &SqlitePool,
    session: &GameSession,
    text: &str,
    is_from_user: bool,
    timestamp: OffsetDateTime,
) -> sqlx::Result<GameMessage> {
    let message = GameMessage {
        id: Uuid::now_v7().to_string(),
        session_id: session.id.clone(),
        user_id: session.user_id.clone(),
        text: text.to_owned(),
        is_from_user,
        timestamp,
    };

    sqlx::query("INSERT INTO game_messages (id,session_id,user_id,content,is_from_user,timestamp) VALUES (?,?,?,?,?,?)")
        .bind(&message.id)
        .bind(&message.session_id)
        .bind(&message.user_id)
        .bind(&message.text)
        .bind(message.is_from_user)
        .bind(to_millis(message.timestamp))
        .execute(db_pool)
        .await?;

    Ok(message)
}

/// A page of turns, oldest first.
pub async fn list_messages(db_pool: &SqlitePool, session_id: &str, limit: i64, offset: i64) -> sqlx::Result<Vec<GameMessage>> {
    sqlx::query_as("SELECT * FROM game_messages WHERE session_id=? ORDER BY timestamp, id LIMIT ? OFFSET ?")
        .bind(session_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(db_pool)
        .await
}

/// The last `n` turns, oldest first.
pub async fn recent_messages(db_pool: &SqlitePool, session_id: &str, n: i64) -> sqlx::Result<Vec<GameMessage>> {
    let mut messages: Vec<GameMessage> =
        sqlx::query_as("SELECT * FROM game_messages WHERE session_id=? ORDER BY timestamp DESC, id DESC LIMIT ?")
            .bind(session_id)
            .bind(n)
            .fetch_all(db_pool)
            .await?;
    messages.reverse();
    Ok(messages)
}

pub async fn delete_session(db_pool: &SqlitePool, user_id: &str, id: &str) -> AppResult<()> {
    let session = get_owned(db_pool, user_id, id).await?;

    let mut tx = db_pool.begin().await?;
    sqlx::query("DELETE FROM game_messages WHERE session_id=?")
        .bind(&session.id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM game_sessions WHERE id=?")
        .bind(&session.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;
    use crate::testing;

    #[tokio::test]
    async fn test_sessions_are_owner_scoped() {
        let db_pool = testing::memory_pool().await;
        let session = insert_session(&db_pool, "u1", "Word Ladder", "Change one letter", GameType::Custom, "words")
            .await
            .unwrap();

        assert!(get_owned(&db_pool, "u1", &session.id).await.is_ok());
        assert!(matches!(get_owned(&db_pool, "u2", &session.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(delete_session(&db_pool, "u2", &session.id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_recent_messages_oldest_first() {
        let db_pool = testing::memory_pool().await;
        let session = insert_session(&db_pool, "u1", "Riddles", "Guess", GameType::Generated, "").await.unwrap();
        let t0 = session.created_at;
        for i in 0..4 {
            append_message(&db_pool, &session, &format!("m{i}"), i % 2 == 1, t0 + Duration::seconds(i))
                .await
                .unwrap();
        }

        let texts: Vec<_> = recent_messages(&db_pool, &session.id, 3).await.unwrap().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, ["m1", "m2", "m3"]);
    }

    #[tokio::test]
    async fn test_delete_removes_messages() {
        let db_pool = testing::memory_pool().await;
        let session = insert_session(&db_pool, "u1", "Riddles", "Guess", GameType::Generated, "").await.unwrap();
        append_message(&db_pool, &session, "Welcome!", false, session.created_at).await.unwrap();

        delete_session(&db_pool, "u1", &session.id).await.unwrap();

        assert!(list_messages(&db_pool, &session.id, 50, 0).await.unwrap().is_empty());
        assert!(list_sessions(&db_pool, "u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sessions_listed_by_last_activity() {
        let db_pool = testing::memory_pool().await;
        let older = insert_session(&db_pool, "u1", "A", "a", GameType::Custom, "").await.unwrap();
        let newer = insert_session(&db_pool, "u1", "B", "b", GameType::Custom, "").await.unwrap();
        touch(&db_pool, &older.id, newer.last_activity + Duration::minutes(5)).await.unwrap();

        let titles: Vec<_> = list_sessions(&db_pool, "u1").await.unwrap().into_iter().map(|s| s.title).collect();
        assert_eq!(titles, ["A", "B"]);
    }
}
