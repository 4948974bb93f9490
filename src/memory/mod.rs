mod insights;
mod notes;

use std::collections::HashSet;

use axum::{
    routing::{get, post},
    Router,
};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqlitePool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    db::{from_millis, to_millis},
    AppState,
};

pub use insights::{extract_and_store, parse_insights, Insights};

/// How many stored memories are considered when ranking for recall.
const RECALL_WINDOW: i64 = 200;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/add-core", post(notes::add_core))
        .route("/add-contextual", post(notes::add_contextual))
        .route("/core-information", get(notes::core_information))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    pub id: String,
    pub user_id: String,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl FromRow<'_, SqliteRow> for Memory {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Memory {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            content: row.try_get("content")?,
            created_at: from_millis(row.try_get("created_at")?),
        })
    }
}

pub async fn add(db_pool: &SqlitePool, user_id: &str, content: &str) -> sqlx::Result<Memory> {
    let memory = Memory {
        id: Uuid::now_v7().to_string(),
        user_id: user_id.to_owned(),
        content: content.trim().to_owned(),
        created_at: OffsetDateTime::now_utc(),
    };
    sqlx::query("INSERT INTO memories (id,user_id,content,created_at) VALUES (?,?,?,?)")
        .bind(&memory.id)
        .bind(&memory.user_id)
        .bind(&memory.content)
        .bind(to_millis(memory.created_at))
        .execute(db_pool)
        .await?;
    Ok(memory)
}

pub async fn recall(db_pool: &SqlitePool, user_id: &str, query: &str, top_k: usize) -> sqlx::Result<Vec<Memory>> {
    let memories: Vec<Memory> =
        sqlx::query_as("SELECT * FROM memories WHERE user_id=? ORDER BY created_at DESC LIMIT ?")
            .bind(user_id)
            .bind(RECALL_WINDOW)
            .fetch_all(db_pool)
            .await?;
    Ok(rank(memories, query, top_k))
}

/// Orders memories by the number of words they share with the query,
/// newest first among equals.
pub fn rank(mut memories: Vec<Memory>, query: &str, top_k: usize) -> Vec<Memory> {
    let query_words = words(query);
    memories.sort_by_cached_key(|m| {
        let shared = words(&m.content).intersection(&query_words).count();
        (std::cmp::Reverse(shared), std::cmp::Reverse(m.created_at))
    });
    memories.truncate(top_k);
    memories
}

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2)
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use time::{macros::datetime, Duration};

    use super::*;
    use crate::testing;

    fn memory(content: &str, minutes: i64) -> Memory {
        Memory {
            id: content.to_owned(),
            user_id: "u1".to_owned(),
            content: content.to_owned(),
            created_at: datetime!(2025-03-01 00:00 UTC) + Duration::minutes(minutes),
        }
    }

    #[test]
    fn test_rank_prefers_overlap_then_recency() {
        let ranked = rank(
            vec![
                memory("Went to the bakery", 1),
                memory("Granddaughter Lucy visited on Sunday", 2),
                memory("Watered the garden", 3),
                memory("Lucy is learning piano", 0),
            ],
            "how is lucy doing?",
            3,
        );
        let ids: Vec<_> = ranked.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(
            ids,
            ["Granddaughter Lucy visited on Sunday", "Lucy is learning piano", "Watered the garden"]
        );
    }

    #[tokio::test]
    async fn test_recall_is_scoped_to_user() {
        let db_pool = testing::memory_pool().await;
        add(&db_pool, "u1", "Likes tea with honey").await.unwrap();
        add(&db_pool, "u2", "Likes coffee").await.unwrap();

        let recalled = recall(&db_pool, "u1", "tea", 5).await.unwrap();
        assert_eq!(recalled.len(), 1);
        assert_eq!(recalled[0].content, "Likes tea with honey");
    }
}
