//! Caregiver ↔ elderly links. A pair has at most one active (pending or
//! approved) connection; approval and rejection are terminal.

mod routes;

use axum::{
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqlitePool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    db::{from_millis, to_millis},
    users::User,
    AppError, AppResult, AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/request", post(routes::request))
        .route("/pending", get(routes::pending))
        .route("/approve", post(routes::approve))
        .route("/reject", post(routes::reject))
        .route("/elderly-list", get(routes::elderly_list))
        .route("/caregiver-list", get(routes::caregiver_list))
        .route("/unsync", delete(routes::unsync))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Pending,
    Approved,
    Rejected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Pending => "pending",
            ConnectionStatus::Approved => "approved",
            ConnectionStatus::Rejected => "rejected",
        }
    }

    fn parse(s: &str) -> ConnectionStatus {
        match s {
            "approved" => ConnectionStatus::Approved,
            "rejected" => ConnectionStatus::Rejected,
            _ => ConnectionStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: String,
    pub caregiver_id: String,
    pub elderly_id: String,
    pub status: ConnectionStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub confirmed_at: Option<OffsetDateTime>,
}

impl FromRow<'_, SqliteRow> for Connection {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let status: String = row.try_get("status")?;
        let confirmed_at: Option<i64> = row.try_get("confirmed_at")?;
        Ok(Connection {
            id: row.try_get("id")?,
            caregiver_id: row.try_get("caregiver_id")?,
            elderly_id: row.try_get("elderly_id")?,
            status: ConnectionStatus::parse(&status),
            created_at: from_millis(row.try_get("created_at")?),
            confirmed_at: confirmed_at.map(from_millis),
        })
    }
}

pub async fn find_active(db_pool: &SqlitePool, caregiver_id: &str, elderly_id: &str) -> sqlx::Result<Option<Connection>> {
    sqlx::query_as(
        "SELECT * FROM connections WHERE caregiver_id=? AND elderly_id=? AND status IN ('pending','approved')",
    )
    .bind(caregiver_id)
    .bind(elderly_id)
    .fetch_optional(db_pool)
    .await
}

/// Returns the pair's active connection, creating a pending one if there
/// is none. The flag is true when this call created it.
pub async fn request(db_pool: &SqlitePool, caregiver_id: &str, elderly_id: &str) -> AppResult<(Connection, bool)> {
    if caregiver_id == elderly_id {
        return Err(AppError::validation("Cannot connect to yourself"));
    }

    let created = sqlx::query(
        "INSERT OR IGNORE INTO connections (id,caregiver_id,elderly_id,status,created_at) VALUES (?,?,?,'pending',?)",
    )
    .bind(Uuid::now_v7().to_string())
    .bind(caregiver_id)
    .bind(elderly_id)
    .bind(to_millis(OffsetDateTime::now_utc()))
    .execute(db_pool)
    .await?
    .rows_affected()
        == 1;

    let connection = find_active(db_pool, caregiver_id, elderly_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("active connection vanished after insert"))?;
    Ok((connection, created))
}

pub async fn find(db_pool: &SqlitePool, id: &str) -> AppResult<Connection> {
    sqlx::query_as("SELECT * FROM connections WHERE id=?")
        .bind(id)
        .fetch_optional(db_pool)
        .await?
        .ok_or_else(|| AppError::not_found("Connection not found"))
}

/// Moves a pending connection addressed to `elderly_id` to `status`.
pub async fn decide(
    db_pool: &SqlitePool,
    elderly_id: &str,
    id: &str,
    status: ConnectionStatus,
) -> AppResult<Connection> {
    let connection = find(db_pool, id).await?;
    if connection.elderly_id != elderly_id {
        return Err(AppError::not_found("Connection not found"));
    }

    let confirmed_at = OffsetDateTime::now_utc();
    let updated = sqlx::query("UPDATE connections SET status=?, confirmed_at=? WHERE id=? AND status='pending'")
        .bind(status.as_str())
        .bind(to_millis(confirmed_at))
        .bind(id)
        .execute(db_pool)
        .await?
        .rows_affected();
    if updated == 0 {
        return Err(AppError::validation("Connection is no longer pending"));
    }

    Ok(Connection { status, confirmed_at: Some(confirmed_at), ..connection })
}

pub async fn pending_for(db_pool: &SqlitePool, elderly_id: &str) -> sqlx::Result<Vec<Connection>> {
    sqlx::query_as("SELECT * FROM connections WHERE elderly_id=? AND status='pending' ORDER BY created_at")
        .bind(elderly_id)
        .fetch_all(db_pool)
        .await
}

pub async fn connected_elderly(db_pool: &SqlitePool, caregiver_id: &str) -> sqlx::Result<Vec<User>> {
    sqlx::query_as(
        "SELECT u.* FROM users u JOIN connections c ON c.elderly_id=u.id \
         WHERE c.caregiver_id=? AND c.status='approved' ORDER BY c.confirmed_at",
    )
    .bind(caregiver_id)
    .fetch_all(db_pool)
    .await
}

pub async fn connected_caregivers(db_pool: &SqlitePool, elderly_id: &str) -> sqlx::Result<Vec<User>> {
    sqlx::query_as(
        "SELECT u.* FROM users u JOIN connections c ON c.caregiver_id=u.id \
         WHERE c.elderly_id=? AND c.status='approved' ORDER BY c.confirmed_at",
    )
    .bind(elderly_id)
    .fetch_all(db_pool)
    .await
}

/// Whether `user` has at least one approved connection on either side.
pub async fn has_approved(db_pool: &SqlitePool, user: &User) -> sqlx::Result<bool> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM connections WHERE (caregiver_id=? OR elderly_id=?) AND status='approved'",
    )
    .bind(&user.id)
    .bind(&user.id)
    .fetch_one(db_pool)
    .await?;
    Ok(count > 0)
}

/// A user can read their own records and those of elderly users who
/// approved them as caregiver.
pub async fn can_view(db_pool: &SqlitePool, viewer_id: &str, target_id: &str) -> sqlx::Result<bool> {
    if viewer_id == target_id {
        return Ok(true);
    }
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM connections WHERE caregiver_id=? AND elderly_id=? AND status='approved'",
    )
    .bind(viewer_id)
    .bind(target_id)
    .fetch_one(db_pool)
    .await?;
    Ok(count > 0)
}

pub async fn ensure_can_view(db_pool: &SqlitePool, viewer_id: &str, target_id: &str) -> AppResult<()> {
    if can_view(db_pool, viewer_id, target_id).await? {
        Ok(())
    } else {
        Err(AppError::not_found("User not found"))
    }
}

/// Removes the pair's active connection.
pub async fn remove(db_pool: &SqlitePool, caregiver_id: &str, elderly_id: &str) -> AppResult<()> {
    let deleted = sqlx::query(
        "DELETE FROM connections WHERE caregiver_id=? AND elderly_id=? AND status IN ('pending','approved')",
    )
    .bind(caregiver_id)
    .bind(elderly_id)
    .execute(db_pool)
    .await?
    .rows_affected();
    if deleted == 0 {
        return Err(AppError::not_found("Connection not found"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[tokio::test]
    async fn test_at_most_one_active_connection_per_pair() {
        let db_pool = testing::memory_pool().await;

        let (first, created) = request(&db_pool, "carer", "elder").await.unwrap();
        assert!(created);
        let (again, created) = request(&db_pool, "carer", "elder").await.unwrap();
        assert!(!created);
        assert_eq!(first.id, again.id);

        decide(&db_pool, "elder", &first.id, ConnectionStatus::Approved).await.unwrap();
        let (still, created) = request(&db_pool, "carer", "elder").await.unwrap();
        assert!(!created);
        assert_eq!(still.status, ConnectionStatus::Approved);

        let duplicate = sqlx::query(
            "INSERT INTO connections (id,caregiver_id,elderly_id,status,created_at) VALUES ('x','carer','elder','pending',0)",
        )
        .execute(&db_pool)
        .await;
        assert!(duplicate.is_err());
    }

    #[tokio::test]
    async fn test_rejection_is_terminal_and_frees_the_pair() {
        let db_pool = testing::memory_pool().await;
        let (pending, _) = request(&db_pool, "carer", "elder").await.unwrap();

        let err = decide(&db_pool, "carer", &pending.id, ConnectionStatus::Approved).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let rejected = decide(&db_pool, "elder", &pending.id, ConnectionStatus::Rejected).await.unwrap();
        assert!(rejected.confirmed_at.is_some());
        let err = decide(&db_pool, "elder", &pending.id, ConnectionStatus::Approved).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let (fresh, created) = request(&db_pool, "carer", "elder").await.unwrap();
        assert!(created);
        assert_ne!(fresh.id, pending.id);
    }

    #[tokio::test]
    async fn test_find_by_id() {
        let db_pool = testing::memory_pool().await;
        let (pending, _) = request(&db_pool, "carer", "elder").await.unwrap();

        let found = find(&db_pool, &pending.id).await.unwrap();
        assert_eq!(found.caregiver_id, "carer");
        assert_eq!(found.status, ConnectionStatus::Pending);
        let err = find(&db_pool, "missing").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_visibility_follows_approval() {
        let db_pool = testing::memory_pool().await;
        let carer = testing::user(&db_pool, "sub-c", "Carer").await;
        let elder = testing::user(&db_pool, "sub-e", "Elder").await;

        assert!(can_view(&db_pool, &elder.id, &elder.id).await.unwrap());
        let (connection, _) = request(&db_pool, &carer.id, &elder.id).await.unwrap();
        assert!(!can_view(&db_pool, &carer.id, &elder.id).await.unwrap());

        decide(&db_pool, &elder.id, &connection.id, ConnectionStatus::Approved).await.unwrap();
        assert!(can_view(&db_pool, &carer.id, &elder.id).await.unwrap());
        assert!(!can_view(&db_pool, &elder.id, &carer.id).await.unwrap());
        assert!(has_approved(&db_pool, &elder).await.unwrap());

        let names: Vec<_> = connected_elderly(&db_pool, &carer.id)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect();
        assert_eq!(names, [elder.id.clone()]);

        remove(&db_pool, &carer.id, &elder.id).await.unwrap();
        assert!(matches!(remove(&db_pool, &carer.id, &elder.id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_self_connection_rejected() {
        let db_pool = testing::memory_pool().await;
        let err = request(&db_pool, "same", "same").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
