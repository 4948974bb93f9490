use axum::{
    debug_handler,
    extract::{Query, State},
    response::Response,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqlitePool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::CurrentUser,
    connections,
    db::{from_millis, to_millis, Paging},
    res, AppError, AppResult, AppState,
};

const PAGE_SIZE: u32 = 10;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(history).post(record))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: String,
    pub user_id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl FromRow<'_, SqliteRow> for Location {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Location {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            latitude: row.try_get("latitude")?,
            longitude: row.try_get("longitude")?,
            timestamp: from_millis(row.try_get("timestamp")?),
        })
    }
}

pub async fn insert(
    db_pool: &SqlitePool,
    user_id: &str,
    latitude: f64,
    longitude: f64,
    timestamp: OffsetDateTime,
) -> AppResult<Location> {
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(AppError::validation("Latitude or longitude out of range"));
    }

    let location = Location {
        id: Uuid::now_v7().to_string(),
        user_id: user_id.to_owned(),
        latitude,
        longitude,
        timestamp,
    };
    sqlx::query("INSERT INTO locations (id,user_id,latitude,longitude,timestamp) VALUES (?,?,?,?,?)")
        .bind(&location.id)
        .bind(&location.user_id)
        .bind(location.latitude)
        .bind(location.longitude)
        .bind(to_millis(location.timestamp))
        .execute(db_pool)
        .await?;
    Ok(location)
}

/// Newest first.
pub async fn list(db_pool: &SqlitePool, user_id: &str, limit: i64, offset: i64) -> sqlx::Result<Vec<Location>> {
    sqlx::query_as("SELECT * FROM locations WHERE user_id=? ORDER BY timestamp DESC LIMIT ? OFFSET ?")
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(db_pool)
        .await
}

#[derive(Deserialize)]
pub(crate) struct NewLocation {
    latitude: f64,
    longitude: f64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    timestamp: Option<OffsetDateTime>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HistoryQuery {
    user_id: Option<String>,
    #[serde(default)]
    page: u32,
    size: Option<u32>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn record(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    Json(new): Json<NewLocation>,
) -> AppResult<Response> {
    let timestamp = new.timestamp.unwrap_or_else(OffsetDateTime::now_utc);
    let location = insert(&db_pool, &user.id, new.latitude, new.longitude, timestamp).await?;
    Ok(res::created("Location saved", location))
}

#[debug_handler(state = AppState)]
pub(crate) async fn history(
    State(db_pool): State<SqlitePool>,
    CurrentUser(viewer): CurrentUser,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Response> {
    let target = query.user_id.as_deref().unwrap_or(&viewer.id);
    connections::ensure_can_view(&db_pool, &viewer.id, target).await?;

    let paging = Paging { page: query.page, size: query.size };
    let (limit, offset) = paging.limit_offset(PAGE_SIZE);
    Ok(res::ok("Locations retrieved", list(&db_pool, target, limit, offset).await?))
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::testing;

    #[tokio::test]
    async fn test_list_is_newest_first_and_paged() {
        let db_pool = testing::memory_pool().await;
        insert(&db_pool, "u1", 51.5, -0.12, datetime!(2025-03-01 09:00 UTC)).await.unwrap();
        insert(&db_pool, "u1", 51.6, -0.13, datetime!(2025-03-01 11:00 UTC)).await.unwrap();
        insert(&db_pool, "u1", 51.7, -0.14, datetime!(2025-03-01 10:00 UTC)).await.unwrap();
        insert(&db_pool, "u2", 40.0, 3.0, datetime!(2025-03-01 12:00 UTC)).await.unwrap();

        let first = list(&db_pool, "u1", 2, 0).await.unwrap();
        assert_eq!(first.iter().map(|l| l.latitude).collect::<Vec<_>>(), vec![51.6, 51.7]);
        let rest = list(&db_pool, "u1", 2, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].timestamp, datetime!(2025-03-01 09:00 UTC));
    }

    #[tokio::test]
    async fn test_out_of_range_rejected() {
        let db_pool = testing::memory_pool().await;
        let err = insert(&db_pool, "u1", 91.0, 0.0, OffsetDateTime::now_utc()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
