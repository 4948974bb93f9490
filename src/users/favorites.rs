use axum::{debug_handler, extract::State, response::Response, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

use crate::{auth::CurrentUser, res, AppResult, AppState};

const MAX_PER_KIND: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum FavoriteKind {
    Caregiver,
    Elderly,
}

impl FavoriteKind {
    fn as_str(&self) -> &'static str {
        match self {
            FavoriteKind::Caregiver => "caregiver",
            FavoriteKind::Elderly => "elderly",
        }
    }
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Favorites {
    favorite_caregiver_ids: Vec<String>,
    favorite_elderly_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ToggleRequest {
    target_user_id: String,
    #[serde(rename = "type")]
    kind: FavoriteKind,
}

pub(crate) async fn load(db_pool: &SqlitePool, user_id: &str) -> sqlx::Result<Favorites> {
    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT target_id,kind FROM favorites WHERE user_id=? ORDER BY rowid")
            .bind(user_id)
            .fetch_all(db_pool)
            .await?;

    let mut favorites = Favorites::default();
    for (target_id, kind) in rows {
        match kind.as_str() {
            "caregiver" => favorites.favorite_caregiver_ids.push(target_id),
            _ => favorites.favorite_elderly_ids.push(target_id),
        }
    }
    Ok(favorites)
}

/// Removes the target if present, otherwise adds it while fewer than two
/// favourites of that kind exist.
pub(crate) async fn toggle_favorite(
    db_pool: &SqlitePool,
    user_id: &str,
    target_id: &str,
    kind: FavoriteKind,
) -> sqlx::Result<Favorites> {
    let removed = sqlx::query("DELETE FROM favorites WHERE user_id=? AND target_id=? AND kind=?")
        .bind(user_id)
        .bind(target_id)
        .bind(kind.as_str())
        .execute(db_pool)
        .await?
        .rows_affected();

    if removed == 0 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM favorites WHERE user_id=? AND kind=?")
            .bind(user_id)
            .bind(kind.as_str())
            .fetch_one(db_pool)
            .await?;

        if count < MAX_PER_KIND {
            sqlx::query("INSERT INTO favorites (user_id,target_id,kind) VALUES (?,?,?)")
                .bind(user_id)
                .bind(target_id)
                .bind(kind.as_str())
                .execute(db_pool)
                .await?;
        } else {
            info!(user_id, kind = kind.as_str(), "favourite limit reached");
        }
    }

    load(db_pool, user_id).await
}

#[debug_handler(state = AppState)]
pub(crate) async fn list(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Response> {
    Ok(res::ok("Favorites", load(&db_pool, &user.id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn toggle(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    Json(ToggleRequest { target_user_id, kind }): Json<ToggleRequest>,
) -> AppResult<Response> {
    let favorites = toggle_favorite(&db_pool, &user.id, &target_user_id, kind).await?;
    Ok(res::ok("Favorites updated", favorites))
}
