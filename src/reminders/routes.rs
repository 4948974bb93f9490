use axum::{
    debug_handler,
    extract::{Path, Query, State},
    response::Response,
    Json,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;

use crate::{auth::CurrentUser, res, AppResult, AppState};

use super::{NewReminder, ReminderPatch};

#[derive(Deserialize)]
pub(crate) struct PageQuery {
    #[serde(default)]
    page: u32,
}

#[debug_handler(state = AppState)]
pub(crate) async fn list(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    Query(PageQuery { page }): Query<PageQuery>,
) -> AppResult<Response> {
    Ok(res::ok("Reminders retrieved", super::list(&db_pool, &user.id, page).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn upcoming(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Response> {
    let reminders = super::upcoming(&db_pool, &user.id, OffsetDateTime::now_utc(), super::PAGE_SIZE).await?;
    Ok(res::ok("Upcoming reminders retrieved", reminders))
}

#[debug_handler(state = AppState)]
pub(crate) async fn create(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    Json(new): Json<NewReminder>,
) -> AppResult<Response> {
    Ok(res::created("Reminder created", super::insert(&db_pool, &user.id, &new).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn update(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Json(patch): Json<ReminderPatch>,
) -> AppResult<Response> {
    Ok(res::ok("Reminder updated", super::update(&db_pool, &user.id, &id, patch).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn remove(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    super::delete(&db_pool, &user.id, &id).await?;
    Ok(res::no_content())
}
