use axum::{
    debug_handler,
    extract::{Path, Query, State},
    response::Response,
};
use sqlx::SqlitePool;

use crate::{auth::CurrentUser, db::Paging, res, AppResult, AppState};

use super::store;

pub const PAGE_SIZE: u32 = 30;

#[debug_handler(state = AppState)]
pub(crate) async fn chats(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    Query(Paging { page, size }): Query<Paging>,
) -> AppResult<Response> {
    let size = size.unwrap_or(PAGE_SIZE).clamp(1, 100);
    Ok(res::ok("Chats retrieved", store::list(&db_pool, &user.id, page, size).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn remove(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    store::delete_by_id(&db_pool, &user.id, &id).await?;
    Ok(res::no_content())
}
