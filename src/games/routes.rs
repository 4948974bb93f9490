use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{Path, Query, State},
    response::Response,
    Json,
};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{auth::CurrentUser, db::Paging, llm::TextGenerator, res, AppResult, AppState};

use super::GameType;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateRequest {
    game_type: GameType,
    user_description: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct MessageRequest {
    #[serde(default)]
    message: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn preview(
    State(llm): State<Arc<dyn TextGenerator>>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Response> {
    Ok(res::ok("Game preview generated", super::preview(llm.as_ref(), &user).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn create(
    State(llm): State<Arc<dyn TextGenerator>>,
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<CreateRequest>,
) -> AppResult<Response> {
    let session = super::create(
        llm.as_ref(),
        &db_pool,
        &user,
        request.game_type,
        request.user_description.as_deref(),
    )
    .await?;
    Ok(res::created("Game session created", session))
}

#[debug_handler(state = AppState)]
pub(crate) async fn sessions(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Response> {
    Ok(res::ok("Game sessions retrieved", super::list_sessions(&db_pool, &user.id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn session(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    Ok(res::ok("Game session retrieved", super::get_owned(&db_pool, &user.id, &id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn message(
    State(llm): State<Arc<dyn TextGenerator>>,
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Json(MessageRequest { message }): Json<MessageRequest>,
) -> AppResult<Response> {
    let answer = super::play_turn(llm.as_ref(), &db_pool, &user, &id, &message).await?;
    Ok(res::ok("Game message processed", answer))
}

#[debug_handler(state = AppState)]
pub(crate) async fn messages(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Query(paging): Query<Paging>,
) -> AppResult<Response> {
    let session = super::get_owned(&db_pool, &user.id, &id).await?;
    let (limit, offset) = paging.limit_offset(50);
    Ok(res::ok("Game messages retrieved", super::list_messages(&db_pool, &session.id, limit, offset).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn remove(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    super::delete_session(&db_pool, &user.id, &id).await?;
    Ok(res::no_content())
}
