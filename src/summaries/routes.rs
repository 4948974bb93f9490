use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{Path, Query, State},
    response::Response,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use time::OffsetDateTime;

use crate::{auth::CurrentUser, connections, llm::TextGenerator, res, AppError, AppResult, AppState};

use super::{format_date, parse_date, parse_offset};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateRequest {
    date: String,
    #[serde(default)]
    timezone_offset_minutes: i32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OffsetQuery {
    #[serde(default)]
    timezone_offset_minutes: i32,
}

#[debug_handler(state = AppState)]
pub(crate) async fn list(
    State(db_pool): State<SqlitePool>,
    CurrentUser(viewer): CurrentUser,
    Path(user_id): Path<String>,
) -> AppResult<Response> {
    connections::ensure_can_view(&db_pool, &viewer.id, &user_id).await?;
    Ok(res::ok("Daily summaries retrieved", super::list(&db_pool, &user_id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn get(
    State(db_pool): State<SqlitePool>,
    CurrentUser(viewer): CurrentUser,
    Path((user_id, date)): Path<(String, String)>,
) -> AppResult<Response> {
    connections::ensure_can_view(&db_pool, &viewer.id, &user_id).await?;
    let summary = super::find(&db_pool, &user_id, parse_date(&date)?)
        .await?
        .ok_or_else(|| AppError::not_found("Daily summary not found"))?;
    Ok(res::ok("Daily summary retrieved", summary))
}

#[debug_handler(state = AppState)]
pub(crate) async fn generate(
    State(db_pool): State<SqlitePool>,
    State(llm): State<Arc<dyn TextGenerator>>,
    CurrentUser(viewer): CurrentUser,
    Path(user_id): Path<String>,
    Json(request): Json<GenerateRequest>,
) -> AppResult<Response> {
    connections::ensure_can_view(&db_pool, &viewer.id, &user_id).await?;
    let date = parse_date(&request.date)?;
    let offset = parse_offset(request.timezone_offset_minutes)?;

    let summary = super::generate(llm.as_ref(), &db_pool, &user_id, date, offset, OffsetDateTime::now_utc()).await?;
    Ok(res::created("Daily summary generated", summary))
}

#[debug_handler(state = AppState)]
pub(crate) async fn can_generate(
    State(db_pool): State<SqlitePool>,
    CurrentUser(viewer): CurrentUser,
    Path((user_id, date)): Path<(String, String)>,
    Query(OffsetQuery { timezone_offset_minutes }): Query<OffsetQuery>,
) -> AppResult<Response> {
    connections::ensure_can_view(&db_pool, &viewer.id, &user_id).await?;
    let date = parse_date(&date)?;
    let offset = parse_offset(timezone_offset_minutes)?;

    let can_generate = super::can_generate(&db_pool, &user_id, date, offset, OffsetDateTime::now_utc()).await?;
    let exists = super::find(&db_pool, &user_id, date).await?.is_some();
    Ok(res::ok(
        "Generation check complete",
        json!({ "canGenerate": can_generate, "exists": exists, "date": format_date(date) }),
    ))
}

#[debug_handler(state = AppState)]
pub(crate) async fn remove(
    State(db_pool): State<SqlitePool>,
    CurrentUser(viewer): CurrentUser,
    Path((user_id, date)): Path<(String, String)>,
) -> AppResult<Response> {
    connections::ensure_can_view(&db_pool, &viewer.id, &user_id).await?;
    super::delete(&db_pool, &user_id, parse_date(&date)?).await?;
    Ok(res::no_content())
}
