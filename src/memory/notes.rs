use axum::{debug_handler, extract::State, response::Response, Json};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;

use crate::{auth::CurrentUser, res, users, AppError, AppResult, AppState};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CoreRequest {
    #[serde(default)]
    core_information: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ContextualRequest {
    #[serde(default)]
    contextual_memory: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn add_core(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    Json(CoreRequest { core_information }): Json<CoreRequest>,
) -> AppResult<Response> {
    if core_information.trim().is_empty() {
        return Err(AppError::validation("Core information cannot be empty"));
    }
    users::append_core_information(&db_pool, &user.id, &core_information).await?;
    Ok(res::ok("Core information stored", json!({ "coreInformation": core_information.trim() })))
}

#[debug_handler(state = AppState)]
pub(crate) async fn add_contextual(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    Json(ContextualRequest { contextual_memory }): Json<ContextualRequest>,
) -> AppResult<Response> {
    if contextual_memory.trim().is_empty() {
        return Err(AppError::validation("Contextual memory cannot be empty"));
    }
    let memory = super::add(&db_pool, &user.id, &contextual_memory).await?;
    Ok(res::created("Contextual memory stored", memory))
}

#[debug_handler(state = AppState)]
pub(crate) async fn core_information(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Response> {
    let user = users::require(&db_pool, &user.id).await?;
    Ok(res::ok(
        "Core information retrieved",
        json!({ "coreInformation": user.core_information().unwrap_or_default() }),
    ))
}
