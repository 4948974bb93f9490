use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{Query, State},
    response::Response,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::{auth::CurrentUser, res, AppError, AppResult, AppState};

use super::{AvatarDetails, AvatarService, SessionRequest, Sessions, TaskMode};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionRef {
    #[serde(default)]
    session_id: String,
}

impl SessionRef {
    fn required(self) -> AppResult<String> {
        match self.session_id.trim() {
            "" => Err(AppError::validation("Session ID is required")),
            id => Ok(id.to_owned()),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TaskRequest {
    #[serde(default)]
    session_id: String,
    #[serde(default)]
    text: String,
    #[serde(default = "talk")]
    task_type: TaskMode,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DetailsQuery {
    #[serde(default)]
    avatar_id: String,
}

fn talk() -> TaskMode {
    TaskMode::Talk
}

#[debug_handler(state = AppState)]
pub(crate) async fn session_token(State(avatar): State<Arc<dyn AvatarService>>) -> AppResult<Response> {
    Ok(res::ok("Session token created", avatar.create_token().await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn create_session(
    State(avatar): State<Arc<dyn AvatarService>>,
    Json(request): Json<SessionRequest>,
) -> AppResult<Response> {
    Ok(res::ok("Session created", avatar.create_session(&request).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn start_session(
    State(avatar): State<Arc<dyn AvatarService>>,
    State(sessions): State<Sessions>,
    CurrentUser(user): CurrentUser,
    Json(session): Json<SessionRef>,
) -> AppResult<Response> {
    let session_id = session.required()?;

    if let Some(previous) = sessions.replace(&user.id, &session_id).await {
        info!(user_id = %user.id, previous = %previous, "stopping previous avatar session");
        if let Err(err) = avatar.stop_session(&previous).await {
            warn!(error = %err, previous = %previous, "could not stop previous avatar session");
        }
    }

    Ok(res::ok("Session started", avatar.start_session(&session_id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn task(
    State(avatar): State<Arc<dyn AvatarService>>,
    Json(TaskRequest { session_id, text, task_type }): Json<TaskRequest>,
) -> AppResult<Response> {
    let session_id = SessionRef { session_id }.required()?;
    if text.trim().is_empty() {
        return Err(AppError::validation("Text is required"));
    }
    Ok(res::ok("Task sent to avatar", avatar.send_task(&session_id, &text, task_type).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn stop_session(
    State(avatar): State<Arc<dyn AvatarService>>,
    State(sessions): State<Sessions>,
    Json(session): Json<SessionRef>,
) -> AppResult<Response> {
    let session_id = session.required()?;
    avatar.stop_session(&session_id).await?;
    sessions.forget(&session_id).await;
    Ok(res::envelope::<()>(axum::http::StatusCode::OK, "Session stopped", None))
}

#[debug_handler(state = AppState)]
pub(crate) async fn avatar_list(State(avatar): State<Arc<dyn AvatarService>>) -> AppResult<Response> {
    let avatars = avatar.list_avatars().await?;
    Ok(res::ok("Avatars retrieved", json!({ "avatars": avatars })))
}

/// An upstream failure yields an empty preview rather than an error.
#[debug_handler(state = AppState)]
pub(crate) async fn avatar_details(
    State(avatar): State<Arc<dyn AvatarService>>,
    Query(DetailsQuery { avatar_id }): Query<DetailsQuery>,
) -> AppResult<Response> {
    let avatar_id = avatar_id.trim();
    if avatar_id.is_empty() {
        return Err(AppError::validation("Avatar ID is required"));
    }
    let details = avatar.avatar_details(avatar_id).await.unwrap_or_else(|err| {
        warn!(error = %err, avatar_id, "could not fetch avatar details");
        AvatarDetails::default()
    });
    Ok(res::ok("Avatar details retrieved", details))
}
