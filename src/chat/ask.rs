use axum::{debug_handler, extract::State, response::Response, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{auth::CurrentUser, orchestrator::Orchestrator, res, AppResult, AppState};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AskRequest {
    #[serde(default)]
    message: String,
    #[serde(default)]
    session_id: String,
    #[serde(default)]
    game_session_id: String,
    location: Option<Value>,
}

impl AskRequest {
    /// Clients send either a place name or a `{latitude, longitude, ...}`
    /// object; both end up as one line in the prompt.
    fn location(&self) -> Option<String> {
        match self.location.as_ref()? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.trim().to_owned()),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct IntroduceRequest {
    #[serde(default)]
    introduction: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn ask(
    State(orchestrator): State<Orchestrator>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<AskRequest>,
) -> AppResult<Response> {
    let location = request.location();
    let text = orchestrator.ask(&user, &request.message, location.as_deref()).await?;
    Ok(res::ok("AI response", json!({ "text": text })))
}

#[debug_handler(state = AppState)]
pub(crate) async fn ask_avatar(
    State(orchestrator): State<Orchestrator>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<AskRequest>,
) -> AppResult<Response> {
    let location = request.location();
    let reply = orchestrator
        .ask_avatar(&user, &request.message, &request.session_id, location.as_deref())
        .await?;
    Ok(res::ok("AI and avatar response", reply))
}

#[debug_handler(state = AppState)]
pub(crate) async fn ask_auto_avatar(
    State(orchestrator): State<Orchestrator>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<AskRequest>,
) -> AppResult<Response> {
    let reply = orchestrator.auto_greet(&user, &request.session_id).await?;
    Ok(res::ok("AI auto and avatar response", reply))
}

#[debug_handler(state = AppState)]
pub(crate) async fn ask_game_avatar(
    State(orchestrator): State<Orchestrator>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<AskRequest>,
) -> AppResult<Response> {
    let reply = orchestrator
        .game_turn(&user, &request.game_session_id, &request.message, &request.session_id)
        .await?;
    Ok(res::ok("AI game and avatar response", reply))
}

#[debug_handler(state = AppState)]
pub(crate) async fn introduce(
    State(orchestrator): State<Orchestrator>,
    CurrentUser(user): CurrentUser,
    Json(IntroduceRequest { introduction }): Json<IntroduceRequest>,
) -> AppResult<Response> {
    let welcome = orchestrator.introduce(&user, &introduction).await?;
    Ok(res::created("Welcome message generated", json!({ "text": welcome })))
}
