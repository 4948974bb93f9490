//! Streaming avatar sessions. The orchestrator only needs
//! [`AvatarService::send_task`]; the rest backs the `/heygen` routes the
//! client uses to open and close its session.

mod heygen;
mod routes;

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use axum::{
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::{AppState, UpstreamError};

pub use heygen::HeyGen;

pub const SERVICE: &str = "avatar";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/session-token", get(routes::session_token))
        .route("/create-session", post(routes::create_session))
        .route("/start-session", post(routes::start_session))
        .route("/task", post(routes::task))
        .route("/stop-session", post(routes::stop_session))
        .route("/avatar-list", get(routes::avatar_list))
        .route("/avatar-details", get(routes::avatar_details))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskMode {
    /// The avatar speaks the text verbatim.
    #[default]
    Repeat,
    /// The avatar treats the text as a prompt to its own model.
    Talk,
}

impl TaskMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskMode::Repeat => "repeat",
            TaskMode::Talk => "talk",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvatarTask {
    pub task_id: Option<String>,
    pub duration_ms: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSettings {
    pub voice_id: Option<String>,
    pub rate: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub avatar_id: Option<String>,
    pub version: Option<String>,
    #[serde(default)]
    pub voice: VoiceSettings,
    pub disable_idle_timeout: Option<bool>,
    pub activity_idle_timeout: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: Option<String>,
    pub token: Option<String>,
    pub status: Option<String>,
    pub avatar_id: Option<String>,
    pub version: Option<String>,
    pub url: Option<String>,
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvatarSummary {
    pub id: String,
    pub preview_image_url: Option<String>,
    pub default_voice: Option<String>,
    pub gender: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarDetails {
    pub preview_image_url: Option<String>,
}

#[async_trait]
pub trait AvatarService: Send + Sync {
    async fn create_token(&self) -> Result<String, UpstreamError>;

    async fn create_session(&self, request: &SessionRequest) -> Result<SessionInfo, UpstreamError>;

    async fn start_session(&self, session_id: &str) -> Result<Value, UpstreamError>;

    /// Makes the avatar in `session_id` speak `text`.
    async fn send_task(&self, session_id: &str, text: &str, mode: TaskMode) -> Result<AvatarTask, UpstreamError>;

    async fn stop_session(&self, session_id: &str) -> Result<(), UpstreamError>;

    /// Public avatars that are ready for streaming.
    async fn list_avatars(&self) -> Result<Vec<AvatarSummary>, UpstreamError>;

    async fn avatar_details(&self, avatar_id: &str) -> Result<AvatarDetails, UpstreamError>;
}

/// The one live streaming session per user.
#[derive(Clone, Default)]
pub struct Sessions {
    active: Arc<Mutex<HashMap<String, String>>>,
}

impl Sessions {
    /// Records `session_id` as the user's session and returns the one it
    /// replaces, if different.
    pub async fn replace(&self, user_id: &str, session_id: &str) -> Option<String> {
        self.active
            .lock()
            .await
            .insert(user_id.to_owned(), session_id.to_owned())
            .filter(|previous| previous != session_id)
    }

    /// Forgets `session_id` wherever it is registered.
    pub async fn forget(&self, session_id: &str) {
        self.active.lock().await.retain(|_, s| s != session_id);
    }

    pub async fn current(&self, user_id: &str) -> Option<String> {
        self.active.lock().await.get(user_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replace_returns_previous_session() {
        let sessions = Sessions::default();
        assert_eq!(sessions.replace("u1", "s1").await, None);
        assert_eq!(sessions.replace("u1", "s1").await, None);
        assert_eq!(sessions.replace("u1", "s2").await, Some("s1".to_owned()));
        assert_eq!(sessions.current("u1").await.as_deref(), Some("s2"));

        sessions.forget("s2").await;
        assert_eq!(sessions.current("u1").await, None);
    }

    #[test]
    fn test_task_mode_wire_names() {
        assert_eq!(serde_json::to_value(TaskMode::Repeat).unwrap(), "repeat");
        let mode: TaskMode = serde_json::from_str("\"talk\"").unwrap();
        assert_eq!(mode.as_str(), "talk");
    }
}
