use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::{GetField, UpstreamError};

use super::{AvatarDetails, AvatarService, AvatarSummary, AvatarTask, SessionInfo, SessionRequest, TaskMode, SERVICE};

const DEFAULT_VOICE: &str = "1776ddbd05374fa480e92f0297bbc67e";
const DEFAULT_RATE: f64 = 0.95;

pub struct HeyGen {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HeyGen {
    pub fn new(api_key: String, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            http_client: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: "https://api.heygen.com".to_owned(),
            api_key,
        })
    }

    /// POSTs `body` and returns the `data` object of the reply.
    async fn call(&self, path: &str, body: &impl Serialize) -> Result<Value, UpstreamError> {
        let response = self
            .http_client
            .post(format!("{}/{path}", self.base_url))
            .header("x-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(SERVICE, e))?;
        read_data(path, response).await
    }

    async fn fetch(&self, path: &str) -> Result<Value, UpstreamError> {
        let response = self
            .http_client
            .get(format!("{}/{path}", self.base_url))
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(SERVICE, e))?;
        read_data(path, response).await
    }
}

async fn read_data(path: &str, response: reqwest::Response) -> Result<Value, UpstreamError> {
    let status = response.status();
    if !status.is_success() {
        return Err(UpstreamError::new(SERVICE, format!("{path} returned status {status}")));
    }
    let mut body: Value = response
        .json()
        .await
        .map_err(|e| UpstreamError::from_reqwest(SERVICE, e))?;
    Ok(body.get_mut("data").map(Value::take).unwrap_or(Value::Null))
}

fn new_session_body(request: &SessionRequest) -> Value {
    let mut body = json!({
        "avatar_id": request.avatar_id,
        "version": request.version.as_deref().unwrap_or("v2"),
        "quality": "high",
        "voice": {
            "voice_id": request.voice.voice_id.as_deref().filter(|v| !v.is_empty()).unwrap_or(DEFAULT_VOICE),
            "rate": request.voice.rate.unwrap_or(DEFAULT_RATE),
        },
    });
    if let Some(disable) = request.disable_idle_timeout {
        body["disable_idle_timeout"] = json!(disable);
    }
    if let Some(timeout) = request.activity_idle_timeout {
        body["activity_idle_timeout"] = json!(timeout);
    }
    body
}

fn session_info(data: &Value) -> SessionInfo {
    let field = |name: &str| data.get_str_field(name).ok();
    SessionInfo {
        session_id: field("session_id"),
        token: field("token"),
        status: field("status"),
        avatar_id: field("avatar_id"),
        version: field("version"),
        url: field("url"),
        access_token: field("access_token"),
    }
}

fn avatar_task(data: &Value) -> AvatarTask {
    AvatarTask {
        task_id: data.get_str_field("task_id").ok(),
        duration_ms: data.get("duration_ms").and_then(Value::as_f64),
    }
}

fn public_avatars(data: &Value) -> Vec<AvatarSummary> {
    let Some(avatars) = data.as_array() else {
        return Vec::new();
    };
    avatars
        .iter()
        .filter(|a| a.get("is_public").and_then(Value::as_bool) == Some(true))
        .filter(|a| a.get_str_field("status").is_ok_and(|s| s == "ACTIVE"))
        .filter_map(|a| {
            Some(AvatarSummary {
                id: a.get_str_field("avatar_id").ok()?,
                preview_image_url: a.get_str_field("normal_preview").ok(),
                default_voice: a.get_str_field("default_voice").ok(),
                gender: a.get_str_field("gender").ok(),
            })
        })
        .collect()
}

fn avatar_details(data: &Value) -> AvatarDetails {
    AvatarDetails { preview_image_url: data.get_str_field("preview_image_url").ok() }
}

#[async_trait]
impl AvatarService for HeyGen {
    async fn create_token(&self) -> Result<String, UpstreamError> {
        let data = self.call("v1/streaming.create_token", &json!({})).await?;
        data.get_str_field("token")
            .map_err(|_| UpstreamError::new(SERVICE, "token missing from reply"))
    }

    async fn create_session(&self, request: &SessionRequest) -> Result<SessionInfo, UpstreamError> {
        let data = self.call("v1/streaming.new", &new_session_body(request)).await?;
        let info = session_info(&data);
        info!(session_id = info.session_id.as_deref(), "avatar session created");
        Ok(info)
    }

    async fn start_session(&self, session_id: &str) -> Result<Value, UpstreamError> {
        self.call("v1/streaming.start", &json!({ "session_id": session_id })).await
    }

    async fn send_task(&self, session_id: &str, text: &str, mode: TaskMode) -> Result<AvatarTask, UpstreamError> {
        let body = json!({ "session_id": session_id, "text": text, "task_type": mode.as_str() });
        let task = avatar_task(&self.call("v1/streaming.task", &body).await?);
        debug!(session_id, task_id = task.task_id.as_deref(), duration_ms = task.duration_ms, "avatar task sent");
        Ok(task)
    }

    async fn stop_session(&self, session_id: &str) -> Result<(), UpstreamError> {
        self.call("v1/streaming.stop", &json!({ "session_id": session_id })).await?;
        info!(session_id, "avatar session stopped");
        Ok(())
    }

    async fn list_avatars(&self) -> Result<Vec<AvatarSummary>, UpstreamError> {
        Ok(public_avatars(&self.fetch("v1/streaming/avatar.list").await?))
    }

    async fn avatar_details(&self, avatar_id: &str) -> Result<AvatarDetails, UpstreamError> {
        Ok(avatar_details(&self.fetch(&format!("v2/avatar/{avatar_id}/details")).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_body_defaults() {
        let body = new_session_body(&SessionRequest { avatar_id: Some("anna".into()), ..Default::default() });
        assert_eq!(body["version"], "v2");
        assert_eq!(body["voice"]["voice_id"], DEFAULT_VOICE);
        assert_eq!(body["voice"]["rate"], DEFAULT_RATE);
        assert!(body.get("disable_idle_timeout").is_none());
    }

    #[test]
    fn test_task_reply_parsing() {
        let task = avatar_task(&json!({ "task_id": "t-1", "duration_ms": 2150.5 }));
        assert_eq!(task, AvatarTask { task_id: Some("t-1".into()), duration_ms: Some(2150.5) });
        assert_eq!(avatar_task(&Value::Null), AvatarTask { task_id: None, duration_ms: None });
    }

    #[test]
    fn test_only_public_active_avatars_listed() {
        let data = json!([
            { "avatar_id": "a", "is_public": true, "status": "ACTIVE", "normal_preview": "https://img/a", "gender": "female" },
            { "avatar_id": "b", "is_public": false, "status": "ACTIVE" },
            { "avatar_id": "c", "is_public": true, "status": "INACTIVE" },
        ]);
        let avatars = public_avatars(&data);
        assert_eq!(avatars.len(), 1);
        assert_eq!(avatars[0].id, "a");
        assert_eq!(avatars[0].preview_image_url.as_deref(), Some("https://img/a"));
    }

    #[test]
    fn test_details_preview_image() {
        let details = avatar_details(&json!({ "id": "anna", "preview_image_url": "https://img/anna.webp" }));
        assert_eq!(details.preview_image_url.as_deref(), Some("https://img/anna.webp"));
        assert_eq!(avatar_details(&json!({ "preview_image_url": 7 })), AvatarDetails::default());
        assert_eq!(avatar_details(&Value::Null), AvatarDetails::default());
    }
}
