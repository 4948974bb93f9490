//! In-memory database and fake collaborators for unit and router tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use serde_json::{json, Value};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use time::OffsetDateTime;

use crate::{
    auth::{IdentityProvider, VerifiedIdentity},
    avatar::{AvatarDetails, AvatarService, AvatarSummary, AvatarTask, SessionInfo, SessionRequest, TaskMode},
    chat::Message,
    db::MIGRATOR,
    dispatch::{Dispatcher, PoolConfig, Workers},
    llm::TextGenerator,
    users::{self, FlowProgress, Role, User},
    weather::{Place, WeatherProvider, WeatherReport},
    AppError, AppResult, AppState, UpstreamError,
};

pub async fn memory_pool() -> SqlitePool {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    MIGRATOR.run(&db_pool).await.expect("migrations apply");
    db_pool
}

pub fn identity(subject_id: &str, name: &str) -> VerifiedIdentity {
    VerifiedIdentity {
        subject_id: subject_id.to_owned(),
        email: Some(format!("{subject_id}@example.com")),
        name: Some(name.to_owned()),
        picture_url: None,
    }
}

pub async fn user(db_pool: &SqlitePool, subject_id: &str, name: &str) -> User {
    users::create_from_identity(db_pool, &identity(subject_id, name))
        .await
        .expect("user created")
}

/// A user that never touches the database.
pub fn sample_user(name: &str, core_information: Option<&str>) -> User {
    User {
        id: "user-1".to_owned(),
        subject_id: "sub-1".to_owned(),
        email: None,
        full_name: Some(name.to_owned()),
        phone_number: None,
        address: None,
        date_of_birth: None,
        profile_image_url: None,
        blood_type: "N/A".to_owned(),
        gender: "N/A".to_owned(),
        core_information: core_information.map(str::to_owned),
        daily_life: None,
        relationships: None,
        medical_needs: None,
        hobbies: None,
        anything_else: None,
        role: Role::Elderly,
        flow: FlowProgress::default(),
        created_at: OffsetDateTime::UNIX_EPOCH,
    }
}

pub fn message(text: &str, is_from_user: bool, timestamp: OffsetDateTime) -> Message {
    Message {
        id: format!("msg-{}", timestamp.unix_timestamp()),
        user_id: "user-1".to_owned(),
        text: text.to_owned(),
        is_from_user,
        timestamp,
    }
}

/// Accepts `token-<subject>` and nothing else.
#[derive(Default)]
pub struct FakeIdentity;

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn verify(&self, credential: &str) -> AppResult<VerifiedIdentity> {
        match credential.strip_prefix("token-") {
            Some(subject_id) if !subject_id.is_empty() => Ok(identity(subject_id, subject_id)),
            _ => Err(AppError::unauthenticated("Invalid or expired token")),
        }
    }
}

pub fn bearer(subject_id: &str) -> String {
    format!("Bearer token-{subject_id}")
}

type Reply = dyn Fn(&str) -> Result<String, UpstreamError> + Send + Sync;

/// Records every prompt, then answers with the supplied closure.
pub struct FakeLlm {
    reply: Box<Reply>,
    prompts: Mutex<Vec<String>>,
}

impl FakeLlm {
    pub fn new(reply: impl Fn(&str) -> Result<String, UpstreamError> + Send + Sync + 'static) -> Self {
        Self { reply: Box::new(reply), prompts: Mutex::default() }
    }

    pub fn replying(text: &str) -> Self {
        let text = text.to_owned();
        Self::new(move |_| Ok(text.clone()))
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }
}

#[async_trait]
impl TextGenerator for FakeLlm {
    async fn generate(&self, prompt: &str) -> Result<String, UpstreamError> {
        self.prompts.lock().expect("prompts lock").push(prompt.to_owned());
        (self.reply)(prompt)
    }
}

#[derive(Default)]
pub struct FakeAvatar {
    failing: bool,
    spoken: Mutex<Vec<(String, String)>>,
    stopped: Mutex<Vec<String>>,
}

impl FakeAvatar {
    pub fn failing() -> Self {
        Self { failing: true, ..Default::default() }
    }

    /// `(session_id, text)` for every task sent.
    pub fn spoken(&self) -> Vec<(String, String)> {
        self.spoken.lock().expect("spoken lock").clone()
    }

    pub fn stopped(&self) -> Vec<String> {
        self.stopped.lock().expect("stopped lock").clone()
    }

    fn check(&self) -> Result<(), UpstreamError> {
        if self.failing {
            return Err(UpstreamError::new(crate::avatar::SERVICE, "status 503"));
        }
        Ok(())
    }
}

#[async_trait]
impl AvatarService for FakeAvatar {
    async fn create_token(&self) -> Result<String, UpstreamError> {
        self.check()?;
        Ok("stream-token".to_owned())
    }

    async fn create_session(&self, request: &SessionRequest) -> Result<SessionInfo, UpstreamError> {
        self.check()?;
        Ok(SessionInfo {
            session_id: Some("avatar-session".to_owned()),
            avatar_id: request.avatar_id.clone(),
            ..Default::default()
        })
    }

    async fn start_session(&self, session_id: &str) -> Result<Value, UpstreamError> {
        self.check()?;
        Ok(json!({ "session_id": session_id, "status": "started" }))
    }

    async fn send_task(&self, session_id: &str, text: &str, _mode: TaskMode) -> Result<AvatarTask, UpstreamError> {
        self.check()?;
        self.spoken
            .lock()
            .expect("spoken lock")
            .push((session_id.to_owned(), text.to_owned()));
        Ok(AvatarTask { task_id: Some("task-1".to_owned()), duration_ms: Some(1200.0) })
    }

    async fn stop_session(&self, session_id: &str) -> Result<(), UpstreamError> {
        self.check()?;
        self.stopped.lock().expect("stopped lock").push(session_id.to_owned());
        Ok(())
    }

    async fn list_avatars(&self) -> Result<Vec<AvatarSummary>, UpstreamError> {
        self.check()?;
        Ok(vec![AvatarSummary {
            id: "Anna_public".to_owned(),
            preview_image_url: None,
            default_voice: None,
            gender: Some("female".to_owned()),
        }])
    }

    async fn avatar_details(&self, avatar_id: &str) -> Result<AvatarDetails, UpstreamError> {
        self.check()?;
        Ok(AvatarDetails { preview_image_url: Some(format!("https://img.example/{avatar_id}.webp")) })
    }
}

/// Always reports a mild, sunny London.
pub struct FakeWeather;

#[async_trait]
impl WeatherProvider for FakeWeather {
    async fn current(&self, latitude: f64, longitude: f64) -> WeatherReport {
        let mut report = WeatherReport::fallback();
        report.weather.success = true;
        report.weather.message = None;
        report.location = Place {
            city: Some("London".to_owned()),
            lat: Some(latitude),
            lon: Some(longitude),
            ..Default::default()
        };
        report
    }
}

/// A fully wired application over fakes and an in-memory database.
pub struct TestApp {
    pub state: AppState,
    pub workers: Workers,
    pub llm: Arc<FakeLlm>,
    pub avatar: Arc<FakeAvatar>,
}

impl TestApp {
    pub async fn new(llm: FakeLlm, avatar: FakeAvatar) -> Self {
        let db_pool = memory_pool().await;
        let (dispatcher, workers) = Dispatcher::start(PoolConfig { workers: 2, queue_capacity: 16 });
        let (llm, avatar) = (Arc::new(llm), Arc::new(avatar));
        let state = AppState::new(
            db_pool,
            Arc::new(FakeIdentity),
            llm.clone(),
            avatar.clone(),
            Arc::new(FakeWeather),
            dispatcher,
        );
        Self { state, workers, llm, avatar }
    }

    pub fn router(&self) -> Router {
        crate::app(self.state.clone())
    }

    pub async fn settle(&self) {
        self.state.dispatcher.wait_idle().await;
    }
}
