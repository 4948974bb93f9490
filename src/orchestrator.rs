//! Per-request sequencing of text generation and avatar animation.
//!
//! Every flow is linear: generate, optionally animate, then hand trailing
//! side effects to the [`Dispatcher`]. Generation and animation failures
//! abort the request; background units only ever log.

use std::{future::Future, sync::Arc, time::Instant};

use serde::Serialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{
    avatar::{AvatarService, AvatarTask, TaskMode},
    chat::store,
    dispatch::{Dispatcher, TaskHandle},
    games,
    llm::TextGenerator,
    memory, prompt, reminders,
    users::User,
    AppError, AppResult,
};

/// Recalled memories rendered into a chat prompt.
const RECALL_TOP_K: usize = 5;
/// Turns of chat history rendered into a chat prompt.
const HISTORY_TURNS: u32 = 10;
/// Upcoming reminders rendered into a chat prompt.
const UPCOMING_REMINDERS: u32 = 10;

/// Text plus the avatar task that speaks it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub text: String,
    pub duration_ms: Option<f64>,
    pub task_id: Option<String>,
}

impl Reply {
    fn new(text: String, task: AvatarTask) -> Self {
        Reply { text, duration_ms: task.duration_ms, task_id: task.task_id }
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    llm: Arc<dyn TextGenerator>,
    avatar: Arc<dyn AvatarService>,
    dispatcher: Dispatcher,
    db_pool: SqlitePool,
}

fn required<'a>(value: &'a str, what: &str) -> AppResult<&'a str> {
    match value.trim() {
        "" => Err(AppError::validation(format!("{what} is required"))),
        v => Ok(v),
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn TextGenerator>,
        avatar: Arc<dyn AvatarService>,
        dispatcher: Dispatcher,
        db_pool: SqlitePool,
    ) -> Self {
        Self { llm, avatar, dispatcher, db_pool }
    }

    /// Queues a background unit. Submission failures are logged, never
    /// returned: the response is already decided by the time this runs.
    async fn background<F>(&self, name: &'static str, unit: F) -> Option<TaskHandle>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        match self.dispatcher.submit(name, unit).await {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(task = name, error = %err, "background unit not submitted");
                None
            }
        }
    }

    async fn generate(&self, user: &User, flow: &'static str, prompt: &str) -> AppResult<String> {
        let started = Instant::now();
        let text = self.llm.generate(prompt).await?;
        info!(user_id = %user.id, flow, step = "generate", elapsed_ms = elapsed_ms(started), "text generated");
        Ok(text)
    }

    async fn animate(&self, user: &User, flow: &'static str, session_id: &str, text: &str) -> AppResult<AvatarTask> {
        let started = Instant::now();
        let task = self.avatar.send_task(session_id, text, TaskMode::Repeat).await?;
        info!(user_id = %user.id, flow, step = "animate", elapsed_ms = elapsed_ms(started), "avatar animated");
        Ok(task)
    }

    async fn chat_prompt(&self, user: &User, message: &str, location: Option<&str>, now: OffsetDateTime) -> AppResult<String> {
        let memories = memory::recall(&self.db_pool, &user.id, message, RECALL_TOP_K).await?;
        let history = store::recent(&self.db_pool, &user.id, HISTORY_TURNS).await?;
        let upcoming = reminders::upcoming(&self.db_pool, &user.id, now, UPCOMING_REMINDERS).await?;

        Ok(prompt::chat(&prompt::ChatContext {
            today: now.date(),
            core_information: user.core_information(),
            memories: &memories,
            history: &history,
            reminders: &upcoming,
            location,
            question: message,
        }))
    }

    /// Persists the exchange and runs both extractors, each as its own unit.
    async fn after_exchange(&self, user: &User, message: &str, reply: &str, asked_at: OffsetDateTime) {
        let answered_at = OffsetDateTime::now_utc();

        let (db_pool, user_id) = (self.db_pool.clone(), user.id.clone());
        let (question, answer) = (message.to_owned(), reply.to_owned());
        self.background("persist-exchange", async move {
            store::append(&db_pool, &user_id, &question, true, asked_at).await?;
            store::append(&db_pool, &user_id, &answer, false, answered_at).await?;
            Ok(())
        })
        .await;

        let (llm, db_pool, user_id) = (self.llm.clone(), self.db_pool.clone(), user.id.clone());
        let (question, answer) = (message.to_owned(), reply.to_owned());
        self.background("extract-insights", async move {
            memory::extract_and_store(llm.as_ref(), &db_pool, &user_id, &question, &answer).await
        })
        .await;

        let (llm, db_pool, user_id) = (self.llm.clone(), self.db_pool.clone(), user.id.clone());
        let question = message.to_owned();
        self.background("extract-reminders", async move {
            reminders::extract_reminders(llm.as_ref(), &db_pool, &user_id, &question, asked_at).await?;
            Ok(())
        })
        .await;
    }

    /// Text-only chat turn.
    pub async fn ask(&self, user: &User, message: &str, location: Option<&str>) -> AppResult<String> {
        let started = Instant::now();
        let message = required(message, "Message")?;
        let asked_at = OffsetDateTime::now_utc();

        let prompt = self.chat_prompt(user, message, location, asked_at).await?;
        let text = self.generate(user, "ask", &prompt).await?;
        self.after_exchange(user, message, &text, asked_at).await;

        info!(user_id = %user.id, flow = "ask", elapsed_ms = elapsed_ms(started), "request complete");
        Ok(text)
    }

    /// Chat turn spoken by the avatar in `session_id`.
    pub async fn ask_avatar(
        &self,
        user: &User,
        message: &str,
        session_id: &str,
        location: Option<&str>,
    ) -> AppResult<Reply> {
        let started = Instant::now();
        let message = required(message, "Message")?;
        let session_id = required(session_id, "Session ID")?;
        let asked_at = OffsetDateTime::now_utc();

        let prompt = self.chat_prompt(user, message, location, asked_at).await?;
        let text = self.generate(user, "ask-avatar", &prompt).await?;
        let task = self.animate(user, "ask-avatar", session_id, &text).await?;
        self.after_exchange(user, message, &text, asked_at).await;

        info!(user_id = %user.id, flow = "ask-avatar", elapsed_ms = elapsed_ms(started), "request complete");
        Ok(Reply::new(text, task))
    }

    /// Greeting on app entry: first contact when there is no history,
    /// otherwise a continuation of the last conversation. Only the
    /// assistant turn is stored.
    pub async fn auto_greet(&self, user: &User, session_id: &str) -> AppResult<Reply> {
        let started = Instant::now();
        let session_id = required(session_id, "Session ID")?;
        let now = OffsetDateTime::now_utc();

        let recent = store::recent(&self.db_pool, &user.id, prompt::GREETING_WINDOW).await?;
        let prompt = prompt::auto_greeting(user, &recent, now);
        let text = self.generate(user, "auto-greet", &prompt).await?;
        let task = self.animate(user, "auto-greet", session_id, &text).await?;

        let (db_pool, user_id, greeting) = (self.db_pool.clone(), user.id.clone(), text.clone());
        self.background("persist-greeting", async move {
            store::append(&db_pool, &user_id, &greeting, false, OffsetDateTime::now_utc()).await?;
            Ok(())
        })
        .await;

        info!(
            user_id = %user.id,
            flow = "auto-greet",
            returning = !recent.is_empty(),
            elapsed_ms = elapsed_ms(started),
            "request complete"
        );
        Ok(Reply::new(text, task))
    }

    /// One game master turn, spoken by the avatar. The game exchange is
    /// stored by the game service itself.
    pub async fn game_turn(
        &self,
        user: &User,
        game_session_id: &str,
        message: &str,
        session_id: &str,
    ) -> AppResult<Reply> {
        let started = Instant::now();
        let game_session_id = required(game_session_id, "Game session ID")?;
        let session_id = required(session_id, "Session ID")?;

        let step = Instant::now();
        let answer = games::play_turn(self.llm.as_ref(), &self.db_pool, user, game_session_id, message).await?;
        info!(user_id = %user.id, flow = "game-turn", step = "generate", elapsed_ms = elapsed_ms(step), "game turn played");
        let task = self.animate(user, "game-turn", session_id, &answer.text).await?;

        info!(user_id = %user.id, flow = "game-turn", elapsed_ms = elapsed_ms(started), "request complete");
        Ok(Reply::new(answer.text, task))
    }

    /// Welcome message after onboarding. The welcome becomes the first
    /// assistant turn; the introduction feeds insight extraction.
    pub async fn introduce(&self, user: &User, introduction: &str) -> AppResult<String> {
        let started = Instant::now();
        let introduction = required(introduction, "Introduction")?;

        let text = self.generate(user, "introduce", &prompt::welcome(user, introduction)).await?;
        store::append(&self.db_pool, &user.id, &text, false, OffsetDateTime::now_utc()).await?;

        let (llm, db_pool, user_id) = (self.llm.clone(), self.db_pool.clone(), user.id.clone());
        let (intro, welcome) = (introduction.to_owned(), text.clone());
        self.background("extract-insights", async move {
            memory::extract_and_store(llm.as_ref(), &db_pool, &user_id, &intro, &welcome).await
        })
        .await;

        info!(user_id = %user.id, flow = "introduce", elapsed_ms = elapsed_ms(started), "request complete");
        Ok(text)
    }
}
