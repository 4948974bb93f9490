pub mod appresult;
pub mod auth;
pub mod avatar;
pub mod chat;
pub mod config;
pub mod connections;
pub mod db;
pub mod dispatch;
pub mod games;
pub mod health;
pub mod llm;
pub mod locations;
pub mod memory;
pub mod notify;
pub mod orchestrator;
pub mod prompt;
pub mod reminders;
pub mod res;
pub mod summaries;
pub mod users;
pub mod weather;
pub mod ws;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

use std::sync::Arc;

use axum::{
    extract::{FromRef, Request},
    http::StatusCode,
    middleware,
    Router,
};
use serde_json::Value;
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use appresult::{AppError, AppResult, UpstreamError};

use auth::IdentityProvider;
use avatar::AvatarService;
use dispatch::Dispatcher;
use health::StartedAt;
use llm::TextGenerator;
use notify::Notifier;
use orchestrator::Orchestrator;
use weather::WeatherProvider;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub identity: Arc<dyn IdentityProvider>,
    pub llm: Arc<dyn TextGenerator>,
    pub avatar: Arc<dyn AvatarService>,
    pub weather: Arc<dyn WeatherProvider>,
    pub notifier: Notifier,
    pub dispatcher: Dispatcher,
    pub orchestrator: Orchestrator,
    pub avatar_sessions: avatar::Sessions,
    pub started_at: StartedAt,
}

impl AppState {
    /// Wires the orchestrator to the same collaborators the handlers see.
    pub fn new(
        db_pool: SqlitePool,
        identity: Arc<dyn IdentityProvider>,
        llm: Arc<dyn TextGenerator>,
        avatar: Arc<dyn AvatarService>,
        weather: Arc<dyn WeatherProvider>,
        dispatcher: Dispatcher,
    ) -> Self {
        let orchestrator = Orchestrator::new(llm.clone(), avatar.clone(), dispatcher.clone(), db_pool.clone());
        AppState {
            db_pool,
            identity,
            llm,
            avatar,
            weather,
            notifier: Notifier::new(64),
            dispatcher,
            orchestrator,
            avatar_sessions: avatar::Sessions::default(),
            started_at: StartedAt::now(),
        }
    }
}

pub fn app(state: AppState) -> Router {
    let protected = Router::new()
        .nest("/auth", auth::router())
        .nest("/memory", chat::router())
        .nest("/connections", connections::router())
        .nest("/ws", ws::router())
        .nest("/games", games::router())
        .nest("/daily-summaries", summaries::router())
        .nest("/users", users::router())
        .nest("/locations", locations::router())
        .nest("/weather", weather::router())
        .nest("/heygen", avatar::router())
        .nest("/reminders", reminders::router())
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_identity));

    Router::new()
        .merge(protected)
        .nest("/health", health::router())
        .fallback(|| async { res::failure(StatusCode::NOT_FOUND, "Route not found") })
        .with_state(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    user_id = tracing::field::Empty,
                )
            }),
        )
        .layer(CorsLayer::permissive())
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> Result<String, String>;
}

impl GetField for Value {
    fn get_str_field(&self, field: &str) -> Result<String, String> {
        Ok(self
            .get(field)
            .ok_or(format!("expected {field}"))?
            .as_str()
            .ok_or(format!("expected {field} to be string"))?
            .to_owned())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_get_str_field() {
        let body = json!({"name": "Ada", "age": 80});
        assert_eq!(body.get_str_field("name").unwrap(), "Ada");
        assert!(body.get_str_field("age").is_err());
        assert!(body.get_str_field("missing").is_err());
    }
}
