use std::time::Instant;

use axum::{debug_handler, extract::State, http::StatusCode, response::Response, routing::get, Router};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::warn;

use crate::{res, AppState};

/// When the process started serving.
#[derive(Debug, Clone, Copy)]
pub struct StartedAt(pub Instant);

impl StartedAt {
    pub fn now() -> Self {
        Self(Instant::now())
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub database: &'static str,
}

pub async fn ping(db_pool: &SqlitePool, started_at: StartedAt) -> Health {
    let database = match sqlx::query("SELECT 1").execute(db_pool).await {
        Ok(_) => "ok",
        Err(err) => {
            warn!(error = %err, "database ping failed");
            "unreachable"
        }
    };
    Health {
        status: if database == "ok" { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: started_at.0.elapsed().as_secs(),
        database,
    }
}

#[debug_handler(state = AppState)]
async fn health(State(db_pool): State<SqlitePool>, State(started_at): State<StartedAt>) -> Response {
    let health = ping(&db_pool, started_at).await;
    if health.database == "ok" {
        res::ok("Service healthy", health)
    } else {
        res::envelope(StatusCode::SERVICE_UNAVAILABLE, "Service degraded", Some(health))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[tokio::test]
    async fn test_ping_reports_database_state() {
        let db_pool = testing::memory_pool().await;
        let health = ping(&db_pool, StartedAt::now()).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.database, "ok");

        db_pool.close().await;
        let health = ping(&db_pool, StartedAt::now()).await;
        assert_eq!(health.status, "degraded");
    }
}
