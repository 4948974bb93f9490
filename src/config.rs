use std::{str::FromStr, time::Duration};

use anyhow::{anyhow, Context};

use crate::dispatch::PoolConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_url: String,
    pub firebase_api_key: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub avatar_api_key: String,
    pub weather_api_key: Option<String>,
    pub pool: PoolConfig,
    pub http_timeout: Duration,
}

impl Config {
    /// Reads the process environment, with `.env` loaded first when present.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow!("{key} must be set"))
        };
        let defaults = PoolConfig::default();

        Ok(Config {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_owned()),
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| "sqlite://companion.db".to_owned()),
            firebase_api_key: required("FIREBASE_API_KEY")?,
            gemini_api_key: required("GEMINI_API_KEY")?,
            gemini_model: lookup("GEMINI_MODEL").unwrap_or_else(|| "gemini-2.0-flash".to_owned()),
            avatar_api_key: required("AVATAR_STREAMING_API_KEY")?,
            weather_api_key: lookup("WEATHER_API_KEY").filter(|v| !v.trim().is_empty()),
            pool: PoolConfig {
                workers: parsed(&lookup, "WORKER_COUNT", defaults.workers)?,
                queue_capacity: parsed(&lookup, "TASK_QUEUE_CAPACITY", defaults.queue_capacity)?,
            },
            http_timeout: Duration::from_secs(parsed(&lookup, "HTTP_TIMEOUT_SECS", 30)?),
        })
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("{key} is not valid: {raw}")),
        None => Ok(default),
    }
}
