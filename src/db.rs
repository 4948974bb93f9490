use std::str::FromStr;

use serde::Deserialize;
use sqlx::{
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use time::OffsetDateTime;

pub static MIGRATOR: Migrator = sqlx::migrate!();

pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect_with(options)
        .await?;
    MIGRATOR.run(&db_pool).await?;
    Ok(db_pool)
}

/// Timestamps are stored as unix milliseconds.
pub fn to_millis(t: OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn from_millis(ms: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paging {
    #[serde(default)]
    pub page: u32,
    pub size: Option<u32>,
}

impl Paging {
    pub fn limit_offset(&self, default_size: u32) -> (i64, i64) {
        let size = self.size.unwrap_or(default_size).clamp(1, 100) as i64;
        (size, self.page as i64 * size)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn test_millis_roundtrip_keeps_precision() {
        let t = datetime!(2025-03-01 10:15:30.123 UTC);
        assert_eq!(from_millis(to_millis(t)), t);
    }

    #[test]
    fn test_paging_bounds() {
        let paging = Paging { page: 2, size: None };
        assert_eq!(paging.limit_offset(30), (30, 60));
        let paging = Paging { page: 0, size: Some(1000) };
        assert_eq!(paging.limit_offset(10), (100, 0));
    }
}
