//! One model-written summary per user per calendar day, covering the
//! turns from noon of that day to just before noon the next.

mod analysis;
mod routes;

use axum::{
    routing::{get, post},
    Router,
};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqlitePool};
use time::{macros::format_description, macros::time, Date, Duration, OffsetDateTime, UtcOffset};
use tracing::info;
use uuid::Uuid;

use crate::{
    chat::store,
    db::{from_millis, to_millis},
    llm::TextGenerator,
    prompt, AppError, AppResult, AppState,
};

pub use analysis::{parse_analysis, Analysis, Scores};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{user_id}", get(routes::list))
        .route("/{user_id}/generate", post(routes::generate))
        .route("/{user_id}/can-generate/{date}", get(routes::can_generate))
        .route("/{user_id}/{date}", get(routes::get).delete(routes::remove))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySummary {
    pub id: String,
    pub user_id: String,
    pub date: String,
    pub summary: String,
    pub scores: Scores,
    pub analysis: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl FromRow<'_, SqliteRow> for DailySummary {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(DailySummary {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            date: row.try_get("summary_date")?,
            summary: row.try_get("summary")?,
            scores: Scores {
                health: row.try_get("health_score")?,
                exercise: row.try_get("exercise_score")?,
                mental: row.try_get("mental_score")?,
                social: row.try_get("social_score")?,
                productivity: row.try_get("productivity_score")?,
            },
            analysis: row.try_get("analysis")?,
            created_at: from_millis(row.try_get("created_at")?),
            updated_at: from_millis(row.try_get("updated_at")?),
        })
    }
}

pub fn format_date(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| date.to_string())
}

pub fn parse_date(raw: &str) -> AppResult<Date> {
    Date::parse(raw.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|_| AppError::validation("Date must be in YYYY-MM-DD format"))
}

/// Minutes east of UTC.
pub fn parse_offset(minutes: i32) -> AppResult<UtcOffset> {
    UtcOffset::from_whole_seconds(minutes.saturating_mul(60))
        .map_err(|_| AppError::validation("Invalid timezone offset"))
}

/// Inclusive bounds of the day's window: noon local time to one
/// millisecond before the next noon.
pub fn window(date: Date, offset: UtcOffset) -> (OffsetDateTime, OffsetDateTime) {
    let start = date.with_time(time!(12:00)).assume_offset(offset);
    (start, start + Duration::days(1) - Duration::milliseconds(1))
}

pub async fn find(db_pool: &SqlitePool, user_id: &str, date: Date) -> sqlx::Result<Option<DailySummary>> {
    sqlx::query_as("SELECT * FROM daily_summaries WHERE user_id=? AND summary_date=?")
        .bind(user_id)
        .bind(format_date(date))
        .fetch_optional(db_pool)
        .await
}

pub async fn list(db_pool: &SqlitePool, user_id: &str) -> sqlx::Result<Vec<DailySummary>> {
    sqlx::query_as("SELECT * FROM daily_summaries WHERE user_id=? ORDER BY summary_date DESC")
        .bind(user_id)
        .fetch_all(db_pool)
        .await
}

pub async fn delete(db_pool: &SqlitePool, user_id: &str, date: Date) -> AppResult<()> {
    let deleted = sqlx::query("DELETE FROM daily_summaries WHERE user_id=? AND summary_date=?")
        .bind(user_id)
        .bind(format_date(date))
        .execute(db_pool)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(AppError::not_found("Daily summary not found"));
    }
    Ok(())
}

/// A day can be summarised once it is over in the user's offset, if it has
/// no summary yet and at least one turn in its window.
pub async fn can_generate(
    db_pool: &SqlitePool,
    user_id: &str,
    date: Date,
    offset: UtcOffset,
    now: OffsetDateTime,
) -> AppResult<bool> {
    if date >= now.to_offset(offset).date() {
        return Ok(false);
    }
    if find(db_pool, user_id, date).await?.is_some() {
        return Ok(false);
    }
    let (start, end) = window(date, offset);
    Ok(!store::between(db_pool, user_id, start, end).await?.is_empty())
}

pub async fn generate(
    llm: &dyn TextGenerator,
    db_pool: &SqlitePool,
    user_id: &str,
    date: Date,
    offset: UtcOffset,
    now: OffsetDateTime,
) -> AppResult<DailySummary> {
    if !can_generate(db_pool, user_id, date, offset, now).await? {
        return Err(AppError::validation("Cannot generate summary for this date"));
    }

    let (start, end) = window(date, offset);
    let mut turns = store::between(db_pool, user_id, start, end).await?;
    for turn in &mut turns {
        turn.timestamp = turn.timestamp.to_offset(offset);
    }

    let reply = llm.generate(&prompt::daily_summary(date, &turns)).await?;
    let Analysis { summary, scores, analysis } = parse_analysis(&reply);

    let created_at = OffsetDateTime::now_utc();
    let daily = DailySummary {
        id: Uuid::now_v7().to_string(),
        user_id: user_id.to_owned(),
        date: format_date(date),
        summary,
        scores,
        analysis,
        created_at,
        updated_at: created_at,
    };

    sqlx::query(
        "INSERT INTO daily_summaries (id,user_id,summary_date,summary,health_score,exercise_score,mental_score,\
         social_score,productivity_score,analysis,created_at,updated_at) VALUES (?,?,?,?,?,?,?,?,?,?,?,?)",
    )
    .bind(&daily.id)
    .bind(&daily.user_id)
    .bind(&daily.date)
    .bind(&daily.summary)
    .bind(daily.scores.health)
    .bind(daily.scores.exercise)
    .bind(daily.scores.mental)
    .bind(daily.scores.social)
    .bind(daily.scores.productivity)
    .bind(&daily.analysis)
    .bind(to_millis(daily.created_at))
    .bind(to_millis(daily.updated_at))
    .execute(db_pool)
    .await?;

    info!(user_id, date = %daily.date, turns = turns.len(), "daily summary generated");
    Ok(daily)
}

#[cfg(test)]
mod tests {
    use time::macros::{date, datetime, offset};

    use super::*;
    use crate::testing::{self, FakeLlm};

    #[test]
    fn test_window_is_noon_to_noon_in_offset() {
        let (start, end) = window(date!(2025-03-01), offset!(+2));
        assert_eq!(start, datetime!(2025-03-01 10:00 UTC));
        assert_eq!(end, datetime!(2025-03-02 09:59:59.999 UTC));
    }

    #[tokio::test]
    async fn test_can_generate_rules() {
        let db_pool = testing::memory_pool().await;
        let day = date!(2025-03-01);
        let now = datetime!(2025-03-03 08:00 UTC);

        assert!(!can_generate(&db_pool, "u1", day, UtcOffset::UTC, now).await.unwrap());

        store::append(&db_pool, "u1", "Morning walk", true, datetime!(2025-03-01 11:59 UTC)).await.unwrap();
        assert!(!can_generate(&db_pool, "u1", day, UtcOffset::UTC, now).await.unwrap());

        store::append(&db_pool, "u1", "Lunch with Joan", true, datetime!(2025-03-01 12:30 UTC)).await.unwrap();
        assert!(can_generate(&db_pool, "u1", day, UtcOffset::UTC, now).await.unwrap());

        let today = now.date();
        assert!(!can_generate(&db_pool, "u1", today, UtcOffset::UTC, now).await.unwrap());
    }

    #[tokio::test]
    async fn test_generate_once_per_day() {
        let db_pool = testing::memory_pool().await;
        let now = datetime!(2025-03-03 08:00 UTC);
        store::append(&db_pool, "u1", "Went to the market", true, datetime!(2025-03-01 15:00 UTC)).await.unwrap();
        let llm = FakeLlm::replying(
            r#"{"summary": "A busy day", "scores": {"health": 12, "exercise": 0, "mental": 7}, "analysis": "Upbeat"}"#,
        );

        let daily = generate(&llm, &db_pool, "u1", date!(2025-03-01), UtcOffset::UTC, now).await.unwrap();
        assert_eq!(daily.date, "2025-03-01");
        assert_eq!(daily.scores, Scores { health: 10, exercise: 1, mental: 7, social: 5, productivity: 5 });
        assert!(llm.prompts()[0].contains("[15:00] User: Went to the market"));

        let again = generate(&llm, &db_pool, "u1", date!(2025-03-01), UtcOffset::UTC, now).await.unwrap_err();
        assert!(matches!(again, AppError::Validation(_)));
        assert_eq!(list(&db_pool, "u1").await.unwrap().len(), 1);
    }
}
