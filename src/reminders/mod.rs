mod extract;
mod routes;

use axum::{
    routing::{get, put},
    Router,
};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqlitePool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    db::{from_millis, to_millis},
    AppError, AppResult, AppState,
};

pub use extract::{extract_reminders, parse_extracted};

pub const PAGE_SIZE: u32 = 10;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(routes::list).post(routes::create))
        .route("/upcoming", get(routes::upcoming))
        .route("/{id}", put(routes::update).delete(routes::remove))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tag {
    Medication,
    Appointment,
    Event,
    Task,
    Personal,
    Work,
    Finance,
    Health,
    Travel,
    Social,
    Education,
    Leisure,
    Other,
}

impl Tag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::Medication => "MEDICATION",
            Tag::Appointment => "APPOINTMENT",
            Tag::Event => "EVENT",
            Tag::Task => "TASK",
            Tag::Personal => "PERSONAL",
            Tag::Work => "WORK",
            Tag::Finance => "FINANCE",
            Tag::Health => "HEALTH",
            Tag::Travel => "TRAVEL",
            Tag::Social => "SOCIAL",
            Tag::Education => "EDUCATION",
            Tag::Leisure => "LEISURE",
            Tag::Other => "OTHER",
        }
    }

    /// Unknown labels become `Other`.
    pub fn parse_lenient(s: &str) -> Tag {
        serde_json::from_value(serde_json::Value::String(s.trim().to_ascii_uppercase())).unwrap_or(Tag::Other)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Incomplete,
    Complete,
    Missed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Incomplete => "INCOMPLETE",
            Status::Complete => "COMPLETE",
            Status::Missed => "MISSED",
        }
    }

    fn parse(s: &str) -> Status {
        match s {
            "COMPLETE" => Status::Complete,
            "MISSED" => Status::Missed,
            _ => Status::Incomplete,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub tags: Vec<Tag>,
    pub status: Status,
}

impl FromRow<'_, SqliteRow> for Reminder {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let tags: String = row.try_get("tags")?;
        let status: String = row.try_get("status")?;
        Ok(Reminder {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            timestamp: from_millis(row.try_get("due_at")?),
            tags: serde_json::from_str(&tags).unwrap_or_default(),
            status: Status::parse(&status),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReminder {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
    pub tags: Option<Vec<Tag>>,
    pub status: Option<Status>,
}

fn tags_json(tags: &[Tag]) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_owned())
}

pub async fn insert(db_pool: &SqlitePool, user_id: &str, new: &NewReminder) -> AppResult<Reminder> {
    if new.title.trim().is_empty() {
        return Err(AppError::validation("Reminder title cannot be empty"));
    }
    let reminder = Reminder {
        id: Uuid::now_v7().to_string(),
        user_id: user_id.to_owned(),
        title: new.title.trim().to_owned(),
        description: new.description.clone().filter(|d| !d.trim().is_empty()),
        timestamp: new.timestamp,
        tags: if new.tags.is_empty() { vec![Tag::Other] } else { new.tags.clone() },
        status: Status::Incomplete,
    };

    sqlx::query("INSERT INTO reminders (id,user_id,title,description,due_at,tags,status) VALUES (?,?,?,?,?,?,?)")
        .bind(&reminder.id)
        .bind(&reminder.user_id)
        .bind(&reminder.title)
        .bind(&reminder.description)
        .bind(to_millis(reminder.timestamp))
        .bind(tags_json(&reminder.tags))
        .bind(reminder.status.as_str())
        .execute(db_pool)
        .await?;

    Ok(reminder)
}

/// Pages of ten, soonest first.
pub async fn list(db_pool: &SqlitePool, user_id: &str, page: u32) -> sqlx::Result<Vec<Reminder>> {
    sqlx::query_as("SELECT * FROM reminders WHERE user_id=? ORDER BY due_at, id LIMIT ? OFFSET ?")
        .bind(user_id)
        .bind(PAGE_SIZE as i64)
        .bind(page as i64 * PAGE_SIZE as i64)
        .fetch_all(db_pool)
        .await
}

pub async fn upcoming(db_pool: &SqlitePool, user_id: &str, now: OffsetDateTime, limit: u32) -> sqlx::Result<Vec<Reminder>> {
    sqlx::query_as(
        "SELECT * FROM reminders WHERE user_id=? AND due_at>=? AND status='INCOMPLETE' ORDER BY due_at LIMIT ?",
    )
    .bind(user_id)
    .bind(to_millis(now))
    .bind(limit as i64)
    .fetch_all(db_pool)
    .await
}

pub async fn get_owned(db_pool: &SqlitePool, user_id: &str, id: &str) -> AppResult<Reminder> {
    sqlx::query_as("SELECT * FROM reminders WHERE id=? AND user_id=?")
        .bind(id)
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?
        .ok_or_else(|| AppError::not_found("Reminder not found"))
}

pub async fn update(db_pool: &SqlitePool, user_id: &str, id: &str, patch: ReminderPatch) -> AppResult<Reminder> {
    let mut reminder = get_owned(db_pool, user_id, id).await?;
    if let Some(title) = patch.title {
        if title.trim().is_empty() {
            return Err(AppError::validation("Reminder title cannot be empty"));
        }
        reminder.title = title.trim().to_owned();
    }
    if let Some(description) = patch.description {
        reminder.description = Some(description).filter(|d| !d.trim().is_empty());
    }
    if let Some(timestamp) = patch.timestamp {
        reminder.timestamp = timestamp;
    }
    if let Some(tags) = patch.tags {
        reminder.tags = tags;
    }
    if let Some(status) = patch.status {
        reminder.status = status;
    }

    sqlx::query("UPDATE reminders SET title=?, description=?, due_at=?, tags=?, status=? WHERE id=?")
        .bind(&reminder.title)
        .bind(&reminder.description)
        .bind(to_millis(reminder.timestamp))
        .bind(tags_json(&reminder.tags))
        .bind(reminder.status.as_str())
        .bind(&reminder.id)
        .execute(db_pool)
        .await?;
    Ok(reminder)
}

pub async fn delete(db_pool: &SqlitePool, user_id: &str, id: &str) -> AppResult<()> {
    let deleted = sqlx::query("DELETE FROM reminders WHERE id=? AND user_id=?")
        .bind(id)
        .bind(user_id)
        .execute(db_pool)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(AppError::not_found("Reminder not found"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use time::{macros::datetime, Duration};

    use super::*;
    use crate::testing;

    fn new(title: &str, timestamp: OffsetDateTime) -> NewReminder {
        NewReminder { title: title.to_owned(), description: None, timestamp, tags: vec![] }
    }

    #[test]
    fn test_tag_parse_lenient() {
        assert_eq!(Tag::parse_lenient("medication"), Tag::Medication);
        assert_eq!(Tag::parse_lenient("Doctor"), Tag::Other);
    }

    #[tokio::test]
    async fn test_list_orders_by_due_time() {
        let db_pool = testing::memory_pool().await;
        let t0 = datetime!(2025-03-01 09:00 UTC);
        insert(&db_pool, "u1", &new("later", t0 + Duration::hours(2))).await.unwrap();
        insert(&db_pool, "u1", &new("sooner", t0)).await.unwrap();

        let titles: Vec<_> = list(&db_pool, "u1", 0).await.unwrap().into_iter().map(|r| r.title).collect();
        assert_eq!(titles, ["sooner", "later"]);
    }

    #[tokio::test]
    async fn test_upcoming_skips_past_and_done() {
        let db_pool = testing::memory_pool().await;
        let now = datetime!(2025-03-01 09:00 UTC);
        insert(&db_pool, "u1", &new("past", now - Duration::hours(1))).await.unwrap();
        let done = insert(&db_pool, "u1", &new("done", now + Duration::hours(1))).await.unwrap();
        insert(&db_pool, "u1", &new("next", now + Duration::hours(3))).await.unwrap();
        update(&db_pool, "u1", &done.id, ReminderPatch { status: Some(Status::Complete), ..Default::default() })
            .await
            .unwrap();

        let titles: Vec<_> = upcoming(&db_pool, "u1", now, 10).await.unwrap().into_iter().map(|r| r.title).collect();
        assert_eq!(titles, ["next"]);
    }

    #[tokio::test]
    async fn test_other_users_cannot_touch_reminder() {
        let db_pool = testing::memory_pool().await;
        let reminder = insert(&db_pool, "u1", &new("pills", OffsetDateTime::now_utc())).await.unwrap();
        assert_eq!(reminder.tags, [Tag::Other]);

        assert!(matches!(delete(&db_pool, "u2", &reminder.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(
            update(&db_pool, "u2", &reminder.id, ReminderPatch::default()).await,
            Err(AppError::NotFound(_))
        ));
        delete(&db_pool, "u1", &reminder.id).await.unwrap();
    }
}
