mod favorites;
mod flow;
mod profile;

use axum::{
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqlitePool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::VerifiedIdentity,
    db::{from_millis, to_millis},
    AppError, AppResult, AppState,
};

pub use flow::FlowProgress;
pub use profile::{build_core_information, ProfileUpdate};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", put(profile::update_profile))
        .route("/profile-flow/status", get(flow::status))
        .route("/profile-flow/step", put(flow::step))
        .route("/profile-flow/step/back", put(flow::back))
        .route("/profile-flow/complete", post(flow::complete))
        .route("/profile-flow/should-show", get(flow::should_show))
        .route("/favorites", get(favorites::list))
        .route("/favorites/toggle", post(favorites::toggle))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    None,
    Elderly,
    Caregiver,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::None => "NONE",
            Role::Elderly => "ELDERLY",
            Role::Caregiver => "CAREGIVER",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NONE" => Some(Role::None),
            "ELDERLY" => Some(Role::Elderly),
            "CAREGIVER" => Some(Role::Caregiver),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub subject_id: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<String>,
    pub profile_image_url: Option<String>,
    pub blood_type: String,
    pub gender: String,
    pub core_information: Option<String>,
    pub daily_life: Option<String>,
    pub relationships: Option<String>,
    pub medical_needs: Option<String>,
    pub hobbies: Option<String>,
    pub anything_else: Option<String>,
    pub role: Role,
    #[serde(skip)]
    pub flow: FlowProgress,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl User {
    pub fn display_name(&self) -> Option<&str> {
        self.full_name.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }

    pub fn first_name(&self) -> Option<&str> {
        self.display_name().and_then(|n| n.split_whitespace().next())
    }

    pub fn core_information(&self) -> Option<&str> {
        self.core_information.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }
}

impl FromRow<'_, SqliteRow> for User {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let role: String = row.try_get("role")?;
        Ok(User {
            id: row.try_get("id")?,
            subject_id: row.try_get("subject_id")?,
            email: row.try_get("email")?,
            full_name: row.try_get("full_name")?,
            phone_number: row.try_get("phone_number")?,
            address: row.try_get("address")?,
            date_of_birth: row.try_get("date_of_birth")?,
            profile_image_url: row.try_get("profile_image_url")?,
            blood_type: row.try_get("blood_type")?,
            gender: row.try_get("gender")?,
            core_information: row.try_get("core_information")?,
            daily_life: row.try_get("daily_life")?,
            relationships: row.try_get("relationships")?,
            medical_needs: row.try_get("medical_needs")?,
            hobbies: row.try_get("hobbies")?,
            anything_else: row.try_get("anything_else")?,
            role: Role::parse(&role).unwrap_or(Role::None),
            flow: FlowProgress {
                current_step: row.try_get("current_profile_step")?,
                highest_step_reached: row.try_get("highest_step_reached")?,
                step1_completed: row.try_get("step1_completed")?,
                step2_completed: row.try_get("step2_completed")?,
                step3_completed: row.try_get("step3_completed")?,
                flow_completed: row.try_get("flow_completed")?,
            },
            created_at: from_millis(row.try_get("created_at")?),
        })
    }
}

pub async fn find_by_subject(db_pool: &SqlitePool, subject_id: &str) -> sqlx::Result<Option<User>> {
    sqlx::query_as("SELECT * FROM users WHERE subject_id=?")
        .bind(subject_id)
        .fetch_optional(db_pool)
        .await
}

pub async fn find_by_id(db_pool: &SqlitePool, id: &str) -> sqlx::Result<Option<User>> {
    sqlx::query_as("SELECT * FROM users WHERE id=?")
        .bind(id)
        .fetch_optional(db_pool)
        .await
}

pub async fn require(db_pool: &SqlitePool, id: &str) -> AppResult<User> {
    find_by_id(db_pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))
}

/// Inserts a user for a newly seen identity. Concurrent first requests for
/// the same subject converge on one row.
pub async fn create_from_identity(db_pool: &SqlitePool, identity: &VerifiedIdentity) -> sqlx::Result<User> {
    sqlx::query(
        "INSERT INTO users (id,subject_id,email,full_name,profile_image_url,role,created_at) \
         VALUES (?,?,?,?,?,'NONE',?) ON CONFLICT(subject_id) DO NOTHING",
    )
    .bind(Uuid::now_v7().to_string())
    .bind(&identity.subject_id)
    .bind(&identity.email)
    .bind(&identity.name)
    .bind(&identity.picture_url)
    .bind(to_millis(OffsetDateTime::now_utc()))
    .execute(db_pool)
    .await?;

    find_by_subject(db_pool, &identity.subject_id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)
}

pub async fn set_role(db_pool: &SqlitePool, id: &str, role: Role) -> sqlx::Result<()> {
    sqlx::query("UPDATE users SET role=? WHERE id=?")
        .bind(role.as_str())
        .bind(id)
        .execute(db_pool)
        .await?;
    Ok(())
}

/// Appends a sentence to the profile notes unless it is already there.
/// Returns whether anything changed.
pub async fn append_core_information(db_pool: &SqlitePool, id: &str, fact: &str) -> AppResult<bool> {
    let fact = fact.trim();
    if fact.is_empty() {
        return Ok(false);
    }
    let user = require(db_pool, id).await?;
    let current = user.core_information().unwrap_or_default();
    if current.to_lowercase().contains(&fact.to_lowercase()) {
        return Ok(false);
    }

    let sentence = if fact.ends_with('.') { fact.to_owned() } else { format!("{fact}.") };
    let updated = if current.is_empty() { sentence } else { format!("{current} {sentence}") };
    sqlx::query("UPDATE users SET core_information=? WHERE id=?")
        .bind(updated)
        .bind(id)
        .execute(db_pool)
        .await?;
    Ok(true)
}
