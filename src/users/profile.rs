use axum::{debug_handler, extract::State, response::Response, Json};
use serde::Deserialize;
use sqlx::SqlitePool;
use time::{macros::format_description, Date};
use tracing::info;

use crate::{auth::CurrentUser, res, AppError, AppResult, AppState};

use super::Role;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<String>,
    pub phone_number: Option<String>,
    pub profile_image_url: Option<String>,
    pub blood_type: Option<String>,
    pub gender: Option<String>,
    pub daily_life: Option<String>,
    pub relationships: Option<String>,
    pub medical_needs: Option<String>,
    pub hobbies: Option<String>,
    pub anything_else: Option<String>,
}

impl ProfileUpdate {
    pub fn validate(&self) -> AppResult<()> {
        if !self.date_of_birth.as_deref().is_some_and(is_valid_date) {
            return Err(AppError::validation("Date of birth must be in YYYY-MM-DD format"));
        }
        if !self.phone_number.as_deref().is_some_and(is_valid_phone) {
            return Err(AppError::validation("Invalid phone number format"));
        }
        if !has_text(&self.full_name) {
            return Err(AppError::validation("Full name is required"));
        }
        if !has_text(&self.address) {
            return Err(AppError::validation("Address is required"));
        }
        Ok(())
    }
}

fn has_text(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|s| !s.trim().is_empty())
}

fn is_valid_date(s: &str) -> bool {
    s.len() == 10 && Date::parse(s, format_description!("[year]-[month]-[day]")).is_ok()
}

fn is_valid_phone(s: &str) -> bool {
    (7..=20).contains(&s.chars().count())
        && s.chars().all(|c| c.is_ascii_digit() || "+-() ".contains(c))
}

/// Folds the onboarding answers of an elderly user into their profile notes.
pub fn build_core_information(update: &ProfileUpdate) -> String {
    [
        ("Daily Life", &update.daily_life),
        ("Relationships", &update.relationships),
        ("Medical Needs", &update.medical_needs),
        ("Hobbies", &update.hobbies),
        ("Additional Info", &update.anything_else),
    ]
    .into_iter()
    .filter(|(_, value)| has_text(value))
    .filter_map(|(label, value)| value.as_deref().map(|v| format!("{label}: {}. ", v.trim())))
    .collect()
}

#[debug_handler(state = AppState)]
pub(crate) async fn update_profile(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    Json(update): Json<ProfileUpdate>,
) -> AppResult<Response> {
    update.validate()?;

    let core_information = match user.role {
        Role::Elderly => Some(build_core_information(&update)),
        _ => user.core_information.clone(),
    };

    sqlx::query(
        "UPDATE users SET full_name=?, address=?, date_of_birth=?, phone_number=?, profile_image_url=?, \
         blood_type=COALESCE(?, blood_type), gender=COALESCE(?, gender), \
         daily_life=?, relationships=?, medical_needs=?, hobbies=?, anything_else=?, core_information=?, \
         step1_completed=1, current_profile_step=2, highest_step_reached=MAX(highest_step_reached, 2) \
         WHERE id=?",
    )
    .bind(update.full_name.as_deref().map(str::trim))
    .bind(update.address.as_deref().map(str::trim))
    .bind(&update.date_of_birth)
    .bind(&update.phone_number)
    .bind(&update.profile_image_url)
    .bind(&update.blood_type)
    .bind(&update.gender)
    .bind(&update.daily_life)
    .bind(&update.relationships)
    .bind(&update.medical_needs)
    .bind(&update.hobbies)
    .bind(&update.anything_else)
    .bind(core_information)
    .bind(&user.id)
    .execute(&db_pool)
    .await?;

    info!(user_id = %user.id, "profile updated");
    let user = super::require(&db_pool, &user.id).await?;
    Ok(res::ok("Profile updated successfully", user))
}
