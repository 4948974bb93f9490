use axum::{debug_handler, extract::State, response::Response, Json};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::info;

use crate::{
    res,
    users::{self, Role},
    AppError, AppResult, AppState,
};

use super::CurrentUser;

#[derive(Deserialize)]
pub(crate) struct RoleRequest {
    role: String,
}

pub(crate) fn parse_assignable(raw: &str) -> AppResult<Role> {
    match Role::parse(raw) {
        Some(role @ (Role::Elderly | Role::Caregiver)) => Ok(role),
        _ => Err(AppError::validation("Invalid role. Must be 'ELDERLY' or 'CAREGIVER'.")),
    }
}

#[debug_handler(state = AppState)]
pub(crate) async fn update_role(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    Json(RoleRequest { role }): Json<RoleRequest>,
) -> AppResult<Response> {
    let role = parse_assignable(&role)?;
    users::set_role(&db_pool, &user.id, role).await?;
    info!(user_id = %user.id, role = role.as_str(), "role updated");
    Ok(res::no_content())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_elderly_or_caregiver_assignable() {
        assert_eq!(parse_assignable("elderly").unwrap(), Role::Elderly);
        assert_eq!(parse_assignable("CAREGIVER").unwrap(), Role::Caregiver);
        assert!(parse_assignable("NONE").is_err());
        assert!(parse_assignable("admin").is_err());
    }
}
