use axum::{
    debug_handler,
    extract::{Query, State},
    response::Response,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;

use crate::{auth::CurrentUser, connections, res, AppError, AppResult, AppState};

use super::Role;

/// Onboarding progress. Elderly users finish at step 3 (profile, extra
/// details, sync), caregivers at step 2 (profile, sync).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowProgress {
    pub current_step: i64,
    pub highest_step_reached: i64,
    pub step1_completed: bool,
    pub step2_completed: bool,
    pub step3_completed: bool,
    pub flow_completed: bool,
}

impl FlowProgress {
    pub fn advance(&mut self, step: i64, role: Role) {
        self.current_step = step;
        self.highest_step_reached = self.highest_step_reached.max(step);
        if step >= 2 {
            self.step2_completed = true;
        }
        if step >= 3 {
            self.step3_completed = true;
        }
        match role {
            Role::Caregiver if step >= 2 => self.flow_completed = true,
            Role::Elderly if step >= 3 => self.flow_completed = true,
            _ => {}
        }
    }

    /// Moves the cursor only; the highest step reached is kept.
    pub fn go_back(&mut self, step: i64) {
        self.current_step = step;
    }

    pub fn should_show(&self, role: Role, has_connections: bool) -> bool {
        if self.flow_completed && has_connections {
            return false;
        }
        if !self.step1_completed {
            return true;
        }
        match role {
            Role::Elderly if !self.step3_completed => return true,
            Role::Caregiver if !self.step2_completed => return true,
            _ => {}
        }
        !has_connections
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct StepQuery {
    step: i64,
}

fn checked(step: i64) -> AppResult<i64> {
    if (1..=3).contains(&step) {
        Ok(step)
    } else {
        Err(AppError::validation("Step must be between 1 and 3"))
    }
}

async fn save(db_pool: &SqlitePool, user_id: &str, flow: &FlowProgress) -> sqlx::Result<()> {
    sqlx::query(
        "UPDATE users SET current_profile_step=?, highest_step_reached=?, step1_completed=?, \
         step2_completed=?, step3_completed=?, flow_completed=? WHERE id=?",
    )
    .bind(flow.current_step)
    .bind(flow.highest_step_reached)
    .bind(flow.step1_completed)
    .bind(flow.step2_completed)
    .bind(flow.step3_completed)
    .bind(flow.flow_completed)
    .bind(user_id)
    .execute(db_pool)
    .await?;
    Ok(())
}

#[debug_handler(state = AppState)]
pub(crate) async fn status(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Response> {
    let has_connections = connections::has_approved(&db_pool, &user).await?;
    let mut body = serde_json::to_value(user.flow)?;
    body["hasConnections"] = json!(has_connections);
    Ok(res::ok("Profile flow status", body))
}

#[debug_handler(state = AppState)]
pub(crate) async fn step(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    Query(StepQuery { step }): Query<StepQuery>,
) -> AppResult<Response> {
    let mut flow = user.flow;
    flow.advance(checked(step)?, user.role);
    save(&db_pool, &user.id, &flow).await?;
    Ok(res::ok("Profile step updated successfully", flow))
}

#[debug_handler(state = AppState)]
pub(crate) async fn back(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    Query(StepQuery { step }): Query<StepQuery>,
) -> AppResult<Response> {
    let mut flow = user.flow;
    flow.go_back(checked(step)?);
    save(&db_pool, &user.id, &flow).await?;
    Ok(res::ok("Profile step updated successfully", flow))
}

#[debug_handler(state = AppState)]
pub(crate) async fn complete(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Response> {
    let mut flow = user.flow;
    flow.flow_completed = true;
    save(&db_pool, &user.id, &flow).await?;
    Ok(res::ok("Profile flow completed", flow))
}

#[debug_handler(state = AppState)]
pub(crate) async fn should_show(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Response> {
    let has_connections = connections::has_approved(&db_pool, &user).await?;
    let show = user.flow.should_show(user.role, has_connections);
    Ok(res::ok("Profile flow visibility", json!({ "shouldShow": show })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> FlowProgress {
        FlowProgress { current_step: 1, highest_step_reached: 1, ..Default::default() }
    }

    #[test]
    fn test_caregiver_completes_at_step_two() {
        let mut flow = fresh();
        flow.step1_completed = true;
        flow.advance(2, Role::Caregiver);
        assert!(flow.flow_completed);
        assert!(flow.step2_completed);
        assert!(!flow.step3_completed);
    }

    #[test]
    fn test_elderly_needs_step_three() {
        let mut flow = fresh();
        flow.advance(2, Role::Elderly);
        assert!(!flow.flow_completed);
        flow.advance(3, Role::Elderly);
        assert!(flow.flow_completed);
        assert_eq!(flow.highest_step_reached, 3);
    }

    #[test]
    fn test_going_back_keeps_highest() {
        let mut flow = fresh();
        flow.advance(3, Role::Elderly);
        flow.go_back(1);
        assert_eq!(flow.current_step, 1);
        assert_eq!(flow.highest_step_reached, 3);
    }

    #[test]
    fn test_should_show_rules() {
        let mut flow = fresh();
        assert!(flow.should_show(Role::Elderly, true));

        flow.step1_completed = true;
        assert!(flow.should_show(Role::Elderly, true));
        flow.advance(3, Role::Elderly);
        assert!(!flow.should_show(Role::Elderly, true));
        assert!(flow.should_show(Role::Elderly, false));
    }

    #[test]
    fn test_step_bounds() {
        assert!(checked(0).is_err());
        assert!(checked(4).is_err());
        assert_eq!(checked(2).unwrap(), 2);
    }
}
