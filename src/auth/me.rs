use axum::{debug_handler, response::Response};

use crate::{res, AppResult};

use super::CurrentUser;

#[debug_handler]
pub(crate) async fn me(CurrentUser(user): CurrentUser) -> AppResult<Response> {
    Ok(res::ok("User retrieved", user))
}
