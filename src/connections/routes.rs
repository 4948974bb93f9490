use axum::{
    debug_handler,
    extract::{Query, State},
    response::Response,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::info;

use crate::{
    auth::CurrentUser,
    notify::{caregiver_topic, elderly_topic, Notifier},
    res, users, AppError, AppResult, AppState,
};

use super::{Connection, ConnectionStatus};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RequestQuery {
    elderly_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DecisionQuery {
    connection_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PairQuery {
    caregiver_id: String,
    elderly_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PendingRequest {
    id: String,
    status: ConnectionStatus,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    caregiver_id: String,
    caregiver_email: Option<String>,
    caregiver_full_name: Option<String>,
    caregiver_profile_image_url: Option<String>,
}

fn rfc3339(t: Option<OffsetDateTime>) -> Option<String> {
    t.and_then(|t| t.format(&Rfc3339).ok())
}

#[debug_handler(state = AppState)]
pub(crate) async fn request(
    State(db_pool): State<SqlitePool>,
    State(notifier): State<Notifier>,
    CurrentUser(caregiver): CurrentUser,
    Query(RequestQuery { elderly_id }): Query<RequestQuery>,
) -> AppResult<Response> {
    users::require(&db_pool, &elderly_id).await?;
    let (connection, created) = super::request(&db_pool, &caregiver.id, &elderly_id).await?;

    if created {
        info!(connection_id = %connection.id, caregiver_id = %caregiver.id, elderly_id = %elderly_id, "connection requested");
        notifier.publish(
            elderly_topic(&elderly_id),
            json!({
                "type": "NEW_CONNECTION_REQUEST",
                "connectionId": connection.id,
                "caregiverId": caregiver.id,
                "caregiverName": caregiver.display_name().unwrap_or_default(),
                "caregiverProfilePictureUrl": caregiver.profile_image_url.as_deref().unwrap_or_default(),
                "elderlyId": elderly_id,
                "status": connection.status,
                "createdAt": rfc3339(Some(connection.created_at)),
            }),
        );
    }

    Ok(res::ok("Connection request sent", connection))
}

#[debug_handler(state = AppState)]
pub(crate) async fn pending(
    State(db_pool): State<SqlitePool>,
    CurrentUser(elderly): CurrentUser,
) -> AppResult<Response> {
    let mut requests = Vec::new();
    for connection in super::pending_for(&db_pool, &elderly.id).await? {
        let caregiver = users::find_by_id(&db_pool, &connection.caregiver_id).await?;
        requests.push(PendingRequest {
            id: connection.id,
            status: connection.status,
            created_at: connection.created_at,
            caregiver_id: connection.caregiver_id,
            caregiver_email: caregiver.as_ref().and_then(|c| c.email.clone()),
            caregiver_full_name: caregiver.as_ref().and_then(|c| c.full_name.clone()),
            caregiver_profile_image_url: caregiver.and_then(|c| c.profile_image_url),
        });
    }
    Ok(res::ok("Pending requests retrieved", requests))
}

fn decision_event(kind: &str, connection: &Connection) -> serde_json::Value {
    json!({
        "type": kind,
        "connectionId": connection.id,
        "elderlyId": connection.elderly_id,
        "status": connection.status,
        "confirmedAt": rfc3339(connection.confirmed_at),
    })
}

#[debug_handler(state = AppState)]
pub(crate) async fn approve(
    State(db_pool): State<SqlitePool>,
    State(notifier): State<Notifier>,
    CurrentUser(elderly): CurrentUser,
    Query(DecisionQuery { connection_id }): Query<DecisionQuery>,
) -> AppResult<Response> {
    let connection = super::decide(&db_pool, &elderly.id, &connection_id, ConnectionStatus::Approved).await?;
    notifier.publish(
        caregiver_topic(&connection.caregiver_id),
        decision_event("CONNECTION_APPROVED", &connection),
    );
    Ok(res::ok("Connection approved", connection))
}

#[debug_handler(state = AppState)]
pub(crate) async fn reject(
    State(db_pool): State<SqlitePool>,
    State(notifier): State<Notifier>,
    CurrentUser(elderly): CurrentUser,
    Query(DecisionQuery { connection_id }): Query<DecisionQuery>,
) -> AppResult<Response> {
    let connection = super::decide(&db_pool, &elderly.id, &connection_id, ConnectionStatus::Rejected).await?;
    notifier.publish(
        caregiver_topic(&connection.caregiver_id),
        decision_event("CONNECTION_REJECTED", &connection),
    );
    Ok(res::ok("Connection rejected", connection))
}

#[debug_handler(state = AppState)]
pub(crate) async fn elderly_list(
    State(db_pool): State<SqlitePool>,
    CurrentUser(caregiver): CurrentUser,
) -> AppResult<Response> {
    Ok(res::ok("Connected elderly retrieved", super::connected_elderly(&db_pool, &caregiver.id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn caregiver_list(
    State(db_pool): State<SqlitePool>,
    CurrentUser(elderly): CurrentUser,
) -> AppResult<Response> {
    Ok(res::ok("Connected caregivers retrieved", super::connected_caregivers(&db_pool, &elderly.id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn unsync(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    Query(PairQuery { caregiver_id, elderly_id }): Query<PairQuery>,
) -> AppResult<Response> {
    if user.id != caregiver_id && user.id != elderly_id {
        return Err(AppError::validation("You can only remove your own connections"));
    }
    super::remove(&db_pool, &caregiver_id, &elderly_id).await?;
    info!(caregiver_id = %caregiver_id, elderly_id = %elderly_id, "connection removed");
    Ok(res::ok("Connection removed", json!({ "success": true })))
}
