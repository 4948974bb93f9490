//! Uniform response envelope: `{status, message, data?, timestamp}`.

use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub status: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl<T> Envelope<T> {
    pub fn new(status: StatusCode, message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            status: status.as_u16(),
            message: message.into(),
            data,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

pub fn envelope<T: Serialize>(status: StatusCode, message: impl Into<String>, data: Option<T>) -> Response {
    (status, Json(Envelope::new(status, message, data))).into_response()
}

pub fn ok<T: Serialize>(message: impl Into<String>, data: T) -> Response {
    envelope(StatusCode::OK, message, Some(data))
}

pub fn created<T: Serialize>(message: impl Into<String>, data: T) -> Response {
    envelope(StatusCode::CREATED, message, Some(data))
}

pub fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    envelope::<()>(status, message, None)
}

pub fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}
