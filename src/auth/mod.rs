use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
    routing::{get, put},
    Router,
};
use sqlx::SqlitePool;
use tracing::{info, Span};

use crate::{users::{self, User}, AppError, AppResult, AppState};

mod clients;
mod me;
mod role;

pub use clients::{Firebase, IdentityProvider, VerifiedIdentity};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(me::me))
        .route("/role", put(role::update_role))
}

/// The caller, resolved once per request by [`require_identity`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| AppError::unauthenticated("Authentication required"))
    }
}

pub fn bearer_token(headers: &HeaderMap) -> AppResult<&str> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::unauthenticated("Missing Authorization header"))?
        .to_str()
        .map_err(|_| AppError::unauthenticated("Malformed Authorization header"))?;

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(AppError::unauthenticated("Malformed Authorization header")),
    }
}

/// Verifies the credential and returns the local user, creating it on
/// first contact with role unset.
pub async fn resolve(
    identity: &dyn IdentityProvider,
    db_pool: &SqlitePool,
    credential: &str,
) -> AppResult<User> {
    let verified = identity.verify(credential).await?;
    if let Some(user) = users::find_by_subject(db_pool, &verified.subject_id).await? {
        return Ok(user);
    }

    let user = users::create_from_identity(db_pool, &verified).await?;
    info!(user_id = %user.id, "first contact, user created");
    Ok(user)
}

pub async fn require_identity(
    State(identity): State<Arc<dyn IdentityProvider>>,
    State(db_pool): State<SqlitePool>,
    mut request: Request,
    next: Next,
) -> AppResult<Response> {
    let credential = bearer_token(request.headers())?.to_owned();
    let user = resolve(identity.as_ref(), &db_pool, &credential).await?;

    Span::current().record("user_id", user.id.as_str());
    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;
    use crate::testing::{self, FakeIdentity};

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&headers("Bearer abc")).unwrap(), "abc");
        assert_eq!(bearer_token(&headers("bearer  abc ")).unwrap(), "abc");
        assert!(bearer_token(&headers("Basic abc")).is_err());
        assert!(bearer_token(&headers("Bearer ")).is_err());
        assert!(bearer_token(&HeaderMap::new()).is_err());
    }

    #[tokio::test]
    async fn test_resolve_creates_then_reuses() {
        let db_pool = testing::memory_pool().await;
        let identity = FakeIdentity::default();

        let first = resolve(&identity, &db_pool, "token-sub-1").await.unwrap();
        let again = resolve(&identity, &db_pool, "token-sub-1").await.unwrap();

        assert_eq!(first.id, again.id);
        assert_eq!(first.role, users::Role::None);
    }

    #[tokio::test]
    async fn test_resolve_rejects_bad_credential() {
        let db_pool = testing::memory_pool().await;
        let err = resolve(&FakeIdentity::default(), &db_pool, "garbage").await.unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
    }
}
