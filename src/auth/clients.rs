use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::{AppError, AppResult, GetField, UpstreamError};

const SERVICE: &str = "identity";

/// What the identity provider vouches for once a credential checks out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub subject_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture_url: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Fails with `AppError::Authentication` when the credential is rejected.
    async fn verify(&self, credential: &str) -> AppResult<VerifiedIdentity>;
}

pub struct Firebase {
    http_client: reqwest::Client,
    lookup_url: String,
}

impl Firebase {
    pub fn new(api_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            http_client: reqwest::Client::builder().timeout(timeout).build()?,
            lookup_url: format!("https://identitytoolkit.googleapis.com/v1/accounts:lookup?key={api_key}"),
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    id_token: &'a str,
}

#[async_trait]
impl IdentityProvider for Firebase {
    async fn verify(&self, credential: &str) -> AppResult<VerifiedIdentity> {
        let response = self
            .http_client
            .post(&self.lookup_url)
            .json(&LookupRequest { id_token: credential })
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(SERVICE, e))?;

        if response.status().is_client_error() {
            return Err(AppError::unauthenticated("Invalid or expired token"));
        }
        if !response.status().is_success() {
            return Err(UpstreamError::new(SERVICE, format!("status {}", response.status())).into());
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| UpstreamError::from_reqwest(SERVICE, e))?;
        parse_lookup(&body)
    }
}

fn parse_lookup(body: &Value) -> AppResult<VerifiedIdentity> {
    let account = body
        .get("users")
        .and_then(|users| users.get(0))
        .ok_or_else(|| AppError::unauthenticated("Token does not match any account"))?;

    let subject_id = account
        .get_str_field("localId")
        .map_err(|_| AppError::unauthenticated("Token does not match any account"))?;
    let optional = |field: &str| account.get_str_field(field).ok().filter(|v| !v.is_empty());

    Ok(VerifiedIdentity {
        subject_id,
        email: optional("email"),
        name: optional("displayName"),
        picture_url: optional("photoUrl"),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_lookup_reads_profile() {
        let body = json!({"users": [{
            "localId": "abc",
            "email": "ada@example.com",
            "displayName": "Ada",
            "photoUrl": ""
        }]});
        let identity = parse_lookup(&body).unwrap();
        assert_eq!(identity.subject_id, "abc");
        assert_eq!(identity.email.as_deref(), Some("ada@example.com"));
        assert_eq!(identity.name.as_deref(), Some("Ada"));
        assert_eq!(identity.picture_url, None);
    }

    #[test]
    fn test_parse_lookup_without_users_is_unauthenticated() {
        let err = parse_lookup(&json!({"kind": "x"})).unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
        let err = parse_lookup(&json!({"users": [{"email": "a@b"}]})).unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
    }
}
