//! The authentication adapter, grounded in the reference codebase's
//! `AuthenticationHTTPAdapter`: forwards the incoming request's headers and
//! cookies to an external authentication service and gets back a user id
//! plus, optionally, a refreshed access token to pass along on the
//! response.

use crate::Error;
use async_trait::async_trait;
use serde_json::{json, Value as Json};
use std::collections::HashMap;

/// What a request handler needs to authenticate: the forwarded header map
/// and any cookies, keyed by name.
pub struct AuthRequest {
    pub headers: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
}

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn authenticate(&self, request: &AuthRequest) -> Result<(u64, Option<String>), Error>;
}

/// Posts the request's headers and cookies to the external auth service and
/// reads back `{"user_id": ..., "access_token": ...}`.
pub struct HttpAuthService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuthService {
    pub fn new(base_url: impl Into<String>) -> HttpAuthService {
        HttpAuthService { client: reqwest::Client::new(), base_url: base_url.into() }
    }

    fn url(&self) -> String {
        format!("{}/authenticate", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl AuthService for HttpAuthService {
    async fn authenticate(&self, request: &AuthRequest) -> Result<(u64, Option<String>), Error> {
        log::debug!("Start request to authentication service with headers: {:?}", request.headers);
        let body: Json = json!({ "headers": request.headers, "cookies": request.cookies });
        let response = self.client.post(self.url()).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::auth(format!("Authentication service returned {}: {}", status, text)));
        }
        let parsed: Json = response.json().await?;
        let user_id = parsed
            .get("user_id")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| Error::auth("Authentication service did not return a user_id".to_string()))?;
        let access_token = parsed.get("access_token").and_then(|v| v.as_str()).map(str::to_string);
        Ok((user_id, access_token))
    }
}

/// A fixed-user fake for tests, bypassing the network hop entirely.
pub struct StaticAuthService {
    pub user_id: u64,
}

#[async_trait]
impl AuthService for StaticAuthService {
    async fn authenticate(&self, _request: &AuthRequest) -> Result<(u64, Option<String>), Error> {
        Ok((self.user_id, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_service_always_returns_its_fixed_user() {
        let service = StaticAuthService { user_id: 42 };
        let request = AuthRequest { headers: HashMap::new(), cookies: HashMap::new() };
        let (user_id, token) = service.authenticate(&request).await.unwrap();
        assert_eq!(user_id, 42);
        assert!(token.is_none());
    }
}
