//! Authorization for back-office routes
//!
//! Identity is delegated: an [`AuthProvider`] turns request headers into an
//! [`AuthContext`] by asking the external identity provider (or, in
//! development, a static token table). Admin privileges come from the admin
//! whitelist, not from the identity provider.

use anyhow::Result;
use async_trait::async_trait;
use axum::http::{HeaderMap, header};
use std::collections::HashMap;
use uuid::Uuid;

use crate::core::error::RequestError;
use crate::core::service::AdminDirectory;

/// Authorization context extracted from a request
#[derive(Debug, Clone, PartialEq)]
pub enum AuthContext {
    /// Authenticated user, not on the admin whitelist
    User { user_id: Option<Uuid>, email: String },

    /// Authenticated and whitelisted
    Admin { user_id: Option<Uuid>, email: String },

    /// No authentication (public access)
    Anonymous,
}

impl AuthContext {
    /// Check if context represents an admin
    pub fn is_admin(&self) -> bool {
        matches!(self, AuthContext::Admin { .. })
    }

    /// Email of the session, if any
    pub fn email(&self) -> Option<&str> {
        match self {
            AuthContext::User { email, .. } | AuthContext::Admin { email, .. } => Some(email),
            AuthContext::Anonymous => None,
        }
    }

    /// Promote a user session to admin when the whitelist says so
    pub async fn resolve_admin(self, directory: &dyn AdminDirectory) -> Result<Self> {
        match self {
            AuthContext::User { user_id, email } => {
                if directory.is_admin(&email).await? {
                    Ok(AuthContext::Admin { user_id, email })
                } else {
                    Ok(AuthContext::User { user_id, email })
                }
            }
            other => Ok(other),
        }
    }
}

/// Authorization policy for an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPolicy {
    /// Public access (no auth required)
    Public,

    /// Any authenticated user
    Authenticated,

    /// Whitelisted admin only
    AdminOnly,
}

impl AuthPolicy {
    /// Check if auth context satisfies this policy
    pub fn check(&self, context: &AuthContext) -> bool {
        match self {
            AuthPolicy::Public => true,
            AuthPolicy::Authenticated => !matches!(context, AuthContext::Anonymous),
            AuthPolicy::AdminOnly => context.is_admin(),
        }
    }

    /// Like [`AuthPolicy::check`], but says why access is refused
    pub fn enforce(&self, context: &AuthContext) -> Result<(), RequestError> {
        if self.check(context) {
            return Ok(());
        }
        match context {
            AuthContext::Anonymous => Err(RequestError::Unauthorized {
                message: "a valid session is required".to_string(),
            }),
            _ => Err(RequestError::Forbidden {
                message: "admin privileges are required".to_string(),
            }),
        }
    }
}

/// Trait for auth providers
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Extract auth context from request headers
    async fn extract_context(&self, headers: &HeaderMap) -> Result<AuthContext>;
}

/// Bearer token of a request, if present
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Default no-auth provider: every request is anonymous
pub struct NoAuthProvider;

#[async_trait]
impl AuthProvider for NoAuthProvider {
    async fn extract_context(&self, _headers: &HeaderMap) -> Result<AuthContext> {
        Ok(AuthContext::Anonymous)
    }
}

/// Token table provider for development and tests
///
/// Maps bearer tokens to user emails. Unknown tokens are anonymous.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthProvider {
    tokens: HashMap<String, String>,
}

impl StaticTokenAuthProvider {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }

    pub fn with_token(mut self, token: impl Into<String>, email: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), email.into());
        self
    }
}

#[async_trait]
impl AuthProvider for StaticTokenAuthProvider {
    async fn extract_context(&self, headers: &HeaderMap) -> Result<AuthContext> {
        Ok(bearer_token(headers)
            .and_then(|token| self.tokens.get(token))
            .map(|email| AuthContext::User {
                user_id: None,
                email: email.clone(),
            })
            .unwrap_or(AuthContext::Anonymous))
    }
}

/// Provider that asks the hosted identity service who owns a bearer token
#[cfg(feature = "supabase-auth")]
pub struct SupabaseAuthProvider {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
}

#[cfg(feature = "supabase-auth")]
impl SupabaseAuthProvider {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
        }
    }
}

#[cfg(feature = "supabase-auth")]
#[derive(serde::Deserialize)]
struct RemoteUser {
    id: Option<Uuid>,
    email: Option<String>,
}

#[cfg(feature = "supabase-auth")]
#[async_trait]
impl AuthProvider for SupabaseAuthProvider {
    async fn extract_context(&self, headers: &HeaderMap) -> Result<AuthContext> {
        let Some(token) = bearer_token(headers) else {
            return Ok(AuthContext::Anonymous);
        };

        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Ok(AuthContext::Anonymous);
        }

        let user: RemoteUser = response.error_for_status()?.json().await?;
        Ok(match user.email {
            Some(email) => AuthContext::User {
                user_id: user.id,
                email,
            },
            None => AuthContext::Anonymous,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_token(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn test_policy_check() {
        let admin = AuthContext::Admin {
            user_id: None,
            email: "ops@store.hn".to_string(),
        };
        let user = AuthContext::User {
            user_id: None,
            email: "fan@store.hn".to_string(),
        };

        assert!(AuthPolicy::Public.check(&AuthContext::Anonymous));
        assert!(!AuthPolicy::Authenticated.check(&AuthContext::Anonymous));
        assert!(AuthPolicy::Authenticated.check(&user));
        assert!(!AuthPolicy::AdminOnly.check(&user));
        assert!(AuthPolicy::AdminOnly.check(&admin));
    }

    #[test]
    fn test_enforce_distinguishes_unauthorized_and_forbidden() {
        let user = AuthContext::User {
            user_id: None,
            email: "fan@store.hn".to_string(),
        };

        assert!(matches!(
            AuthPolicy::AdminOnly.enforce(&AuthContext::Anonymous),
            Err(RequestError::Unauthorized { .. })
        ));
        assert!(matches!(
            AuthPolicy::AdminOnly.enforce(&user),
            Err(RequestError::Forbidden { .. })
        ));
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(&headers_with_token("abc")), Some("abc"));
        assert_eq!(bearer_token(&HeaderMap::new()), None);

        let mut basic = HeaderMap::new();
        basic.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(bearer_token(&basic), None);
    }

    #[tokio::test]
    async fn test_static_token_provider() {
        let provider = StaticTokenAuthProvider::default().with_token("t1", "ops@store.hn");

        let ctx = provider
            .extract_context(&headers_with_token("t1"))
            .await
            .unwrap();
        assert_eq!(ctx.email(), Some("ops@store.hn"));

        let ctx = provider
            .extract_context(&headers_with_token("nope"))
            .await
            .unwrap();
        assert_eq!(ctx, AuthContext::Anonymous);
    }

    #[tokio::test]
    async fn test_no_auth_provider_is_anonymous() {
        let ctx = NoAuthProvider
            .extract_context(&headers_with_token("t1"))
            .await
            .unwrap();
        assert_eq!(ctx, AuthContext::Anonymous);
    }
}
