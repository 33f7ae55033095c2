//! Identity tokens for the history endpoints.
//!
//! Requests carry `Authorization: Bearer <token>`. An [`IdentityVerifier`]
//! turns the token into a user id; the [`AuthUser`] extractor runs that
//! lookup for each handler that needs it.

mod firebase;

pub use firebase::{FirebaseVerifier, GOOGLE_SECURETOKEN_JWKS_URL};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::error::{ApiError, AuthError};

/// Resolves an identity token to a user id.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<String, AuthError>;
}

/// Shared handle stored in application state.
pub type SharedVerifier = Arc<dyn IdentityVerifier>;

/// Pull the bearer token out of the `Authorization` header.
///
/// The token is whatever follows the last `"Bearer "`; a header without that
/// prefix is taken as the raw token.
pub fn bearer_token(headers: &HeaderMap) -> Result<String, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidToken("header is not valid ASCII".to_string()))?;

    let token = value.rsplit("Bearer ").next().unwrap_or(value).trim();
    if token.is_empty() {
        return Err(AuthError::InvalidToken("empty token".to_string()));
    }
    Ok(token.to_string())
}

/// Fixed token → user id table.
///
/// Used for local development (`FIT_ASSIST_DEV_TOKENS`) and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, String>,
}

impl StaticTokenVerifier {
    pub fn new<I, T, U>(entries: I) -> Self
    where
        I: IntoIterator<Item = (T, U)>,
        T: Into<String>,
        U: Into<String>,
    {
        Self {
            tokens: entries
                .into_iter()
                .map(|(token, uid)| (token.into(), uid.into()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }
}

#[async_trait]
impl IdentityVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<String, AuthError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| AuthError::InvalidToken("unknown token".to_string()))
    }
}

/// Verifier used when no identity backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledVerifier;

#[async_trait]
impl IdentityVerifier for DisabledVerifier {
    async fn verify(&self, _token: &str) -> Result<String, AuthError> {
        Err(AuthError::NotConfigured)
    }
}

/// Authenticated caller, extracted from the `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub uid: String,
}

impl<S> FromRequestParts<S> for AuthUser
where
    SharedVerifier: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;
        let verifier = SharedVerifier::from_ref(state);
        let uid = verifier.verify(&token).await.map_err(|e| {
            tracing::debug!(error = %e, "Identity token rejected");
            e
        })?;
        Ok(AuthUser { uid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        map
    }

    #[test]
    fn extracts_bearer_token() {
        assert_eq!(bearer_token(&headers("Bearer abc.def")).unwrap(), "abc.def");
    }

    #[test]
    fn missing_header_is_reported() {
        let err = bearer_token(&HeaderMap::new()).unwrap_err();
        assert!(matches!(err, AuthError::MissingHeader));
        assert_eq!(err.to_string(), "Authorization header is missing");
    }

    #[test]
    fn header_without_prefix_is_raw_token() {
        assert_eq!(bearer_token(&headers("abc.def")).unwrap(), "abc.def");
    }

    #[test]
    fn empty_token_is_invalid() {
        let err = bearer_token(&headers("Bearer ")).unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn static_verifier_resolves_known_tokens() {
        let verifier = StaticTokenVerifier::new([("tok-alice", "alice"), ("tok-bob", "bob")]);
        assert_eq!(verifier.len(), 2);
        assert_eq!(verifier.verify("tok-alice").await.unwrap(), "alice");
        assert!(matches!(
            verifier.verify("tok-eve").await,
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn disabled_verifier_rejects() {
        assert!(matches!(
            DisabledVerifier.verify("anything").await,
            Err(AuthError::NotConfigured)
        ));
    }
}
