//! Firebase ID token verification.
//!
//! Tokens are RS256 JWTs signed by one of Google's rotating `securetoken`
//! keys. The published JWK set is cached for an hour and refetched when it
//! goes stale or a token names an unknown `kid`. Refetches are at least a
//! minute apart, so a burst of tokens with made-up key ids costs at
//! most one request to Google.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::IdentityVerifier;
use crate::error::AuthError;

const CACHE_TTL: Duration = Duration::from_secs(3600);
const MIN_REFRESH: Duration = Duration::from_secs(60);
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// JWK set for Firebase Auth ID tokens.
pub const GOOGLE_SECURETOKEN_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

#[derive(Debug, Clone, Deserialize)]
struct FirebaseClaims {
    sub: String,
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

/// Verifies Firebase ID tokens for one project.
pub struct FirebaseVerifier {
    project_id: String,
    jwks_url: String,
    fetch_timeout: Duration,
    client: reqwest::Client,
    cache: RwLock<Option<CachedKeys>>,
}

impl FirebaseVerifier {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            jwks_url: GOOGLE_SECURETOKEN_JWKS_URL.to_string(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            client: reqwest::Client::new(),
            cache: RwLock::new(None),
        }
    }

    /// Fetch keys from a different URL (emulators, tests).
    pub fn with_jwks_url(mut self, url: impl Into<String>) -> Self {
        self.jwks_url = url.into();
        self
    }

    /// Upper bound on one JWK set request.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    fn issuer(&self) -> String {
        format!("https://securetoken.google.com/{}", self.project_id)
    }

    async fn fetch_keys(&self) -> Result<JwkSet, AuthError> {
        let response = self
            .client
            .get(&self.jwks_url)
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(|e| AuthError::KeyFetch(e.to_string()))?
            .error_for_status()
            .map_err(|e| AuthError::KeyFetch(e.to_string()))?;

        let keys: JwkSet = response
            .json()
            .await
            .map_err(|e| AuthError::KeyFetch(format!("invalid JWK set: {e}")))?;
        info!(keys = keys.keys.len(), "Fetched Firebase signing keys");
        Ok(keys)
    }

    /// Decoding key for `kid`, refreshing the cache when needed.
    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                let age = cached.fetched_at.elapsed();
                let known = cached.keys.find(kid).is_some();
                if (known && age < CACHE_TTL) || age < MIN_REFRESH {
                    return key_for(&cached.keys, kid);
                }
            }
        }

        let mut cache = self.cache.write().await;
        // Another request may have refreshed while this one waited.
        if let Some(cached) = cache.as_ref() {
            if cached.fetched_at.elapsed() < MIN_REFRESH {
                return key_for(&cached.keys, kid);
            }
        }

        debug!(kid, "Signing key not cached, refreshing");
        let keys = self.fetch_keys().await?;
        let key = key_for(&keys, kid);
        *cache = Some(CachedKeys {
            keys,
            fetched_at: Instant::now(),
        });
        key
    }
}

fn key_for(keys: &JwkSet, kid: &str) -> Result<DecodingKey, AuthError> {
    let jwk = keys
        .find(kid)
        .ok_or_else(|| AuthError::InvalidToken(format!("unknown signing key {kid}")))?;
    DecodingKey::from_jwk(jwk).map_err(|e| AuthError::InvalidToken(e.to_string()))
}

#[async_trait]
impl IdentityVerifier for FirebaseVerifier {
    async fn verify(&self, token: &str) -> Result<String, AuthError> {
        let header = decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::InvalidToken(format!(
                "unexpected algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("token has no key id".to_string()))?;

        let key = self.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[self.issuer()]);

        let data = decode::<FirebaseClaims>(token, &key, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        if data.claims.sub.is_empty() {
            return Err(AuthError::InvalidToken("token has empty subject".to_string()));
        }
        Ok(data.claims.sub)
    }
}
