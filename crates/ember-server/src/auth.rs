//! Session token verification and caching.
//!
//! Clients present the bearer token issued by the identity service.  The
//! Ed25519 signature is checked once per token; successful verifications
//! are cached until the token expires so repeat requests skip the
//! signature check.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{header, HeaderMap};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use ember_shared::constants::SESSION_CACHE_CONTEXT;
use ember_shared::session::{verify_session_token, SessionToken};
use ember_shared::{TokenError, UserId};

#[derive(Debug, Clone)]
struct CachedSession {
    user_id: UserId,
    valid_until: DateTime<Utc>,
}

/// Verifies and caches session tokens.
#[derive(Clone)]
pub struct SessionVerifier {
    /// The identity service's Ed25519 public key.
    issuer_pubkey: [u8; 32],
    /// Cache: keyed hash of the raw bearer -> verified session.
    cache: Arc<RwLock<HashMap<[u8; 32], CachedSession>>>,
}

impl SessionVerifier {
    pub fn new(issuer_pubkey: [u8; 32]) -> Self {
        Self {
            issuer_pubkey,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Verify a raw bearer string and return the user it was issued to.
    pub async fn verify(&self, bearer: &str) -> Result<UserId, TokenError> {
        let now = Utc::now();
        let key = cache_key(bearer);

        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(&key) {
                if now <= entry.valid_until {
                    return Ok(entry.user_id.clone());
                }
            }
        }

        let token = SessionToken::from_bearer(bearer)?;
        let user_id = verify_session_token(&token, &self.issuer_pubkey, now)?;

        self.cache.write().await.insert(
            key,
            CachedSession {
                user_id: user_id.clone(),
                valid_until: token.valid_until,
            },
        );
        debug!(user = %user_id, until = %token.valid_until, "Session verified");

        Ok(user_id)
    }

    /// Verify the `Authorization: Bearer ...` header of a request.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<UserId, TokenError> {
        let bearer = bearer_token(headers).ok_or(TokenError::Missing)?;
        self.verify(bearer).await
    }

    /// Remove all expired entries from the cache.
    ///
    /// Should be called periodically (e.g. every 10 minutes) to prevent
    /// unbounded memory growth.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut cache = self.cache.write().await;
        let before = cache.len();
        cache.retain(|_, entry| now <= entry.valid_until);
        let removed = before - cache.len();
        if removed > 0 {
            debug!(removed, remaining = cache.len(), "Purged expired sessions");
        }
        removed
    }

    pub async fn cache_size(&self) -> usize {
        self.cache.read().await.len()
    }
}

/// Extract the token after `Bearer ` from the Authorization header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn cache_key(bearer: &str) -> [u8; 32] {
    blake3::derive_key(SESSION_CACHE_CONTEXT, bearer.trim().as_bytes())
}
