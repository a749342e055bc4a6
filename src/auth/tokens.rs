//! Opaque bearer token issuance, validation and revocation.
//!
//! Token values are 256 random bits, base64url encoded and handed to the
//! client exactly once. Storage only ever sees their SHA-256 digest, so a
//! leaked `access_tokens` table cannot be replayed.

use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::error::TokenError;
use super::repo::{CredentialStore, TokenStore};
use super::repo_types::{TokenRecord, User};
use crate::config::TokenConfig;

const TOKEN_BYTES: usize = 32;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A freshly issued token. `value` is the only copy of the plaintext.
#[derive(Debug, Clone)]
pub struct Token {
    pub value: String,
    pub user_id: Uuid,
    pub name: String,
    pub issued_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub revoked: bool,
}

#[derive(Clone)]
pub struct TokenIssuer {
    tokens: Arc<dyn TokenStore>,
    users: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    name: String,
    prefix: String,
}

impl TokenIssuer {
    pub fn new(
        tokens: Arc<dyn TokenStore>,
        users: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        config: &TokenConfig,
    ) -> Self {
        Self {
            tokens,
            users,
            clock,
            // seconds() cannot overflow the way minutes() can for huge inputs
            ttl: Duration::seconds(config.ttl_minutes.saturating_mul(60)),
            name: config.name.clone(),
            prefix: config.prefix.clone(),
        }
    }

    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn issue(&self, user: &User) -> Result<Token, TokenError> {
        let value = self.generate_value();
        let now = self.clock.now();
        let expires_at = now
            .checked_add(self.ttl)
            .ok_or_else(|| anyhow::anyhow!("token expiry out of range (ttl {})", self.ttl))?;
        let record = TokenRecord {
            id: Uuid::new_v4(),
            token_hash: hash_token(&value),
            user_id: user.id,
            name: self.name.clone(),
            issued_at: now,
            expires_at,
            revoked: false,
        };
        self.tokens.insert(&record).await?;
        debug!(token_id = %record.id, expires_at = %record.expires_at, "token issued");

        Ok(Token {
            value,
            user_id: record.user_id,
            name: record.name,
            issued_at: record.issued_at,
            expires_at: record.expires_at,
            revoked: false,
        })
    }

    /// Idempotent: revoking an already revoked token succeeds.
    #[instrument(skip_all)]
    pub async fn revoke(&self, value: &str) -> Result<(), TokenError> {
        if !self.tokens.revoke(&hash_token(value)).await? {
            return Err(TokenError::NotFound);
        }
        debug!("token revoked");
        Ok(())
    }

    /// Revokes the token only if it is still live (known, not revoked, not
    /// expired), in a single store operation. Concurrent callers with the same
    /// token see exactly one success; the rest get `NotFound`.
    #[instrument(skip_all)]
    pub async fn revoke_live(&self, value: &str) -> Result<Uuid, TokenError> {
        let user_id = self
            .tokens
            .revoke_live(&hash_token(value), self.clock.now())
            .await?
            .ok_or(TokenError::NotFound)?;
        debug!(%user_id, "live token revoked");
        Ok(user_id)
    }

    /// Resolves a token to its owner. Valid up to and including `expires_at`.
    #[instrument(skip_all)]
    pub async fn validate(&self, value: &str) -> Result<User, TokenError> {
        let record = self
            .tokens
            .find_by_hash(&hash_token(value))
            .await?
            .ok_or(TokenError::NotFound)?;

        if record.revoked {
            return Err(TokenError::Revoked);
        }
        if self.clock.now() > record.expires_at {
            return Err(TokenError::Expired);
        }

        // owner removed out of band
        self.users
            .find_by_id(record.user_id)
            .await?
            .ok_or(TokenError::NotFound)
    }

    fn generate_value(&self) -> String {
        let mut buf = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut buf);
        format!("{}{}", self.prefix, Base64UrlUnpadded::encode_string(&buf))
    }
}

/// SHA-256 hex digest of a token value, the form tokens are stored under.
pub fn hash_token(value: &str) -> String {
    format!("{:x}", Sha256::digest(value.as_bytes()))
}
