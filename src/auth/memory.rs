//! In-memory stores, used when no database is configured and in tests.

use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::error::AuthError;
use super::repo::{CredentialStore, TokenStore};
use super::repo_types::{NewUser, TokenRecord, User};

#[derive(Default)]
struct Users {
    by_id: HashMap<Uuid, User>,
    // lowercased email -> id
    by_email: HashMap<String, Uuid>,
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: RwLock<Users>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn create(&self, user: NewUser) -> Result<User, AuthError> {
        let key = user.email.to_lowercase();
        // check and insert under one write lock
        let mut users = self.inner.write().await;
        if users.by_email.contains_key(&key) {
            return Err(AuthError::DuplicateEmail);
        }
        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            created_at: OffsetDateTime::now_utc(),
        };
        users.by_email.insert(key, created.id);
        users.by_id.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let users = self.inner.read().await;
        Ok(users
            .by_email
            .get(&email.to_lowercase())
            .and_then(|id| users.by_id.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.inner.read().await.by_id.get(&id).cloned())
    }
}

#[derive(Default)]
pub struct MemoryTokenStore {
    // token_hash -> record
    inner: RwLock<HashMap<String, TokenRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn insert(&self, record: &TokenRecord) -> anyhow::Result<()> {
        let mut tokens = self.inner.write().await;
        anyhow::ensure!(
            !tokens.contains_key(&record.token_hash),
            "duplicate token hash"
        );
        tokens.insert(record.token_hash.clone(), record.clone());
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> anyhow::Result<Option<TokenRecord>> {
        Ok(self.inner.read().await.get(token_hash).cloned())
    }

    async fn revoke(&self, token_hash: &str) -> anyhow::Result<bool> {
        match self.inner.write().await.get_mut(token_hash) {
            Some(record) => {
                record.revoked = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_live(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<Uuid>> {
        // check and flip under one write lock
        let mut tokens = self.inner.write().await;
        match tokens.get_mut(token_hash) {
            Some(record) if !record.revoked && now <= record.expires_at => {
                record.revoked = true;
                Ok(Some(record.user_id))
            }
            _ => Ok(None),
        }
    }
}
