use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::error::AuthError;
use super::repo_types::{NewUser, TokenRecord, User};

/// User persistence. Email uniqueness is case-insensitive and enforced by the
/// store itself, not by a check-then-insert in the caller.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fails with `AuthError::DuplicateEmail` if the email is taken.
    async fn create(&self, user: NewUser) -> Result<User, AuthError>;
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
}

/// Access token persistence, keyed by the token digest.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert(&self, record: &TokenRecord) -> anyhow::Result<()>;
    async fn find_by_hash(&self, token_hash: &str) -> anyhow::Result<Option<TokenRecord>>;
    /// Marks the token revoked. Returns `false` if no token matched.
    async fn revoke(&self, token_hash: &str) -> anyhow::Result<bool>;
    /// Revokes the token only if it is unrevoked and `expires_at >= now`,
    /// atomically. Returns the owner's id when it did.
    async fn revoke_live(&self, token_hash: &str, now: OffsetDateTime)
        -> anyhow::Result<Option<Uuid>>;
}

#[derive(Clone)]
pub struct PgCredentialStore {
    db: PgPool,
}

impl PgCredentialStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn create(&self, user: NewUser) -> Result<User, AuthError> {
        let result = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, name, email, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, email, password_hash, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&self.db)
        .await;

        match result {
            Ok(u) => Ok(u),
            // users_email_lower_idx
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(AuthError::DuplicateEmail)
            }
            Err(e) => Err(anyhow::Error::new(e).context("insert user").into()),
        }
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, created_at
            FROM users
            WHERE lower(email) = lower($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"SELECT id, name, email, password_hash, created_at FROM users WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }
}

#[derive(Clone)]
pub struct PgTokenStore {
    db: PgPool,
}

impl PgTokenStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn insert(&self, record: &TokenRecord) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO access_tokens (id, token_hash, user_id, name, issued_at, expires_at, revoked)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(&record.token_hash)
        .bind(record.user_id)
        .bind(&record.name)
        .bind(record.issued_at)
        .bind(record.expires_at)
        .bind(record.revoked)
        .execute(&self.db)
        .await
        .context("insert access token")?;
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> anyhow::Result<Option<TokenRecord>> {
        let row = sqlx::query_as::<_, TokenRecord>(
            r#"
            SELECT id, token_hash, user_id, name, issued_at, expires_at, revoked
              FROM access_tokens
             WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.db)
        .await
        .context("find access token")?;
        Ok(row)
    }

    async fn revoke(&self, token_hash: &str) -> anyhow::Result<bool> {
        let res = sqlx::query("UPDATE access_tokens SET revoked = TRUE WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.db)
            .await
            .context("revoke access token")?;
        Ok(res.rows_affected() > 0)
    }

    async fn revoke_live(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<Uuid>> {
        let user_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE access_tokens
               SET revoked = TRUE
             WHERE token_hash = $1 AND revoked = FALSE AND expires_at >= $2
            RETURNING user_id
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.db)
        .await
        .context("revoke live access token")?;
        Ok(user_id)
    }
}
