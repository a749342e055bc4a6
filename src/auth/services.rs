//! Request-level orchestration of the credential core.
//!
//! Signup and login end in a freshly issued token; logout and current-user
//! take the caller's token explicitly. A user row and its first token are
//! written by two separate stores, so a failed issue after a successful
//! create leaves an account without a token; the client recovers by logging in.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::dto::{LoginRequest, SignupRequest};
use super::error::AuthError;
use super::password::{hash_password, verify_password};
use super::repo::CredentialStore;
use super::repo_types::{NewUser, User};
use super::tokens::{Token, TokenIssuer};
use super::validation::{validate_login, validate_signup};

/// Outcome of a successful signup or login.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub token: Token,
}

/// Signup, login, logout and current-user resolution. Holds no per-user
/// state; every call resolves identity from the token it is given.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn CredentialStore>,
    tokens: TokenIssuer,
}

impl AuthService {
    pub fn new(users: Arc<dyn CredentialStore>, tokens: TokenIssuer) -> Self {
        Self { users, tokens }
    }

    #[instrument(skip_all)]
    pub async fn signup(&self, req: SignupRequest) -> Result<Session, AuthError> {
        let input = validate_signup(&req).map_err(|errors| {
            warn!(%errors, "signup validation failed");
            AuthError::Validation(errors)
        })?;

        let password_hash = hash_password(&input.password)?;
        let user = self
            .users
            .create(NewUser {
                name: input.name,
                email: input.email,
                password_hash,
            })
            .await
            .map_err(|e| {
                if matches!(e, AuthError::DuplicateEmail) {
                    warn!("signup with registered email");
                }
                e
            })?;

        let token = self.tokens.issue(&user).await?;
        info!(user_id = %user.id, "user registered");
        Ok(Session { user, token })
    }

    #[instrument(skip_all)]
    pub async fn login(&self, req: LoginRequest) -> Result<Session, AuthError> {
        let input = validate_login(&req)?;

        let user = match self.users.find_by_email(&input.email).await? {
            Some(u) => u,
            None => {
                // burn a hash so unknown emails cost about as much as wrong passwords
                let _ = hash_password(&input.password);
                warn!("login unknown email");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !verify_password(&input.password, &user.password_hash)? {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.tokens.issue(&user).await?;
        info!(user_id = %user.id, "user logged in");
        Ok(Session { user, token })
    }

    /// Fails `Unauthorized` for unknown, expired or already revoked tokens.
    /// Of several concurrent logouts with one token, exactly one succeeds.
    #[instrument(skip_all)]
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        let user_id = self.tokens.revoke_live(token).await?;
        info!(%user_id, "user logged out");
        Ok(())
    }

    #[instrument(skip_all)]
    pub async fn current_user(&self, token: &str) -> Result<User, AuthError> {
        Ok(self.tokens.validate(token).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use time::{macros::datetime, Duration, OffsetDateTime};
    use uuid::Uuid;

    use super::*;
    use crate::auth::memory::{MemoryCredentialStore, MemoryTokenStore};
    use crate::auth::repo::TokenStore;
    use crate::auth::repo_types::TokenRecord;
    use crate::auth::tokens::test_support::ManualClock;
    use crate::config::TokenConfig;

    fn service_with_clock(clock: Arc<ManualClock>) -> AuthService {
        let users: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
        let issuer = TokenIssuer::new(
            Arc::new(MemoryTokenStore::new()),
            users.clone(),
            clock,
            &TokenConfig {
                ttl_minutes: 10,
                ..TokenConfig::default()
            },
        );
        AuthService::new(users, issuer)
    }

    fn service() -> AuthService {
        service_with_clock(Arc::new(ManualClock::new(datetime!(2026-03-01 09:00 UTC))))
    }

    fn signup_req(name: &str, email: &str, pw: &str, confirm: &str) -> SignupRequest {
        SignupRequest {
            name: Some(name.into()),
            email: Some(email.into()),
            password: Some(pw.into()),
            password_confirmation: Some(confirm.into()),
        }
    }

    fn login_req(email: &str, pw: &str) -> LoginRequest {
        LoginRequest {
            email: Some(email.into()),
            password: Some(pw.into()),
        }
    }

    #[tokio::test]
    async fn signup_login_logout_scenario() {
        let svc = service();

        let s1 = svc
            .signup(signup_req("Ann", "ann@x.com", "pw123", "pw123"))
            .await
            .unwrap();
        assert_eq!(s1.user.email, "ann@x.com");
        assert_eq!(s1.user.name, "Ann");

        let s2 = svc.login(login_req("ann@x.com", "pw123")).await.unwrap();
        assert_ne!(s1.token.value, s2.token.value);
        assert_eq!(s1.user.id, s2.user.id);

        svc.logout(&s1.token.value).await.unwrap();
        assert!(matches!(
            svc.current_user(&s1.token.value).await.unwrap_err(),
            AuthError::Unauthorized
        ));
        let me = svc.current_user(&s2.token.value).await.unwrap();
        assert_eq!(me.id, s1.user.id);
    }

    #[tokio::test]
    async fn duplicate_signup_conflicts() {
        let svc = service();
        svc.signup(signup_req("Ann", "ann@x.com", "pw123", "pw123"))
            .await
            .unwrap();
        let err = svc
            .signup(signup_req("Ann", "ANN@x.com", "pw123", "pw123"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DuplicateEmail));
        assert_eq!(err.status(), axum::http::StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn signup_mismatch_is_validation_error() {
        let svc = service();
        let err = svc
            .signup(signup_req("Ann", "ann@x.com", "pw123", "pw321"))
            .await
            .unwrap_err();
        match err {
            AuthError::Validation(errors) => assert!(errors.has("password_confirmation")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_the_same() {
        let svc = service();
        svc.signup(signup_req("Ann", "ann@x.com", "pw123", "pw123"))
            .await
            .unwrap();

        let wrong_pw = svc.login(login_req("ann@x.com", "nope")).await.unwrap_err();
        let unknown = svc.login(login_req("bob@x.com", "pw123")).await.unwrap_err();
        assert!(matches!(wrong_pw, AuthError::InvalidCredentials));
        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert_eq!(wrong_pw.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn login_is_case_insensitive_on_email() {
        let svc = service();
        svc.signup(signup_req("Ann", "ann@x.com", "pw123", "pw123"))
            .await
            .unwrap();
        assert!(svc.login(login_req(" Ann@X.COM ", "pw123")).await.is_ok());
    }

    #[tokio::test]
    async fn logout_twice_is_unauthorized() {
        let svc = service();
        let s = svc
            .signup(signup_req("Ann", "ann@x.com", "pw123", "pw123"))
            .await
            .unwrap();
        svc.logout(&s.token.value).await.unwrap();
        assert!(matches!(
            svc.logout(&s.token.value).await.unwrap_err(),
            AuthError::Unauthorized
        ));
        assert!(matches!(
            svc.logout("garbage").await.unwrap_err(),
            AuthError::Unauthorized
        ));
    }

    #[tokio::test]
    async fn expired_token_is_unauthorized() {
        let clock = Arc::new(ManualClock::new(datetime!(2026-03-01 09:00 UTC)));
        let svc = service_with_clock(clock.clone());
        let s = svc
            .signup(signup_req("Ann", "ann@x.com", "pw123", "pw123"))
            .await
            .unwrap();

        clock.advance(Duration::minutes(10));
        assert!(svc.current_user(&s.token.value).await.is_ok());
        clock.advance(Duration::seconds(1));
        assert!(matches!(
            svc.current_user(&s.token.value).await.unwrap_err(),
            AuthError::Unauthorized
        ));
        assert!(matches!(
            svc.logout(&s.token.value).await.unwrap_err(),
            AuthError::Unauthorized
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_logouts_with_one_token() {
        let svc = service();
        let s = svc
            .signup(signup_req("Ann", "ann@x.com", "pw123", "pw123"))
            .await
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let svc = svc.clone();
                let token = s.token.value.clone();
                tokio::spawn(async move { svc.logout(&token).await })
            })
            .collect();

        let mut ok = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(()) => ok += 1,
                Err(AuthError::Unauthorized) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(ok, 1);
    }

    /// Token store whose inserts fail until `healthy` is set.
    #[derive(Default)]
    struct FlakyTokenStore {
        healthy: std::sync::atomic::AtomicBool,
        inner: MemoryTokenStore,
    }

    #[async_trait]
    impl TokenStore for FlakyTokenStore {
        async fn insert(&self, record: &TokenRecord) -> anyhow::Result<()> {
            anyhow::ensure!(
                self.healthy.load(std::sync::atomic::Ordering::SeqCst),
                "token table unavailable"
            );
            self.inner.insert(record).await
        }
        async fn find_by_hash(&self, token_hash: &str) -> anyhow::Result<Option<TokenRecord>> {
            self.inner.find_by_hash(token_hash).await
        }
        async fn revoke(&self, token_hash: &str) -> anyhow::Result<bool> {
            self.inner.revoke(token_hash).await
        }
        async fn revoke_live(
            &self,
            token_hash: &str,
            now: OffsetDateTime,
        ) -> anyhow::Result<Option<Uuid>> {
            self.inner.revoke_live(token_hash, now).await
        }
    }

    #[tokio::test]
    async fn failed_issue_after_signup_recovers_through_login() {
        let users: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
        let tokens = Arc::new(FlakyTokenStore::default());
        let issuer = TokenIssuer::new(
            tokens.clone(),
            users.clone(),
            Arc::new(ManualClock::new(datetime!(2026-03-01 09:00 UTC))),
            &TokenConfig::default(),
        );
        let svc = AuthService::new(users, issuer);

        let err = svc
            .signup(signup_req("Ann", "ann@x.com", "pw123", "pw123"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Storage(_)));
        assert_eq!(err.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);

        // the account exists, so a retried signup conflicts and login succeeds
        tokens
            .healthy
            .store(true, std::sync::atomic::Ordering::SeqCst);
        assert!(matches!(
            svc.signup(signup_req("Ann", "ann@x.com", "pw123", "pw123"))
                .await
                .unwrap_err(),
            AuthError::DuplicateEmail
        ));
        let s = svc.login(login_req("ann@x.com", "pw123")).await.unwrap();
        assert!(svc.current_user(&s.token.value).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_signups_with_same_email() {
        let svc = service();
        let handles: Vec<_> = (0..6)
            .map(|i| {
                let svc = svc.clone();
                // vary the case to exercise case-insensitive uniqueness
                let email = if i % 2 == 0 { "race@x.com" } else { "RACE@x.com" };
                tokio::spawn(async move {
                    svc.signup(signup_req("Racer", email, "pw", "pw")).await
                })
            })
            .collect();

        let mut ok = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(AuthError::DuplicateEmail) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(ok, 1);
    }
}
