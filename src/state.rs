use std::sync::Arc;

use crate::auth::{
    memory::{MemoryCredentialStore, MemoryTokenStore},
    repo::{CredentialStore, PgCredentialStore, PgTokenStore, TokenStore},
    services::AuthService,
    tokens::{Clock, SystemClock, TokenIssuer},
};
use crate::config::AppConfig;
use crate::db;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth: AuthService,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let database_url = config.database_url.clone();
        match database_url.as_deref() {
            Some(url) => {
                let pool = db::connect(url, config.max_connections).await?;
                db::migrate(&pool).await?;
                tracing::info!("using postgres stores");
                let users = Arc::new(PgCredentialStore::new(pool.clone())) as Arc<dyn CredentialStore>;
                let tokens = Arc::new(PgTokenStore::new(pool)) as Arc<dyn TokenStore>;
                Ok(Self::from_parts(config, users, tokens, Arc::new(SystemClock)))
            }
            None => {
                tracing::warn!("DATABASE_URL not set; using in-memory stores, data is lost on restart");
                Ok(Self::in_memory(config))
            }
        }
    }

    pub fn in_memory(config: Arc<AppConfig>) -> Self {
        Self::from_parts(
            config,
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(MemoryTokenStore::new()),
            Arc::new(SystemClock),
        )
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn CredentialStore>,
        tokens: Arc<dyn TokenStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let issuer = TokenIssuer::new(tokens, users.clone(), clock, &config.token);
        let auth = AuthService::new(users, issuer);
        Self { config, auth }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        Self::in_memory(Arc::new(AppConfig::in_memory()))
    }
}
