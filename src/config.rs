use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub ttl_minutes: i64,
    pub name: String,
    pub prefix: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            // personal access tokens live for a year
            ttl_minutes: 60 * 24 * 365,
            name: "Personal Access Token".into(),
            prefix: String::new(),
        }
    }
}

/// Upper bound on token lifetime, one hundred years.
pub const MAX_TOKEN_TTL_MINUTES: i64 = 60 * 24 * 365 * 100;

/// Unparseable values fall back to the default; out-of-range ones are an error.
fn parse_ttl_minutes(raw: Option<String>, default: i64) -> anyhow::Result<i64> {
    let ttl = raw
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(default);
    anyhow::ensure!(
        (1..=MAX_TOKEN_TTL_MINUTES).contains(&ttl),
        "TOKEN_TTL_MINUTES must be between 1 and {MAX_TOKEN_TTL_MINUTES}, got {ttl}"
    );
    Ok(ttl)
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Postgres connection string; `None` runs on the in-memory stores.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub token: TokenConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);

        let defaults = TokenConfig::default();
        let ttl_minutes =
            parse_ttl_minutes(std::env::var("TOKEN_TTL_MINUTES").ok(), defaults.ttl_minutes)?;

        let token = TokenConfig {
            ttl_minutes,
            name: std::env::var("TOKEN_NAME").unwrap_or(defaults.name),
            prefix: std::env::var("TOKEN_PREFIX").unwrap_or(defaults.prefix),
        };

        Ok(Self {
            database_url,
            max_connections,
            token,
        })
    }

    /// Config used by the in-memory wiring in tests.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            database_url: None,
            max_connections: 1,
            token: TokenConfig::default(),
        }
    }
}
