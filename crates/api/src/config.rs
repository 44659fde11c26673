//! Process configuration loaded from the environment

use std::collections::HashMap;

/// Secrets shorter than this are accepted but logged as weak
const MIN_RECOMMENDED_SECRET_LEN: usize = 32;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Runtime configuration. Built once at startup and shared read-only.
#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub jwt_refresh_secret: String,
    /// Expected audience of Google ID tokens; federated login is disabled without it
    pub google_client_id: Option<String>,
    pub port: u16,
    /// Empty means any origin
    pub allowed_origins: Vec<String>,
}

// Secrets stay out of Debug output.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_max_connections", &self.database_max_connections)
            .field("google_client_id", &self.google_client_id)
            .field("port", &self.port)
            .field("allowed_origins", &self.allowed_origins)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load configuration from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an explicit key/value map
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = non_empty("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let jwt_secret = non_empty("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        let jwt_refresh_secret =
            non_empty("JWT_REFRESH_SECRET").ok_or(ConfigError::Missing("JWT_REFRESH_SECRET"))?;

        if jwt_secret == jwt_refresh_secret {
            return Err(ConfigError::Invalid {
                var: "JWT_REFRESH_SECRET",
                reason: "must differ from JWT_SECRET".to_string(),
            });
        }

        for (var, secret) in [
            ("JWT_SECRET", &jwt_secret),
            ("JWT_REFRESH_SECRET", &jwt_refresh_secret),
        ] {
            if secret.len() < MIN_RECOMMENDED_SECRET_LEN {
                tracing::warn!(
                    var,
                    min_len = MIN_RECOMMENDED_SECRET_LEN,
                    "Signing secret is shorter than recommended"
                );
            }
        }

        let port = match non_empty("PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| ConfigError::Invalid {
                var: "PORT",
                reason: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        let database_max_connections = match non_empty("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => raw.trim().parse::<u32>().map_err(|e| ConfigError::Invalid {
                var: "DATABASE_MAX_CONNECTIONS",
                reason: e.to_string(),
            })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let allowed_origins = non_empty("ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url,
            database_max_connections,
            jwt_secret,
            jwt_refresh_secret,
            google_client_id: non_empty("GOOGLE_CLIENT_ID"),
            port,
            allowed_origins,
        })
    }

    /// Socket address string the server binds to
    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}
