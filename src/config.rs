use std::path::PathBuf;
use std::str::FromStr;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Json,
    Sqlite,
}

impl FromStr for StoreBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(StoreBackend::Json),
            "sqlite" => Ok(StoreBackend::Sqlite),
            other => Err(AppError::Config(format!("Unknown STORE_BACKEND: {}", other))),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub polka_key: String,
    pub store_backend: StoreBackend,
    pub database_path: PathBuf,
    pub database_url: String,
    pub db_max_connections: u32,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_days: i64,
    pub max_chirp_length: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let jwt_secret = std::env::var("JWT_SECRET")
            .map_err(|_| AppError::Config("JWT_SECRET must be set".to_string()))?;
        if jwt_secret.is_empty() {
            return Err(AppError::Config("JWT_SECRET must not be empty".to_string()));
        }

        Ok(Config {
            jwt_secret,
            polka_key: std::env::var("POLKA_KEY")
                .map_err(|_| AppError::Config("POLKA_KEY must be set".to_string()))?,
            store_backend: std::env::var("STORE_BACKEND")
                .unwrap_or_else(|_| "json".to_string())
                .parse()?,
            database_path: std::env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "database.json".to_string())
                .into(),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://chirpy.db".to_string()),
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|e| AppError::Config(format!("Invalid DB_MAX_CONNECTIONS: {}", e)))?,
            access_token_ttl_secs: std::env::var("ACCESS_TOKEN_TTL_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .map_err(|e| AppError::Config(format!("Invalid ACCESS_TOKEN_TTL_SECS: {}", e)))?,
            refresh_token_ttl_days: std::env::var("REFRESH_TOKEN_TTL_DAYS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|e| AppError::Config(format!("Invalid REFRESH_TOKEN_TTL_DAYS: {}", e)))?,
            max_chirp_length: std::env::var("MAX_CHIRP_LENGTH")
                .unwrap_or_else(|_| "140".to_string())
                .parse()
                .map_err(|e| AppError::Config(format!("Invalid MAX_CHIRP_LENGTH: {}", e)))?,
        })
    }

    /// Defaults for everything but the secrets; used by tests and embedders.
    pub fn with_secrets(jwt_secret: impl Into<String>, polka_key: impl Into<String>) -> Self {
        Config {
            jwt_secret: jwt_secret.into(),
            polka_key: polka_key.into(),
            store_backend: StoreBackend::Json,
            database_path: PathBuf::from("database.json"),
            database_url: "sqlite://chirpy.db".to_string(),
            db_max_connections: 5,
            access_token_ttl_secs: 3600,
            refresh_token_ttl_days: 60,
            max_chirp_length: 140,
        }
    }

    pub fn access_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.access_token_ttl_secs)
    }

    pub fn refresh_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.refresh_token_ttl_days)
    }
}

// Secrets stay out of debug output.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("store_backend", &self.store_backend)
            .field("database_path", &self.database_path)
            .field("database_url", &self.database_url)
            .field("access_token_ttl_secs", &self.access_token_ttl_secs)
            .field("refresh_token_ttl_days", &self.refresh_token_ttl_days)
            .field("max_chirp_length", &self.max_chirp_length)
            .finish_non_exhaustive()
    }
}
