//! Application configuration

use std::env;

/// Which Session Store backend the server runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::Invalid(
                "STORE_BACKEND must be one of: postgres, memory",
            )),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub cors_allowed_origins: Vec<String>,

    // Storage
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Authentication
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,

    // Chat
    pub reopen_on_customer_message: bool,
    pub max_attachment_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let store_backend: StoreBackend = env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .parse()?;

        let database_url = env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(|origin| origin.trim().to_string())
                        .filter(|origin| !origin.is_empty())
                        .collect()
                })
                .unwrap_or_default(),

            // Storage
            store_backend,
            database_url,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .unwrap_or(20),

            // Authentication
            jwt_secret: {
                let secret =
                    env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "JWT_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },
            jwt_expiry_hours: env::var("JWT_EXPIRY_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .unwrap_or(24),

            // Chat
            reopen_on_customer_message: env::var("REOPEN_ON_CUSTOMER_MESSAGE")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            max_attachment_bytes: env::var("MAX_ATTACHMENT_BYTES")
                .unwrap_or_else(|_| "10485760".to_string()) // 10MB default
                .parse()
                .unwrap_or(10 * 1024 * 1024),
        })
    }

    /// Configuration for tests and local runs: in-memory store, fixed secret
    pub fn for_memory_store(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind_address: "127.0.0.1:0".to_string(),
            cors_allowed_origins: Vec::new(),
            store_backend: StoreBackend::Memory,
            database_url: None,
            database_max_connections: 1,
            jwt_secret: jwt_secret.into(),
            jwt_expiry_hours: 24,
            reopen_on_customer_message: true,
            max_attachment_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const VARS: &[&str] = &[
        "STORE_BACKEND",
        "DATABASE_URL",
        "JWT_SECRET",
        "REOPEN_ON_CUSTOMER_MESSAGE",
        "CORS_ALLOWED_ORIGINS",
        "MAX_ATTACHMENT_BYTES",
    ];

    fn cleanup_config() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    fn set_secret() {
        env::set_var(
            "JWT_SECRET",
            "test-jwt-secret-must-be-at-least-32-characters-long",
        );
    }

    #[test]
    #[serial]
    fn test_postgres_backend_requires_database_url() {
        cleanup_config();
        set_secret();

        match Config::from_env() {
            Err(ConfigError::Missing("DATABASE_URL")) => {}
            other => panic!("Expected Missing DATABASE_URL, got: {:?}", other),
        }

        env::set_var("DATABASE_URL", "postgres://test");
        let config = Config::from_env().unwrap();
        assert_eq!(config.store_backend, StoreBackend::Postgres);

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_memory_backend_defaults() {
        cleanup_config();
        set_secret();
        env::set_var("STORE_BACKEND", "memory");

        let config = Config::from_env().unwrap();
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert!(config.database_url.is_none());
        assert!(config.reopen_on_customer_message);
        assert_eq!(config.max_attachment_bytes, 10 * 1024 * 1024);
        assert!(config.cors_allowed_origins.is_empty());

        env::set_var("REOPEN_ON_CUSTOMER_MESSAGE", "false");
        env::set_var("CORS_ALLOWED_ORIGINS", "https://shop.test, https://admin.shop.test");
        let config = Config::from_env().unwrap();
        assert!(!config.reopen_on_customer_message);
        assert_eq!(config.cors_allowed_origins.len(), 2);

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_weak_jwt_secret_rejected() {
        cleanup_config();
        env::set_var("STORE_BACKEND", "memory");
        env::set_var("JWT_SECRET", "short");

        assert!(matches!(Config::from_env(), Err(ConfigError::WeakSecret(_))));

        env::remove_var("JWT_SECRET");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Missing("JWT_SECRET"))
        ));

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_unknown_backend_rejected() {
        cleanup_config();
        set_secret();
        env::set_var("STORE_BACKEND", "redis");
        assert!(matches!(Config::from_env(), Err(ConfigError::Invalid(_))));
        cleanup_config();
    }
}
