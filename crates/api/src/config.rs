//! Application configuration

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Which [`helpdesk_shared::HelpdeskStore`] backend to run against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Credentials for the superadmin created on first start
#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
    pub name: String,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub cors_allowed_origins: Vec<String>,
    pub log_format: LogFormat,

    // Storage
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Sessions
    pub session_secret: String,
    pub session_expiry_hours: i64,
    pub session_cookie_secure: bool,

    // Uploads
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,

    // Notifications
    pub events_keepalive: Duration,

    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let storage_backend = match env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .to_lowercase()
            .as_str()
        {
            "postgres" => StorageBackend::Postgres,
            "memory" => StorageBackend::Memory,
            _ => return Err(ConfigError::Invalid("STORAGE_BACKEND must be postgres or memory")),
        };

        let database_url = env::var("DATABASE_URL").ok();
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        // A zero interval would make the keep-alive timer spin
        let keepalive_secs: u64 = env::var("EVENTS_KEEPALIVE_SECS")
            .unwrap_or_else(|_| "15".to_string())
            .parse()
            .unwrap_or(15);
        if keepalive_secs == 0 {
            return Err(ConfigError::Invalid(
                "EVENTS_KEEPALIVE_SECS must be greater than zero",
            ));
        }

        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            log_format: match env::var("LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },

            // Storage
            storage_backend,
            database_url,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),

            // Sessions
            session_secret: {
                let secret = env::var("SESSION_SECRET")
                    .map_err(|_| ConfigError::Missing("SESSION_SECRET"))?;
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "SESSION_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },
            session_expiry_hours: env::var("SESSION_EXPIRY_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .unwrap_or(24),
            session_cookie_secure: env::var("SESSION_COOKIE_SECURE")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),

            // Uploads
            upload_dir: env::var("UPLOAD_DIR")
                .unwrap_or_else(|_| "public/uploads".to_string())
                .into(),
            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .unwrap_or_else(|_| "16777216".to_string()) // 16MB default
                .parse()
                .unwrap_or(16 * 1024 * 1024),

            // Notifications
            events_keepalive: Duration::from_secs(keepalive_secs),

            bootstrap_admin: match (
                env::var("BOOTSTRAP_ADMIN_EMAIL"),
                env::var("BOOTSTRAP_ADMIN_PASSWORD"),
            ) {
                (Ok(email), Ok(password)) if !email.is_empty() && !password.is_empty() => {
                    Some(BootstrapAdmin {
                        email,
                        password,
                        name: env::var("BOOTSTRAP_ADMIN_NAME")
                            .unwrap_or_else(|_| "Administrator".to_string()),
                    })
                }
                _ => None,
            },
        })
    }

    /// Configuration for tests and local runs against the in-memory store
    pub fn for_memory(session_secret: impl Into<String>) -> Self {
        Self {
            bind_address: "127.0.0.1:0".to_string(),
            cors_allowed_origins: Vec::new(),
            log_format: LogFormat::Pretty,
            storage_backend: StorageBackend::Memory,
            database_url: None,
            database_max_connections: 1,
            session_secret: session_secret.into(),
            session_expiry_hours: 24,
            session_cookie_secure: false,
            upload_dir: env::temp_dir().join("helpdesk-uploads"),
            max_upload_bytes: 16 * 1024 * 1024,
            events_keepalive: Duration::from_secs(15),
            bootstrap_admin: None,
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
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const SECRET: &str = "test-session-secret-must-be-at-least-32-characters";

    fn cleanup_config() {
        for key in [
            "STORAGE_BACKEND",
            "DATABASE_URL",
            "SESSION_SECRET",
            "EVENTS_KEEPALIVE_SECS",
            "CORS_ALLOWED_ORIGINS",
            "BOOTSTRAP_ADMIN_EMAIL",
            "BOOTSTRAP_ADMIN_PASSWORD",
            "LOG_FORMAT",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_postgres_backend_requires_database_url() {
        cleanup_config();
        env::set_var("SESSION_SECRET", SECRET);

        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::Missing("DATABASE_URL"))));

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_short_secret_rejected() {
        cleanup_config();
        env::set_var("STORAGE_BACKEND", "memory");
        env::set_var("SESSION_SECRET", "too-short");

        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::WeakSecret(_))));

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_memory_backend_defaults() {
        cleanup_config();
        env::set_var("STORAGE_BACKEND", "memory");
        env::set_var("SESSION_SECRET", SECRET);
        env::set_var("EVENTS_KEEPALIVE_SECS", "5");
        env::set_var("CORS_ALLOWED_ORIGINS", "https://a.example, ,https://b.example");
        env::set_var("LOG_FORMAT", "json");

        let config = Config::from_env().unwrap();
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert_eq!(config.bind_address, "0.0.0.0:3000");
        assert_eq!(config.session_expiry_hours, 24);
        assert_eq!(config.events_keepalive, Duration::from_secs(5));
        assert_eq!(
            config.cors_allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.bootstrap_admin.is_none());

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_bootstrap_admin_needs_email_and_password() {
        cleanup_config();
        env::set_var("STORAGE_BACKEND", "memory");
        env::set_var("SESSION_SECRET", SECRET);
        env::set_var("BOOTSTRAP_ADMIN_EMAIL", "root@example.com");

        assert!(Config::from_env().unwrap().bootstrap_admin.is_none());

        env::set_var("BOOTSTRAP_ADMIN_PASSWORD", "changeme");
        let admin = Config::from_env().unwrap().bootstrap_admin.unwrap();
        assert_eq!(admin.email, "root@example.com");
        assert_eq!(admin.name, "Administrator");

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_zero_keepalive_rejected() {
        cleanup_config();
        env::set_var("STORAGE_BACKEND", "memory");
        env::set_var("SESSION_SECRET", SECRET);
        env::set_var("EVENTS_KEEPALIVE_SECS", "0");

        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("EVENTS_KEEPALIVE_SECS must be greater than zero"))
        ));

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_unknown_backend_rejected() {
        cleanup_config();
        env::set_var("STORAGE_BACKEND", "sqlite");
        env::set_var("SESSION_SECRET", SECRET);

        assert!(matches!(Config::from_env(), Err(ConfigError::Invalid(_))));

        cleanup_config();
    }
}
