//! Engine configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Invalid values fail fast at startup
//! rather than surfacing mid-execution.

use std::net::SocketAddr;

/// Top-level engine configuration.
///
/// Loaded once at startup via [`EngineConfig::from_env`] and passed
/// explicitly to every component that needs it.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Socket address to bind the HTTP server to.
    pub listen_addr: SocketAddr,

    /// Database settings.
    pub database: DatabaseConfig,

    /// Redis settings for the job queue.
    pub redis: RedisConfig,

    /// Worker pool concurrency (1..=50).
    pub queue_concurrency: usize,

    /// Maximum queue delivery attempts per job (1..=10).
    pub queue_max_attempts: u32,

    /// Wallet address injected into venue adapters at construction.
    pub wallet_address: String,

    /// Log level seed for the tracing filter.
    pub log_level: LogLevel,
}

/// PostgreSQL connection settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Database user.
    pub user: String,
    /// Database password.
    pub password: String,
    /// Database name.
    pub name: String,
    /// Whether to require SSL.
    pub ssl: bool,
    /// Minimum idle connections in the pool.
    pub pool_min: u32,
    /// Maximum connections in the pool.
    pub pool_max: u32,
}

impl DatabaseConfig {
    /// Builds a `postgres://` connection URL from the settings.
    #[must_use]
    pub fn connection_url(&self) -> String {
        let ssl_mode = if self.ssl { "require" } else { "prefer" };
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={ssl_mode}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

/// Redis connection settings.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis host.
    pub host: String,
    /// Redis port.
    pub port: u16,
    /// Optional password.
    pub password: Option<String>,
}

impl RedisConfig {
    /// Builds a `redis://` connection URL from the settings.
    #[must_use]
    pub fn connection_url(&self) -> String {
        match &self.password {
            Some(pw) => format!("redis://:{pw}@{}:{}/", self.host, self.port),
            None => format!("redis://{}:{}/", self.host, self.port),
        }
    }
}

/// Log verbosity level. Maps onto the tracing `EnvFilter` default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Errors only.
    Error,
    /// Warnings and errors.
    Warn,
    /// Informational and above.
    Info,
    /// Everything including debug.
    Debug,
}

impl LogLevel {
    /// Returns the level as the string `tracing_subscriber` expects.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            other => Err(format!(
                "invalid LOG_LEVEL {other:?}: expected error|warn|info|debug"
            )),
        }
    }
}

/// Error raised when a configuration value is invalid.
#[derive(Debug, thiserror::Error)]
#[error("configuration error: {0}")]
pub struct ConfigError(String);

impl EngineConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    /// Missing variables fall back to defaults; present-but-invalid
    /// variables are a hard error.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a variable fails to parse or is
    /// outside its allowed range.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port: u16 = parse_env("PORT", 3000)?;
        let listen_addr: SocketAddr = format!("0.0.0.0:{port}")
            .parse()
            .map_err(|e| ConfigError(format!("PORT: {e}")))?;

        let database = DatabaseConfig {
            host: env_or("DB_HOST", "localhost"),
            port: parse_env("DB_PORT", 5432)?,
            user: env_or("DB_USER", "swapflow"),
            password: env_or("DB_PASSWORD", "swapflow"),
            name: env_or("DB_NAME", "swapflow"),
            ssl: parse_env_bool("DB_SSL", false)?,
            pool_min: parse_env("DB_POOL_MIN", 2)?,
            pool_max: parse_env("DB_POOL_MAX", 10)?,
        };
        if database.pool_min > database.pool_max {
            return Err(ConfigError(format!(
                "DB_POOL_MIN {} exceeds DB_POOL_MAX {}",
                database.pool_min, database.pool_max
            )));
        }

        let redis = RedisConfig {
            host: env_or("REDIS_HOST", "localhost"),
            port: parse_env("REDIS_PORT", 6379)?,
            password: std::env::var("REDIS_PASSWORD").ok().filter(|s| !s.is_empty()),
        };

        let queue_concurrency: usize = parse_env("QUEUE_CONCURRENCY", 10)?;
        if !(1..=50).contains(&queue_concurrency) {
            return Err(ConfigError(format!(
                "QUEUE_CONCURRENCY must be in 1..=50, got {queue_concurrency}"
            )));
        }

        let queue_max_attempts: u32 = parse_env("QUEUE_MAX_ATTEMPTS", 3)?;
        if !(1..=10).contains(&queue_max_attempts) {
            return Err(ConfigError(format!(
                "QUEUE_MAX_ATTEMPTS must be in 1..=10, got {queue_max_attempts}"
            )));
        }

        let wallet_address = env_or("WALLET_ADDRESS", "");
        if wallet_address.is_empty() {
            return Err(ConfigError("WALLET_ADDRESS must be set".to_string()));
        }

        let log_level: LogLevel = std::env::var("LOG_LEVEL")
            .unwrap_or_else(|_| "info".to_string())
            .parse()
            .map_err(ConfigError)?;

        Ok(Self {
            listen_addr,
            database,
            redis,
            queue_concurrency,
            queue_max_attempts,
            wallet_address,
            log_level,
        })
    }
}

/// Reads an environment variable, falling back to `default` when unset.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parses an environment variable as `T`. Missing values use `default`;
/// present-but-unparsable values are an error.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| ConfigError(format!("{key}: {e}"))),
        Err(_) => Ok(default),
    }
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive).
fn parse_env_bool(key: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(key).ok().as_deref() {
        Some("true") | Some("TRUE") | Some("1") => Ok(true),
        Some("false") | Some("FALSE") | Some("0") => Ok(false),
        Some(other) => Err(ConfigError(format!(
            "{key}: expected true|false|1|0, got {other:?}"
        ))),
        None => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn log_level_parses_case_insensitive() {
        assert_eq!("INFO".parse::<LogLevel>(), Ok(LogLevel::Info));
        assert_eq!("debug".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn database_url_includes_ssl_mode() {
        let cfg = DatabaseConfig {
            host: "db".to_string(),
            port: 5432,
            user: "u".to_string(),
            password: "p".to_string(),
            name: "orders".to_string(),
            ssl: true,
            pool_min: 2,
            pool_max: 10,
        };
        assert_eq!(
            cfg.connection_url(),
            "postgres://u:p@db:5432/orders?sslmode=require"
        );
    }

    #[test]
    fn redis_url_with_and_without_password() {
        let mut cfg = RedisConfig {
            host: "cache".to_string(),
            port: 6379,
            password: None,
        };
        assert_eq!(cfg.connection_url(), "redis://cache:6379/");

        cfg.password = Some("secret".to_string());
        assert_eq!(cfg.connection_url(), "redis://:secret@cache:6379/");
    }
}
