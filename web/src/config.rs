//! Configuration loaded from environment variables (`spec.md` §6).
//!
//! Grounded in the teacher's own `examples/ticketing/src/config.rs`
//! `Config::from_env()` shape (one field per env var, `env::var(..).ok().and_then(|s|
//! s.parse().ok()).unwrap_or(default)`), but fallible rather than
//! panic-on-missing: `DATABASE_URL` has no safe default, and a missing or
//! unparsable required variable must produce exit code 1, not a panic.

use std::env;
use std::time::Duration;

use thiserror::Error;

/// Failure to assemble a valid [`Config`] from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable was not set.
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    /// A variable was set but failed to parse into its expected type.
    #[error("environment variable {name} has invalid value {value:?}")]
    Invalid {
        /// The variable's name.
        name: &'static str,
        /// The raw, unparsable value.
        value: String,
    },
}

/// Application configuration assembled from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// `DATABASE_URL`.
    pub database_url: String,
    /// `DB_POOL_MIN`.
    pub db_pool_min: u32,
    /// `DB_POOL_MAX`.
    pub db_pool_max: u32,
    /// `DB_STATEMENT_TIMEOUT`, as a [`Duration`].
    pub db_statement_timeout: Duration,
    /// `HORIZON_DAYS`, default 30.
    pub horizon_days: i64,
    /// `OUTBOX_POLL_MS`.
    pub outbox_poll_ms: u64,
    /// `OUTBOX_BATCH`.
    pub outbox_batch: u32,
    /// `OUTBOX_MAX_ATTEMPTS`.
    pub outbox_max_attempts: u32,
    /// `IDEMPOTENCY_TTL_SECONDS`.
    pub idempotency_ttl_seconds: i64,
    /// `RATE_LIMIT_PUBLIC_PER_MIN`.
    pub rate_limit_public_per_min: u32,
    /// `SERVER_HOST`, default `0.0.0.0`.
    pub server_host: String,
    /// `SERVER_PORT`, default `8080`.
    pub server_port: u16,
    /// `LOG_LEVEL` / `RUST_LOG`, default `info`.
    pub log_level: String,
}

impl Config {
    /// Load configuration from the environment, failing fast on a missing or
    /// unparsable required variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            db_pool_min: optional_parsed("DB_POOL_MIN", 2)?,
            db_pool_max: optional_parsed("DB_POOL_MAX", 10)?,
            db_statement_timeout: Duration::from_millis(optional_parsed("DB_STATEMENT_TIMEOUT", 5_000)?),
            horizon_days: optional_parsed("HORIZON_DAYS", 30)?,
            outbox_poll_ms: optional_parsed("OUTBOX_POLL_MS", 500)?,
            outbox_batch: optional_parsed("OUTBOX_BATCH", 50)?,
            outbox_max_attempts: optional_parsed("OUTBOX_MAX_ATTEMPTS", 8)?,
            idempotency_ttl_seconds: optional_parsed("IDEMPOTENCY_TTL_SECONDS", 86_400)?,
            rate_limit_public_per_min: optional_parsed("RATE_LIMIT_PUBLIC_PER_MIN", 120)?,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: optional_parsed("SERVER_PORT", 8080)?,
            log_level: env::var("LOG_LEVEL").or_else(|_| env::var("RUST_LOG")).unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn optional_parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(value) => value.parse().map_err(|_| ConfigError::Invalid { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn missing_database_url_is_an_error() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        env::remove_var("DATABASE_URL");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn invalid_numeric_value_is_an_error() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        env::set_var("DATABASE_URL", "postgres://localhost/test");
        env::set_var("DB_POOL_MIN", "not-a-number");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "DB_POOL_MIN", .. }));
        env::remove_var("DB_POOL_MIN");
        env::remove_var("DATABASE_URL");
    }

    #[test]
    fn defaults_apply_when_optional_vars_absent() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        env::set_var("DATABASE_URL", "postgres://localhost/test");
        env::remove_var("HORIZON_DAYS");
        let config = Config::from_env().unwrap();
        assert_eq!(config.horizon_days, 30);
        env::remove_var("DATABASE_URL");
    }
}
