//! Configuration types.

use std::time::Duration;

use crate::error::ConfigError;

/// Default staleness window for persisted sessions (7 days).
pub const DEFAULT_MAX_SESSION_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct OnboardingConfig {
    /// Persisted sessions idle for longer than this are discarded on load.
    pub max_session_age: Duration,
    /// Pause between the welcome message and the first stage prompt.
    /// Zero emits both synchronously.
    pub welcome_delay: Duration,
    /// Settings key the session snapshot is stored under.
    pub storage_key: String,
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            max_session_age: DEFAULT_MAX_SESSION_AGE,
            welcome_delay: Duration::from_millis(1500),
            storage_key: "onboarding_session".to_string(),
        }
    }
}

impl OnboardingConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_session_age = env_parse::<u64>("ONBOARD_MAX_SESSION_AGE_HOURS")
            .and_then(|hours| hours_to_duration("ONBOARD_MAX_SESSION_AGE_HOURS", hours))
            .unwrap_or(defaults.max_session_age);

        let welcome_delay = env_parse::<u64>("ONBOARD_WELCOME_DELAY_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.welcome_delay);

        Self {
            max_session_age,
            welcome_delay,
            ..defaults
        }
    }

    /// Config with no pacing delay, used by tests and batch tooling.
    pub fn immediate() -> Self {
        Self {
            welcome_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// HTTP server configuration for the binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: String,
    /// Root directory for uploaded partner documents.
    pub documents_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            db_path: "./data/onboarding.db".to_string(),
            documents_dir: "./data/documents".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_parse("ONBOARD_PORT").unwrap_or(defaults.port),
            db_path: std::env::var("ONBOARD_DB_PATH").unwrap_or(defaults.db_path),
            documents_dir: std::env::var("ONBOARD_DOCUMENTS_DIR").unwrap_or(defaults.documents_dir),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match parse_value(key, &raw) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!("{e}; using default");
            None
        }
    }
}

fn hours_to_duration(key: &str, hours: u64) -> Option<Duration> {
    match hours.checked_mul(3600) {
        Some(secs) => Some(Duration::from_secs(secs)),
        None => {
            let e = ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{hours} hours is out of range"),
            };
            tracing::warn!("{e}; using default");
            None
        }
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("cannot parse '{raw}'"),
    })
}
