use std::{fmt, str::FromStr};

use chrono::Duration;
use thiserror::Error;

const DEV_JWT_SECRET: &str = "development-secret-change-me";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(ConfigError::ValidationError(format!(
                "unknown environment '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => f.write_str("development"),
            Environment::Production => f.write_str("production"),
        }
    }
}

/// Runtime settings, read from the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiry: Duration,
    pub refresh_expiry: Duration,
    pub scheduler_enabled: bool,
    pub notification_retention_days: i64,
    pub inactive_user_minutes: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            environment: Environment::Development,
            database_url: "sqlite://tracker.sqlite?mode=rwc".to_string(),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            jwt_expiry: Duration::hours(24),
            refresh_expiry: Duration::days(7),
            scheduler_enabled: true,
            notification_retention_days: 30,
            inactive_user_minutes: 30,
        }
    }
}

fn parse_or_default<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + fmt::Display,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Invalid {key}='{raw}', falling back to {default}");
                default
            }
        },
        None => default,
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from `lookup`. Unparseable values are logged and replaced
    /// by their defaults; a missing secret in production is an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let environment = match lookup("ENVIRONMENT") {
            Some(raw) => raw.parse().unwrap_or_else(|err| {
                tracing::warn!("{err}, falling back to development");
                Environment::Development
            }),
            None => Environment::Development,
        };

        let port = match lookup("API_PORT").or_else(|| lookup("PORT")) {
            Some(raw) => raw.trim().parse::<u16>().unwrap_or_else(|_| {
                tracing::warn!("Invalid port '{raw}', falling back to {}", defaults.port);
                defaults.port
            }),
            None => defaults.port,
        };

        let jwt_secret = match lookup("JWT_SECRET").filter(|s| !s.trim().is_empty()) {
            Some(secret) => secret,
            None if environment == Environment::Production => {
                return Err(ConfigError::Missing("JWT_SECRET"));
            }
            None => {
                tracing::warn!("JWT_SECRET not set, using the development secret");
                defaults.jwt_secret
            }
        };

        let config = Config {
            host: lookup("HOST").unwrap_or(defaults.host),
            port,
            environment,
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            jwt_secret,
            jwt_expiry: Duration::hours(parse_or_default(&lookup, "JWT_EXPIRY", 24i64)),
            refresh_expiry: Duration::days(parse_or_default(&lookup, "REFRESH_EXPIRY", 7i64)),
            scheduler_enabled: parse_or_default(&lookup, "SCHEDULER_ENABLED", true),
            notification_retention_days: parse_or_default(
                &lookup,
                "NOTIFICATION_RETENTION_DAYS",
                defaults.notification_retention_days,
            ),
            inactive_user_minutes: parse_or_default(
                &lookup,
                "INACTIVE_USER_MINUTES",
                defaults.inactive_user_minutes,
            ),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "JWT_SECRET must not be empty".to_string(),
            ));
        }
        if self.jwt_expiry <= Duration::zero() {
            return Err(ConfigError::ValidationError(
                "JWT_EXPIRY must be positive".to_string(),
            ));
        }
        if self.refresh_expiry <= Duration::zero() {
            return Err(ConfigError::ValidationError(
                "REFRESH_EXPIRY must be positive".to_string(),
            ));
        }
        if self.notification_retention_days < 1 {
            return Err(ConfigError::ValidationError(
                "NOTIFICATION_RETENTION_DAYS must be at least 1".to_string(),
            ));
        }
        if self.inactive_user_minutes < 1 {
            return Err(ConfigError::ValidationError(
                "INACTIVE_USER_MINUTES must be at least 1".to_string(),
            ));
        }
        if self.environment == Environment::Production && self.jwt_secret == DEV_JWT_SECRET {
            return Err(ConfigError::ValidationError(
                "JWT_SECRET must be changed in production".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
