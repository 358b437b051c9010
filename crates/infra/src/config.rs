//! Process configuration from environment variables.

use std::env;
use std::fmt::Display;
use std::str::FromStr;

use thiserror::Error;
use tracing::{info, warn};

pub const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    /// Reported by `/health`.
    pub app_env: String,
    pub jwt_secret: String,
    pub jwt_ttl_minutes: i64,
    pub cors_origins: Vec<String>,
    pub dispatch_max_retries: u32,
    pub alert_log_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 4000,
            app_env: "development".to_string(),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            jwt_ttl_minutes: 1440,
            cors_origins: split_origins("http://localhost:5173,http://localhost:3000,http://localhost:5172"),
            dispatch_max_retries: 3,
            alert_log_capacity: 500,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let jwt_secret = match lookup("JWT_SECRET").filter(|s| !s.trim().is_empty()) {
            Some(secret) => secret,
            None => {
                warn!("JWT_SECRET not set, using the development secret");
                defaults.jwt_secret
            }
        };

        let jwt_ttl_minutes: i64 = try_load(&lookup, "JWT_TTL_MINUTES", defaults.jwt_ttl_minutes)?;
        if jwt_ttl_minutes <= 0 {
            return Err(ConfigError::Invalid {
                key: "JWT_TTL_MINUTES",
                value: jwt_ttl_minutes.to_string(),
                reason: "must be positive".to_string(),
            });
        }

        Ok(Self {
            port: try_load(&lookup, "PORT", defaults.port)?,
            app_env: lookup("APP_ENV").unwrap_or_else(|| {
                info!("APP_ENV not set, using default: {}", defaults.app_env);
                defaults.app_env.clone()
            }),
            jwt_secret,
            jwt_ttl_minutes,
            cors_origins: lookup("CORS_ORIGINS")
                .map(|raw| split_origins(&raw))
                .unwrap_or(defaults.cors_origins),
            dispatch_max_retries: try_load(&lookup, "DISPATCH_MAX_RETRIES", defaults.dispatch_max_retries)?,
            alert_log_capacity: try_load(&lookup, "ALERT_LOG_CAPACITY", defaults.alert_log_capacity)?,
        })
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

fn try_load<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(config.uses_dev_secret());
    }

    #[test]
    fn values_override_defaults() {
        let config = AppConfig::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("APP_ENV", "production"),
            ("JWT_SECRET", "s3cret"),
            ("CORS_ORIGINS", "https://a.test, https://b.test,"),
            ("DISPATCH_MAX_RETRIES", "7"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.app_env, "production");
        assert!(!config.uses_dev_secret());
        assert_eq!(config.cors_origins, vec!["https://a.test", "https://b.test"]);
        assert_eq!(config.dispatch_max_retries, 7);
    }

    #[test]
    fn unparsable_value_names_the_key() {
        match AppConfig::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err() {
            ConfigError::Invalid { key, value, .. } => {
                assert_eq!(key, "PORT");
                assert_eq!(value, "eighty");
            }
        }
    }

    #[test]
    fn non_positive_ttl_is_rejected() {
        assert!(AppConfig::from_lookup(lookup(&[("JWT_TTL_MINUTES", "0")])).is_err());
    }
}
