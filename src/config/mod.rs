//! Configuration management
//!
//! Provides configuration defaults, validation, and environment-based
//! overrides for the queue store, token signing, and logging.

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};

use crate::error::{HypervisorError, HypervisorResult};

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from environment variables
    pub fn load_from_env() -> HypervisorResult<AppConfig> {
        let mut config = AppConfig::default();

        if let Ok(val) = std::env::var("HYPERVISOR_LOG_LEVEL") {
            config.logging.level = val;
        }
        if let Ok(val) = std::env::var("REDIS_HOST") {
            config.queue_store.host = val;
        }
        if let Ok(val) = std::env::var("REDIS_PORT") {
            config.queue_store.port = val.parse().map_err(|_| {
                HypervisorError::Validation(format!("REDIS_PORT is not a port number: {val}"))
            })?;
        }
        if let Ok(val) = std::env::var("REDIS_DATABASE_INDEX") {
            config.queue_store.database_index = val.parse().map_err(|_| {
                HypervisorError::Validation(format!("REDIS_DATABASE_INDEX is not an integer: {val}"))
            })?;
        }
        if let Ok(val) = std::env::var("JWT_SECRET_KEY") {
            config.auth.secret_key = val;
        }
        if let Ok(val) = std::env::var("JWT_ALGORITHM") {
            config.auth.algorithm = val;
        }
        if let Ok(val) = std::env::var("ACCESS_TOKEN_EXPIRE_MINUTES") {
            config.auth.token_ttl_minutes = val.parse().map_err(|_| {
                HypervisorError::Validation(format!(
                    "ACCESS_TOKEN_EXPIRE_MINUTES is not an integer: {val}"
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Service configuration
    pub service: ServiceConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Queue store (ordered-set service) configuration
    pub queue_store: QueueStoreConfig,
    /// Bearer-token configuration
    pub auth: AuthConfig,
}

impl AppConfig {
    /// Validate configuration
    pub fn validate(&self) -> HypervisorResult<()> {
        self.service.validate()?;
        self.logging.validate()?;
        self.queue_store.validate()?;
        self.auth.validate()?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            logging: LoggingConfig::default(),
            queue_store: QueueStoreConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    pub name: String,
    /// Service version
    pub version: String,
}

impl ServiceConfig {
    fn validate(&self) -> HypervisorResult<()> {
        if self.name.is_empty() {
            return Err(HypervisorError::Validation(
                "Service name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "hypervisor".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
}

impl LoggingConfig {
    fn validate(&self) -> HypervisorResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.as_str()) {
            return Err(HypervisorError::Validation(format!(
                "Invalid log level: {}",
                self.level
            )));
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Queue store connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStoreConfig {
    /// Queue store host
    pub host: String,
    /// Queue store port
    pub port: u16,
    /// Logical database index
    pub database_index: u32,
}

impl QueueStoreConfig {
    /// Connection URL for the queue store client
    pub fn url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.database_index)
    }

    fn validate(&self) -> HypervisorResult<()> {
        if self.host.is_empty() {
            return Err(HypervisorError::Validation(
                "Queue store host cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for QueueStoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            database_index: 0,
        }
    }
}

/// Bearer-token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Token signing key
    pub secret_key: String,
    /// Token signing algorithm identifier
    pub algorithm: String,
    /// Token time-to-live in minutes
    pub token_ttl_minutes: i64,
}

impl AuthConfig {
    /// Parsed signing algorithm
    pub fn algorithm(&self) -> HypervisorResult<Algorithm> {
        self.algorithm.parse().map_err(|_| {
            HypervisorError::Validation(format!(
                "Unknown token algorithm: {}",
                self.algorithm
            ))
        })
    }

    fn validate(&self) -> HypervisorResult<()> {
        if self.secret_key.is_empty() {
            return Err(HypervisorError::Validation(
                "Token signing key cannot be empty".to_string(),
            ));
        }
        if self.token_ttl_minutes <= 0 {
            return Err(HypervisorError::Validation(
                "Token TTL must be positive".to_string(),
            ));
        }
        self.algorithm()?;
        Ok(())
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key: "my_secret_key".to_string(),
            algorithm: "HS256".to_string(),
            token_ttl_minutes: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn default_config_validates() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn queue_store_url_includes_database_index() {
        let config = QueueStoreConfig {
            host: "queue.internal".to_string(),
            port: 6380,
            database_index: 3,
        };
        assert_eq!(config.url(), "redis://queue.internal:6380/3");
    }

    #[test]
    fn bad_log_level_is_rejected() {
        let mut config = AppConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_algorithm_is_rejected() {
        let mut config = AppConfig::default();
        config.auth.algorithm = "none".to_string();
        assert!(config.validate().is_err());
    }
}
