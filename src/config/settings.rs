//! Engine settings management
//!
//! This module defines the configuration structure and provides methods
//! for loading settings from TOML files and environment variables.

use std::time::Duration;
use serde::{Deserialize, Serialize};

/// Main engine configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub payments: PaymentsConfig,
    pub reconciliation: ReconciliationConfig,
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Redis configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    pub url: String,
    pub prefix: String,
}

/// Payment provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaymentsConfig {
    pub api_url: String,
    pub secret_key: String,
    pub timeout_seconds: u64,
    /// Upper bound on provider calls in flight during mass cancellation
    pub refund_concurrency: usize,
}

/// Payment reconciliation and waitlist window configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconciliationConfig {
    pub poll_attempts: u32,
    pub poll_interval_ms: u64,
    pub payment_window_hours: i64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: String,
}

impl Settings {
    /// Load settings from configuration file and environment variables
    pub fn new() -> Result<Self, config::ConfigError> {
        let defaults = config::Config::try_from(&Settings::default())?;
        let settings = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("GYMBOOKING").separator("__"))
            .build()?;

        settings.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), crate::utils::errors::EngineError> {
        super::validation::validate_settings(self)
    }
}

impl PaymentsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl ReconciliationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn payment_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.payment_window_hours)
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            poll_attempts: 5,
            poll_interval_ms: 1000,
            payment_window_hours: 24,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/gymbooking".to_string(),
                max_connections: 10,
                min_connections: 1,
            },
            redis: RedisConfig {
                url: "redis://localhost:6379".to_string(),
                prefix: "gymbooking:".to_string(),
            },
            payments: PaymentsConfig {
                api_url: "https://api.stripe.com".to_string(),
                secret_key: String::new(),
                timeout_seconds: 10,
                refund_concurrency: 8,
            },
            reconciliation: ReconciliationConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: "/var/log/gymbooking".to_string(),
            },
        }
    }
}
