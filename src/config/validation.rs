//! Configuration validation module
//!
//! This module provides validation functions for engine configuration
//! to ensure all required settings are properly configured.

use crate::utils::errors::{EngineError, Result};
use super::Settings;

/// Validate all configuration settings
pub fn validate_settings(settings: &Settings) -> Result<()> {
    validate_database_config(&settings.database)?;
    validate_redis_config(&settings.redis)?;
    validate_payments_config(&settings.payments)?;
    validate_reconciliation_config(&settings.reconciliation)?;
    validate_logging_config(&settings.logging)?;

    Ok(())
}

/// Validate database configuration
fn validate_database_config(config: &super::DatabaseConfig) -> Result<()> {
    if config.url.is_empty() {
        return Err(EngineError::Config(
            "Database URL is required".to_string()
        ));
    }

    if config.max_connections == 0 {
        return Err(EngineError::Config(
            "Max connections must be greater than 0".to_string()
        ));
    }

    if config.min_connections > config.max_connections {
        return Err(EngineError::Config(
            "Min connections cannot be greater than max connections".to_string()
        ));
    }

    Ok(())
}

/// Validate Redis configuration
fn validate_redis_config(config: &super::RedisConfig) -> Result<()> {
    if config.url.is_empty() {
        return Err(EngineError::Config(
            "Redis URL is required".to_string()
        ));
    }

    Ok(())
}

/// Validate payment provider configuration
fn validate_payments_config(config: &super::PaymentsConfig) -> Result<()> {
    url::Url::parse(&config.api_url)?;

    if config.secret_key.is_empty() {
        return Err(EngineError::Config(
            "Payment provider secret key is required".to_string()
        ));
    }

    if config.timeout_seconds == 0 {
        return Err(EngineError::Config(
            "Payment provider timeout must be greater than 0".to_string()
        ));
    }

    if config.refund_concurrency == 0 {
        return Err(EngineError::Config(
            "Refund concurrency must be greater than 0".to_string()
        ));
    }

    Ok(())
}

/// Validate reconciliation configuration
fn validate_reconciliation_config(config: &super::ReconciliationConfig) -> Result<()> {
    if config.poll_attempts == 0 {
        return Err(EngineError::Config(
            "At least one payment poll attempt is required".to_string()
        ));
    }

    if config.payment_window_hours <= 0 {
        return Err(EngineError::Config(
            "Payment window must be a positive number of hours".to_string()
        ));
    }

    Ok(())
}

/// Validate logging configuration
fn validate_logging_config(config: &super::LoggingConfig) -> Result<()> {
    if config.level.is_empty() {
        return Err(EngineError::Config(
            "Log level is required".to_string()
        ));
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.level.as_str()) {
        return Err(EngineError::Config(
            format!("Invalid log level: {}. Valid levels: {:?}", config.level, valid_levels)
        ));
    }

    Ok(())
}
