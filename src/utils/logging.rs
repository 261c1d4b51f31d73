//! Logging configuration and setup
//!
//! This module provides logging initialization and structured logging utilities
//! for the participation engine.

use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use crate::config::LoggingConfig;
use crate::utils::errors::{EngineError, Result};

/// Initialize logging based on configuration
///
/// The returned guard flushes the file writer on drop and must be kept alive
/// for the lifetime of the process.
pub fn init_logging(config: &LoggingConfig) -> Result<WorkerGuard> {
    let file_appender = tracing_appender::rolling::daily(&config.file_path, "gymbooking.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
        .with(tracing_subscriber::fmt::layer().json().with_writer(non_blocking))
        .try_init()
        .map_err(|e| EngineError::Config(format!("Failed to install subscriber: {}", e)))?;

    info!("Logging initialized with level: {}", config.level);
    Ok(guard)
}

/// Log participation lifecycle actions with structured data
pub fn log_participation_action(participation_id: i64, event_id: i64, member_id: i64, action: &str, status: &str) {
    info!(
        participation_id = participation_id,
        event_id = event_id,
        member_id = member_id,
        action = action,
        status = status,
        "Participation action performed"
    );
}

/// Log payment state changes
pub fn log_payment_event(participation_id: i64, intent_id: Option<&str>, event: &str, amount: Option<i64>) {
    info!(
        participation_id = participation_id,
        intent_id = intent_id,
        payment_event = event,
        amount = amount,
        "Payment event recorded"
    );
}

/// Log a refund or intent cancellation that failed during mass cancellation
pub fn log_refund_failure(event_id: i64, participation_id: i64, action: &str, error: &str) {
    warn!(
        event_id = event_id,
        participation_id = participation_id,
        action = action,
        error = error,
        "Provider call failed, participation left for manual follow-up"
    );
}

/// Log provider errors with context
pub fn log_provider_error(operation: &str, error: &str, context: Option<&str>) {
    error!(
        operation = operation,
        error = error,
        context = context,
        "Payment provider error occurred"
    );
}

/// Log administrative event cancellation outcomes
pub fn log_event_cancellation(event_id: i64, actor_id: i64, participants: usize, refunded: i64, failed: usize) {
    if failed > 0 {
        warn!(
            event_id = event_id,
            actor_id = actor_id,
            participants = participants,
            total_refunded = refunded,
            refunds_failed = failed,
            "Event cancelled with refund failures"
        );
    } else {
        info!(
            event_id = event_id,
            actor_id = actor_id,
            participants = participants,
            total_refunded = refunded,
            "Event cancelled"
        );
    }
}

/// Log database operations
pub fn log_database_operation(operation: &str, table: &str, duration_ms: u64, success: bool) {
    if success {
        debug!(
            operation = operation,
            table = table,
            duration_ms = duration_ms,
            "Database operation completed"
        );
    } else {
        error!(
            operation = operation,
            table = table,
            duration_ms = duration_ms,
            "Database operation failed"
        );
    }
}
