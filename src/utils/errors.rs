//! Error handling for GymBooking
//!
//! This module defines the main error types used throughout the engine
//! and provides a unified error handling strategy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the participation engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Payment provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Event not found: {event_id}")]
    EventNotFound { event_id: i64 },

    #[error("Participation not found: {participation_id}")]
    ParticipationNotFound { participation_id: i64 },

    #[error("Member {member_id} has no participation in event {event_id}")]
    MemberNotRegistered { event_id: i64, member_id: i64 },

    #[error("Event {event_id} is not open for registration")]
    EventNotOpen { event_id: i64 },

    #[error("Member {member_id} is already registered for event {event_id}")]
    AlreadyRegistered { event_id: i64, member_id: i64 },

    #[error("Event {event_id} is already cancelled")]
    AlreadyCancelled { event_id: i64 },

    #[error("Gym {tenant_id} has no payment account configured")]
    NoPaymentAccount { tenant_id: i64 },

    #[error("Payment for participation {participation_id} is still processing, retry shortly")]
    PaymentNotConfirmed { participation_id: i64 },

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("{0} was modified concurrently, retry")]
    ConcurrentUpdate(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Payment provider specific errors
///
/// Kept `Clone` and serializable so per-item failures can be carried
/// verbatim inside a cancellation report.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ProviderError {
    #[error("Provider resource not found: {0}")]
    NotFound(String),

    #[error("Provider request timed out")]
    Timeout,

    #[error("Provider rate limit exceeded")]
    RateLimited,

    #[error("Provider temporarily unavailable: {0}")]
    Transient(String),

    #[error("Provider rejected request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether retrying the same call later could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout | ProviderError::RateLimited | ProviderError::Transient(_)
        )
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Result type alias for payment provider calls
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

impl EngineError {
    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            EngineError::Database(_) => false,
            EngineError::Migration(_) => false,
            EngineError::Provider(e) => e.is_transient(),
            EngineError::Config(_) => false,
            EngineError::EventNotFound { .. } => false,
            EngineError::ParticipationNotFound { .. } => false,
            EngineError::MemberNotRegistered { .. } => false,
            EngineError::EventNotOpen { .. } => false,
            EngineError::AlreadyRegistered { .. } => false,
            EngineError::AlreadyCancelled { .. } => false,
            EngineError::NoPaymentAccount { .. } => false,
            EngineError::PaymentNotConfirmed { .. } => true,
            EngineError::InvalidStateTransition { .. } => false,
            EngineError::ConcurrentUpdate(_) => true,
            EngineError::Redis(_) => true,
            EngineError::Http(_) => true,
            EngineError::Serialization(_) => false,
            EngineError::UrlParse(_) => false,
            EngineError::InvalidInput(_) => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            EngineError::Database(_) => ErrorSeverity::Critical,
            EngineError::Migration(_) => ErrorSeverity::Critical,
            EngineError::Config(_) => ErrorSeverity::Critical,
            EngineError::NoPaymentAccount { .. } => ErrorSeverity::Warning,
            EngineError::PaymentNotConfirmed { .. } => ErrorSeverity::Warning,
            EngineError::ConcurrentUpdate(_) => ErrorSeverity::Warning,
            EngineError::EventNotFound { .. }
            | EngineError::ParticipationNotFound { .. }
            | EngineError::MemberNotRegistered { .. }
            | EngineError::EventNotOpen { .. }
            | EngineError::AlreadyRegistered { .. }
            | EngineError::AlreadyCancelled { .. }
            | EngineError::InvalidInput(_) => ErrorSeverity::Info,
            _ => ErrorSeverity::Error,
        }
    }

    /// True for the not-found family surfaced as-is to callers
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::EventNotFound { .. }
                | EngineError::ParticipationNotFound { .. }
                | EngineError::MemberNotRegistered { .. }
        )
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "INFO"),
            ErrorSeverity::Warning => write!(f, "WARN"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}
