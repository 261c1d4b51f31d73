//! Helper functions and utilities
//!
//! Small pure helpers shared by the engine services and the provider client.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Generate a one-off idempotency key for provider calls that must never be replayed
pub fn generate_idempotency_key(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

/// Stable idempotency key tied to a participation, so retries of the same
/// logical refund collapse into one provider-side refund
pub fn participation_idempotency_key(action: &str, participation_id: i64) -> String {
    format!("{}-participation-{}", action, participation_id)
}

/// Time remaining until `start`, negative once it has passed
pub fn time_until(start: DateTime<Utc>, at: DateTime<Utc>) -> Duration {
    start.signed_duration_since(at)
}

/// Convert a provider unix timestamp (seconds) into a UTC datetime
pub fn from_unix_seconds(seconds: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(seconds, 0)
}
