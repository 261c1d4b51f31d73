//! Payment-side models: gym payment accounts, refund decisions and
//! the report returned by administrative event cancellation

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use crate::models::{Event, Participation};
use crate::utils::errors::ProviderError;

/// A gym's connected account at the payment provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PaymentAccount {
    pub tenant_id: i64,
    pub account_id: String,
    pub charges_enabled: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundKind {
    NoRefund,
    FullRefund,
    PartialRefund,
    /// Full amount as house credit, no provider refund call
    Credit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundDecision {
    pub amount_cents: i64,
    pub kind: RefundKind,
    pub reason: String,
}

impl RefundDecision {
    pub fn none(reason: impl Into<String>) -> Self {
        Self {
            amount_cents: 0,
            kind: RefundKind::NoRefund,
            reason: reason.into(),
        }
    }

    /// Whether the decision moves money back through the provider
    pub fn requires_provider_refund(&self) -> bool {
        matches!(self.kind, RefundKind::FullRefund | RefundKind::PartialRefund) && self.amount_cents > 0
    }
}

/// Client-facing handle for the intent a member should pay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntentHandle {
    pub intent_id: String,
    pub client_secret: Option<String>,
    pub reused: bool,
    pub already_paid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedAction {
    Refund,
    CancelIntent,
}

/// One provider call that failed during mass cancellation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancellationFailure {
    pub participation_id: i64,
    pub member_id: i64,
    pub action: FailedAction,
    pub intent_id: String,
    pub amount_cents: Option<i64>,
    pub error: ProviderError,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CancellationReport {
    pub event_id: i64,
    pub participants_count: usize,
    pub refunds_processed: usize,
    pub refunds_failed: usize,
    pub payments_cancelled: usize,
    pub total_refunded_cents: i64,
    pub failures: Vec<CancellationFailure>,
}

impl CancellationReport {
    pub fn new(event_id: i64, participants_count: usize) -> Self {
        Self {
            event_id,
            participants_count,
            ..Default::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of one attempt to commit an event cancellation
#[derive(Debug, Clone)]
pub enum CancellationCommit {
    /// The event is cancelled and every settled row was written
    Committed(Event),
    /// Nothing was written. Holds the current state of every row that
    /// appeared or changed after the settled snapshot was read.
    Stale(Vec<Participation>),
}

/// Check the event's current rows, read under the event lock, against the
/// settled snapshot. Returns the rows that must be settled again.
pub fn stale_rows(current: &[Participation], settled: &[Participation]) -> Vec<Participation> {
    current
        .iter()
        .filter(|row| match settled.iter().find(|s| s.id == row.id) {
            Some(s) => s.version != row.version,
            None => !row.status.is_terminal(),
        })
        .cloned()
        .collect()
}
