//! Event model

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use crate::utils::errors::{EngineError, Result};

/// Default share refunded under a partial refund policy
pub const DEFAULT_PARTIAL_REFUND_PERCENTAGE: i32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Scheduled,
    Cancelled,
    Completed,
}

impl EventStatus {
    /// Administrative cancellation; terminal states reject
    pub fn cancel(self) -> Result<Self> {
        match self {
            EventStatus::Scheduled => Ok(EventStatus::Cancelled),
            other => Err(EngineError::InvalidStateTransition {
                from: other.to_string(),
                to: EventStatus::Cancelled.to_string(),
            }),
        }
    }

    pub fn complete(self) -> Result<Self> {
        match self {
            EventStatus::Scheduled => Ok(EventStatus::Completed),
            other => Err(EngineError::InvalidStateTransition {
                from: other.to_string(),
                to: EventStatus::Completed.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventStatus::Scheduled => write!(f, "SCHEDULED"),
            EventStatus::Cancelled => write!(f, "CANCELLED"),
            EventStatus::Completed => write!(f, "COMPLETED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "refund_policy", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundPolicy {
    NoRefund,
    FullRefund,
    PartialRefund,
    Credit,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: i64,
    pub tenant_id: i64,
    pub creator_id: Option<i64>,
    pub title: String,
    pub start_time: DateTime<Utc>,
    /// 0 means unlimited
    pub capacity: i32,
    pub is_paid: bool,
    pub price_cents: Option<i64>,
    pub currency: Option<String>,
    pub refund_policy: Option<RefundPolicy>,
    pub refund_deadline_hours: Option<i32>,
    pub partial_refund_percentage: Option<i32>,
    pub status: EventStatus,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<i64>,
    pub cancellation_reason: Option<String>,
    pub total_refunded_cents: Option<i64>,
    pub completion_attempts: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn is_unlimited(&self) -> bool {
        self.capacity == 0
    }

    pub fn is_open(&self) -> bool {
        self.status == EventStatus::Scheduled
    }

    /// Whether another seat can be taken given the current registered count
    pub fn has_seat_for(&self, registered: i64) -> bool {
        self.is_unlimited() || registered < i64::from(self.capacity)
    }

    pub fn price(&self) -> i64 {
        self.price_cents.unwrap_or(0)
    }

    pub fn currency_code(&self) -> &str {
        self.currency.as_deref().unwrap_or("eur")
    }

    pub fn refund_percentage(&self) -> i32 {
        self.partial_refund_percentage
            .unwrap_or(DEFAULT_PARTIAL_REFUND_PERCENTAGE)
            .clamp(0, 100)
    }

    /// Registration is open while scheduled and not yet started
    pub fn ensure_open_for_registration(&self, now: DateTime<Utc>) -> Result<()> {
        if !self.is_open() || self.start_time <= now {
            return Err(EngineError::EventNotOpen { event_id: self.id });
        }
        Ok(())
    }

    /// Apply a capacity edit. Returns the previous capacity.
    ///
    /// Shrinking below the seats already taken is rejected; seats are never revoked.
    pub fn change_capacity(&mut self, capacity: i32, registered: i64, now: DateTime<Utc>) -> Result<i32> {
        if capacity < 0 {
            return Err(EngineError::InvalidInput("Capacity cannot be negative".to_string()));
        }
        if !self.is_open() {
            return Err(EngineError::EventNotOpen { event_id: self.id });
        }
        if capacity > 0 && i64::from(capacity) < registered {
            return Err(EngineError::InvalidInput(format!(
                "Capacity {} is below the {} seats already taken",
                capacity, registered
            )));
        }
        let previous = self.capacity;
        self.capacity = capacity;
        self.updated_at = now;
        Ok(previous)
    }

    pub fn record_completion_attempt(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.completion_attempts += 1;
        if self.status == EventStatus::Scheduled && self.start_time <= now {
            self.status = self.status.complete()?;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Terminal administrative cancellation with audit stamp
    pub fn apply_cancellation(&mut self, audit: &CancellationAudit) -> Result<()> {
        if self.status == EventStatus::Cancelled {
            return Err(EngineError::AlreadyCancelled { event_id: self.id });
        }
        self.status = self.status.cancel()?;
        self.cancelled_at = Some(audit.cancelled_at);
        self.cancelled_by = Some(audit.cancelled_by);
        self.cancellation_reason = Some(audit.reason.clone());
        self.total_refunded_cents = Some(audit.total_refunded_cents);
        self.updated_at = audit.cancelled_at;
        Ok(())
    }
}

/// Audit fields stamped when an event is administratively cancelled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationAudit {
    pub cancelled_at: DateTime<Utc>,
    pub cancelled_by: i64,
    pub reason: String,
    pub total_refunded_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEventRequest {
    pub tenant_id: i64,
    pub creator_id: Option<i64>,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub capacity: i32,
    pub is_paid: bool,
    pub price_cents: Option<i64>,
    pub currency: Option<String>,
    pub refund_policy: Option<RefundPolicy>,
    pub refund_deadline_hours: Option<i32>,
    pub partial_refund_percentage: Option<i32>,
}

impl CreateEventRequest {
    /// Reject requests whose monetization fields disagree with the paid flag
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(EngineError::InvalidInput("Event title is required".to_string()));
        }
        if self.capacity < 0 {
            return Err(EngineError::InvalidInput("Capacity cannot be negative".to_string()));
        }

        let monetization_set = self.price_cents.is_some()
            || self.currency.is_some()
            || self.refund_policy.is_some()
            || self.refund_deadline_hours.is_some()
            || self.partial_refund_percentage.is_some();

        if !self.is_paid {
            if monetization_set {
                return Err(EngineError::InvalidInput(
                    "Free events cannot carry price or refund settings".to_string(),
                ));
            }
            return Ok(());
        }

        match self.price_cents {
            Some(price) if price > 0 => {}
            _ => {
                return Err(EngineError::InvalidInput(
                    "Paid events require a positive price".to_string(),
                ))
            }
        }
        if self.currency.as_deref().map_or(true, |c| c.len() != 3) {
            return Err(EngineError::InvalidInput(
                "Paid events require a three-letter currency".to_string(),
            ));
        }
        if self.refund_policy.is_none() {
            return Err(EngineError::InvalidInput(
                "Paid events require a refund policy".to_string(),
            ));
        }
        if self.refund_deadline_hours.map_or(false, |h| h < 0) {
            return Err(EngineError::InvalidInput(
                "Refund deadline cannot be negative".to_string(),
            ));
        }
        if let Some(pct) = self.partial_refund_percentage {
            if !(0..=100).contains(&pct) {
                return Err(EngineError::InvalidInput(
                    "Partial refund percentage must be between 0 and 100".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paid_request() -> CreateEventRequest {
        CreateEventRequest {
            tenant_id: 1,
            creator_id: Some(9),
            title: "Morning HIIT".to_string(),
            start_time: Utc::now(),
            capacity: 12,
            is_paid: true,
            price_cents: Some(1500),
            currency: Some("eur".to_string()),
            refund_policy: Some(RefundPolicy::PartialRefund),
            refund_deadline_hours: Some(24),
            partial_refund_percentage: Some(50),
        }
    }

    #[test]
    fn test_paid_event_requires_monetization_fields() {
        assert!(paid_request().validate().is_ok());

        let mut missing_price = paid_request();
        missing_price.price_cents = None;
        assert!(missing_price.validate().is_err());

        let mut missing_policy = paid_request();
        missing_policy.refund_policy = None;
        assert!(missing_policy.validate().is_err());
    }

    #[test]
    fn test_free_event_rejects_monetization_fields() {
        let mut request = paid_request();
        request.is_paid = false;
        assert!(request.validate().is_err());

        request.price_cents = None;
        request.currency = None;
        request.refund_policy = None;
        request.refund_deadline_hours = None;
        request.partial_refund_percentage = None;
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_percentage_out_of_range() {
        let mut request = paid_request();
        request.partial_refund_percentage = Some(150);
        assert!(request.validate().is_err());
    }

    fn scheduled_event(capacity: i32) -> Event {
        let now = Utc::now();
        Event {
            id: 3,
            tenant_id: 1,
            creator_id: None,
            title: "Yoga".to_string(),
            start_time: now + chrono::Duration::days(1),
            capacity,
            is_paid: false,
            price_cents: None,
            currency: None,
            refund_policy: None,
            refund_deadline_hours: None,
            partial_refund_percentage: None,
            status: EventStatus::Scheduled,
            cancelled_at: None,
            cancelled_by: None,
            cancellation_reason: None,
            total_refunded_cents: None,
            completion_attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_capacity_change_rules() {
        let mut event = scheduled_event(5);
        assert_eq!(event.change_capacity(8, 5, Utc::now()).unwrap(), 5);
        assert_eq!(event.capacity, 8);
        assert!(event.change_capacity(3, 5, Utc::now()).is_err());
        assert!(event.change_capacity(-1, 0, Utc::now()).is_err());
        assert_eq!(event.change_capacity(0, 5, Utc::now()).unwrap(), 8);
        assert!(event.has_seat_for(10_000));
    }

    #[test]
    fn test_cancellation_is_terminal() {
        let mut event = scheduled_event(5);
        let audit = CancellationAudit {
            cancelled_at: Utc::now(),
            cancelled_by: 77,
            reason: "Instructor sick".to_string(),
            total_refunded_cents: 4500,
        };
        event.apply_cancellation(&audit).unwrap();
        assert_eq!(event.status, EventStatus::Cancelled);
        assert_eq!(event.cancelled_by, Some(77));
        assert_eq!(event.total_refunded_cents, Some(4500));
        assert!(matches!(
            event.apply_cancellation(&audit),
            Err(EngineError::AlreadyCancelled { event_id: 3 })
        ));
    }

    #[test]
    fn test_completion_attempt_completes_started_event() {
        let mut event = scheduled_event(5);
        event.record_completion_attempt(Utc::now()).unwrap();
        assert_eq!(event.status, EventStatus::Scheduled);
        assert_eq!(event.completion_attempts, 1);

        event.start_time = Utc::now() - chrono::Duration::hours(1);
        event.record_completion_attempt(Utc::now()).unwrap();
        assert_eq!(event.status, EventStatus::Completed);
        assert_eq!(event.completion_attempts, 2);
    }

    #[test]
    fn test_event_status_transitions() {
        assert_eq!(EventStatus::Scheduled.cancel().unwrap(), EventStatus::Cancelled);
        assert!(EventStatus::Cancelled.cancel().is_err());
        assert!(EventStatus::Completed.cancel().is_err());
        assert_eq!(EventStatus::Scheduled.complete().unwrap(), EventStatus::Completed);
    }
}
