//! Participation model and its two state machines
//!
//! A participation is one member's registration record for one event. Its
//! seat-holding status and its payment sub-state are closed enums; every
//! change goes through the transition functions below so call sites never
//! assign a status directly.

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use crate::utils::errors::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "participation_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipationStatus {
    Registered,
    PendingPayment,
    WaitingList,
    Cancelled,
}

impl ParticipationStatus {
    /// Status assigned when a member (re-)registers
    pub fn on_registration(seat_available: bool, monetized: bool) -> Self {
        match (seat_available, monetized) {
            (false, _) => ParticipationStatus::WaitingList,
            (true, true) => ParticipationStatus::PendingPayment,
            (true, false) => ParticipationStatus::Registered,
        }
    }

    /// Waitlist promotion; a member who already paid skips the payment step
    pub fn promote(self, monetized: bool, already_paid: bool) -> Result<Self> {
        match self {
            ParticipationStatus::WaitingList if monetized && !already_paid => {
                Ok(ParticipationStatus::PendingPayment)
            }
            ParticipationStatus::WaitingList => Ok(ParticipationStatus::Registered),
            other => Err(invalid(other, "promoted")),
        }
    }

    /// Status after a confirmed payment; only a pending slot competes for a seat
    pub fn settle(self, seat_available: bool) -> Self {
        match self {
            ParticipationStatus::PendingPayment if seat_available => ParticipationStatus::Registered,
            ParticipationStatus::PendingPayment => ParticipationStatus::WaitingList,
            other => other,
        }
    }

    pub fn cancel(self) -> Result<Self> {
        match self {
            ParticipationStatus::Cancelled => Err(invalid(self, ParticipationStatus::Cancelled)),
            _ => Ok(ParticipationStatus::Cancelled),
        }
    }

    /// Counts against event capacity
    pub fn holds_seat(self) -> bool {
        self == ParticipationStatus::Registered
    }

    pub fn is_terminal(self) -> bool {
        self == ParticipationStatus::Cancelled
    }
}

impl std::fmt::Display for ParticipationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParticipationStatus::Registered => write!(f, "REGISTERED"),
            ParticipationStatus::PendingPayment => write!(f, "PENDING_PAYMENT"),
            ParticipationStatus::WaitingList => write!(f, "WAITING_LIST"),
            ParticipationStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
    Credited,
    Expired,
}

impl PaymentStatus {
    /// Payment confirmed. `None` covers rows created before a price existed.
    pub fn mark_paid(current: Option<Self>) -> Result<Self> {
        match current {
            None | Some(PaymentStatus::Pending) | Some(PaymentStatus::Expired) => Ok(PaymentStatus::Paid),
            Some(other) => Err(invalid(other, PaymentStatus::Paid)),
        }
    }

    pub fn refund(self) -> Result<Self> {
        match self {
            PaymentStatus::Paid => Ok(PaymentStatus::Refunded),
            other => Err(invalid(other, PaymentStatus::Refunded)),
        }
    }

    pub fn credit(self) -> Result<Self> {
        match self {
            PaymentStatus::Paid => Ok(PaymentStatus::Credited),
            other => Err(invalid(other, PaymentStatus::Credited)),
        }
    }

    pub fn expire(self) -> Result<Self> {
        match self {
            PaymentStatus::Pending => Ok(PaymentStatus::Expired),
            other => Err(invalid(other, PaymentStatus::Expired)),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "PENDING"),
            PaymentStatus::Paid => write!(f, "PAID"),
            PaymentStatus::Refunded => write!(f, "REFUNDED"),
            PaymentStatus::Credited => write!(f, "CREDITED"),
            PaymentStatus::Expired => write!(f, "EXPIRED"),
        }
    }
}

fn invalid(from: impl std::fmt::Display, to: impl std::fmt::Display) -> EngineError {
    EngineError::InvalidStateTransition {
        from: from.to_string(),
        to: to.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Participation {
    pub id: i64,
    pub event_id: i64,
    pub member_id: i64,
    pub tenant_id: i64,
    pub status: ParticipationStatus,
    pub payment_status: Option<PaymentStatus>,
    pub payment_intent_id: Option<String>,
    pub amount_paid_cents: Option<i64>,
    pub paid_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refund_amount_cents: Option<i64>,
    pub payment_expires_at: Option<DateTime<Utc>>,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped by the store on every write; a write carrying a stale version is rejected
    pub version: i64,
}

/// Payment facts discovered by the reconciliation protocol or a webhook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSettlement {
    pub intent_id: String,
    pub amount_cents: i64,
    pub paid_at: DateTime<Utc>,
}

/// A waitlisted participation moved forward by the resolver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotedParticipation {
    pub participation_id: i64,
    pub member_id: i64,
    pub status: ParticipationStatus,
    pub registered_at: DateTime<Utc>,
    pub payment_expires_at: Option<DateTime<Utc>>,
}

impl Participation {
    pub fn is_paid(&self) -> bool {
        self.payment_status == Some(PaymentStatus::Paid)
    }

    pub fn amount_paid(&self) -> i64 {
        self.amount_paid_cents.unwrap_or(0)
    }

    /// Fresh admission or reactivation of a cancelled row
    pub fn admit(&mut self, seat_available: bool, monetized: bool, now: DateTime<Utc>) {
        self.status = ParticipationStatus::on_registration(seat_available, monetized);
        self.payment_status = if monetized { Some(PaymentStatus::Pending) } else { None };
        self.payment_intent_id = None;
        self.amount_paid_cents = None;
        self.paid_at = None;
        self.refunded_at = None;
        self.refund_amount_cents = None;
        self.payment_expires_at = None;
        self.registered_at = now;
        self.updated_at = now;
    }

    pub fn promote(&mut self, monetized: bool, payment_expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
        let next = self.status.promote(monetized, self.is_paid())?;
        self.payment_expires_at = match next {
            ParticipationStatus::PendingPayment => Some(payment_expires_at),
            _ => None,
        };
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Apply a confirmed payment. Returns `false` when the row was already paid.
    pub fn record_payment(&mut self, settlement: &PaymentSettlement, seat_available: bool, now: DateTime<Utc>) -> Result<bool> {
        if self.is_paid() {
            return Ok(false);
        }
        self.payment_status = Some(PaymentStatus::mark_paid(self.payment_status)?);
        self.payment_intent_id = Some(settlement.intent_id.clone());
        self.amount_paid_cents = Some(settlement.amount_cents);
        self.paid_at = Some(settlement.paid_at);
        self.status = self.status.settle(seat_available);
        self.payment_expires_at = None;
        self.updated_at = now;
        Ok(true)
    }

    pub fn link_intent(&mut self, intent_id: &str, now: DateTime<Utc>) {
        self.payment_intent_id = Some(intent_id.to_string());
        self.updated_at = now;
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.status = self.status.cancel()?;
        self.payment_expires_at = None;
        self.updated_at = now;
        Ok(())
    }

    /// Terminal transition forced by the event being cancelled. An unpaid
    /// payment expires; a collected one stays PAID until it is refunded.
    pub fn close_for_cancelled_event(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.payment_status == Some(PaymentStatus::Pending) {
            self.expire_payment(now)?;
        }
        if !self.status.is_terminal() {
            self.cancel(now)?;
        }
        Ok(())
    }

    pub fn mark_refunded(&mut self, amount: i64, now: DateTime<Utc>) -> Result<()> {
        let current = self.payment_status.ok_or_else(|| invalid("NONE", PaymentStatus::Refunded))?;
        self.payment_status = Some(current.refund()?);
        self.refund_amount_cents = Some(amount);
        self.refunded_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_credited(&mut self, amount: i64, now: DateTime<Utc>) -> Result<()> {
        let current = self.payment_status.ok_or_else(|| invalid("NONE", PaymentStatus::Credited))?;
        self.payment_status = Some(current.credit()?);
        self.refund_amount_cents = Some(amount);
        self.refunded_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn expire_payment(&mut self, now: DateTime<Utc>) -> Result<()> {
        if let Some(current) = self.payment_status {
            self.payment_status = Some(current.expire()?);
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn payment_window_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.status == ParticipationStatus::PendingPayment
            && !self.is_paid()
            && self.payment_expires_at.map_or(false, |deadline| deadline < now)
    }

    pub fn to_promoted(&self) -> PromotedParticipation {
        PromotedParticipation {
            participation_id: self.id,
            member_id: self.member_id,
            status: self.status,
            registered_at: self.registered_at,
            payment_expires_at: self.payment_expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn participation(status: ParticipationStatus, payment: Option<PaymentStatus>) -> Participation {
        let now = Utc::now();
        Participation {
            id: 1,
            event_id: 10,
            member_id: 100,
            tenant_id: 5,
            status,
            payment_status: payment,
            payment_intent_id: None,
            amount_paid_cents: None,
            paid_at: None,
            refunded_at: None,
            refund_amount_cents: None,
            payment_expires_at: None,
            registered_at: now,
            updated_at: now,
            version: 1,
        }
    }

    fn settlement() -> PaymentSettlement {
        PaymentSettlement {
            intent_id: "pi_123".to_string(),
            amount_cents: 3000,
            paid_at: Utc::now(),
        }
    }

    #[test]
    fn test_registration_status_matrix() {
        assert_eq!(ParticipationStatus::on_registration(true, false), ParticipationStatus::Registered);
        assert_eq!(ParticipationStatus::on_registration(true, true), ParticipationStatus::PendingPayment);
        assert_eq!(ParticipationStatus::on_registration(false, true), ParticipationStatus::WaitingList);
        assert_eq!(ParticipationStatus::on_registration(false, false), ParticipationStatus::WaitingList);
    }

    #[test]
    fn test_only_registered_holds_a_seat() {
        assert!(ParticipationStatus::Registered.holds_seat());
        assert!(!ParticipationStatus::PendingPayment.holds_seat());
        assert!(!ParticipationStatus::WaitingList.holds_seat());
        assert!(!ParticipationStatus::Cancelled.holds_seat());
    }

    #[test]
    fn test_promotion_requires_waiting_list() {
        assert_eq!(
            ParticipationStatus::WaitingList.promote(true, false).unwrap(),
            ParticipationStatus::PendingPayment
        );
        assert_eq!(
            ParticipationStatus::WaitingList.promote(true, true).unwrap(),
            ParticipationStatus::Registered
        );
        assert_eq!(
            ParticipationStatus::WaitingList.promote(false, false).unwrap(),
            ParticipationStatus::Registered
        );
        assert!(ParticipationStatus::Registered.promote(false, false).is_err());
    }

    #[test]
    fn test_record_payment_takes_seat_when_available() {
        let mut p = participation(ParticipationStatus::PendingPayment, Some(PaymentStatus::Pending));
        assert!(p.record_payment(&settlement(), true, Utc::now()).unwrap());
        assert_eq!(p.status, ParticipationStatus::Registered);
        assert_eq!(p.payment_status, Some(PaymentStatus::Paid));
        assert_eq!(p.amount_paid_cents, Some(3000));
        assert_eq!(p.payment_intent_id.as_deref(), Some("pi_123"));
    }

    #[test]
    fn test_record_payment_falls_back_to_waitlist_when_full() {
        let mut p = participation(ParticipationStatus::PendingPayment, Some(PaymentStatus::Pending));
        p.payment_expires_at = Some(Utc::now() + Duration::hours(24));
        p.record_payment(&settlement(), false, Utc::now()).unwrap();
        assert_eq!(p.status, ParticipationStatus::WaitingList);
        assert!(p.payment_expires_at.is_none());
    }

    #[test]
    fn test_record_payment_is_idempotent() {
        let mut p = participation(ParticipationStatus::PendingPayment, Some(PaymentStatus::Pending));
        p.record_payment(&settlement(), true, Utc::now()).unwrap();
        let snapshot = p.clone();
        assert!(!p.record_payment(&settlement(), true, Utc::now()).unwrap());
        assert_eq!(p, snapshot);
    }

    #[test]
    fn test_refund_requires_paid() {
        let mut p = participation(ParticipationStatus::Registered, Some(PaymentStatus::Pending));
        assert!(p.mark_refunded(100, Utc::now()).is_err());

        let mut paid = participation(ParticipationStatus::Registered, Some(PaymentStatus::Paid));
        paid.mark_refunded(100, Utc::now()).unwrap();
        assert_eq!(paid.payment_status, Some(PaymentStatus::Refunded));
        assert_eq!(paid.refund_amount_cents, Some(100));
    }

    #[test]
    fn test_cancel_twice_rejected() {
        let mut p = participation(ParticipationStatus::Registered, None);
        p.cancel(Utc::now()).unwrap();
        assert!(p.cancel(Utc::now()).is_err());
    }

    #[test]
    fn test_close_for_cancelled_event_keeps_collected_money() {
        let now = Utc::now();
        let mut pending = participation(ParticipationStatus::PendingPayment, Some(PaymentStatus::Pending));
        pending.close_for_cancelled_event(now).unwrap();
        assert_eq!(pending.status, ParticipationStatus::Cancelled);
        assert_eq!(pending.payment_status, Some(PaymentStatus::Expired));

        let mut paid = participation(ParticipationStatus::Registered, Some(PaymentStatus::Paid));
        paid.close_for_cancelled_event(now).unwrap();
        assert_eq!(paid.status, ParticipationStatus::Cancelled);
        assert_eq!(paid.payment_status, Some(PaymentStatus::Paid));

        let mut already = participation(ParticipationStatus::Cancelled, Some(PaymentStatus::Refunded));
        already.close_for_cancelled_event(now).unwrap();
        assert_eq!(already.payment_status, Some(PaymentStatus::Refunded));
    }

    #[test]
    fn test_payment_window_elapsed() {
        let now = Utc::now();
        let mut p = participation(ParticipationStatus::PendingPayment, Some(PaymentStatus::Pending));
        assert!(!p.payment_window_elapsed(now));
        p.payment_expires_at = Some(now - Duration::minutes(1));
        assert!(p.payment_window_elapsed(now));
        p.payment_status = Some(PaymentStatus::Paid);
        assert!(!p.payment_window_elapsed(now));
    }
}
