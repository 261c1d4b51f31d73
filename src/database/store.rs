//! Participation store contract
//!
//! Every method is one atomic unit against the backing store. Methods that
//! touch seats take the event row lock before reading the registered count,
//! so two callers can never both observe the last free seat.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use crate::models::{
    CancellationAudit, CancellationCommit, CreateEventRequest, Event, Participation,
    PaymentAccount, PaymentSettlement, PromotedParticipation,
};
use crate::utils::errors::Result;

#[async_trait]
pub trait EngineStore: Send + Sync {
    /// Insert a validated event
    async fn create_event(&self, request: &CreateEventRequest) -> Result<Event>;

    async fn find_event(&self, event_id: i64) -> Result<Option<Event>>;

    /// Change capacity under the event lock. Returns the event and the previous capacity.
    async fn update_event_capacity(&self, event_id: i64, capacity: i32) -> Result<(Event, i32)>;

    /// Bump the completion counter; a scheduled event that has started becomes completed
    async fn record_completion_attempt(&self, event_id: i64, now: DateTime<Utc>) -> Result<Event>;

    async fn upsert_payment_account(&self, account: &PaymentAccount) -> Result<PaymentAccount>;

    async fn find_payment_account(&self, tenant_id: i64) -> Result<Option<PaymentAccount>>;

    async fn find_participation(&self, participation_id: i64) -> Result<Option<Participation>>;

    async fn find_member_participation(&self, event_id: i64, member_id: i64) -> Result<Option<Participation>>;

    async fn find_participation_by_intent(&self, intent_id: &str) -> Result<Option<Participation>>;

    /// Every participation of the event that is not cancelled
    async fn list_active_participations(&self, event_id: i64) -> Result<Vec<Participation>>;

    async fn count_registered(&self, event_id: i64) -> Result<i64>;

    /// Check-and-reserve: create or reactivate the member's row with a status
    /// decided from the registered count read under the event lock
    async fn admit_participant(&self, event_id: i64, member_id: i64, now: DateTime<Utc>) -> Result<Participation>;

    /// Run the FIFO promotion rules under the event lock
    async fn promote_waitlisted(&self, event_id: i64, payment_window: Duration, now: DateTime<Utc>) -> Result<Vec<PromotedParticipation>>;

    /// Payment finalization; a no-op for rows that are already paid
    async fn settle_payment(&self, participation_id: i64, settlement: &PaymentSettlement, now: DateTime<Utc>) -> Result<Participation>;

    /// Overwrite the stored intent reference
    async fn link_payment_intent(&self, participation_id: i64, intent_id: &str, now: DateTime<Utc>) -> Result<Participation>;

    /// Persist a participation whose transition does not claim a seat. The
    /// write only lands if the row is still at `participation.version`;
    /// otherwise fails with `ConcurrentUpdate` and leaves the row alone.
    async fn save_participation(&self, participation: &Participation) -> Result<Participation>;

    /// Cancel unpaid promoted slots whose payment window has closed
    async fn expire_overdue_payments(&self, event_id: i64, now: DateTime<Utc>) -> Result<Vec<Participation>>;

    /// Under the event lock, check the settled rows against every row of the
    /// event. When none changed and no active row is missing, write them and
    /// the event audit in one transaction; otherwise write nothing and return
    /// the stale rows.
    async fn commit_event_cancellation(&self, event_id: i64, settled: &[Participation], audit: &CancellationAudit) -> Result<CancellationCommit>;
}
