//! Database service layer
//!
//! Postgres implementation of [`EngineStore`]. Seat-affecting operations open
//! a transaction, lock the event row with `SELECT ... FOR UPDATE`, and only
//! then count registered seats, which serializes concurrent check-and-reserve
//! attempts on the same event.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use crate::database::{DatabasePool, EventRepository, ParticipationRepository, PaymentAccountRepository};
use crate::database::store::EngineStore;
use crate::models::*;
use crate::services::capacity;
use crate::utils::errors::{EngineError, Result};

#[derive(Debug, Clone)]
pub struct DatabaseService {
    pool: DatabasePool,
    pub events: EventRepository,
    pub participations: ParticipationRepository,
    pub accounts: PaymentAccountRepository,
}

impl DatabaseService {
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            events: EventRepository::new(pool.clone()),
            participations: ParticipationRepository::new(pool.clone()),
            accounts: PaymentAccountRepository::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl EngineStore for DatabaseService {
    async fn create_event(&self, request: &CreateEventRequest) -> Result<Event> {
        request.validate()?;
        self.events.create(request).await
    }

    async fn find_event(&self, event_id: i64) -> Result<Option<Event>> {
        self.events.find_by_id(event_id).await
    }

    async fn update_event_capacity(&self, event_id: i64, capacity: i32) -> Result<(Event, i32)> {
        let mut tx = self.pool.begin().await?;
        let mut event = EventRepository::lock(&mut tx, event_id)
            .await?
            .ok_or(EngineError::EventNotFound { event_id })?;
        let registered = ParticipationRepository::count_registered(&mut tx, event_id).await?;

        let previous = event.change_capacity(capacity, registered, Utc::now())?;
        let event = EventRepository::save(&mut tx, &event).await?;
        tx.commit().await?;

        debug!(event_id = event_id, previous = previous, capacity = capacity, "Event capacity updated");
        Ok((event, previous))
    }

    async fn record_completion_attempt(&self, event_id: i64, now: DateTime<Utc>) -> Result<Event> {
        let mut tx = self.pool.begin().await?;
        let mut event = EventRepository::lock(&mut tx, event_id)
            .await?
            .ok_or(EngineError::EventNotFound { event_id })?;
        event.record_completion_attempt(now)?;
        let event = EventRepository::save(&mut tx, &event).await?;
        tx.commit().await?;
        Ok(event)
    }

    async fn upsert_payment_account(&self, account: &PaymentAccount) -> Result<PaymentAccount> {
        self.accounts.upsert(account).await
    }

    async fn find_payment_account(&self, tenant_id: i64) -> Result<Option<PaymentAccount>> {
        self.accounts.find_by_tenant(tenant_id).await
    }

    async fn find_participation(&self, participation_id: i64) -> Result<Option<Participation>> {
        self.participations.find_by_id(participation_id).await
    }

    async fn find_member_participation(&self, event_id: i64, member_id: i64) -> Result<Option<Participation>> {
        self.participations.find_for_member(event_id, member_id).await
    }

    async fn find_participation_by_intent(&self, intent_id: &str) -> Result<Option<Participation>> {
        self.participations.find_by_intent(intent_id).await
    }

    async fn list_active_participations(&self, event_id: i64) -> Result<Vec<Participation>> {
        self.participations.list_active(event_id).await
    }

    async fn count_registered(&self, event_id: i64) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        ParticipationRepository::count_registered(&mut conn, event_id).await
    }

    async fn admit_participant(&self, event_id: i64, member_id: i64, now: DateTime<Utc>) -> Result<Participation> {
        let mut tx = self.pool.begin().await?;
        let event = EventRepository::lock(&mut tx, event_id)
            .await?
            .ok_or(EngineError::EventNotFound { event_id })?;
        event.ensure_open_for_registration(now)?;

        let registered = ParticipationRepository::count_registered(&mut tx, event_id).await?;
        let seat_available = event.has_seat_for(registered);

        let participation = match ParticipationRepository::lock_for_member(&mut tx, event_id, member_id).await? {
            Some(existing) if !existing.status.is_terminal() => {
                return Err(EngineError::AlreadyRegistered { event_id, member_id });
            }
            Some(mut existing) => {
                existing.admit(seat_available, event.is_paid, now);
                ParticipationRepository::save(&mut tx, &existing).await?
            }
            None => {
                let mut fresh = Participation {
                    id: 0,
                    event_id,
                    member_id,
                    tenant_id: event.tenant_id,
                    status: ParticipationStatus::WaitingList,
                    payment_status: None,
                    payment_intent_id: None,
                    amount_paid_cents: None,
                    paid_at: None,
                    refunded_at: None,
                    refund_amount_cents: None,
                    payment_expires_at: None,
                    registered_at: now,
                    updated_at: now,
                    version: 0,
                };
                fresh.admit(seat_available, event.is_paid, now);
                ParticipationRepository::insert(&mut tx, &fresh).await?
            }
        };

        tx.commit().await?;
        Ok(participation)
    }

    async fn promote_waitlisted(&self, event_id: i64, payment_window: Duration, now: DateTime<Utc>) -> Result<Vec<PromotedParticipation>> {
        let mut tx = self.pool.begin().await?;
        let event = EventRepository::lock(&mut tx, event_id)
            .await?
            .ok_or(EngineError::EventNotFound { event_id })?;
        if !event.is_open() {
            return Ok(Vec::new());
        }

        let registered = ParticipationRepository::count_registered(&mut tx, event_id).await?;
        if capacity::promotion_slots(&event, registered) == 0 {
            return Ok(Vec::new());
        }

        let waiting = ParticipationRepository::lock_by_status(&mut tx, event_id, ParticipationStatus::WaitingList).await?;
        let promoted = capacity::promote_waitlisted(&event, registered, waiting, payment_window, now)?;

        let mut saved = Vec::with_capacity(promoted.len());
        for participation in &promoted {
            saved.push(ParticipationRepository::save(&mut tx, participation).await?.to_promoted());
        }
        tx.commit().await?;
        Ok(saved)
    }

    async fn settle_payment(&self, participation_id: i64, settlement: &PaymentSettlement, now: DateTime<Utc>) -> Result<Participation> {
        let current = self
            .participations
            .find_by_id(participation_id)
            .await?
            .ok_or(EngineError::ParticipationNotFound { participation_id })?;

        let mut tx = self.pool.begin().await?;
        let event = EventRepository::lock(&mut tx, current.event_id)
            .await?
            .ok_or(EngineError::EventNotFound { event_id: current.event_id })?;
        let mut participation = ParticipationRepository::lock(&mut tx, participation_id)
            .await?
            .ok_or(EngineError::ParticipationNotFound { participation_id })?;

        let registered = ParticipationRepository::count_registered(&mut tx, event.id).await?;
        if !participation.record_payment(settlement, event.has_seat_for(registered), now)? {
            return Ok(participation);
        }

        let participation = ParticipationRepository::save(&mut tx, &participation).await?;
        tx.commit().await?;
        Ok(participation)
    }

    async fn link_payment_intent(&self, participation_id: i64, intent_id: &str, now: DateTime<Utc>) -> Result<Participation> {
        let mut tx = self.pool.begin().await?;
        let mut participation = ParticipationRepository::lock(&mut tx, participation_id)
            .await?
            .ok_or(EngineError::ParticipationNotFound { participation_id })?;
        participation.link_intent(intent_id, now);
        let participation = ParticipationRepository::save(&mut tx, &participation).await?;
        tx.commit().await?;
        Ok(participation)
    }

    async fn save_participation(&self, participation: &Participation) -> Result<Participation> {
        let mut conn = self.pool.acquire().await?;
        ParticipationRepository::save_if_current(&mut conn, participation)
            .await?
            .ok_or_else(|| EngineError::ConcurrentUpdate(format!("participation {}", participation.id)))
    }

    async fn expire_overdue_payments(&self, event_id: i64, now: DateTime<Utc>) -> Result<Vec<Participation>> {
        let mut tx = self.pool.begin().await?;
        EventRepository::lock(&mut tx, event_id)
            .await?
            .ok_or(EngineError::EventNotFound { event_id })?;

        let pending = ParticipationRepository::lock_by_status(&mut tx, event_id, ParticipationStatus::PendingPayment).await?;
        let mut expired = Vec::new();
        for mut participation in pending.into_iter().filter(|p| p.payment_window_elapsed(now)) {
            participation.cancel(now)?;
            participation.expire_payment(now)?;
            expired.push(ParticipationRepository::save(&mut tx, &participation).await?);
        }
        tx.commit().await?;
        Ok(expired)
    }

    async fn commit_event_cancellation(&self, event_id: i64, settled: &[Participation], audit: &CancellationAudit) -> Result<CancellationCommit> {
        let mut tx = self.pool.begin().await?;
        let mut event = EventRepository::lock(&mut tx, event_id)
            .await?
            .ok_or(EngineError::EventNotFound { event_id })?;
        event.apply_cancellation(audit)?;

        let current = ParticipationRepository::lock_for_event(&mut tx, event_id).await?;
        let stale = stale_rows(&current, settled);
        if !stale.is_empty() {
            debug!(event_id = event_id, stale = stale.len(), "Cancellation commit found rows changed since settlement");
            return Ok(CancellationCommit::Stale(stale));
        }

        for participation in settled {
            ParticipationRepository::save(&mut tx, participation).await?;
        }
        let event = EventRepository::save(&mut tx, &event).await?;
        tx.commit().await?;
        Ok(CancellationCommit::Committed(event))
    }
}
