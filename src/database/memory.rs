//! In-process store
//!
//! Implements [`EngineStore`] over plain collections behind one async mutex.
//! Holding the mutex for the whole method gives the same check-and-reserve
//! atomicity the Postgres store gets from row locks. Used by the test suite
//! and for running the engine without a database.

use std::collections::{BTreeMap, HashMap};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use crate::database::store::EngineStore;
use crate::models::{
    stale_rows, CancellationAudit, CancellationCommit, CreateEventRequest, Event, EventStatus,
    Participation, ParticipationStatus, PaymentAccount, PaymentSettlement, PromotedParticipation,
};
use crate::services::capacity;
use crate::utils::errors::{EngineError, Result};

#[derive(Debug, Default)]
struct MemoryState {
    events: BTreeMap<i64, Event>,
    participations: BTreeMap<i64, Participation>,
    accounts: HashMap<i64, PaymentAccount>,
    next_event_id: i64,
    next_participation_id: i64,
}

impl MemoryState {
    fn event(&self, event_id: i64) -> Result<&Event> {
        self.events.get(&event_id).ok_or(EngineError::EventNotFound { event_id })
    }

    fn participation(&self, participation_id: i64) -> Result<&Participation> {
        self.participations
            .get(&participation_id)
            .ok_or(EngineError::ParticipationNotFound { participation_id })
    }

    fn registered(&self, event_id: i64) -> i64 {
        self.participations
            .values()
            .filter(|p| p.event_id == event_id && p.status.holds_seat())
            .count() as i64
    }

    fn by_event(&self, event_id: i64) -> impl Iterator<Item = &Participation> {
        self.participations.values().filter(move |p| p.event_id == event_id)
    }

    /// Write a row, bumping its version past the stored one
    fn write(&mut self, mut participation: Participation) -> Participation {
        let stored = self.participations.get(&participation.id).map_or(0, |p| p.version);
        participation.version = stored + 1;
        self.participations.insert(participation.id, participation.clone());
        participation
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every participation of an event, cancelled ones included
    pub async fn participations_for(&self, event_id: i64) -> Vec<Participation> {
        let state = self.state.lock().await;
        let rows = state.by_event(event_id).cloned().collect();
        rows
    }

    /// Overwrite a row as-is. Lets tests stage states the engine itself would not produce.
    pub async fn put_participation(&self, participation: Participation) {
        let mut state = self.state.lock().await;
        state.next_participation_id = state.next_participation_id.max(participation.id);
        state.participations.insert(participation.id, participation);
    }
}

#[async_trait]
impl EngineStore for MemoryStore {
    async fn create_event(&self, request: &CreateEventRequest) -> Result<Event> {
        request.validate()?;
        let mut state = self.state.lock().await;
        state.next_event_id += 1;
        let now = Utc::now();
        let event = Event {
            id: state.next_event_id,
            tenant_id: request.tenant_id,
            creator_id: request.creator_id,
            title: request.title.clone(),
            start_time: request.start_time,
            capacity: request.capacity,
            is_paid: request.is_paid,
            price_cents: request.price_cents,
            currency: request.currency.clone(),
            refund_policy: request.refund_policy,
            refund_deadline_hours: request.refund_deadline_hours,
            partial_refund_percentage: request.partial_refund_percentage,
            status: EventStatus::Scheduled,
            cancelled_at: None,
            cancelled_by: None,
            cancellation_reason: None,
            total_refunded_cents: None,
            completion_attempts: 0,
            created_at: now,
            updated_at: now,
        };
        state.events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn find_event(&self, event_id: i64) -> Result<Option<Event>> {
        Ok(self.state.lock().await.events.get(&event_id).cloned())
    }

    async fn update_event_capacity(&self, event_id: i64, capacity: i32) -> Result<(Event, i32)> {
        let mut state = self.state.lock().await;
        let registered = state.registered(event_id);
        let mut event = state.event(event_id)?.clone();
        let previous = event.change_capacity(capacity, registered, Utc::now())?;
        state.events.insert(event_id, event.clone());
        Ok((event, previous))
    }

    async fn record_completion_attempt(&self, event_id: i64, now: DateTime<Utc>) -> Result<Event> {
        let mut state = self.state.lock().await;
        let mut event = state.event(event_id)?.clone();
        event.record_completion_attempt(now)?;
        state.events.insert(event_id, event.clone());
        Ok(event)
    }

    async fn upsert_payment_account(&self, account: &PaymentAccount) -> Result<PaymentAccount> {
        let mut state = self.state.lock().await;
        state.accounts.insert(account.tenant_id, account.clone());
        Ok(account.clone())
    }

    async fn find_payment_account(&self, tenant_id: i64) -> Result<Option<PaymentAccount>> {
        Ok(self.state.lock().await.accounts.get(&tenant_id).cloned())
    }

    async fn find_participation(&self, participation_id: i64) -> Result<Option<Participation>> {
        Ok(self.state.lock().await.participations.get(&participation_id).cloned())
    }

    async fn find_member_participation(&self, event_id: i64, member_id: i64) -> Result<Option<Participation>> {
        let state = self.state.lock().await;
        let found = state.by_event(event_id).find(|p| p.member_id == member_id).cloned();
        Ok(found)
    }

    async fn find_participation_by_intent(&self, intent_id: &str) -> Result<Option<Participation>> {
        let state = self.state.lock().await;
        let found = state
            .participations
            .values()
            .find(|p| p.payment_intent_id.as_deref() == Some(intent_id))
            .cloned();
        Ok(found)
    }

    async fn list_active_participations(&self, event_id: i64) -> Result<Vec<Participation>> {
        let state = self.state.lock().await;
        let active = state.by_event(event_id).filter(|p| !p.status.is_terminal()).cloned().collect();
        Ok(active)
    }

    async fn count_registered(&self, event_id: i64) -> Result<i64> {
        Ok(self.state.lock().await.registered(event_id))
    }

    async fn admit_participant(&self, event_id: i64, member_id: i64, now: DateTime<Utc>) -> Result<Participation> {
        let mut state = self.state.lock().await;
        let event = state.event(event_id)?.clone();
        event.ensure_open_for_registration(now)?;
        let seat_available = event.has_seat_for(state.registered(event_id));

        let existing = state.by_event(event_id).find(|p| p.member_id == member_id).cloned();
        let participation = match existing {
            Some(p) if !p.status.is_terminal() => {
                return Err(EngineError::AlreadyRegistered { event_id, member_id });
            }
            Some(mut p) => {
                p.admit(seat_available, event.is_paid, now);
                p
            }
            None => {
                state.next_participation_id += 1;
                let mut p = Participation {
                    id: state.next_participation_id,
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
                p.admit(seat_available, event.is_paid, now);
                p
            }
        };

        Ok(state.write(participation))
    }

    async fn promote_waitlisted(&self, event_id: i64, payment_window: Duration, now: DateTime<Utc>) -> Result<Vec<PromotedParticipation>> {
        let mut state = self.state.lock().await;
        let event = state.event(event_id)?.clone();
        if !event.is_open() {
            return Ok(Vec::new());
        }
        let registered = state.registered(event_id);
        let waiting: Vec<Participation> = state
            .by_event(event_id)
            .filter(|p| p.status == ParticipationStatus::WaitingList)
            .cloned()
            .collect();

        let promoted = capacity::promote_waitlisted(&event, registered, waiting, payment_window, now)?;
        let mut saved = Vec::with_capacity(promoted.len());
        for p in promoted {
            saved.push(state.write(p).to_promoted());
        }
        Ok(saved)
    }

    async fn settle_payment(&self, participation_id: i64, settlement: &PaymentSettlement, now: DateTime<Utc>) -> Result<Participation> {
        let mut state = self.state.lock().await;
        let mut participation = state.participation(participation_id)?.clone();
        let event = state.event(participation.event_id)?.clone();
        let seat_available = event.has_seat_for(state.registered(event.id));

        if participation.record_payment(settlement, seat_available, now)? {
            return Ok(state.write(participation));
        }
        Ok(participation)
    }

    async fn link_payment_intent(&self, participation_id: i64, intent_id: &str, now: DateTime<Utc>) -> Result<Participation> {
        let mut state = self.state.lock().await;
        let mut participation = state.participation(participation_id)?.clone();
        participation.link_intent(intent_id, now);
        Ok(state.write(participation))
    }

    async fn save_participation(&self, participation: &Participation) -> Result<Participation> {
        let mut state = self.state.lock().await;
        if state.participation(participation.id)?.version != participation.version {
            return Err(EngineError::ConcurrentUpdate(format!("participation {}", participation.id)));
        }
        Ok(state.write(participation.clone()))
    }

    async fn expire_overdue_payments(&self, event_id: i64, now: DateTime<Utc>) -> Result<Vec<Participation>> {
        let mut state = self.state.lock().await;
        state.event(event_id)?;
        let overdue: Vec<Participation> = state
            .by_event(event_id)
            .filter(|p| p.payment_window_elapsed(now))
            .cloned()
            .collect();

        let mut expired = Vec::with_capacity(overdue.len());
        for mut p in overdue {
            p.cancel(now)?;
            p.expire_payment(now)?;
            expired.push(state.write(p));
        }
        Ok(expired)
    }

    async fn commit_event_cancellation(&self, event_id: i64, settled: &[Participation], audit: &CancellationAudit) -> Result<CancellationCommit> {
        let mut state = self.state.lock().await;
        let mut event = state.event(event_id)?.clone();
        event.apply_cancellation(audit)?;

        let current: Vec<Participation> = state.by_event(event_id).cloned().collect();
        let stale = stale_rows(&current, settled);
        if !stale.is_empty() {
            return Ok(CancellationCommit::Stale(stale));
        }

        for p in settled {
            state.write(p.clone());
        }
        state.events.insert(event_id, event.clone());
        Ok(CancellationCommit::Committed(event))
    }
}
