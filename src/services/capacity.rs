//! Capacity and waitlist resolution
//!
//! The seat arithmetic lives here as pure functions so every store applies
//! exactly the same rules inside its own atomic section. [`WaitlistResolver`]
//! is the service entry point that asks the store to run them under the
//! event lock.

use std::sync::Arc;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use crate::database::EngineStore;
use crate::models::{Event, Participation, ParticipationStatus, PromotedParticipation};
use crate::utils::errors::Result;

/// Number of waitlisted entries that may move forward right now.
/// Unlimited events never promote; they never waitlist in the first place.
pub fn promotion_slots(event: &Event, registered: i64) -> usize {
    if event.is_unlimited() {
        return 0;
    }
    let vacancies = i64::from(event.capacity) - registered;
    if vacancies <= 0 {
        0
    } else {
        vacancies as usize
    }
}

/// Strict FIFO by registration time; row id keeps the order stable for equal timestamps
pub fn order_waitlist(waiting: &mut [Participation]) {
    waiting.sort_by(|a, b| a.registered_at.cmp(&b.registered_at).then(a.id.cmp(&b.id)));
}

/// Promote the head of the waitlist into the free seats.
///
/// Returns only the rows that changed; the caller persists them.
pub fn promote_waitlisted(
    event: &Event,
    registered: i64,
    mut waiting: Vec<Participation>,
    payment_window: Duration,
    now: DateTime<Utc>,
) -> Result<Vec<Participation>> {
    let slots = promotion_slots(event, registered);
    if slots == 0 {
        return Ok(Vec::new());
    }

    waiting.retain(|p| p.status == ParticipationStatus::WaitingList);
    order_waitlist(&mut waiting);

    let deadline = now + payment_window;
    let mut promoted = Vec::with_capacity(slots.min(waiting.len()));
    for mut participation in waiting.into_iter().take(slots) {
        participation.promote(event.is_paid, deadline, now)?;
        promoted.push(participation);
    }
    Ok(promoted)
}

/// Waitlist resolver service
#[derive(Clone)]
pub struct WaitlistResolver {
    store: Arc<dyn EngineStore>,
    payment_window: Duration,
}

impl WaitlistResolver {
    pub fn new(store: Arc<dyn EngineStore>, payment_window: Duration) -> Self {
        Self { store, payment_window }
    }

    /// Fill free seats from the waitlist in registration order
    pub async fn promote_from_waitlist(&self, event_id: i64) -> Result<Vec<PromotedParticipation>> {
        debug!(event_id = event_id, "Resolving waitlist");
        let promoted = self
            .store
            .promote_waitlisted(event_id, self.payment_window, Utc::now())
            .await?;

        if !promoted.is_empty() {
            info!(
                event_id = event_id,
                promoted = promoted.len(),
                members = ?promoted.iter().map(|p| p.member_id).collect::<Vec<_>>(),
                "Waitlisted participants promoted"
            );
        }
        Ok(promoted)
    }
}
