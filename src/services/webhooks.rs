//! Provider webhook intake
//!
//! Applies `payment_intent.succeeded` notifications to local state. This is
//! the asynchronous writer the reconciliation polling tier waits for.
//! Signature verification happens before an intent reaches this module.

use std::sync::Arc;
use chrono::Utc;
use tracing::{debug, warn};
use crate::database::EngineStore;
use crate::models::{Participation, PaymentSettlement};
use crate::payments::provider::METADATA_PARTICIPATION_ID;
use crate::payments::PaymentIntent;
use crate::utils::errors::Result;
use crate::utils::logging::log_payment_event;

#[derive(Clone)]
pub struct WebhookHandler {
    store: Arc<dyn EngineStore>,
}

impl WebhookHandler {
    pub fn new(store: Arc<dyn EngineStore>) -> Self {
        Self { store }
    }

    /// Returns the settled participation, or `None` when the intent matches no row
    pub async fn handle_payment_succeeded(&self, intent: &PaymentIntent) -> Result<Option<Participation>> {
        if !intent.status.is_succeeded() {
            debug!(intent_id = %intent.id, status = ?intent.status, "Ignoring non-succeeded intent notification");
            return Ok(None);
        }

        let Some(participation) = self.locate(intent).await? else {
            warn!(intent_id = %intent.id, "Succeeded intent matches no participation");
            return Ok(None);
        };

        let settlement = PaymentSettlement {
            intent_id: intent.id.clone(),
            amount_cents: intent.amount,
            paid_at: intent.created_at(),
        };
        let settled = self
            .store
            .settle_payment(participation.id, &settlement, Utc::now())
            .await?;

        log_payment_event(settled.id, Some(&intent.id), "webhook_succeeded", Some(intent.amount));
        Ok(Some(settled))
    }

    async fn locate(&self, intent: &PaymentIntent) -> Result<Option<Participation>> {
        if let Some(found) = self.store.find_participation_by_intent(&intent.id).await? {
            return Ok(Some(found));
        }

        let Some(participation_id) = intent.metadata_id(METADATA_PARTICIPATION_ID) else {
            return Ok(None);
        };
        let candidate = self.store.find_participation(participation_id).await?;
        Ok(candidate.filter(|p| intent.belongs_to(p.event_id, p.member_id)))
    }
}
