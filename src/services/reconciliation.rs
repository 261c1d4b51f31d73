//! Payment reconciliation protocol
//!
//! Confirms whether a registration's payment succeeded when local state and
//! the provider disagree. Three tiers, cheapest first:
//!
//! 1. poll the local row, waiting for the webhook writer to catch up;
//! 2. retrieve the known (or client-supplied) intent directly;
//! 3. search the provider by metadata and self-heal the local reference.
//!
//! Finalization goes through [`EngineStore::settle_payment`], which is atomic
//! and a no-op for rows that are already paid.

use std::sync::Arc;
use chrono::Utc;
use tracing::{debug, info, warn};
use crate::config::ReconciliationConfig;
use crate::database::EngineStore;
use crate::models::{Participation, PaymentSettlement};
use crate::payments::{IntentSearch, PaymentIntent, PaymentProvider};
use crate::utils::errors::{EngineError, Result};
use crate::utils::logging::{log_payment_event, log_provider_error};

/// Provider account a tenant's intents live on; `None` is the platform account
pub async fn connected_account(store: &dyn EngineStore, tenant_id: i64) -> Result<Option<String>> {
    Ok(store
        .find_payment_account(tenant_id)
        .await?
        .map(|account| account.account_id))
}

/// Like [`connected_account`] but requires charges to be enabled
pub async fn enabled_account(store: &dyn EngineStore, tenant_id: i64) -> Result<String> {
    match store.find_payment_account(tenant_id).await? {
        Some(account) if account.charges_enabled => Ok(account.account_id),
        _ => Err(EngineError::NoPaymentAccount { tenant_id }),
    }
}

#[derive(Clone)]
pub struct PaymentReconciler {
    store: Arc<dyn EngineStore>,
    provider: Arc<dyn PaymentProvider>,
    config: ReconciliationConfig,
}

impl PaymentReconciler {
    pub fn new(store: Arc<dyn EngineStore>, provider: Arc<dyn PaymentProvider>, config: ReconciliationConfig) -> Self {
        Self { store, provider, config }
    }

    /// Run the protocol for one participation.
    ///
    /// Returns the finalized row, or `PaymentNotConfirmed` with the row left untouched.
    pub async fn confirm_payment(&self, participation_id: i64, intent_hint: Option<&str>) -> Result<Participation> {
        let participation = match self.poll_local(participation_id).await? {
            Polled::Paid(participation) => return Ok(participation),
            Polled::Unpaid(participation) => participation,
        };

        let account = connected_account(self.store.as_ref(), participation.tenant_id).await?;

        if let Some(confirmed) = self.direct_lookup(&participation, account.as_deref(), intent_hint).await? {
            return Ok(confirmed);
        }
        if let Some(confirmed) = self.metadata_search(&participation, account.as_deref()).await? {
            return Ok(confirmed);
        }

        info!(
            participation_id = participation_id,
            event_id = participation.event_id,
            "Payment could not be confirmed yet"
        );
        Err(EngineError::PaymentNotConfirmed { participation_id })
    }

    async fn poll_local(&self, participation_id: i64) -> Result<Polled> {
        let attempts = self.config.poll_attempts.max(1);
        let mut attempt = 1;
        loop {
            let participation = self
                .store
                .find_participation(participation_id)
                .await?
                .ok_or(EngineError::ParticipationNotFound { participation_id })?;

            if participation.is_paid() {
                debug!(participation_id = participation_id, attempt = attempt, "Payment already recorded locally");
                return Ok(Polled::Paid(participation));
            }
            if attempt >= attempts {
                return Ok(Polled::Unpaid(participation));
            }

            attempt += 1;
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    async fn direct_lookup(
        &self,
        participation: &Participation,
        account: Option<&str>,
        intent_hint: Option<&str>,
    ) -> Result<Option<Participation>> {
        let Some(intent_id) = intent_hint.or(participation.payment_intent_id.as_deref()) else {
            return Ok(None);
        };

        let intent = match self.provider.retrieve_payment_intent(account, intent_id).await {
            Ok(intent) => intent,
            Err(e) => {
                log_provider_error("retrieve_payment_intent", &e.to_string(), Some(intent_id));
                return Ok(None);
            }
        };

        if !intent.status.is_succeeded() {
            debug!(participation_id = participation.id, intent_id = %intent.id, status = ?intent.status, "Intent not succeeded");
            return Ok(None);
        }
        if !intent.belongs_to(participation.event_id, participation.member_id) {
            warn!(
                participation_id = participation.id,
                intent_id = %intent.id,
                "Intent metadata names a different event or member"
            );
            return Ok(None);
        }

        if participation.payment_intent_id.as_deref() != Some(intent.id.as_str()) {
            info!(participation_id = participation.id, intent_id = %intent.id, "Linking client-supplied intent");
        }
        self.finalize(participation.id, &intent).await.map(Some)
    }

    async fn metadata_search(&self, participation: &Participation, account: Option<&str>) -> Result<Option<Participation>> {
        let search = IntentSearch {
            event_id: participation.event_id,
            user_id: participation.member_id,
            gym_id: participation.tenant_id,
        };

        let intents = match self.provider.search_payment_intents(account, &search).await {
            Ok(intents) => intents,
            Err(e) => {
                log_provider_error("search_payment_intents", &e.to_string(), Some(&participation.id.to_string()));
                return Ok(None);
            }
        };

        let Some(latest) = intents
            .into_iter()
            .filter(|intent| intent.status.is_succeeded())
            .max_by_key(|intent| intent.created)
        else {
            return Ok(None);
        };

        info!(
            participation_id = participation.id,
            previous = ?participation.payment_intent_id,
            intent_id = %latest.id,
            "Self-healing payment intent reference"
        );
        self.finalize(participation.id, &latest).await.map(Some)
    }

    async fn finalize(&self, participation_id: i64, intent: &PaymentIntent) -> Result<Participation> {
        let settlement = PaymentSettlement {
            intent_id: intent.id.clone(),
            amount_cents: intent.amount,
            paid_at: Utc::now(),
        };
        let participation = self.store.settle_payment(participation_id, &settlement, Utc::now()).await?;
        log_payment_event(participation_id, Some(&intent.id), "confirmed", Some(intent.amount));
        Ok(participation)
    }
}

enum Polled {
    Paid(Participation),
    Unpaid(Participation),
}
