//! Payment intent issuance for a member's first payment
//!
//! Reuses a still-payable intent instead of creating duplicates, and treats a
//! remote `succeeded` intent as proof of payment.

use std::sync::Arc;
use chrono::Utc;
use tracing::{debug, info};
use crate::database::EngineStore;
use crate::models::{Event, Participation, PaymentIntentHandle, PaymentSettlement};
use crate::payments::{CreateIntentRequest, IntentMetadata, PaymentIntent, PaymentProvider};
use crate::services::reconciliation::enabled_account;
use crate::utils::errors::{EngineError, ProviderError, Result};
use crate::utils::helpers::generate_idempotency_key;
use crate::utils::logging::log_payment_event;

#[derive(Clone)]
pub struct PaymentIntentIssuer {
    store: Arc<dyn EngineStore>,
    provider: Arc<dyn PaymentProvider>,
}

impl PaymentIntentIssuer {
    pub fn new(store: Arc<dyn EngineStore>, provider: Arc<dyn PaymentProvider>) -> Self {
        Self { store, provider }
    }

    pub async fn get_or_create_payment_intent(&self, event_id: i64, member_id: i64) -> Result<PaymentIntentHandle> {
        let event = self
            .store
            .find_event(event_id)
            .await?
            .ok_or(EngineError::EventNotFound { event_id })?;
        if !event.is_paid {
            return Err(EngineError::InvalidInput(format!("Event {} does not take payments", event_id)));
        }

        let participation = self
            .store
            .find_member_participation(event_id, member_id)
            .await?
            .ok_or(EngineError::MemberNotRegistered { event_id, member_id })?;
        if participation.status.is_terminal() {
            return Err(EngineError::InvalidStateTransition {
                from: participation.status.to_string(),
                to: "PAYMENT".to_string(),
            });
        }

        if participation.is_paid() {
            if let Some(intent_id) = &participation.payment_intent_id {
                return Ok(PaymentIntentHandle {
                    intent_id: intent_id.clone(),
                    client_secret: None,
                    reused: true,
                    already_paid: true,
                });
            }
        }

        let account = enabled_account(self.store.as_ref(), event.tenant_id).await?;

        if let Some(existing_id) = participation.payment_intent_id.as_deref() {
            match self.provider.retrieve_payment_intent(Some(&account), existing_id).await {
                Ok(intent) if intent.status.is_reusable() => {
                    debug!(participation_id = participation.id, intent_id = %intent.id, "Reusing open payment intent");
                    return Ok(handle(intent, true, false));
                }
                Ok(intent) if intent.status.is_succeeded() => {
                    self.settle(&participation, &intent).await?;
                    return Ok(handle(intent, true, true));
                }
                Ok(intent) => {
                    debug!(participation_id = participation.id, intent_id = %intent.id, status = ?intent.status, "Stored intent is no longer payable");
                }
                Err(ProviderError::NotFound(_)) => {
                    debug!(participation_id = participation.id, intent_id = existing_id, "Stored intent missing at provider");
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.create(&event, &participation, &account).await
    }

    async fn create(&self, event: &Event, participation: &Participation, account: &str) -> Result<PaymentIntentHandle> {
        let request = CreateIntentRequest {
            amount: event.price(),
            currency: event.currency_code().to_string(),
            metadata: IntentMetadata {
                event_id: event.id,
                user_id: participation.member_id,
                gym_id: event.tenant_id,
                participation_id: Some(participation.id),
            },
            idempotency_key: generate_idempotency_key("intent"),
        };

        let intent = self.provider.create_payment_intent(Some(account), &request).await?;
        self.store
            .link_payment_intent(participation.id, &intent.id, Utc::now())
            .await?;

        info!(
            participation_id = participation.id,
            event_id = event.id,
            intent_id = %intent.id,
            amount = intent.amount,
            "Payment intent created"
        );
        Ok(handle(intent, false, false))
    }

    async fn settle(&self, participation: &Participation, intent: &PaymentIntent) -> Result<()> {
        let settlement = PaymentSettlement {
            intent_id: intent.id.clone(),
            amount_cents: intent.amount,
            paid_at: Utc::now(),
        };
        self.store.settle_payment(participation.id, &settlement, Utc::now()).await?;
        log_payment_event(participation.id, Some(&intent.id), "confirmed_on_issue", Some(intent.amount));
        Ok(())
    }
}

fn handle(intent: PaymentIntent, reused: bool, already_paid: bool) -> PaymentIntentHandle {
    PaymentIntentHandle {
        intent_id: intent.id,
        client_secret: if already_paid { None } else { intent.client_secret },
        reused,
        already_paid,
    }
}
