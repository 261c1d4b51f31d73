//! Participation service implementation
//!
//! Entry point for every participation operation. Composes the store, the
//! payment provider, the waitlist resolver and the reconciliation, intent and
//! cancellation services, and drops cached reads after each write.

use std::collections::HashMap;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use crate::config::Settings;
use crate::database::EngineStore;
use crate::models::{
    CancellationReport, CreateEventRequest, Event, Participation, PaymentIntentHandle,
    PaymentStatus, PromotedParticipation, RefundKind,
};
use crate::payments::{PaymentIntent, PaymentProvider, RefundReason, RefundRequest};
use crate::services::cache::CacheInvalidator;
use crate::services::cancellation::MassCancellationOrchestrator;
use crate::services::capacity::WaitlistResolver;
use crate::services::intents::PaymentIntentIssuer;
use crate::services::reconciliation::{connected_account, enabled_account, PaymentReconciler};
use crate::services::refund::calculate_refund;
use crate::services::webhooks::WebhookHandler;
use crate::utils::errors::{EngineError, Result};
use crate::utils::helpers::participation_idempotency_key;
use crate::utils::logging::{log_participation_action, log_payment_event};

#[derive(Clone)]
pub struct ParticipationService {
    store: Arc<dyn EngineStore>,
    provider: Arc<dyn PaymentProvider>,
    cache: Arc<dyn CacheInvalidator>,
    waitlist: WaitlistResolver,
    reconciler: PaymentReconciler,
    intents: PaymentIntentIssuer,
    cancellations: MassCancellationOrchestrator,
    webhooks: WebhookHandler,
}

impl ParticipationService {
    pub fn new(
        store: Arc<dyn EngineStore>,
        provider: Arc<dyn PaymentProvider>,
        cache: Arc<dyn CacheInvalidator>,
        settings: &Settings,
    ) -> Self {
        Self {
            waitlist: WaitlistResolver::new(store.clone(), settings.reconciliation.payment_window()),
            reconciler: PaymentReconciler::new(store.clone(), provider.clone(), settings.reconciliation.clone()),
            intents: PaymentIntentIssuer::new(store.clone(), provider.clone()),
            cancellations: MassCancellationOrchestrator::new(store.clone(), provider.clone(), &settings.payments),
            webhooks: WebhookHandler::new(store.clone()),
            store,
            provider,
            cache,
        }
    }

    /// Create an event after checking its monetization fields
    pub async fn create_event(&self, request: &CreateEventRequest) -> Result<Event> {
        let event = self.store.create_event(request).await?;
        info!(event_id = event.id, tenant_id = event.tenant_id, is_paid = event.is_paid, "Event created");
        self.cache.invalidate_event(&event).await;
        Ok(event)
    }

    /// Register a member, or put them on the waitlist when the event is full
    pub async fn register_participant(&self, event_id: i64, member_id: i64) -> Result<Participation> {
        debug!(event_id = event_id, member_id = member_id, "Registering participant");
        let participation = self.store.admit_participant(event_id, member_id, Utc::now()).await?;

        log_participation_action(
            participation.id,
            event_id,
            member_id,
            "register",
            &participation.status.to_string(),
        );
        self.invalidate(event_id).await;
        Ok(participation)
    }

    /// Confirm a payment through the reconciliation protocol
    pub async fn confirm_payment(&self, participation_id: i64, intent_hint: Option<&str>) -> Result<Participation> {
        let participation = self.reconciler.confirm_payment(participation_id, intent_hint).await?;
        self.invalidate(participation.event_id).await;
        Ok(participation)
    }

    /// Cancel one member's participation, applying the event's refund policy
    pub async fn cancel_participation(&self, member_id: i64, event_id: i64) -> Result<Participation> {
        let mut participation = self
            .store
            .find_member_participation(event_id, member_id)
            .await?
            .ok_or(EngineError::MemberNotRegistered { event_id, member_id })?;
        let event = self
            .store
            .find_event(event_id)
            .await?
            .ok_or(EngineError::EventNotFound { event_id })?;

        let now = Utc::now();
        participation.status.cancel()?;

        match (participation.payment_status, participation.payment_intent_id.clone()) {
            (Some(PaymentStatus::Paid), Some(intent_id)) => {
                self.refund_on_cancel(&event, &mut participation, &intent_id, now).await?;
            }
            (Some(PaymentStatus::Pending), intent_id) => {
                if let Some(intent_id) = intent_id {
                    self.cancel_intent_best_effort(&participation, &intent_id).await;
                }
                participation.expire_payment(now)?;
            }
            _ => {}
        }

        participation.cancel(now)?;
        let participation = match self.store.save_participation(&participation).await {
            Ok(saved) => saved,
            Err(e @ EngineError::ConcurrentUpdate(_)) => {
                if participation.payment_status == Some(PaymentStatus::Refunded) {
                    error!(
                        participation_id = participation.id,
                        intent_id = participation.payment_intent_id.as_deref().unwrap_or_default(),
                        "Refund issued but participation was modified concurrently"
                    );
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        log_participation_action(participation.id, event_id, member_id, "cancel", &participation.status.to_string());

        if event.is_open() {
            self.waitlist.promote_from_waitlist(event_id).await?;
        }
        self.cache.invalidate_event(&event).await;
        Ok(participation)
    }

    /// Change capacity; an increase fills the new seats from the waitlist
    pub async fn update_event_capacity(&self, event_id: i64, capacity: i32) -> Result<Event> {
        let (event, previous) = self.store.update_event_capacity(event_id, capacity).await?;
        info!(event_id = event_id, previous = previous, capacity = capacity, "Event capacity changed");

        if capacity > previous {
            self.waitlist.promote_from_waitlist(event_id).await?;
        }
        self.cache.invalidate_event(&event).await;
        Ok(event)
    }

    /// Administrative cancellation with full refunds for every payer
    pub async fn cancel_event_with_refunds(&self, event_id: i64, actor_id: i64, reason: &str) -> Result<CancellationReport> {
        let (event, report) = self
            .cancellations
            .cancel_event_with_refunds(event_id, actor_id, reason)
            .await?;
        self.cache.invalidate_event(&event).await;
        Ok(report)
    }

    pub async fn get_or_create_payment_intent(&self, event_id: i64, member_id: i64) -> Result<PaymentIntentHandle> {
        let handle = self.intents.get_or_create_payment_intent(event_id, member_id).await?;
        if handle.already_paid {
            self.invalidate(event_id).await;
        }
        Ok(handle)
    }

    pub async fn promote_from_waitlist(&self, event_id: i64) -> Result<Vec<PromotedParticipation>> {
        let promoted = self.waitlist.promote_from_waitlist(event_id).await?;
        if !promoted.is_empty() {
            self.invalidate(event_id).await;
        }
        Ok(promoted)
    }

    /// Release promoted slots whose payment window ran out, then refill them
    pub async fn expire_overdue_payments(&self, event_id: i64, now: DateTime<Utc>) -> Result<Vec<Participation>> {
        let expired = self.store.expire_overdue_payments(event_id, now).await?;
        if expired.is_empty() {
            return Ok(expired);
        }

        for participation in &expired {
            log_participation_action(participation.id, event_id, participation.member_id, "expire_payment", "CANCELLED");
            if let Some(intent_id) = participation.payment_intent_id.as_deref() {
                self.cancel_intent_best_effort(participation, intent_id).await;
            }
        }

        self.waitlist.promote_from_waitlist(event_id).await?;
        self.invalidate(event_id).await;
        Ok(expired)
    }

    pub async fn record_completion_attempt(&self, event_id: i64, now: DateTime<Utc>) -> Result<Event> {
        let event = self.store.record_completion_attempt(event_id, now).await?;
        debug!(event_id = event_id, attempts = event.completion_attempts, status = %event.status, "Completion attempt recorded");
        self.cache.invalidate_event(&event).await;
        Ok(event)
    }

    /// Webhook intake for `payment_intent.succeeded`
    pub async fn handle_payment_succeeded(&self, intent: &PaymentIntent) -> Result<Option<Participation>> {
        let settled = self.webhooks.handle_payment_succeeded(intent).await?;
        if let Some(participation) = &settled {
            self.invalidate(participation.event_id).await;
        }
        Ok(settled)
    }

    async fn refund_on_cancel(
        &self,
        event: &Event,
        participation: &mut Participation,
        intent_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let decision = calculate_refund(event, participation.amount_paid(), now);
        debug!(
            participation_id = participation.id,
            amount = decision.amount_cents,
            kind = ?decision.kind,
            reason = %decision.reason,
            "Refund decision"
        );

        if decision.requires_provider_refund() {
            let account = enabled_account(self.store.as_ref(), event.tenant_id).await?;
            let mut metadata = HashMap::new();
            metadata.insert("event_id".to_string(), event.id.to_string());
            metadata.insert("participation_id".to_string(), participation.id.to_string());
            metadata.insert("reason".to_string(), "member_cancelled".to_string());

            let request = RefundRequest {
                payment_intent_id: intent_id.to_string(),
                amount: decision.amount_cents,
                reason: RefundReason::RequestedByCustomer,
                metadata,
                idempotency_key: participation_idempotency_key(&format!("refund-{}", intent_id), participation.id),
            };
            self.provider.create_refund(Some(&account), &request).await?;
            participation.mark_refunded(decision.amount_cents, now)?;
            log_payment_event(participation.id, Some(intent_id), "refunded", Some(decision.amount_cents));
        } else if decision.kind == RefundKind::Credit {
            participation.mark_credited(decision.amount_cents, now)?;
            log_payment_event(participation.id, Some(intent_id), "credited", Some(decision.amount_cents));
        }
        Ok(())
    }

    async fn cancel_intent_best_effort(&self, participation: &Participation, intent_id: &str) {
        let account = match connected_account(self.store.as_ref(), participation.tenant_id).await {
            Ok(account) => account,
            Err(e) => {
                warn!(participation_id = participation.id, error = %e, "Could not resolve payment account");
                return;
            }
        };
        if let Err(e) = self.provider.cancel_payment_intent(account.as_deref(), intent_id).await {
            warn!(
                participation_id = participation.id,
                intent_id = intent_id,
                error = %e,
                "Failed to cancel payment intent"
            );
        }
    }

    async fn invalidate(&self, event_id: i64) {
        match self.store.find_event(event_id).await {
            Ok(Some(event)) => self.cache.invalidate_event(&event).await,
            Ok(None) => {}
            Err(e) => warn!(event_id = event_id, error = %e, "Could not load event for cache invalidation"),
        }
    }
}
