//! Mass cancellation of an event
//!
//! Every non-terminal participation is settled independently: paid rows are
//! refunded in full, pending intents are cancelled, everything else is simply
//! cancelled. Provider calls run concurrently with a bounded fan-out and a
//! per-call timeout. A failed call is recorded in the report and never stops
//! the event from being cancelled.
//!
//! Settlement happens off-lock, so the commit re-checks every row of the event
//! under the event lock. Rows registered, paid or cancelled in the meantime
//! come back stale and are settled again from their fresh state before the
//! next commit attempt.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};
use crate::config::PaymentsConfig;
use crate::database::EngineStore;
use crate::models::{
    CancellationAudit, CancellationCommit, CancellationFailure, CancellationReport, Event,
    EventStatus, FailedAction, Participation, PaymentStatus,
};
use crate::payments::{PaymentProvider, RefundReason, RefundRequest};
use crate::services::reconciliation::enabled_account;
use crate::utils::errors::{EngineError, ProviderError, ProviderResult, Result};
use crate::utils::helpers::participation_idempotency_key;
use crate::utils::logging::{log_event_cancellation, log_refund_failure};

/// Commit attempts before giving up on an event that keeps changing
const MAX_COMMIT_ROUNDS: usize = 5;

/// What happened to one participation
#[derive(Debug)]
enum Settled {
    Refunded { intent_id: String, amount: i64 },
    IntentCancelled(String),
    Cancelled,
    Failed(CancellationFailure),
}

#[derive(Clone)]
pub struct MassCancellationOrchestrator {
    store: Arc<dyn EngineStore>,
    provider: Arc<dyn PaymentProvider>,
    call_timeout: Duration,
    concurrency: usize,
}

impl MassCancellationOrchestrator {
    pub fn new(store: Arc<dyn EngineStore>, provider: Arc<dyn PaymentProvider>, config: &PaymentsConfig) -> Self {
        Self {
            store,
            provider,
            call_timeout: config.timeout(),
            concurrency: config.refund_concurrency.max(1),
        }
    }

    pub async fn cancel_event_with_refunds(
        &self,
        event_id: i64,
        actor_id: i64,
        reason: &str,
    ) -> Result<(Event, CancellationReport)> {
        let event = self
            .store
            .find_event(event_id)
            .await?
            .ok_or(EngineError::EventNotFound { event_id })?;
        if event.status == EventStatus::Cancelled {
            return Err(EngineError::AlreadyCancelled { event_id });
        }
        event.status.cancel()?;

        let mut pending = self.store.list_active_participations(event_id).await?;
        info!(
            event_id = event_id,
            actor_id = actor_id,
            participants = pending.len(),
            "Cancelling event with refunds"
        );

        let now = Utc::now();
        let mut account: Option<String> = None;
        let mut outcomes: BTreeMap<i64, (Participation, Settled)> = BTreeMap::new();

        for round in 1..=MAX_COMMIT_ROUNDS {
            if account.is_none() && pending.iter().any(needs_provider) {
                account = Some(enabled_account(self.store.as_ref(), event.tenant_id).await?);
            }

            let settled: Vec<(Participation, Settled)> = stream::iter(pending)
                .map(|participation| {
                    let previous = outcomes.get(&participation.id).map(|(_, outcome)| outcome);
                    self.settle_one(participation, previous, account.as_deref(), now)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;
            for (participation, outcome) in settled {
                outcomes.insert(participation.id, (participation, outcome));
            }

            let report = summarize(event_id, &outcomes);
            let rows: Vec<Participation> = outcomes.values().map(|(p, _)| p.clone()).collect();
            let audit = CancellationAudit {
                cancelled_at: now,
                cancelled_by: actor_id,
                reason: reason.to_string(),
                total_refunded_cents: report.total_refunded_cents,
            };

            match self.store.commit_event_cancellation(event_id, &rows, &audit).await? {
                CancellationCommit::Committed(event) => {
                    for failure in &report.failures {
                        log_refund_failure(event_id, failure.participation_id, action_name(failure.action), &failure.error.to_string());
                    }
                    log_event_cancellation(
                        event_id,
                        actor_id,
                        report.participants_count,
                        report.total_refunded_cents,
                        report.failures.len(),
                    );
                    return Ok((event, report));
                }
                CancellationCommit::Stale(rows) => {
                    warn!(
                        event_id = event_id,
                        round = round,
                        stale = rows.len(),
                        "Participations changed while cancelling, settling them again"
                    );
                    pending = rows;
                }
            }
        }

        Err(EngineError::ConcurrentUpdate(format!("event {}", event_id)))
    }

    /// Settle one row. `previous` is this row's outcome from an earlier round;
    /// a refund or intent cancel already done for the same intent is reused.
    async fn settle_one(
        &self,
        mut participation: Participation,
        previous: Option<&Settled>,
        account: Option<&str>,
        now: DateTime<Utc>,
    ) -> (Participation, Settled) {
        let intent_id = participation.payment_intent_id.clone();
        let outcome = match (participation.payment_status, intent_id) {
            (Some(PaymentStatus::Paid), Some(intent_id)) if participation.amount_paid() > 0 => {
                let amount = participation.amount_paid();
                let result = match previous {
                    Some(Settled::Refunded { intent_id: done, amount: refunded }) if *done == intent_id && *refunded == amount => {
                        debug!(participation_id = participation.id, "Refund already issued in an earlier round");
                        Ok(())
                    }
                    _ => self.refund(&participation, &intent_id, amount, account).await,
                };
                match result {
                    Ok(()) => {
                        if let Err(e) = participation.mark_refunded(amount, now) {
                            warn!(participation_id = participation.id, error = %e, "Refund issued but row could not be marked");
                        }
                        Settled::Refunded { intent_id, amount }
                    }
                    Err(e) => failure(&participation, FailedAction::Refund, intent_id, Some(amount), e),
                }
            }
            (Some(PaymentStatus::Pending), Some(intent_id)) => {
                let result = match previous {
                    Some(Settled::IntentCancelled(done)) if *done == intent_id => Ok(()),
                    _ => self
                        .bounded(self.provider.cancel_payment_intent(account, &intent_id))
                        .await
                        .map(|_| ()),
                };
                match result {
                    Ok(()) => Settled::IntentCancelled(intent_id),
                    Err(e) => failure(&participation, FailedAction::CancelIntent, intent_id, None, e),
                }
            }
            _ => Settled::Cancelled,
        };

        if let Err(e) = participation.close_for_cancelled_event(now) {
            warn!(participation_id = participation.id, error = %e, "Could not close participation for cancelled event");
        }
        (participation, outcome)
    }

    async fn refund(&self, participation: &Participation, intent_id: &str, amount: i64, account: Option<&str>) -> ProviderResult<()> {
        let mut metadata = HashMap::new();
        metadata.insert("event_id".to_string(), participation.event_id.to_string());
        metadata.insert("participation_id".to_string(), participation.id.to_string());
        metadata.insert("reason".to_string(), "event_cancelled".to_string());

        let request = RefundRequest {
            payment_intent_id: intent_id.to_string(),
            amount,
            reason: RefundReason::RequestedByCustomer,
            metadata,
            idempotency_key: participation_idempotency_key(&format!("refund-{}", intent_id), participation.id),
        };
        self.bounded(self.provider.create_refund(account, &request)).await?;
        Ok(())
    }

    async fn bounded<T>(&self, call: impl Future<Output = ProviderResult<T>>) -> ProviderResult<T> {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .unwrap_or(Err(ProviderError::Timeout))
    }
}

/// Report over the latest outcome of every row
fn summarize(event_id: i64, outcomes: &BTreeMap<i64, (Participation, Settled)>) -> CancellationReport {
    let mut report = CancellationReport::new(event_id, outcomes.len());
    for (_, outcome) in outcomes.values() {
        match outcome {
            Settled::Refunded { amount, .. } => {
                report.refunds_processed += 1;
                report.total_refunded_cents += amount;
            }
            Settled::IntentCancelled(_) => report.payments_cancelled += 1,
            Settled::Cancelled => {}
            Settled::Failed(failure) => {
                if failure.action == FailedAction::Refund {
                    report.refunds_failed += 1;
                }
                report.failures.push(failure.clone());
            }
        }
    }
    report
}

/// Rows whose settlement has to reach the provider
fn needs_provider(participation: &Participation) -> bool {
    participation.payment_intent_id.is_some()
        && matches!(
            participation.payment_status,
            Some(PaymentStatus::Paid) | Some(PaymentStatus::Pending)
        )
}

fn failure(
    participation: &Participation,
    action: FailedAction,
    intent_id: String,
    amount_cents: Option<i64>,
    error: ProviderError,
) -> Settled {
    Settled::Failed(CancellationFailure {
        participation_id: participation.id,
        member_id: participation.member_id,
        action,
        intent_id,
        amount_cents,
        error,
    })
}

fn action_name(action: FailedAction) -> &'static str {
    match action {
        FailedAction::Refund => "refund",
        FailedAction::CancelIntent => "cancel_intent",
    }
}
