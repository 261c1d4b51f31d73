//! In-process payment provider for testing
//!
//! Keeps intents in memory, counts every call, and lets a test script
//! failures or delays per intent. Refunds honour idempotency keys: a repeated
//! key returns the first refund instead of creating another.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use gymbooking::payments::provider::{METADATA_EVENT_ID, METADATA_GYM_ID, METADATA_USER_ID};
use gymbooking::payments::{
    CreateIntentRequest, IntentSearch, IntentStatus, PaymentIntent, PaymentProvider, Refund, RefundRequest,
};
use gymbooking::utils::errors::{ProviderError, ProviderResult};

#[derive(Debug, Default)]
pub struct CallCounts {
    pub create: AtomicUsize,
    pub retrieve: AtomicUsize,
    pub cancel: AtomicUsize,
    pub refund: AtomicUsize,
    pub search: AtomicUsize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.create.load(Ordering::SeqCst)
            + self.retrieve.load(Ordering::SeqCst)
            + self.cancel.load(Ordering::SeqCst)
            + self.refund.load(Ordering::SeqCst)
            + self.search.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeProvider {
    intents: Mutex<HashMap<String, PaymentIntent>>,
    refund_failures: Mutex<HashMap<String, ProviderError>>,
    cancel_failures: Mutex<HashMap<String, ProviderError>>,
    refund_delays: Mutex<HashMap<String, Duration>>,
    search_failure: Mutex<Option<ProviderError>>,
    refunds: Mutex<Vec<(Option<String>, RefundRequest)>>,
    refund_keys: Mutex<HashMap<String, (i64, Refund)>>,
    next_id: AtomicUsize,
    pub calls: CallCounts,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an intent as if it had been created at the provider
    pub fn insert_intent(&self, intent: PaymentIntent) {
        self.intents.lock().unwrap().insert(intent.id.clone(), intent);
    }

    pub fn intent(&self, intent_id: &str) -> Option<PaymentIntent> {
        self.intents.lock().unwrap().get(intent_id).cloned()
    }

    pub fn set_status(&self, intent_id: &str, status: IntentStatus) {
        if let Some(intent) = self.intents.lock().unwrap().get_mut(intent_id) {
            intent.status = status;
        }
    }

    pub fn fail_refund(&self, intent_id: &str, error: ProviderError) {
        self.refund_failures.lock().unwrap().insert(intent_id.to_string(), error);
    }

    pub fn fail_cancel(&self, intent_id: &str, error: ProviderError) {
        self.cancel_failures.lock().unwrap().insert(intent_id.to_string(), error);
    }

    pub fn delay_refund(&self, intent_id: &str, delay: Duration) {
        self.refund_delays.lock().unwrap().insert(intent_id.to_string(), delay);
    }

    pub fn fail_search(&self, error: ProviderError) {
        *self.search_failure.lock().unwrap() = Some(error);
    }

    /// Refund requests that succeeded, with the account they were sent to
    pub fn refunds(&self) -> Vec<(Option<String>, RefundRequest)> {
        self.refunds.lock().unwrap().clone()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// A succeeded intent stamped with the metadata the engine searches on
pub fn succeeded_intent(id: &str, event_id: i64, member_id: i64, gym_id: i64, amount: i64, created: i64) -> PaymentIntent {
    let mut metadata = HashMap::new();
    metadata.insert(METADATA_EVENT_ID.to_string(), event_id.to_string());
    metadata.insert(METADATA_USER_ID.to_string(), member_id.to_string());
    metadata.insert(METADATA_GYM_ID.to_string(), gym_id.to_string());
    PaymentIntent {
        id: id.to_string(),
        status: IntentStatus::Succeeded,
        amount,
        currency: "eur".to_string(),
        created,
        metadata,
        client_secret: None,
    }
}

#[async_trait]
impl PaymentProvider for FakeProvider {
    async fn create_payment_intent(&self, _account: Option<&str>, request: &CreateIntentRequest) -> ProviderResult<PaymentIntent> {
        self.calls.create.fetch_add(1, Ordering::SeqCst);
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("pi_fake_{}", n);
        let intent = PaymentIntent {
            id: id.clone(),
            status: IntentStatus::RequiresPaymentMethod,
            amount: request.amount,
            currency: request.currency.clone(),
            created: Utc::now().timestamp(),
            metadata: request.metadata.to_map(),
            client_secret: Some(format!("{}_secret", id)),
        };
        self.insert_intent(intent.clone());
        Ok(intent)
    }

    async fn retrieve_payment_intent(&self, _account: Option<&str>, intent_id: &str) -> ProviderResult<PaymentIntent> {
        self.calls.retrieve.fetch_add(1, Ordering::SeqCst);
        self.intent(intent_id)
            .ok_or_else(|| ProviderError::NotFound(format!("resource_missing: {}", intent_id)))
    }

    async fn cancel_payment_intent(&self, _account: Option<&str>, intent_id: &str) -> ProviderResult<PaymentIntent> {
        self.calls.cancel.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.cancel_failures.lock().unwrap().get(intent_id).cloned() {
            return Err(error);
        }
        self.set_status(intent_id, IntentStatus::Canceled);
        self.intent(intent_id)
            .ok_or_else(|| ProviderError::NotFound(format!("resource_missing: {}", intent_id)))
    }

    async fn create_refund(&self, account: Option<&str>, request: &RefundRequest) -> ProviderResult<Refund> {
        self.calls.refund.fetch_add(1, Ordering::SeqCst);
        let delay = self.refund_delays.lock().unwrap().get(&request.payment_intent_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.refund_failures.lock().unwrap().get(&request.payment_intent_id).cloned() {
            return Err(error);
        }

        let mut keys = self.refund_keys.lock().unwrap();
        if let Some((amount, refund)) = keys.get(&request.idempotency_key) {
            if *amount != request.amount {
                return Err(ProviderError::Api {
                    status: 400,
                    message: "Keys for idempotent requests can only be used with the same parameters".to_string(),
                });
            }
            return Ok(refund.clone());
        }

        self.refunds
            .lock()
            .unwrap()
            .push((account.map(str::to_string), request.clone()));
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let refund = Refund {
            id: format!("re_fake_{}", n),
            amount: request.amount,
            status: "succeeded".to_string(),
            payment_intent: Some(request.payment_intent_id.clone()),
        };
        keys.insert(request.idempotency_key.clone(), (request.amount, refund.clone()));
        Ok(refund)
    }

    async fn search_payment_intents(&self, _account: Option<&str>, search: &IntentSearch) -> ProviderResult<Vec<PaymentIntent>> {
        self.calls.search.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.search_failure.lock().unwrap().clone() {
            return Err(error);
        }
        let intents = self.intents.lock().unwrap();
        Ok(intents
            .values()
            .filter(|i| i.status == IntentStatus::Succeeded)
            .filter(|i| i.metadata_id(METADATA_EVENT_ID) == Some(search.event_id))
            .filter(|i| i.metadata_id(METADATA_USER_ID) == Some(search.user_id))
            .filter(|i| i.metadata_id(METADATA_GYM_ID) == Some(search.gym_id))
            .cloned()
            .collect())
    }
}
