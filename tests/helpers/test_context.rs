//! Test context for unified test setup
//!
//! Wires a [`ParticipationService`] over the in-process store, the fake
//! provider and a cache that records what it was asked to invalidate.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use gymbooking::config::Settings;
use gymbooking::database::{EngineStore, MemoryStore};
use gymbooking::models::{CreateEventRequest, Event, Participation, PaymentAccount, RefundPolicy};
use gymbooking::payments::PaymentIntent;
use gymbooking::services::{CacheInvalidator, ParticipationService};

use super::fake_provider::{succeeded_intent, FakeProvider};

pub const GYM_ID: i64 = 7;
pub const CONNECTED_ACCOUNT: &str = "acct_gym_7";
pub const PRICE: i64 = 3000;

/// Cache double recording every invalidated event id
#[derive(Debug, Default)]
pub struct RecordingCache {
    pub invalidated: Mutex<Vec<i64>>,
}

#[async_trait]
impl CacheInvalidator for RecordingCache {
    async fn invalidate_event(&self, event: &Event) {
        self.invalidated.lock().unwrap().push(event.id);
    }
}

pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub provider: Arc<FakeProvider>,
    pub cache: Arc<RecordingCache>,
    pub settings: Settings,
    pub service: ParticipationService,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: Settings) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(FakeProvider::new());
        let cache = Arc::new(RecordingCache::default());
        let service = ParticipationService::new(store.clone(), provider.clone(), cache.clone(), &settings);

        Self {
            store,
            provider,
            cache,
            settings,
            service,
        }
    }

    pub async fn free_event(&self, capacity: i32) -> Event {
        self.service
            .create_event(&free_event_request(capacity))
            .await
            .expect("Failed to create free event")
    }

    pub async fn paid_event(&self, capacity: i32, policy: RefundPolicy, deadline_hours: i32) -> Event {
        self.service
            .create_event(&paid_event_request(capacity, policy, deadline_hours))
            .await
            .expect("Failed to create paid event")
    }

    pub async fn enable_payments(&self) {
        self.store
            .upsert_payment_account(&PaymentAccount {
                tenant_id: GYM_ID,
                account_id: CONNECTED_ACCOUNT.to_string(),
                charges_enabled: true,
                created_at: Utc::now(),
            })
            .await
            .expect("Failed to store payment account");
    }

    pub async fn register(&self, event_id: i64, member_id: i64) -> Participation {
        self.service
            .register_participant(event_id, member_id)
            .await
            .expect("Failed to register participant")
    }

    /// Deliver a succeeded-intent webhook for the row, as the provider would after checkout
    pub async fn pay(&self, participation: &Participation, amount: i64) -> Participation {
        let intent_id = format!("pi_paid_{}", participation.id);
        let intent = succeeded_intent(
            &intent_id,
            participation.event_id,
            participation.member_id,
            participation.tenant_id,
            amount,
            Utc::now().timestamp(),
        );
        self.provider.insert_intent(intent.clone());
        self.deliver(&intent, participation.id).await
    }

    async fn deliver(&self, intent: &PaymentIntent, participation_id: i64) -> Participation {
        let mut intent = intent.clone();
        intent
            .metadata
            .insert("participation_id".to_string(), participation_id.to_string());
        self.service
            .handle_payment_succeeded(&intent)
            .await
            .expect("Webhook failed")
            .expect("Webhook matched no participation")
    }

    pub async fn reload(&self, participation_id: i64) -> Participation {
        self.store
            .find_participation(participation_id)
            .await
            .expect("Store read failed")
            .expect("Participation missing")
    }

    pub async fn reload_event(&self, event_id: i64) -> Event {
        self.store
            .find_event(event_id)
            .await
            .expect("Store read failed")
            .expect("Event missing")
    }
}

/// Settings with a fast polling tier so reconciliation tests stay quick
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.reconciliation.poll_attempts = 3;
    settings.reconciliation.poll_interval_ms = 5;
    settings.payments.timeout_seconds = 1;
    settings.payments.refund_concurrency = 4;
    settings
}

pub fn free_event_request(capacity: i32) -> CreateEventRequest {
    CreateEventRequest {
        tenant_id: GYM_ID,
        creator_id: Some(99),
        title: "Open Gym".to_string(),
        start_time: Utc::now() + Duration::days(3),
        capacity,
        is_paid: false,
        price_cents: None,
        currency: None,
        refund_policy: None,
        refund_deadline_hours: None,
        partial_refund_percentage: None,
    }
}

pub fn paid_event_request(capacity: i32, policy: RefundPolicy, deadline_hours: i32) -> CreateEventRequest {
    CreateEventRequest {
        tenant_id: GYM_ID,
        creator_id: Some(99),
        title: "Kettlebell Workshop".to_string(),
        start_time: Utc::now() + Duration::days(3),
        capacity,
        is_paid: true,
        price_cents: Some(PRICE),
        currency: Some("eur".to_string()),
        refund_policy: Some(policy),
        refund_deadline_hours: Some(deadline_hours),
        partial_refund_percentage: Some(50),
    }
}
