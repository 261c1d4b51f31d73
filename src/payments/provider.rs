//! Payment provider contract
//!
//! The engine only ever talks to the provider through [`PaymentProvider`]:
//! create, retrieve and cancel a payment intent, create a refund, and search
//! intents by metadata. Field names follow the provider's wire format so the
//! HTTP client can (de)serialize them directly.

use std::collections::HashMap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::utils::errors::ProviderResult;
use crate::utils::helpers::from_unix_seconds;

pub const METADATA_EVENT_ID: &str = "event_id";
pub const METADATA_USER_ID: &str = "user_id";
pub const METADATA_GYM_ID: &str = "gym_id";
pub const METADATA_PARTICIPATION_ID: &str = "participation_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

impl IntentStatus {
    /// States in which the member can still complete the existing intent
    pub fn is_reusable(self) -> bool {
        matches!(
            self,
            IntentStatus::RequiresPaymentMethod
                | IntentStatus::RequiresConfirmation
                | IntentStatus::RequiresAction
                | IntentStatus::Processing
        )
    }

    pub fn is_succeeded(self) -> bool {
        self == IntentStatus::Succeeded
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: IntentStatus,
    pub amount: i64,
    pub currency: String,
    /// Unix seconds
    pub created: i64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

impl PaymentIntent {
    pub fn created_at(&self) -> DateTime<Utc> {
        from_unix_seconds(self.created).unwrap_or_else(Utc::now)
    }

    pub fn metadata_id(&self, key: &str) -> Option<i64> {
        self.metadata.get(key).and_then(|v| v.parse().ok())
    }

    /// True only when the metadata names exactly this event and member.
    /// Intents without that metadata are never trusted.
    pub fn belongs_to(&self, event_id: i64, member_id: i64) -> bool {
        self.metadata_id(METADATA_EVENT_ID) == Some(event_id) && self.metadata_id(METADATA_USER_ID) == Some(member_id)
    }
}

/// Metadata stamped on every intent so it can be found again by search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentMetadata {
    pub event_id: i64,
    pub user_id: i64,
    pub gym_id: i64,
    pub participation_id: Option<i64>,
}

impl IntentMetadata {
    pub fn to_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert(METADATA_EVENT_ID.to_string(), self.event_id.to_string());
        map.insert(METADATA_USER_ID.to_string(), self.user_id.to_string());
        map.insert(METADATA_GYM_ID.to_string(), self.gym_id.to_string());
        if let Some(participation_id) = self.participation_id {
            map.insert(METADATA_PARTICIPATION_ID.to_string(), participation_id.to_string());
        }
        map
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateIntentRequest {
    pub amount: i64,
    pub currency: String,
    pub metadata: IntentMetadata,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundReason {
    RequestedByCustomer,
    Duplicate,
    Fraudulent,
}

impl RefundReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RefundReason::RequestedByCustomer => "requested_by_customer",
            RefundReason::Duplicate => "duplicate",
            RefundReason::Fraudulent => "fraudulent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub payment_intent_id: String,
    pub amount: i64,
    pub reason: RefundReason,
    pub metadata: HashMap<String, String>,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    pub amount: i64,
    pub status: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
}

/// Metadata search for succeeded intents of one member in one event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentSearch {
    pub event_id: i64,
    pub user_id: i64,
    pub gym_id: i64,
}

impl IntentSearch {
    /// Provider search-query language, restricted to succeeded intents
    pub fn to_query(&self) -> String {
        format!(
            "status:'succeeded' AND metadata['{}']:'{}' AND metadata['{}']:'{}' AND metadata['{}']:'{}'",
            METADATA_EVENT_ID, self.event_id,
            METADATA_USER_ID, self.user_id,
            METADATA_GYM_ID, self.gym_id,
        )
    }
}

/// Narrow contract of the external payment provider.
///
/// `account` is the gym's connected account; `None` addresses the platform
/// account itself.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_payment_intent(&self, account: Option<&str>, request: &CreateIntentRequest) -> ProviderResult<PaymentIntent>;

    async fn retrieve_payment_intent(&self, account: Option<&str>, intent_id: &str) -> ProviderResult<PaymentIntent>;

    async fn cancel_payment_intent(&self, account: Option<&str>, intent_id: &str) -> ProviderResult<PaymentIntent>;

    async fn create_refund(&self, account: Option<&str>, request: &RefundRequest) -> ProviderResult<Refund>;

    async fn search_payment_intents(&self, account: Option<&str>, search: &IntentSearch) -> ProviderResult<Vec<PaymentIntent>>;
}
