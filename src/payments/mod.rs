//! Payment provider module
//!
//! The provider contract the engine depends on, and its HTTP implementation.

pub mod provider;
pub mod stripe;

pub use provider::{
    PaymentProvider, PaymentIntent, IntentStatus, IntentMetadata, IntentSearch,
    CreateIntentRequest, RefundRequest, RefundReason, Refund,
};
pub use stripe::StripeClient;
