//! GymBooking participation engine
//!
//! Capacity-constrained event registration with a FIFO waitlist, payment
//! reconciliation against an eventually-consistent payment provider, refund
//! policy calculation, and administrative mass cancellation with per-item
//! failure reporting.

pub mod config;
pub mod database;
pub mod models;
pub mod payments;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::Settings;
pub use utils::errors::{EngineError, ProviderError, Result};

// Re-export main components for easy access
pub use database::{DatabaseService, EngineStore, MemoryStore};
pub use payments::{PaymentProvider, StripeClient};
pub use services::{ParticipationService, ServiceFactory};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!("{} v{}", NAME, VERSION)
}
