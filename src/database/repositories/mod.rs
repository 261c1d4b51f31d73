//! Database repositories module
//!
//! This module contains all repository implementations for data access

pub mod event;
pub mod participation;
pub mod account;

// Re-export repositories
pub use event::EventRepository;
pub use participation::ParticipationRepository;
pub use account::PaymentAccountRepository;
