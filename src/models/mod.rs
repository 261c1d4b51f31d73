//! Data models module
//!
//! This module contains all data structures used throughout the engine

pub mod event;
pub mod participation;
pub mod payment;

// Re-export commonly used models
pub use event::{Event, EventStatus, RefundPolicy, CreateEventRequest, CancellationAudit};
pub use participation::{Participation, ParticipationStatus, PaymentStatus, PaymentSettlement, PromotedParticipation};
pub use payment::{PaymentAccount, RefundKind, RefundDecision, PaymentIntentHandle, CancellationReport, CancellationFailure, FailedAction, CancellationCommit, stale_rows};
