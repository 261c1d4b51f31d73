//! Database module
//!
//! Persistence for events, participations and tenant payment accounts.
//! [`EngineStore`] is the seam the services talk to; [`DatabaseService`]
//! backs it with Postgres and [`MemoryStore`] with in-process collections.

pub mod connection;
pub mod memory;
pub mod repositories;
pub mod service;
pub mod store;

pub use connection::{DatabasePool, DatabaseConfig, create_pool, run_migrations, health_check};
pub use memory::MemoryStore;
pub use repositories::{EventRepository, ParticipationRepository, PaymentAccountRepository};
pub use service::DatabaseService;
pub use store::EngineStore;
