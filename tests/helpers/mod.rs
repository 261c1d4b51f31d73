//! Test helpers module
//!
//! Shared doubles and setup for the integration tests: an in-process payment
//! provider, a wiremock-backed provider API, and a service context over the
//! in-memory store.

#![allow(dead_code)]

pub mod fake_provider;
pub mod provider_mock;
pub mod test_context;

pub use fake_provider::*;
pub use provider_mock::*;
pub use test_context::*;
