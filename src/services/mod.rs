//! Services module
//!
//! This module contains the participation engine's business logic services

pub mod cache;
pub mod cancellation;
pub mod capacity;
pub mod intents;
pub mod participation;
pub mod reconciliation;
pub mod redis;
pub mod refund;
pub mod webhooks;

// Re-export commonly used services
pub use cache::{CacheInvalidator, NullCache, RedisCacheInvalidator};
pub use cancellation::MassCancellationOrchestrator;
pub use capacity::WaitlistResolver;
pub use intents::PaymentIntentIssuer;
pub use participation::ParticipationService;
pub use reconciliation::PaymentReconciler;
pub use redis::RedisService;
pub use refund::calculate_refund;
pub use webhooks::WebhookHandler;

use std::sync::Arc;
use crate::config::settings::Settings;
use crate::database::{self, DatabasePool, DatabaseService};
use crate::payments::StripeClient;
use crate::utils::errors::Result;

/// Service factory wiring the production collaborators together
#[derive(Clone)]
pub struct ServiceFactory {
    pub participation_service: ParticipationService,
    pub redis_service: RedisService,
    pool: DatabasePool,
}

impl ServiceFactory {
    /// Create a new ServiceFactory with Postgres, Redis and the HTTP provider client
    pub fn new(settings: &Settings, pool: DatabasePool) -> Result<Self> {
        let redis_service = RedisService::new(settings.redis.clone())?;
        let store = Arc::new(DatabaseService::new(pool.clone()));
        let provider = Arc::new(StripeClient::new(&settings.payments)?);
        let cache = Arc::new(RedisCacheInvalidator::new(redis_service.clone()));

        let participation_service = ParticipationService::new(store, provider, cache, settings);

        Ok(Self {
            participation_service,
            redis_service,
            pool,
        })
    }

    /// Health check for all services
    pub async fn health_check(&self) -> ServiceHealthStatus {
        let database_healthy = database::health_check(&self.pool).await.is_ok();
        let redis_healthy = self.redis_service.health_check().await.unwrap_or(false);

        ServiceHealthStatus {
            database_healthy,
            redis_healthy,
        }
    }
}

/// Health status for all services
#[derive(Debug, Clone)]
pub struct ServiceHealthStatus {
    pub database_healthy: bool,
    pub redis_healthy: bool,
}

impl ServiceHealthStatus {
    /// The engine cannot run without its database; a missing cache only degrades reads
    pub fn is_healthy(&self) -> bool {
        self.database_healthy
    }

    /// Get list of unhealthy services
    pub fn get_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if !self.database_healthy {
            issues.push("Database connection failed".to_string());
        }
        if !self.redis_healthy {
            issues.push("Redis connection failed".to_string());
        }

        issues
    }
}
