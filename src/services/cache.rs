//! Read-cache invalidation after participation writes
//!
//! Event listings are cached per event, per gym and per creator. Any write
//! that changes an event or its attendance drops those entries. A failed
//! invalidation never fails the write that triggered it.

use async_trait::async_trait;
use tracing::warn;
use crate::models::Event;
use crate::services::redis::RedisService;

#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate_event(&self, event: &Event);
}

/// Cache keys touched by a change to `event`
pub fn event_cache_keys(event: &Event) -> (String, Vec<String>) {
    let mut patterns = vec![format!("events:tenant:{}:*", event.tenant_id)];
    if let Some(creator_id) = event.creator_id {
        patterns.push(format!("events:creator:{}:*", creator_id));
    }
    (format!("event:{}", event.id), patterns)
}

#[derive(Clone, Debug)]
pub struct RedisCacheInvalidator {
    redis: RedisService,
}

impl RedisCacheInvalidator {
    pub fn new(redis: RedisService) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl CacheInvalidator for RedisCacheInvalidator {
    async fn invalidate_event(&self, event: &Event) {
        let (key, patterns) = event_cache_keys(event);

        if let Err(e) = self.redis.delete(&key).await {
            warn!(event_id = event.id, key = %key, error = %e, "Failed to invalidate event cache");
        }
        for pattern in patterns {
            if let Err(e) = self.redis.delete_pattern(&pattern).await {
                warn!(event_id = event.id, pattern = %pattern, error = %e, "Failed to invalidate listing cache");
            }
        }
    }
}

/// No-op invalidator for deployments without a read cache
#[derive(Clone, Copy, Debug, Default)]
pub struct NullCache;

#[async_trait]
impl CacheInvalidator for NullCache {
    async fn invalidate_event(&self, _event: &Event) {}
}
