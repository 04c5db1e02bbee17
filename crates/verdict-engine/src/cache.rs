//! Decision cache.
//!
//! Read-through cache keyed by `(user, tenant, resource, action)` with
//! explicit invalidation from every mutating service. Only context-free
//! requests (no resource id, no attributes) are cached; everything else
//! depends on state outside the key.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::request::AuthzResponse;

/// Cache key for a context-free decision.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecisionKey {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub resource: String,
    pub action: String,
}

#[async_trait]
pub trait DecisionCache: Send + Sync {
    async fn get(&self, key: &DecisionKey) -> Option<AuthzResponse>;
    async fn put(&self, key: DecisionKey, response: AuthzResponse);
    /// Drops every cached decision for the user in the tenant.
    async fn invalidate_user(&self, user_id: Uuid, tenant_id: Uuid);
    /// Drops the whole cache. Used when a mutation's blast radius is
    /// unknown (role, permission, or policy changes).
    async fn invalidate_all(&self);
}

struct CachedDecision {
    response: AuthzResponse,
    expires_at: Instant,
}

/// In-process TTL cache.
pub struct MemoryDecisionCache {
    entries: DashMap<DecisionKey, CachedDecision>,
    ttl: Duration,
}

impl MemoryDecisionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl DecisionCache for MemoryDecisionCache {
    async fn get(&self, key: &DecisionKey) -> Option<AuthzResponse> {
        // Expired entries are removed lazily on access.
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > Instant::now() {
                return Some(entry.response.clone());
            }
        }
        self.entries
            .remove_if(key, |_, entry| entry.expires_at <= Instant::now());
        None
    }

    async fn put(&self, key: DecisionKey, response: AuthzResponse) {
        self.entries.insert(
            key,
            CachedDecision {
                response,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    async fn invalidate_user(&self, user_id: Uuid, tenant_id: Uuid) {
        self.entries
            .retain(|key, _| !(key.user_id == user_id && key.tenant_id == tenant_id));
    }

    async fn invalidate_all(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(user_id: Uuid, tenant_id: Uuid) -> DecisionKey {
        DecisionKey {
            user_id,
            tenant_id,
            resource: "REPORT".into(),
            action: "READ".into(),
        }
    }

    #[tokio::test]
    async fn caches_within_ttl() {
        let cache = MemoryDecisionCache::new(Duration::from_secs(60));
        let k = key(Uuid::new_v4(), Uuid::new_v4());

        cache
            .put(k.clone(), AuthzResponse::allowed("Direct permission granted", vec![]))
            .await;

        let hit = cache.get(&k).await.unwrap();
        assert!(hit.allowed);
    }

    #[tokio::test]
    async fn expires_after_ttl() {
        let cache = MemoryDecisionCache::new(Duration::from_millis(10));
        let k = key(Uuid::new_v4(), Uuid::new_v4());

        cache
            .put(k.clone(), AuthzResponse::allowed("Direct permission granted", vec![]))
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(cache.get(&k).await.is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn invalidate_user_is_scoped() {
        let cache = MemoryDecisionCache::new(Duration::from_secs(60));
        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();
        let tenant = Uuid::new_v4();

        cache
            .put(key(user_a, tenant), AuthzResponse::denied("No permission for REPORT:READ"))
            .await;
        cache
            .put(key(user_b, tenant), AuthzResponse::denied("No permission for REPORT:READ"))
            .await;

        cache.invalidate_user(user_a, tenant).await;

        assert!(cache.get(&key(user_a, tenant)).await.is_none());
        assert!(cache.get(&key(user_b, tenant)).await.is_some());
    }

    #[tokio::test]
    async fn invalidate_all_clears() {
        let cache = MemoryDecisionCache::new(Duration::from_secs(60));
        cache
            .put(
                key(Uuid::new_v4(), Uuid::new_v4()),
                AuthzResponse::allowed("Direct permission granted", vec![]),
            )
            .await;

        cache.invalidate_all().await;
        assert!(cache.is_empty());
    }
}
