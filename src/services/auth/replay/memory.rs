use std::{
    collections::HashMap,
    future::Future,
    hash::{Hash, Hasher},
    pin::Pin,
    sync::{Arc, Mutex, PoisonError},
};

use crate::services::auth::replay::store::{ReplayError, ReplayStore};
use crate::services::clock::Clock;

const SHARD_COUNT: usize = 16;
// Per-shard size that triggers an eviction sweep of expired entries.
const SWEEP_THRESHOLD: usize = 4096;

/// In-process replay store: sharded map of `key -> expiry`.
///
/// Check-and-insert happens under a single shard lock, so two concurrent
/// observations of the same key cannot both be accepted. Expired entries are
/// evicted lazily: on the key we touch, and shard-wide once a shard grows
/// past `SWEEP_THRESHOLD`. Eviction is a memory bound, not a correctness
/// requirement; an entry is never dropped before its window has elapsed.
pub struct MemoryReplayStore {
    shards: Vec<Mutex<HashMap<String, i64>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryReplayStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let shards = (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect();
        Self { shards, clock }
    }

    fn shard(&self, key: &str) -> &Mutex<HashMap<String, i64>> {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARD_COUNT]
    }
}

impl ReplayStore for MemoryReplayStore {
    fn check_and_store<'a>(
        &'a self,
        key: &'a str,
        ttl_secs: u64,
    ) -> Pin<Box<dyn Future<Output = Result<bool, ReplayError>> + Send + 'a>> {
        Box::pin(async move {
            let now = self.clock.now();
            let mut map = self
                .shard(key)
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            if let Some(&expires_at) = map.get(key) {
                if expires_at > now {
                    return Ok(false);
                }
                // Window elapsed; the identifier may be observed again.
                map.remove(key);
            }

            if map.len() >= SWEEP_THRESHOLD {
                map.retain(|_, &mut expires_at| expires_at > now);
            }

            map.insert(key.to_string(), now + ttl_secs as i64);
            Ok(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::FixedClock;

    fn store_at(now: i64) -> (MemoryReplayStore, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::at(now));
        (MemoryReplayStore::new(clock.clone()), clock)
    }

    #[tokio::test]
    async fn first_sighting_accepted_duplicate_rejected() {
        let (store, _clock) = store_at(1_000);

        assert!(store.check_and_store("jkt1:jti1", 60).await.unwrap());
        assert!(!store.check_and_store("jkt1:jti1", 60).await.unwrap());
        // Different jti under the same key is unrelated.
        assert!(store.check_and_store("jkt1:jti2", 60).await.unwrap());
    }

    #[tokio::test]
    async fn entry_expires_after_window() {
        let (store, clock) = store_at(1_000);

        assert!(store.check_and_store("k", 60).await.unwrap());
        clock.advance(59);
        assert!(!store.check_and_store("k", 60).await.unwrap());
        clock.advance(2);
        assert!(store.check_and_store("k", 60).await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_observe_accepts_exactly_one() {
        let (store, _clock) = store_at(1_000);
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.check_and_store("jkt:dup", 60).await.unwrap()
            }));
        }

        let mut accepted = 0;
        for h in handles {
            if h.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
    }
}
