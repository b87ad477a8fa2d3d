use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use crate::services::{
    auth::replay::store::{ReplayError, ReplayStore},
    cache::{CacheClient, ValkeyClient},
};

/// Valkey-backed replay store (Redis protocol), for multi-instance
/// deployments where the jti set must be shared.
///
/// Fail-closed: any backend error surfaces as `Err` and the caller must
/// treat it as authentication failure.
#[derive(Clone)]
pub struct ValkeyReplayStore<C: CacheClient> {
    cache: Arc<C>,
    // Key prefix to avoid collisions across environments.
    prefix: String,
}

impl ValkeyReplayStore<ValkeyClient> {
    pub async fn new(redis_url: &str) -> Result<Self, ReplayError> {
        let client = ValkeyClient::new(redis_url).await?;
        Ok(Self::new_with_cache(Arc::new(client), "dpop:replay"))
    }
}

impl<C: CacheClient> ValkeyReplayStore<C> {
    pub fn new_with_cache(cache: Arc<C>, prefix: impl Into<String>) -> Self {
        Self {
            cache,
            prefix: prefix.into(),
        }
    }

    fn key(&self, raw: &str) -> String {
        format!("{}:{}", self.prefix, raw)
    }
}

impl<C: CacheClient> ReplayStore for ValkeyReplayStore<C> {
    fn check_and_store<'a>(
        &'a self,
        key: &'a str,
        ttl_secs: u64,
    ) -> Pin<Box<dyn Future<Output = Result<bool, ReplayError>> + Send + 'a>> {
        Box::pin(async move {
            let full_key = self.key(key);

            // SET <key> "1" NX EX <ttl>: true when newly set, false when the
            // identifier was already observed.
            let res = self
                .cache
                .set_if_absent_with_ttl(&full_key, "1", Duration::from_secs(ttl_secs))
                .await?;

            Ok(res)
        })
    }
}
