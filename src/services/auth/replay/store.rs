use std::{future::Future, pin::Pin};

use crate::services::cache::CacheError;

/// Time-bounded set of proof identifiers already seen, keyed per signing key.
///
/// Check-and-insert must be atomic: for concurrent calls with the same key,
/// exactly one caller observes `Ok(true)`.
///
/// Returns:
/// - `Ok(true)`  => first sighting (stored with TTL)
/// - `Ok(false)` => duplicate within the freshness window (replay)
/// - `Err(_)`    => backend failure (caller must fail closed)
pub trait ReplayStore: Send + Sync {
    fn check_and_store<'a>(
        &'a self,
        key: &'a str,
        ttl_secs: u64,
    ) -> Pin<Box<dyn Future<Output = Result<bool, ReplayError>> + Send + 'a>>;
}

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error(transparent)]
    Cache(#[from] CacheError),
}
