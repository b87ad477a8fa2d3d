//! Server nonce issuance and single-use consumption.
//!
//! Nonces are opaque, unpredictable, short-lived values scoped to a client
//! context so they cannot be replayed across unrelated clients. Consumption
//! is atomic under a shard lock; a consumed entry is kept (marked) until it
//! expires so a second presentation is reported as `AlreadyConsumed` rather
//! than `Unknown`.

use std::{
    collections::HashMap,
    hash::{Hash, Hasher},
    sync::{Arc, Mutex, PoisonError},
};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::services::clock::Clock;

const SHARD_COUNT: usize = 16;
const SWEEP_THRESHOLD: usize = 1024;
const NONCE_BYTES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceCheck {
    Valid,
    Unknown,
    Expired,
    AlreadyConsumed,
}

struct NonceEntry {
    issued_at: i64,
    consumed: bool,
}

pub struct NonceAuthority {
    shards: Vec<Mutex<HashMap<String, NonceEntry>>>,
    ttl_seconds: i64,
    clock: Arc<dyn Clock>,
}

impl NonceAuthority {
    pub fn new(ttl_seconds: u64, clock: Arc<dyn Clock>) -> Self {
        let shards = (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect();
        Self {
            shards,
            ttl_seconds: ttl_seconds as i64,
            clock,
        }
    }

    fn shard(&self, key: &str) -> &Mutex<HashMap<String, NonceEntry>> {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARD_COUNT]
    }

    fn entry_key(context: &str, value: &str) -> String {
        format!("{}:{}", context, value)
    }

    /// Issue a fresh nonce for `context` (client id, optionally suffixed by
    /// key thumbprint). The value is recorded unconsumed and returned for
    /// transmission to the client.
    pub fn issue(&self, context: &str) -> String {
        let mut bytes = [0u8; NONCE_BYTES];
        getrandom::fill(&mut bytes).expect("getrandom failed");
        let value = URL_SAFE_NO_PAD.encode(bytes);

        let now = self.clock.now();
        let key = Self::entry_key(context, &value);
        let mut map = self
            .shard(&key)
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if map.len() >= SWEEP_THRESHOLD {
            let ttl = self.ttl_seconds;
            map.retain(|_, e| now < e.issued_at + ttl);
        }

        map.insert(
            key,
            NonceEntry {
                issued_at: now,
                consumed: false,
            },
        );

        value
    }

    /// Validate a presented nonce and consume it on success.
    ///
    /// One-time use is a hard invariant: exactly one concurrent caller can
    /// observe `Valid` for a given value.
    pub fn validate_and_consume(&self, context: &str, value: &str) -> NonceCheck {
        let now = self.clock.now();
        let key = Self::entry_key(context, value);
        let mut map = self
            .shard(&key)
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let Some(entry) = map.get_mut(&key) else {
            return NonceCheck::Unknown;
        };

        if now >= entry.issued_at + self.ttl_seconds {
            map.remove(&key);
            return NonceCheck::Expired;
        }

        if entry.consumed {
            return NonceCheck::AlreadyConsumed;
        }

        entry.consumed = true;
        NonceCheck::Valid
    }
}
