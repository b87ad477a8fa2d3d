//! Clock source for everything time-sensitive in proof validation.
//!
//! Injected instead of calling `Utc::now()` inline so freshness-window and
//! expiry behavior can be pinned down in tests.

pub trait Clock: Send + Sync {
    // Seconds since the Unix epoch.
    fn now(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Test clock pinned to a fixed instant.
#[cfg(test)]
#[derive(Debug)]
pub struct FixedClock(pub std::sync::atomic::AtomicI64);

#[cfg(test)]
impl FixedClock {
    pub fn at(now: i64) -> Self {
        Self(std::sync::atomic::AtomicI64::new(now))
    }

    pub fn advance(&self, secs: i64) {
        self.0.fetch_add(secs, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}
