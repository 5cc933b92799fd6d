//! Time-bounded lookup cache with an injected clock.
//!
//! No ambient globals: the TTL and the clock are explicit so callers (and
//! tests) own time.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (Instant, V)>>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K, clock: &dyn Clock) -> Option<V> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some((stored, value)) if clock.now().duration_since(*stored) < self.ttl => {
                Some(value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V, clock: &dyn Clock) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, (clock.now(), value));
        }
    }

    pub fn invalidate(&self, key: &K) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct TestClock {
        base: Instant,
        offset_ms: AtomicU64,
    }

    impl TestClock {
        fn new() -> Self {
            Self {
                base: Instant::now(),
                offset_ms: AtomicU64::new(0),
            }
        }

        fn advance_ms(&self, ms: u64) {
            self.offset_ms.fetch_add(ms, Ordering::SeqCst);
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            self.base + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
        }
    }

    #[test]
    fn entries_expire_after_ttl() {
        let clock = TestClock::new();
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_millis(100));

        cache.insert("a", 1, &clock);
        assert_eq!(cache.get(&"a", &clock), Some(1));

        clock.advance_ms(99);
        assert_eq!(cache.get(&"a", &clock), Some(1));

        clock.advance_ms(1);
        assert_eq!(cache.get(&"a", &clock), None);
    }

    #[test]
    fn invalidate_drops_entry() {
        let clock = TestClock::new();
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_secs(60));
        cache.insert("a", 1, &clock);
        cache.invalidate(&"a");
        assert_eq!(cache.get(&"a", &clock), None);
    }
}
