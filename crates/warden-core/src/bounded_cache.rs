//! Small in-memory maps that bound themselves by clearing entirely once they
//! grow past a fixed ceiling.
//!
//! Callers get read-then-write semantics without cross-operation atomicity: two
//! interleaved callers may both observe a miss.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Last-seen timestamps keyed by string, used for cooldown windows.
#[derive(Debug)]
pub struct StampCache {
    ceiling: usize,
    entries: Mutex<HashMap<String, u64>>,
}

impl StampCache {
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling: ceiling.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Milliseconds left in `window_ms` since `key` was last stamped; zero when
    /// the window is disabled, never stamped, or already elapsed.
    pub fn remaining_ms(&self, key: &str, window_ms: u64, now_ms: u64) -> u64 {
        if window_ms == 0 {
            return 0;
        }
        let Some(last) = lock(&self.entries).get(key).copied() else {
            return 0;
        };
        let elapsed = now_ms.saturating_sub(last);
        window_ms.saturating_sub(elapsed)
    }

    pub fn stamp(&self, key: &str, now_ms: u64) {
        let mut entries = lock(&self.entries);
        entries.insert(key.to_string(), now_ms);
        if entries.len() > self.ceiling {
            entries.clear();
        }
    }

    /// Stamps `key` and returns true unless it was stamped within `window_ms`.
    pub fn admit(&self, key: &str, window_ms: u64, now_ms: u64) -> bool {
        if window_ms == 0 {
            return true;
        }
        if self.remaining_ms(key, window_ms, now_ms) > 0 {
            return false;
        }
        self.stamp(key, now_ms);
        true
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
struct TtlEntry<V> {
    stored_at_ms: u64,
    value: V,
}

/// Values that expire `ttl_ms` after insertion.
#[derive(Debug)]
pub struct TtlCache<V> {
    ttl_ms: u64,
    ceiling: usize,
    entries: Mutex<HashMap<String, TtlEntry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl_ms: u64, ceiling: usize) -> Self {
        Self {
            ttl_ms,
            ceiling: ceiling.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    /// Returns a fresh value with its insertion time; expired entries are dropped.
    pub fn get_with_age(&self, key: &str, now_ms: u64) -> Option<(V, u64)> {
        let mut entries = lock(&self.entries);
        let entry = entries.get(key)?;
        let age_ms = now_ms.saturating_sub(entry.stored_at_ms);
        if age_ms >= self.ttl_ms {
            entries.remove(key);
            return None;
        }
        Some((entry.value.clone(), age_ms))
    }

    pub fn get(&self, key: &str, now_ms: u64) -> Option<V> {
        self.get_with_age(key, now_ms).map(|(value, _)| value)
    }

    pub fn insert(&self, key: &str, value: V, now_ms: u64) {
        let mut entries = lock(&self.entries);
        entries.insert(
            key.to_string(),
            TtlEntry {
                stored_at_ms: now_ms,
                value,
            },
        );
        if entries.len() > self.ceiling {
            entries.clear();
        }
    }

    pub fn remove(&self, key: &str) {
        lock(&self.entries).remove(key);
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
