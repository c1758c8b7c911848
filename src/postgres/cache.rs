//! Per-connection prepared statement cache.
//!
//! A statement is kept once it has been prepared `threshold` times on the
//! connection. The cache has no eviction order: when it is full it is cleared
//! and refills from the next hot statements.

use std::collections::HashMap;
use std::sync::Arc;

/// Statement text plus the declared parameter types it was prepared with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    pub sql: Arc<str>,
    pub param_oids: Vec<u32>,
}

#[derive(Debug)]
pub(crate) struct StatementCache<S> {
    threshold: u32,
    capacity: usize,
    uses: HashMap<CacheKey, u32>,
    prepared: HashMap<CacheKey, S>,
}

impl<S: Clone> StatementCache<S> {
    pub(crate) fn new(threshold: u32, capacity: usize) -> Self {
        Self {
            threshold,
            capacity,
            uses: HashMap::new(),
            prepared: HashMap::new(),
        }
    }

    fn enabled(&self) -> bool {
        self.threshold > 0 && self.capacity > 0
    }

    pub(crate) fn get(&self, key: &CacheKey) -> Option<S> {
        self.prepared.get(key).cloned()
    }

    /// Count one preparation of `key` and keep `stmt` once the threshold is
    /// reached.
    pub(crate) fn record(&mut self, key: CacheKey, stmt: &S) {
        if !self.enabled() {
            return;
        }
        // Counters for cold statements are bounded as well.
        if self.uses.len() >= self.capacity.saturating_mul(4) {
            self.uses.clear();
        }
        let uses = self.uses.entry(key.clone()).or_insert(0);
        *uses += 1;
        if *uses < self.threshold {
            return;
        }
        self.uses.remove(&key);
        if self.prepared.len() >= self.capacity {
            tracing::debug!(capacity = self.capacity, "statement cache full, clearing");
            self.prepared.clear();
        }
        self.prepared.insert(key, stmt.clone());
    }

    pub(crate) fn len(&self) -> usize {
        self.prepared.len()
    }
}
