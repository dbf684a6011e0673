//! The weighted, fingerprint-keyed cache of materialised intermediate
//! tables (spec.md §4.5).
//!
//! Grounded directly on `Cache` in
//! `original_source/wombat_db/engine/engine.py`, with one deliberate fix:
//! the source's eviction step computes `importances.index(min(importances))`
//! — a *position* in a freshly built list — and then uses that position as
//! if it were a cache key (`del self.tables[min_key]`). That only works by
//! accident when keys happen to be small integers; for content-hash keys it
//! evicts (or panics on) the wrong entry entirely. This evicts the actual
//! minimum-importance resident key instead.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::optimizer::Fingerprint;
use crate::table::Table;

struct Inner {
    entries: HashMap<Fingerprint, Arc<Table>>,
    importance: HashMap<Fingerprint, f64>,
    memory: usize,
    max_memory: usize,
}

/// Synchronised with a single lock, matching the teacher's use of
/// `parking_lot::Mutex` for the shared cache (spec.md §5: readers holding a
/// returned `Arc<Table>` stay valid even if the entry is later evicted).
pub struct WeightedCache {
    inner: Mutex<Inner>,
}

impl WeightedCache {
    pub fn new(max_memory: usize) -> Self {
        WeightedCache {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                importance: HashMap::new(),
                memory: 0,
                max_memory,
            }),
        }
    }

    pub fn get(&self, key: Fingerprint) -> Option<Arc<Table>> {
        self.inner.lock().entries.get(&key).cloned()
    }

    /// `importance[key] += weight`, then admit the entry if it fits, evicting
    /// the minimum-importance resident(s) as needed. Refuses to insert when
    /// the new entry's accumulated importance does not exceed the cheapest
    /// resident's — matching spec.md §4.5/§8 property 6.
    pub fn put(&self, key: Fingerprint, table: Arc<Table>, weight: f64) {
        let mut inner = self.inner.lock();
        *inner.importance.entry(key).or_insert(0.0) += weight;

        if inner.entries.contains_key(&key) {
            return;
        }

        let bytes = table.byte_footprint();
        loop {
            if inner.memory + bytes <= inner.max_memory {
                inner.entries.insert(key, table);
                inner.memory += bytes;
                trace!(fingerprint = %key, bytes, "cache insert");
                return;
            }

            let min_resident = inner
                .entries
                .keys()
                .copied()
                .min_by(|a, b| inner.importance[a].partial_cmp(&inner.importance[b]).unwrap());

            let Some(min_key) = min_resident else {
                return;
            };

            if inner.importance[&key] > inner.importance[&min_key] {
                if let Some(evicted) = inner.entries.remove(&min_key) {
                    inner.memory -= evicted.byte_footprint();
                    trace!(fingerprint = %min_key, "cache evict");
                }
            } else {
                return;
            }
        }
    }

    pub fn keys(&self) -> Vec<Fingerprint> {
        self.inner.lock().entries.keys().copied().collect()
    }
}
