use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::domain::record::Record;

/// Default time-box of a cached sheet.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

struct CacheEntry {
    records: Vec<Record>,
    fetched_at: Instant,
    valid: bool,
}

/// Time-boxed read cache keyed by `(store id, sheet name)`.
pub struct SheetCache {
    ttl: Duration,
    entries: Mutex<HashMap<(String, String), CacheEntry>>,
}

impl SheetCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// A copy of the cached records, if present, valid and younger than the TTL.
    pub fn get(&self, store_id: &str, sheet: &str) -> Option<Vec<Record>> {
        let entries = self.entries.lock().ok()?;
        let entry = entries.get(&(store_id.to_string(), sheet.to_string()))?;
        (entry.valid && entry.fetched_at.elapsed() < self.ttl).then(|| entry.records.clone())
    }

    pub fn put(&self, store_id: &str, sheet: &str, records: Vec<Record>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                (store_id.to_string(), sheet.to_string()),
                CacheEntry {
                    records,
                    fetched_at: Instant::now(),
                    valid: true,
                },
            );
        }
    }

    pub fn invalidate(&self, store_id: &str, sheet: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            if let Some(entry) = entries.get_mut(&(store_id.to_string(), sheet.to_string())) {
                entry.valid = false;
                debug!(sheet, "cache invalidated");
            }
        }
    }

    pub fn invalidate_all(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            for entry in entries.values_mut() {
                entry.valid = false;
            }
            debug!(entries = entries.len(), "all caches invalidated");
        }
    }
}

impl Default for SheetCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str) -> Record {
        Record::from_pairs(&[("local_id", id)])
    }

    #[test]
    fn hit_until_invalidated() {
        let cache = SheetCache::default();
        cache.put("s1", "Brands", vec![rec("bra_1")]);
        assert_eq!(cache.get("s1", "Brands").unwrap().len(), 1);
        assert!(cache.get("s2", "Brands").is_none());

        cache.invalidate("s1", "Brands");
        assert!(cache.get("s1", "Brands").is_none());
    }

    #[test]
    fn invalidate_all_drops_every_sheet() {
        let cache = SheetCache::default();
        cache.put("s1", "Brands", vec![rec("bra_1")]);
        cache.put("s1", "Options", vec![rec("opt_1")]);
        cache.invalidate_all();
        assert!(cache.get("s1", "Brands").is_none());
        assert!(cache.get("s1", "Options").is_none());
    }

    #[test]
    fn expired_entries_miss() {
        let cache = SheetCache::new(Duration::ZERO);
        cache.put("s1", "Brands", vec![rec("bra_1")]);
        assert!(cache.get("s1", "Brands").is_none());
    }
}
