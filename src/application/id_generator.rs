use regex::Regex;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::record::Record;

/// Digits in the numeric suffix of a generated id.
pub const SUFFIX_WIDTH: usize = 12;

/// Sequential id source, one counter per prefix.
///
/// Ids look like `cat_000000000042`. Counters live in memory only, so all
/// creates for one prefix must go through the same generator.
#[derive(Debug, Default)]
pub struct IdGenerator {
    counters: Mutex<HashMap<String, u64>>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the counter for `prefix` from the largest suffix in `records`.
    ///
    /// Ids that do not match `^{prefix}_\d{12}$` are ignored. The counter is
    /// never moved backwards.
    pub fn initialize(&self, prefix: &str, records: &[Record]) {
        let pattern = format!(r"^{}_(\d{{{}}})$", regex::escape(prefix), SUFFIX_WIDTH);
        let max_seen = match Regex::new(&pattern) {
            Ok(re) => records
                .iter()
                .filter_map(|r| re.captures(r.id()))
                .filter_map(|c| c.get(1)?.as_str().parse::<u64>().ok())
                .max()
                .unwrap_or(0),
            Err(e) => {
                warn!(prefix, error = %e, "invalid id prefix, counter left as is");
                return;
            }
        };

        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let counter = counters.entry(prefix.to_string()).or_insert(0);
        *counter = (*counter).max(max_seen);
        debug!(prefix, counter = *counter, "id generator initialised");
    }

    /// Next id for `prefix`.
    pub fn next(&self, prefix: &str) -> String {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let counter = counters.entry(prefix.to_string()).or_insert_with(|| {
            warn!(prefix, "id generator not initialised, starting at 1");
            0
        });
        *counter += 1;
        format!("{}_{:0width$}", prefix, *counter, width = SUFFIX_WIDTH)
    }
}
