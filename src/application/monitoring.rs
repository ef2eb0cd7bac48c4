use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, instrument};

use crate::domain::error::Result;
use crate::domain::ports::{TabularStore, WriteRequest};
use crate::domain::record::Record;
use crate::domain::schema::Sheet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreCall {
    Fetch,
    BatchWrite,
}

impl fmt::Display for StoreCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StoreCall::Fetch => "fetch",
            StoreCall::BatchWrite => "batch_write",
        })
    }
}

/// One timed store call.
#[derive(Debug, Clone, Serialize)]
pub struct OpTiming {
    pub call: StoreCall,
    /// Sheet read, or the sheets a batch touched joined by `+`.
    pub sheet: String,
    pub duration_ms: u128,
    /// Rows read, or requests submitted.
    pub rows: usize,
    /// Read bypassed the cache.
    pub forced: bool,
}

/// Store timings collected over the life of one engine context.
#[derive(Debug, Default, Clone, Serialize)]
pub struct PerfReport {
    pub timings: Vec<OpTiming>,
    pub total_rows_fetched: usize,
    pub total_requests_written: usize,
    pub total_ms: u128,
}

impl PerfReport {
    pub fn shared() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::default()))
    }

    fn push(&mut self, timing: OpTiming) {
        self.total_ms += timing.duration_ms;
        match timing.call {
            StoreCall::Fetch => self.total_rows_fetched += timing.rows,
            StoreCall::BatchWrite => self.total_requests_written += timing.rows,
        }
        self.timings.push(timing);
    }

    /// Fetches that went past the cache.
    pub fn forced_reads(&self) -> usize {
        self.timings
            .iter()
            .filter(|t| t.call == StoreCall::Fetch && t.forced)
            .count()
    }
}

/// [`TabularStore`] decorator that times `fetch` and `batch_write` into a
/// shared [`PerfReport`]. Everything else passes straight through.
pub struct MonitoringStore {
    inner: Arc<dyn TabularStore>,
    report: Arc<Mutex<PerfReport>>,
}

impl MonitoringStore {
    pub fn new(inner: Arc<dyn TabularStore>, report: Arc<Mutex<PerfReport>>) -> Self {
        Self { inner, report }
    }

    fn note(&self, timing: OpTiming) {
        match self.report.lock() {
            Ok(mut report) => report.push(timing),
            Err(_) => debug!("perf report poisoned, timing dropped"),
        }
    }
}

#[async_trait]
impl TabularStore for MonitoringStore {
    #[instrument(name = "fetch", skip(self, sheet), fields(sheet = %sheet), level = "debug")]
    async fn fetch(&self, sheet: Sheet, force_refresh: bool) -> Result<Vec<Record>> {
        let started = Instant::now();
        let records = self.inner.fetch(sheet, force_refresh).await?;
        let duration_ms = started.elapsed().as_millis();
        debug!(rows = records.len(), duration_ms, "sheet read");

        self.note(OpTiming {
            call: StoreCall::Fetch,
            sheet: sheet.to_string(),
            duration_ms,
            rows: records.len(),
            forced: force_refresh,
        });
        Ok(records)
    }

    async fn create(&self, sheet: Sheet, record: Record) -> Result<Record> {
        self.inner.create(sheet, record).await
    }

    async fn update(&self, sheet: Sheet, record: &Record) -> Result<()> {
        self.inner.update(sheet, record).await
    }

    #[instrument(name = "batch_write", skip_all, fields(requests = requests.len()))]
    async fn batch_write(&self, requests: Vec<WriteRequest>) -> Result<()> {
        let count = requests.len();
        let sheets: std::collections::BTreeSet<String> =
            requests.iter().map(|r| r.sheet().to_string()).collect();
        let sheets = sheets.into_iter().collect::<Vec<_>>().join("+");

        let started = Instant::now();
        let result = self.inner.batch_write(requests).await;
        let duration_ms = started.elapsed().as_millis();
        info!(sheets = %sheets, ok = result.is_ok(), duration_ms, "batch written");

        self.note(OpTiming {
            call: StoreCall::BatchWrite,
            sheet: sheets,
            duration_ms,
            rows: count,
            forced: false,
        });
        result
    }

    fn invalidate(&self, sheet: Sheet) {
        self.inner.invalidate(sheet);
    }

    fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::EntityKind;
    use crate::testkit::{brand, Fixture};

    #[tokio::test]
    async fn records_fetches_and_writes() {
        let fx = Fixture::new().with(EntityKind::Brands, &[brand("bra_1"), brand("bra_2")]);
        let report = PerfReport::shared();
        let store = MonitoringStore::new(fx.dyn_store(), report.clone());

        let brands = store.list(EntityKind::Brands, true).await.unwrap();
        store.list(EntityKind::Brands, false).await.unwrap();
        store
            .delete_rows(Sheet::Entity(EntityKind::Brands), &[brands[0].row.unwrap()])
            .await
            .unwrap();

        let r = report.lock().unwrap();
        assert_eq!(r.timings.len(), 3);
        assert_eq!(r.total_rows_fetched, 4);
        assert_eq!(r.total_requests_written, 1);
        assert_eq!(r.forced_reads(), 1);
        assert_eq!(r.timings[2].call, StoreCall::BatchWrite);
        assert_eq!(r.timings[2].sheet, "Brands");
    }
}
