use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::domain::error::{EngineError, Result};
use crate::domain::ports::{order_for_submission, SheetBackend, SheetOp, TabularStore, WriteRequest};
use crate::domain::record::Record;
use crate::domain::schema::Sheet;
use crate::domain::value_objects::RowIndex;
use crate::infrastructure::store::cache::SheetCache;
use crate::infrastructure::store::row_mapper::{normalize, record_to_row, rows_to_records};

/// [`TabularStore`] over a [`SheetBackend`], with a time-boxed read cache.
///
/// The backend's `ready()` future is awaited once, before the first call
/// that touches it.
pub struct CachedSheetStore {
    backend: Arc<dyn SheetBackend>,
    cache: SheetCache,
    ready: OnceCell<()>,
}

impl CachedSheetStore {
    pub fn new(backend: Arc<dyn SheetBackend>, ttl: Duration) -> Self {
        Self {
            backend,
            cache: SheetCache::new(ttl),
            ready: OnceCell::new(),
        }
    }

    async fn ensure_ready(&self) -> Result<()> {
        self.ready
            .get_or_try_init(|| async { self.backend.ready().await })
            .await
            .map(|_| ())
    }

    async fn load(&self, sheet: Sheet) -> Result<Vec<Record>> {
        self.ensure_ready().await?;
        debug!(sheet = %sheet, "loading fresh rows");
        let rows = self.backend.read(sheet.name()).await?;
        let records = rows_to_records(sheet.schema(), &rows)?;
        self.cache
            .put(self.backend.store_id(), sheet.name(), records.clone());
        Ok(records)
    }

    fn to_op(req: WriteRequest) -> SheetOp {
        match req {
            WriteRequest::DeleteRow { sheet, row } => SheetOp::Delete {
                sheet: sheet.name().to_string(),
                row: row.0,
            },
            WriteRequest::AppendRow { sheet, fields } => SheetOp::Append {
                sheet: sheet.name().to_string(),
                values: record_to_row(sheet.schema(), &fields),
            },
            WriteRequest::UpdateRow { sheet, row, fields } => SheetOp::Update {
                sheet: sheet.name().to_string(),
                row: row.0,
                values: record_to_row(sheet.schema(), &fields),
            },
        }
    }
}

#[async_trait]
impl TabularStore for CachedSheetStore {
    async fn fetch(&self, sheet: Sheet, force_refresh: bool) -> Result<Vec<Record>> {
        if !force_refresh {
            if let Some(hit) = self.cache.get(self.backend.store_id(), sheet.name()) {
                return Ok(hit);
            }
        }
        self.load(sheet).await
    }

    async fn create(&self, sheet: Sheet, mut record: Record) -> Result<Record> {
        let existing = self.load(sheet).await?;
        let row = RowIndex::of_data(existing.len());
        record.fields = normalize(sheet.schema(), &record.fields);
        let result = self
            .backend
            .apply(vec![Self::to_op(WriteRequest::AppendRow {
                sheet,
                fields: record.fields.clone(),
            })])
            .await;
        self.invalidate(sheet);
        result?;
        record.row = Some(row);
        Ok(record)
    }

    async fn update(&self, sheet: Sheet, record: &Record) -> Result<()> {
        let row = record.row.ok_or_else(|| {
            EngineError::Validation(format!("record '{}' has no row position", record.id()))
        })?;
        self.ensure_ready().await?;
        let result = self
            .backend
            .apply(vec![Self::to_op(WriteRequest::UpdateRow {
                sheet,
                row,
                fields: record.fields.clone(),
            })])
            .await;
        self.invalidate(sheet);
        result
    }

    async fn batch_write(&self, requests: Vec<WriteRequest>) -> Result<()> {
        if requests.is_empty() {
            return Ok(());
        }
        self.ensure_ready().await?;
        let touched: BTreeSet<Sheet> = requests.iter().map(WriteRequest::sheet).collect();
        let ops: Vec<SheetOp> = order_for_submission(requests)
            .into_iter()
            .map(Self::to_op)
            .collect();
        debug!(ops = ops.len(), sheets = touched.len(), "submitting batch");

        let result = self.backend.apply(ops).await;
        for sheet in touched {
            self.invalidate(sheet);
        }
        result
    }

    fn invalidate(&self, sheet: Sheet) {
        self.cache.invalidate(self.backend.store_id(), sheet.name());
    }

    fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}
