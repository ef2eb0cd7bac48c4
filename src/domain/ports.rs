use async_trait::async_trait;
use std::cmp::Reverse;

use crate::domain::analysis::{DeleteChoice, DeletionSummary};
use crate::domain::error::Result;
use crate::domain::record::{FieldMap, Record};
use crate::domain::schema::{EntityKind, Sheet};
use crate::domain::value_objects::RowIndex;

// ─── Write requests ──────────────────────────────────────────────────────────

/// One row-level mutation, addressed by sheet and physical row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteRequest {
    DeleteRow { sheet: Sheet, row: RowIndex },
    AppendRow { sheet: Sheet, fields: FieldMap },
    UpdateRow {
        sheet: Sheet,
        row: RowIndex,
        fields: FieldMap,
    },
}

impl WriteRequest {
    pub fn sheet(&self) -> Sheet {
        match self {
            WriteRequest::DeleteRow { sheet, .. }
            | WriteRequest::AppendRow { sheet, .. }
            | WriteRequest::UpdateRow { sheet, .. } => *sheet,
        }
    }
}

/// Order requests so that positions stay valid while they are applied in
/// sequence: updates first, then appends, then deletes from the highest row
/// to the lowest within each sheet.
pub fn order_for_submission(requests: Vec<WriteRequest>) -> Vec<WriteRequest> {
    let mut updates = Vec::new();
    let mut appends = Vec::new();
    let mut deletes = Vec::new();
    for req in requests {
        match req {
            WriteRequest::UpdateRow { .. } => updates.push(req),
            WriteRequest::AppendRow { .. } => appends.push(req),
            WriteRequest::DeleteRow { sheet, row } => deletes.push((sheet, row)),
        }
    }
    deletes.sort_by_key(|(sheet, row)| (*sheet, Reverse(*row)));
    deletes.dedup();

    updates
        .into_iter()
        .chain(appends)
        .chain(
            deletes
                .into_iter()
                .map(|(sheet, row)| WriteRequest::DeleteRow { sheet, row }),
        )
        .collect()
}

// ─── TabularStore ────────────────────────────────────────────────────────────

/// Port: record-level access to the spreadsheet (implemented by `CachedSheetStore`).
///
/// Reads may be served from a time-boxed cache unless `force_refresh` is set.
#[async_trait]
pub trait TabularStore: Send + Sync {
    async fn fetch(&self, sheet: Sheet, force_refresh: bool) -> Result<Vec<Record>>;

    /// Append `record`; returns it with its assigned row.
    async fn create(&self, sheet: Sheet, record: Record) -> Result<Record>;

    /// Overwrite the row `record.row` points at.
    async fn update(&self, sheet: Sheet, record: &Record) -> Result<()>;

    /// Submit all requests as one combined batch.
    async fn batch_write(&self, requests: Vec<WriteRequest>) -> Result<()>;

    fn invalidate(&self, sheet: Sheet);

    fn invalidate_all(&self);

    async fn list(&self, kind: EntityKind, force_refresh: bool) -> Result<Vec<Record>> {
        self.fetch(Sheet::Entity(kind), force_refresh).await
    }

    async fn list_mappings(&self, kind: EntityKind, force_refresh: bool) -> Result<Vec<Record>> {
        self.fetch(Sheet::Mappings(kind), force_refresh).await
    }

    async fn delete_rows(&self, sheet: Sheet, rows: &[RowIndex]) -> Result<()> {
        let requests = rows
            .iter()
            .map(|row| WriteRequest::DeleteRow { sheet, row: *row })
            .collect();
        self.batch_write(requests).await
    }
}

// ─── SheetBackend ────────────────────────────────────────────────────────────

/// A raw sheet row: cell text in column order.
pub type RawRow = Vec<String>;

/// Raw mutation understood by a [`SheetBackend`]. Rows are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetOp {
    Delete { sheet: String, row: usize },
    Append { sheet: String, values: RawRow },
    /// Overwrites the first `values.len()` cells of `row`. Cells past them
    /// (columns outside the schema) are left as they are.
    Update { sheet: String, row: usize, values: RawRow },
}

/// Port: the spreadsheet service itself (implemented by `MemoryWorkbook`,
/// `JsonWorkbook`).
#[async_trait]
pub trait SheetBackend: Send + Sync {
    /// Identifier of the spreadsheet; part of every cache key.
    fn store_id(&self) -> &str;

    /// Resolves once the client is initialised and authorised.
    async fn ready(&self) -> Result<()>;

    /// All rows of `sheet`, header first. Empty when the sheet is blank.
    async fn read(&self, sheet: &str) -> Result<Vec<RawRow>>;

    /// Apply `ops` in order as one request.
    async fn apply(&self, ops: Vec<SheetOp>) -> Result<()>;
}

// ─── DeletePrompt ────────────────────────────────────────────────────────────

/// Port: asks the user how to proceed with a delete (implemented by the CLI).
#[async_trait]
pub trait DeletePrompt: Send + Sync {
    /// Plain yes/no when nothing depends on the selection.
    async fn confirm(&self, kind: EntityKind, count: usize) -> bool;

    /// Safe / cascade / cancel when something does.
    async fn choose(&self, summary: &DeletionSummary) -> DeleteChoice;
}
