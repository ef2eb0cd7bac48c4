use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::debug;

use crate::domain::error::{EngineError, Result};
use crate::domain::ports::{RawRow, SheetBackend, SheetOp};
use crate::domain::record::Record;
use crate::domain::schema::Sheet;
use crate::infrastructure::store::row_mapper::{header_row, record_to_row};

/// Sheet name → rows, header first.
pub type WorkbookData = BTreeMap<String, Vec<RawRow>>;

#[derive(Default)]
struct Faults {
    not_ready: Option<EngineError>,
    fail_reads: Option<EngineError>,
    fail_next_apply: Option<EngineError>,
    /// Ops applied before `fail_next_apply` fires, to simulate partial application.
    apply_before_failure: usize,
}

/// In-memory [`SheetBackend`].
///
/// Applies batch operations in order. A failing op stops the batch and
/// leaves earlier ops applied, like a remote batch call that dies partway.
pub struct MemoryWorkbook {
    store_id: String,
    sheets: Mutex<WorkbookData>,
    faults: Mutex<Faults>,
    apply_calls: Mutex<usize>,
}

impl MemoryWorkbook {
    /// Workbook with every known sheet present and holding only its header.
    pub fn new(store_id: impl Into<String>) -> Self {
        Self::from_data(store_id, WorkbookData::new())
    }

    /// Wrap existing data; any known sheet missing from it is added with its header.
    pub fn from_data(store_id: impl Into<String>, mut data: WorkbookData) -> Self {
        for sheet in Sheet::all() {
            data.entry(sheet.name().to_string())
                .or_insert_with(|| vec![header_row(sheet.schema())]);
        }
        Self {
            store_id: store_id.into(),
            sheets: Mutex::new(data),
            faults: Mutex::new(Faults::default()),
            apply_calls: Mutex::new(0),
        }
    }

    /// Append records to a sheet directly, bypassing faults.
    pub fn seed(&self, sheet: Sheet, records: &[Record]) {
        let mut sheets = self.sheets.lock().unwrap_or_else(|e| e.into_inner());
        let rows = sheets
            .entry(sheet.name().to_string())
            .or_insert_with(|| vec![header_row(sheet.schema())]);
        for r in records {
            rows.push(record_to_row(sheet.schema(), &r.fields));
        }
    }

    /// Replace a sheet's raw rows (header included).
    pub fn put_raw(&self, sheet_name: &str, rows: Vec<RawRow>) {
        let mut sheets = self.sheets.lock().unwrap_or_else(|e| e.into_inner());
        sheets.insert(sheet_name.to_string(), rows);
    }

    pub fn snapshot(&self) -> WorkbookData {
        self.sheets.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of `apply` calls received, failed ones included.
    pub fn apply_calls(&self) -> usize {
        *self.apply_calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_not_ready(&self, err: Option<EngineError>) {
        self.faults.lock().unwrap_or_else(|e| e.into_inner()).not_ready = err;
    }

    pub fn fail_reads(&self, err: Option<EngineError>) {
        self.faults.lock().unwrap_or_else(|e| e.into_inner()).fail_reads = err;
    }

    /// Make the next `apply` fail after applying `after_ops` of its ops.
    pub fn fail_next_apply(&self, err: EngineError, after_ops: usize) {
        let mut faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
        faults.fail_next_apply = Some(err);
        faults.apply_before_failure = after_ops;
    }
}

fn apply_op(sheets: &mut WorkbookData, op: SheetOp) -> Result<()> {
    let sheet_name = match &op {
        SheetOp::Delete { sheet, .. } | SheetOp::Append { sheet, .. } | SheetOp::Update { sheet, .. } => {
            sheet.clone()
        }
    };
    let rows = sheets
        .get_mut(&sheet_name)
        .ok_or_else(|| EngineError::from_status(404, format!("sheet '{}' does not exist", sheet_name)))?;

    let check_row = |row: usize, len: usize| -> Result<usize> {
        if row < 2 || row > len {
            return Err(EngineError::from_status(
                400,
                format!("row {} out of range in '{}'", row, sheet_name),
            ));
        }
        Ok(row - 1)
    };

    match op {
        SheetOp::Delete { row, .. } => {
            let at = check_row(row, rows.len())?;
            rows.remove(at);
        }
        SheetOp::Append { values, .. } => rows.push(values),
        SheetOp::Update { row, values, .. } => {
            let at = check_row(row, rows.len())?;
            let target = &mut rows[at];
            let tail = if target.len() > values.len() {
                target.split_off(values.len())
            } else {
                Vec::new()
            };
            *target = values;
            target.extend(tail);
        }
    }
    Ok(())
}

#[async_trait]
impl SheetBackend for MemoryWorkbook {
    fn store_id(&self) -> &str {
        &self.store_id
    }

    async fn ready(&self) -> Result<()> {
        match &self.faults.lock().unwrap_or_else(|e| e.into_inner()).not_ready {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn read(&self, sheet: &str) -> Result<Vec<RawRow>> {
        if let Some(err) = &self.faults.lock().unwrap_or_else(|e| e.into_inner()).fail_reads {
            return Err(err.clone());
        }
        let sheets = self.sheets.lock().unwrap_or_else(|e| e.into_inner());
        sheets
            .get(sheet)
            .cloned()
            .ok_or_else(|| EngineError::from_status(404, format!("sheet '{}' does not exist", sheet)))
    }

    async fn apply(&self, ops: Vec<SheetOp>) -> Result<()> {
        *self.apply_calls.lock().unwrap_or_else(|e| e.into_inner()) += 1;

        let (failure, limit) = {
            let mut faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
            (faults.fail_next_apply.take(), faults.apply_before_failure)
        };

        let mut sheets = self.sheets.lock().unwrap_or_else(|e| e.into_inner());
        debug!(ops = ops.len(), "applying batch");
        for (i, op) in ops.into_iter().enumerate() {
            if let Some(err) = &failure {
                if i >= limit {
                    return Err(err.clone());
                }
            }
            apply_op(&mut sheets, op)?;
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
