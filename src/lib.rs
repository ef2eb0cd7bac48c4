use anyhow::Result;
use std::sync::Arc;

pub mod application;
pub mod domain;
pub mod infrastructure;
#[cfg(feature = "cli")]
pub mod presentation;

#[cfg(test)]
mod testkit;

// ─── Logging ───

/// How much of taxonomist's own tracing output to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Failures only; what `--quiet` selects.
    Error,
    /// Completed mutations and analyses.
    #[default]
    Info,
    /// Cache traffic, flow transitions and batch sizes; what `--verbose` selects.
    Debug,
}

impl LogLevel {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub fn directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "taxonomist=error",
            LogLevel::Info => "taxonomist=info",
            LogLevel::Debug => "taxonomist=debug",
        }
    }
}

/// Install a stderr `tracing` subscriber. `RUST_LOG` wins over `level`.
///
/// Needs the `cli` feature. Embedders with their own subscriber should not call it.
#[cfg(feature = "cli")]
pub fn init_tracing(level: LogLevel) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

// ─── Public API Facade ───

pub use application::batch::BatchOutcome;
pub use application::confirmation::{DeleteOutcome, DeleteStatus, FlowState};
pub use application::context::{DataChanged, EngineContext};
pub use application::merge::MergeReport;
pub use application::monitoring::PerfReport;
pub use domain::analysis::{
    AnalysisResult, DeleteChoice, DeleteTargets, DeletionSummary, DependentItem, IntegrityWarning,
};
pub use domain::category_tree::CategoryTree;
pub use domain::error::EngineError;
pub use domain::ports::{DeletePrompt, SheetBackend, TabularStore};
pub use domain::record::Record;
pub use domain::schema::{EntityKind, Sheet};
pub use infrastructure::config::{AppConfig, CacheConfig, StoreConfig};
pub use infrastructure::store::json_file::JsonWorkbook;
pub use infrastructure::store::memory::MemoryWorkbook;

use crate::infrastructure::store::cached::CachedSheetStore;

// ─── Public entry points ───

/// Open the JSON workbook named by `cfg` and build an engine over it.
pub async fn open(cfg: &AppConfig) -> Result<EngineContext> {
    let backend = JsonWorkbook::open(&cfg.store.workbook_path, cfg.store.store_id.clone()).await?;
    Ok(with_backend(Arc::new(backend), cfg))
}

/// Build an engine over any [`SheetBackend`], cached with `cfg.cache`.
pub fn with_backend(backend: Arc<dyn SheetBackend>, cfg: &AppConfig) -> EngineContext {
    let store = CachedSheetStore::new(backend, cfg.cache.ttl());
    EngineContext::new(Arc::new(store))
}
