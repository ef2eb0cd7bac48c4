use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::debug;

use crate::application::analyzer::DependencyAnalyzer;
use crate::application::batch::{BatchMutator, BatchOutcome};
use crate::application::confirmation::{DeleteOutcome, DeleteStatus, DeletionFlow};
use crate::application::entity::EntityService;
use crate::application::id_generator::IdGenerator;
use crate::application::merge::{MergeEngine, MergeReport};
use crate::application::monitoring::{MonitoringStore, PerfReport};
use crate::domain::analysis::{AnalysisResult, DeleteTargets};
use crate::domain::category_tree::CategoryTree;
use crate::domain::error::Result;
use crate::domain::marketplace::MarketplaceConfig;
use crate::domain::ports::{DeletePrompt, TabularStore};
use crate::domain::record::{FieldMap, Record};
use crate::domain::schema::EntityKind;

const EVENT_CAPACITY: usize = 64;

/// Emitted once per affected kind after a successful mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DataChanged {
    pub kind: EntityKind,
}

/// Owns the store, the id sequences and the change channel for one
/// spreadsheet. Every operation the front-end needs goes through here.
pub struct EngineContext {
    store: Arc<dyn TabularStore>,
    analyzer: DependencyAnalyzer,
    mutator: BatchMutator,
    merger: MergeEngine,
    entities: EntityService,
    events: broadcast::Sender<DataChanged>,
    report: Arc<Mutex<PerfReport>>,
}

impl EngineContext {
    /// Build a context over `store`, timing its calls into a fresh [`PerfReport`].
    pub fn new(store: Arc<dyn TabularStore>) -> Self {
        let report = PerfReport::shared();
        let store: Arc<dyn TabularStore> =
            Arc::new(MonitoringStore::new(store, Arc::clone(&report)));
        let ids = Arc::new(IdGenerator::new());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            analyzer: DependencyAnalyzer::new(Arc::clone(&store)),
            mutator: BatchMutator::new(Arc::clone(&store)),
            merger: MergeEngine::new(Arc::clone(&store)),
            entities: EntityService::new(Arc::clone(&store), ids),
            store,
            events,
            report,
        }
    }

    pub fn store(&self) -> &Arc<dyn TabularStore> {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DataChanged> {
        self.events.subscribe()
    }

    pub fn perf_report(&self) -> PerfReport {
        self.report
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn notify(&self, kinds: impl IntoIterator<Item = EntityKind>) {
        for kind in kinds {
            debug!(kind = %kind, "data changed");
            // No receivers is fine.
            let _ = self.events.send(DataChanged { kind });
        }
    }

    pub async fn analyze(&self, kind: EntityKind, ids: &[String]) -> Result<AnalysisResult> {
        self.analyzer.analyze(kind, ids).await
    }

    /// Analyze, ask `prompt`, delete.
    pub async fn confirm_and_delete(
        &self,
        kind: EntityKind,
        ids: &[String],
        prompt: &dyn DeletePrompt,
    ) -> DeleteOutcome {
        let mut flow = DeletionFlow::new(&self.analyzer, &self.mutator, prompt);
        let outcome = flow.run(kind, ids).await;
        if outcome.status == DeleteStatus::Success {
            self.notify(outcome.affected.iter().copied());
        }
        outcome
    }

    pub async fn batch_delete(&self, targets: &DeleteTargets) -> BatchOutcome {
        let outcome = self.mutator.batch_delete(targets).await;
        if outcome.is_success() {
            self.notify(targets.iter().filter(|(_, ids)| !ids.is_empty()).map(|(k, _)| k));
        }
        outcome
    }

    pub async fn merge(
        &self,
        kind: EntityKind,
        master_id: &str,
        loser_ids: &[String],
    ) -> Result<MergeReport> {
        let report = self.merger.merge(kind, master_id, loser_ids).await?;
        let referrer = match kind {
            EntityKind::Categories => Some(EntityKind::Characteristics),
            EntityKind::Characteristics => Some(EntityKind::Options),
            EntityKind::Options => Some(EntityKind::Characteristics),
            EntityKind::Brands => None,
        };
        self.notify(std::iter::once(kind).chain(referrer));
        Ok(report)
    }

    /// Update the record with this id, or create one when the id is blank.
    /// An id that does not exist is rejected rather than replaced.
    pub async fn save(&self, kind: EntityKind, record: Record) -> Result<Record> {
        let saved = self.entities.save(kind, record).await?;
        self.notify([kind]);
        Ok(saved)
    }

    pub async fn save_mappings(
        &self,
        kind: EntityKind,
        owner_id: &str,
        mappings: Vec<FieldMap>,
    ) -> Result<usize> {
        let written = self.entities.save_mappings(kind, owner_id, mappings).await?;
        self.notify([kind]);
        Ok(written)
    }

    pub async fn eligible_trigger_options(&self, characteristic: &Record) -> Result<Vec<Record>> {
        self.entities.eligible_trigger_options(characteristic).await
    }

    pub async fn category_tree(&self) -> Result<CategoryTree> {
        let categories = self.store.list(EntityKind::Categories, false).await?;
        Ok(CategoryTree::build(&categories))
    }

    pub async fn marketplace_config(&self) -> Result<MarketplaceConfig> {
        MarketplaceConfig::load(self.store.as_ref(), false).await
    }
}
