use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::analysis::DeleteTargets;
use crate::domain::error::Result;
use crate::domain::ports::{TabularStore, WriteRequest};
use crate::domain::schema::Sheet;

/// Result of a batch delete. Failures are values, never errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Success {
        /// Entity rows removed.
        rows_deleted: usize,
        /// Mapping rows removed along with their owners.
        mappings_deleted: usize,
    },
    Error {
        message: String,
    },
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BatchOutcome::Success { .. })
    }
}

/// Row counts of a planned or applied delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteCounts {
    pub rows: usize,
    pub mappings: usize,
}

// ─── Batch Mutator ───

/// Deletes rows across sheets in one combined backend request.
pub struct BatchMutator {
    store: Arc<dyn TabularStore>,
}

impl BatchMutator {
    pub fn new(store: Arc<dyn TabularStore>) -> Self {
        Self { store }
    }

    /// Delete every id in `targets`, together with the mapping rows the
    /// deleted entities own.
    ///
    /// Ids that no longer exist are skipped, so repeating a delete reports
    /// zero rows instead of failing. Every cache entry is dropped afterwards,
    /// whatever the outcome.
    pub async fn batch_delete(&self, targets: &DeleteTargets) -> BatchOutcome {
        let result = self.delete(targets).await;
        self.store.invalidate_all();
        match result {
            Ok(counts) => {
                info!(
                    rows = counts.rows,
                    mappings = counts.mappings,
                    "batch delete completed"
                );
                BatchOutcome::Success {
                    rows_deleted: counts.rows,
                    mappings_deleted: counts.mappings,
                }
            }
            Err(e) => {
                warn!(error = %e, "batch delete failed");
                BatchOutcome::Error {
                    message: e.to_string(),
                }
            }
        }
    }

    /// Resolve and submit the delete without touching the cache afterwards.
    pub(crate) async fn delete(&self, targets: &DeleteTargets) -> Result<DeleteCounts> {
        let (requests, counts) = self.plan(targets).await?;
        if requests.is_empty() {
            debug!("nothing to delete");
            return Ok(counts);
        }
        self.store.batch_write(requests).await?;
        Ok(counts)
    }

    /// Resolve ids to row positions on freshly read sheets.
    async fn plan(&self, targets: &DeleteTargets) -> Result<(Vec<WriteRequest>, DeleteCounts)> {
        let mut requests = Vec::new();
        let mut counts = DeleteCounts::default();

        for (kind, ids) in targets.iter().filter(|(_, ids)| !ids.is_empty()) {
            let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
            let (records, mappings) = tokio::try_join!(
                self.store.list(kind, true),
                self.store.list_mappings(kind, true),
            )?;

            for record in records.iter().filter(|r| wanted.contains(r.id())) {
                if let Some(row) = record.row {
                    requests.push(WriteRequest::DeleteRow {
                        sheet: Sheet::Entity(kind),
                        row,
                    });
                    counts.rows += 1;
                }
            }
            for mapping in mappings
                .iter()
                .filter(|m| wanted.contains(m.mapping_owner(kind)))
            {
                if let Some(row) = mapping.row {
                    requests.push(WriteRequest::DeleteRow {
                        sheet: Sheet::Mappings(kind),
                        row,
                    });
                    counts.mappings += 1;
                }
            }
            debug!(kind = %kind, rows = counts.rows, mappings = counts.mappings, "resolved delete targets");
        }
        Ok((requests, counts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::EngineError;
    use crate::domain::schema::EntityKind;
    use crate::testkit::{brand, cat, chr, mapping, opt, Fixture};

    #[tokio::test]
    async fn deletes_across_kinds_with_their_mappings() {
        let fx = Fixture::new()
            .with(EntityKind::Characteristics, &[chr("cha_1", "", None), chr("cha_2", "", None)])
            .with(
                EntityKind::Options,
                &[opt("opt_1", "cha_1"), opt("opt_2", "cha_2"), opt("opt_3", "cha_1")],
            )
            .with_mappings(
                EntityKind::Options,
                &[
                    mapping(EntityKind::Options, "m1", "opt_1", "rztk"),
                    mapping(EntityKind::Options, "m2", "opt_2", "rztk"),
                ],
            );
        let mut targets = DeleteTargets::single(EntityKind::Characteristics, ["cha_1"]);
        targets.push(EntityKind::Options, "opt_1");
        targets.push(EntityKind::Options, "opt_3");

        let outcome = BatchMutator::new(fx.dyn_store()).batch_delete(&targets).await;
        assert_eq!(
            outcome,
            BatchOutcome::Success {
                rows_deleted: 3,
                mappings_deleted: 1
            }
        );
        assert_eq!(fx.ids(EntityKind::Characteristics).await, vec!["cha_2"]);
        assert_eq!(fx.ids(EntityKind::Options).await, vec!["opt_2"]);
        let left: Vec<String> = fx
            .mappings(EntityKind::Options)
            .await
            .iter()
            .map(|m| m.get("mapping_id").to_string())
            .collect();
        assert_eq!(left, vec!["m2"]);
        // One combined request.
        assert_eq!(fx.workbook.apply_calls(), 1);
    }

    #[tokio::test]
    async fn repeated_delete_reports_zero_rows() {
        let fx = Fixture::new().with(EntityKind::Brands, &[brand("bra_1"), brand("bra_2")]);
        let mutator = BatchMutator::new(fx.dyn_store());
        let targets = DeleteTargets::single(EntityKind::Brands, ["bra_1"]);

        assert!(mutator.batch_delete(&targets).await.is_success());
        let again = mutator.batch_delete(&targets).await;
        assert_eq!(
            again,
            BatchOutcome::Success {
                rows_deleted: 0,
                mappings_deleted: 0
            }
        );
        assert_eq!(fx.workbook.apply_calls(), 1);
        assert_eq!(fx.ids(EntityKind::Brands).await, vec!["bra_2"]);
    }

    #[tokio::test]
    async fn non_adjacent_rows_are_deleted_without_shifting() {
        let cats: Vec<_> = (1..=6).map(|i| cat(&format!("cat_{}", i), None)).collect();
        let fx = Fixture::new().with(EntityKind::Categories, &cats);
        let targets = DeleteTargets::single(EntityKind::Categories, ["cat_2", "cat_5", "cat_3"]);

        BatchMutator::new(fx.dyn_store()).batch_delete(&targets).await;
        assert_eq!(
            fx.ids(EntityKind::Categories).await,
            vec!["cat_1", "cat_4", "cat_6"]
        );
    }

    #[tokio::test]
    async fn backend_failure_is_an_outcome_and_cache_is_dropped() {
        let fx = Fixture::new().with(EntityKind::Brands, &[brand("bra_1"), brand("bra_2")]);
        fx.store.list(EntityKind::Brands, false).await.unwrap();
        fx.workbook
            .fail_next_apply(EngineError::from_status(403, "read-only"), 1);

        let outcome = BatchMutator::new(fx.dyn_store())
            .batch_delete(&DeleteTargets::single(EntityKind::Brands, ["bra_1", "bra_2"]))
            .await;
        match outcome {
            BatchOutcome::Error { message } => assert!(message.contains("403")),
            other => panic!("unexpected {other:?}"),
        }
        // The first delete (highest row) went through; a cached read shows it.
        let cached: Vec<String> = fx
            .store
            .list(EntityKind::Brands, false)
            .await
            .unwrap()
            .iter()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(cached, vec!["bra_1"]);
    }

    #[tokio::test]
    async fn read_failure_is_an_outcome_without_writes() {
        let fx = Fixture::new().with(EntityKind::Brands, &[brand("bra_1")]);
        fx.workbook
            .fail_reads(Some(EngineError::NotAuthorized("expired".into())));

        let outcome = BatchMutator::new(fx.dyn_store())
            .batch_delete(&DeleteTargets::single(EntityKind::Brands, ["bra_1"]))
            .await;
        assert_eq!(
            outcome,
            BatchOutcome::Error {
                message: "not authorized: expired".into()
            }
        );
        assert_eq!(fx.workbook.apply_calls(), 0);
    }
}
