use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::batch::BatchMutator;
use crate::domain::analysis::{DeleteTargets, IntegrityWarning};
use crate::domain::error::{EngineError, Result};
use crate::domain::marketplace::MarketplaceConfig;
use crate::domain::ports::{TabularStore, WriteRequest};
use crate::domain::record::{join_id_set, Record};
use crate::domain::schema::{fields, EntityKind, Sheet};

/// What a merge changed.
#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub kind: EntityKind,
    pub master_id: String,
    pub losers: Vec<String>,
    /// Rows whose references were repointed to the master.
    pub references_rewritten: usize,
    /// Loser mappings re-keyed to the master.
    pub mappings_transferred: usize,
    /// Loser mappings dropped because the master already maps that marketplace.
    pub mappings_dropped: usize,
    pub rows_deleted: usize,
    pub warnings: Vec<IntegrityWarning>,
}

// ─── Merge Engine ───

/// Folds "loser" records into a surviving "master".
pub struct MergeEngine {
    store: Arc<dyn TabularStore>,
    mutator: BatchMutator,
}

/// Requests and bookkeeping computed before anything is written.
#[derive(Default)]
struct MergePlan {
    requests: Vec<WriteRequest>,
    references_rewritten: usize,
    mappings_transferred: usize,
    mappings_dropped: usize,
    warnings: Vec<IntegrityWarning>,
}

impl MergeEngine {
    pub fn new(store: Arc<dyn TabularStore>) -> Self {
        Self {
            mutator: BatchMutator::new(store.clone()),
            store,
        }
    }

    /// Repoint references from `loser_ids` to `master_id`, move their
    /// mappings, then delete the losers.
    ///
    /// Input errors are rejected before any I/O. Once reading has started,
    /// every failure drops the whole cache before it is returned; a failure
    /// after the rewrite batch leaves the losers in place with no references
    /// left to them, and re-running the merge finishes the job.
    pub async fn merge(
        &self,
        kind: EntityKind,
        master_id: &str,
        loser_ids: &[String],
    ) -> Result<MergeReport> {
        let (master_id, losers) = validate(master_id, loser_ids)?;

        let result = self.run(kind, &master_id, &losers).await;
        self.store.invalidate_all();

        match &result {
            Ok(report) => info!(
                kind = %kind,
                master = %master_id,
                losers = report.losers.len(),
                rewritten = report.references_rewritten,
                transferred = report.mappings_transferred,
                dropped = report.mappings_dropped,
                "merge completed"
            ),
            Err(e) => warn!(kind = %kind, master = %master_id, error = %e, "merge failed"),
        }
        result
    }

    async fn run(&self, kind: EntityKind, master_id: &str, losers: &[String]) -> Result<MergeReport> {
        let records = self.store.list(kind, true).await?;
        check_present(kind, &records, master_id, losers)?;

        let loser_set: HashSet<&str> = losers.iter().map(String::as_str).collect();
        let mut plan = MergePlan::default();
        self.plan_rewrites(kind, master_id, &loser_set, &records, &mut plan)
            .await?;
        self.plan_mapping_transfer(kind, master_id, &loser_set, &mut plan)
            .await?;
        for w in &plan.warnings {
            warn!(kind = %kind, "{}", w);
        }

        debug!(requests = plan.requests.len(), "submitting merge rewrites");
        self.store.batch_write(plan.requests).await?;

        let counts = self
            .mutator
            .delete(&DeleteTargets::single(kind, losers.iter().cloned()))
            .await?;

        Ok(MergeReport {
            kind,
            master_id: master_id.to_string(),
            losers: losers.to_vec(),
            references_rewritten: plan.references_rewritten,
            mappings_transferred: plan.mappings_transferred,
            mappings_dropped: plan.mappings_dropped,
            rows_deleted: counts.rows,
            warnings: plan.warnings,
        })
    }

    async fn plan_rewrites(
        &self,
        kind: EntityKind,
        master_id: &str,
        losers: &HashSet<&str>,
        records: &[Record],
        plan: &mut MergePlan,
    ) -> Result<()> {
        match kind {
            EntityKind::Categories => {
                let characteristics = self.store.list(EntityKind::Characteristics, true).await?;
                rewrite_category_parents(records, master_id, losers, plan);
                rewrite_category_sets(&characteristics, master_id, losers, plan);
            }
            EntityKind::Characteristics => {
                let options = self.store.list(EntityKind::Options, true).await?;
                rewrite_option_owners(&options, master_id, losers, plan);
                check_self_trigger(records, &options, master_id, losers, plan);
            }
            EntityKind::Options => {
                let characteristics = self.store.list(EntityKind::Characteristics, true).await?;
                rewrite_triggers(&characteristics, records, master_id, losers, plan);
            }
            EntityKind::Brands => {}
        }
        Ok(())
    }

    async fn plan_mapping_transfer(
        &self,
        kind: EntityKind,
        master_id: &str,
        losers: &HashSet<&str>,
        plan: &mut MergePlan,
    ) -> Result<()> {
        let (mappings, config) = tokio::try_join!(
            self.store.list_mappings(kind, true),
            MarketplaceConfig::load(self.store.as_ref(), true),
        )?;
        transfer_mappings(kind, &mappings, &config, master_id, losers, plan);
        Ok(())
    }
}

/// Trim the inputs, drop duplicate losers, and reject anything unusable.
fn validate(master_id: &str, loser_ids: &[String]) -> Result<(String, Vec<String>)> {
    let master = master_id.trim();
    if master.is_empty() {
        return Err(EngineError::Validation("master id is required".into()));
    }
    let mut seen = HashSet::new();
    let mut losers = Vec::new();
    for id in loser_ids.iter().map(|id| id.trim()) {
        if id.is_empty() {
            return Err(EngineError::Validation("loser ids must not be blank".into()));
        }
        if id == master {
            return Err(EngineError::Validation(format!(
                "master '{}' cannot also be merged away",
                master
            )));
        }
        if seen.insert(id) {
            losers.push(id.to_string());
        }
    }
    if losers.is_empty() {
        return Err(EngineError::Validation("at least one record to merge is required".into()));
    }
    Ok((master.to_string(), losers))
}

fn check_present(kind: EntityKind, records: &[Record], master: &str, losers: &[String]) -> Result<()> {
    let ids: HashSet<&str> = records.iter().map(Record::id).collect();
    let missing: Vec<&str> = std::iter::once(master)
        .chain(losers.iter().map(String::as_str))
        .filter(|id| !ids.contains(id))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(EngineError::Validation(format!(
        "{} not found: {}",
        kind,
        missing.join(", ")
    )))
}

fn update(plan: &mut MergePlan, sheet: Sheet, record: &Record, field: &str, value: &str) {
    let Some(row) = record.row else {
        return;
    };
    let mut fields = record.fields.clone();
    fields.insert(field.to_string(), value.to_string());
    plan.requests.push(WriteRequest::UpdateRow { sheet, row, fields });
    plan.references_rewritten += 1;
}

// ─── Reference rewrites ───

/// Children of losers move under the master.
///
/// A category on the master's own ancestor chain (the master itself
/// included) cannot take the master as parent; it climbs instead to the
/// nearest ancestor of its loser parent that is neither a loser nor itself.
fn rewrite_category_parents(
    categories: &[Record],
    master: &str,
    losers: &HashSet<&str>,
    plan: &mut MergePlan,
) {
    let by_id: HashMap<&str, &Record> = categories.iter().map(|c| (c.id(), c)).collect();
    let parent_of = |id: &str| by_id.get(id).copied().and_then(Record::parent_id);

    let mut master_chain: HashSet<&str> = HashSet::new();
    let mut current = Some(master);
    while let Some(id) = current {
        if !master_chain.insert(id) {
            break;
        }
        current = parent_of(id);
    }

    let climb = |start: &str, this: &str| -> String {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut current = parent_of(start);
        while let Some(id) = current {
            if id == this || !visited.insert(id) {
                return String::new();
            }
            if !losers.contains(id) {
                return id.to_string();
            }
            current = parent_of(id);
        }
        String::new()
    };

    for category in categories.iter().filter(|c| !losers.contains(c.id())) {
        let Some(parent) = category.parent_id().filter(|p| losers.contains(p)) else {
            continue;
        };
        let new_parent = if master_chain.contains(category.id()) {
            climb(parent, category.id())
        } else {
            master.to_string()
        };
        update(
            plan,
            Sheet::Entity(EntityKind::Categories),
            category,
            fields::PARENT_ID,
            &new_parent,
        );
    }
}

/// Characteristics bound to a loser category are bound to the master instead.
fn rewrite_category_sets(
    characteristics: &[Record],
    master: &str,
    losers: &HashSet<&str>,
    plan: &mut MergePlan,
) {
    for c in characteristics {
        let ids = c.category_ids();
        if !ids.iter().any(|id| losers.contains(id)) {
            continue;
        }
        let rewritten: BTreeSet<&str> = ids
            .into_iter()
            .map(|id| if losers.contains(id) { master } else { id })
            .collect();
        update(
            plan,
            Sheet::Entity(EntityKind::Characteristics),
            c,
            fields::CATEGORY_IDS,
            &join_id_set(rewritten),
        );
    }
}

/// Options keep their ids; only the owner changes, so trigger references
/// stay valid.
fn rewrite_option_owners(options: &[Record], master: &str, losers: &HashSet<&str>, plan: &mut MergePlan) {
    for o in options {
        if o.owner_char_id().is_some_and(|owner| losers.contains(owner)) {
            update(
                plan,
                Sheet::Entity(EntityKind::Options),
                o,
                fields::OWNER_CHAR,
                master,
            );
        }
    }
}

/// Flag a master that would be triggered by one of its own options.
fn check_self_trigger(
    characteristics: &[Record],
    options: &[Record],
    master: &str,
    losers: &HashSet<&str>,
    plan: &mut MergePlan,
) {
    let Some(trigger) = characteristics
        .iter()
        .find(|c| c.id() == master)
        .and_then(Record::trigger_option_id)
    else {
        return;
    };
    let owned_after_merge = options.iter().any(|o| {
        o.id() == trigger
            && o
                .owner_char_id()
                .is_some_and(|owner| owner == master || losers.contains(owner))
    });
    if owned_after_merge {
        plan.warnings.push(IntegrityWarning::SelfTrigger {
            characteristic: master.to_string(),
            option: trigger.to_string(),
        });
    }
}

/// Characteristics triggered by a loser are triggered by the master instead.
/// One that ends up triggered by an option it owns is flagged.
fn rewrite_triggers(
    characteristics: &[Record],
    options: &[Record],
    master: &str,
    losers: &HashSet<&str>,
    plan: &mut MergePlan,
) {
    let master_owner = options
        .iter()
        .find(|o| o.id() == master)
        .and_then(Record::owner_char_id);
    for c in characteristics {
        if !c.trigger_option_id().is_some_and(|t| losers.contains(t)) {
            continue;
        }
        update(
            plan,
            Sheet::Entity(EntityKind::Characteristics),
            c,
            fields::TRIGGER_OPTION,
            master,
        );
        if master_owner == Some(c.id()) {
            plan.warnings.push(IntegrityWarning::SelfTrigger {
                characteristic: c.id().to_string(),
                option: master.to_string(),
            });
        }
    }
}

// ─── Mapping transfer ───

/// Re-key loser mappings to the master.
///
/// Where the marketplace allows a single mapping per entity and the master
/// already has one (or receives one earlier in this pass), the loser's
/// mapping is deleted instead.
fn transfer_mappings(
    kind: EntityKind,
    mappings: &[Record],
    config: &MarketplaceConfig,
    master: &str,
    losers: &HashSet<&str>,
    plan: &mut MergePlan,
) {
    let sheet = Sheet::Mappings(kind);
    let owner_column = kind.mapping_owner_column();
    let mut mapped: HashSet<&str> = mappings
        .iter()
        .filter(|m| m.mapping_owner(kind) == master)
        .map(Record::marketplace_id)
        .collect();

    for m in mappings.iter().filter(|m| losers.contains(m.mapping_owner(kind))) {
        let Some(row) = m.row else {
            continue;
        };
        let marketplace = m.marketplace_id();
        if !config.allows_multiple(kind, marketplace) && mapped.contains(marketplace) {
            plan.requests.push(WriteRequest::DeleteRow { sheet, row });
            plan.mappings_dropped += 1;
            continue;
        }
        let mut fields = m.fields.clone();
        fields.insert(owner_column.to_string(), master.to_string());
        plan.requests.push(WriteRequest::UpdateRow { sheet, row, fields });
        plan.mappings_transferred += 1;
        mapped.insert(marketplace);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::store::row_mapper::{header_row, record_to_row};
    use crate::testkit::{brand, cat, chr, mapping, marketplace, opt, Fixture};

    fn losers(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn parent(r: &Record) -> &str {
        r.get(fields::PARENT_ID)
    }

    #[tokio::test]
    async fn validation_rejects_before_io() {
        let fx = Fixture::new();
        fx.workbook.fail_reads(Some(EngineError::from_status(500, "down")));
        let engine = MergeEngine::new(fx.dyn_store());

        for (master, l) in [("", vec!["cat_2"]), ("cat_1", vec![]), ("cat_1", vec!["cat_1"]), ("cat_1", vec![" "])] {
            let err = engine
                .merge(EntityKind::Categories, master, &losers(&l))
                .await
                .unwrap_err();
            assert!(err.is_validation(), "{master:?} {l:?}: {err}");
        }
    }

    #[tokio::test]
    async fn missing_records_are_a_validation_error() {
        let fx = Fixture::new().with(EntityKind::Brands, &[brand("bra_1")]);
        let err = MergeEngine::new(fx.dyn_store())
            .merge(EntityKind::Brands, "bra_1", &losers(&["bra_9"]))
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::Validation("brands not found: bra_9".into()));
        assert_eq!(fx.workbook.apply_calls(), 0);
    }

    #[tokio::test]
    async fn category_children_follow_the_master() {
        let fx = Fixture::new()
            .with(
                EntityKind::Categories,
                &[
                    cat("cat_1", None),
                    cat("cat_2", None),
                    cat("cat_3", Some("cat_2")),
                    cat("cat_4", Some("cat_2")),
                    cat("cat_5", Some("cat_3")),
                ],
            )
            .with(
                EntityKind::Characteristics,
                &[chr("cha_1", "cat_2,cat_5", None), chr("cha_2", "cat_1,cat_2", None)],
            );
        let report = MergeEngine::new(fx.dyn_store())
            .merge(EntityKind::Categories, "cat_1", &losers(&["cat_2"]))
            .await
            .unwrap();
        assert_eq!(report.rows_deleted, 1);

        let cats = fx.store.list(EntityKind::Categories, true).await.unwrap();
        assert!(cats.iter().all(|c| c.id() != "cat_2"));
        assert!(cats.iter().all(|c| parent(c) != "cat_2"));
        let by_id: HashMap<&str, &Record> = cats.iter().map(|c| (c.id(), c)).collect();
        assert_eq!(parent(by_id["cat_3"]), "cat_1");
        assert_eq!(parent(by_id["cat_4"]), "cat_1");
        assert_eq!(parent(by_id["cat_5"]), "cat_3");

        let cha = fx.get(EntityKind::Characteristics, "cha_1").await.unwrap();
        assert_eq!(cha.get(fields::CATEGORY_IDS), "cat_1,cat_5");
        let cha = fx.get(EntityKind::Characteristics, "cha_2").await.unwrap();
        assert_eq!(cha.get(fields::CATEGORY_IDS), "cat_1");
    }

    #[tokio::test]
    async fn master_under_a_loser_climbs_past_it() {
        // cat_root <- cat_2 (loser) <- cat_1 (master)
        let fx = Fixture::new().with(
            EntityKind::Categories,
            &[
                cat("cat_root", None),
                cat("cat_2", Some("cat_root")),
                cat("cat_1", Some("cat_2")),
            ],
        );
        MergeEngine::new(fx.dyn_store())
            .merge(EntityKind::Categories, "cat_1", &losers(&["cat_2"]))
            .await
            .unwrap();
        let master = fx.get(EntityKind::Categories, "cat_1").await.unwrap();
        assert_eq!(parent(&master), "cat_root");
    }

    #[tokio::test]
    async fn loser_child_above_master_does_not_form_a_cycle() {
        // cat_2 (loser) <- cat_x <- cat_1 (master)
        let fx = Fixture::new().with(
            EntityKind::Categories,
            &[
                cat("cat_2", None),
                cat("cat_x", Some("cat_2")),
                cat("cat_1", Some("cat_x")),
            ],
        );
        MergeEngine::new(fx.dyn_store())
            .merge(EntityKind::Categories, "cat_1", &losers(&["cat_2"]))
            .await
            .unwrap();
        let cats = fx.store.list(EntityKind::Categories, true).await.unwrap();
        let tree = crate::domain::category_tree::CategoryTree::build(&cats);
        assert!(tree.warnings.is_empty());
        assert_eq!(tree.depth_of("cat_1"), Some(1));
    }

    #[tokio::test]
    async fn characteristic_merge_moves_options_and_keeps_triggers() {
        let fx = Fixture::new()
            .with(
                EntityKind::Characteristics,
                &[
                    chr("cha_1", "cat_1", None),
                    chr("cha_2", "cat_1", None),
                    chr("cha_3", "cat_1", Some("opt_2")),
                ],
            )
            .with(EntityKind::Options, &[opt("opt_1", "cha_1"), opt("opt_2", "cha_2")]);
        let report = MergeEngine::new(fx.dyn_store())
            .merge(EntityKind::Characteristics, "cha_1", &losers(&["cha_2"]))
            .await
            .unwrap();
        assert!(report.warnings.is_empty());

        let moved = fx.get(EntityKind::Options, "opt_2").await.unwrap();
        assert_eq!(moved.owner_char_id(), Some("cha_1"));
        let triggered = fx.get(EntityKind::Characteristics, "cha_3").await.unwrap();
        assert_eq!(triggered.trigger_option_id(), Some("opt_2"));
        assert_eq!(fx.ids(EntityKind::Characteristics).await, vec!["cha_1", "cha_3"]);
    }

    #[tokio::test]
    async fn master_triggered_by_absorbed_option_is_flagged() {
        let fx = Fixture::new()
            .with(
                EntityKind::Characteristics,
                &[chr("cha_1", "cat_1", Some("opt_2")), chr("cha_2", "cat_1", None)],
            )
            .with(EntityKind::Options, &[opt("opt_2", "cha_2")]);
        let report = MergeEngine::new(fx.dyn_store())
            .merge(EntityKind::Characteristics, "cha_1", &losers(&["cha_2"]))
            .await
            .unwrap();
        assert_eq!(
            report.warnings,
            vec![IntegrityWarning::SelfTrigger {
                characteristic: "cha_1".into(),
                option: "opt_2".into()
            }]
        );
    }

    #[tokio::test]
    async fn option_merge_repoints_triggers() {
        let fx = Fixture::new()
            .with(
                EntityKind::Characteristics,
                &[chr("cha_1", "cat_1", None), chr("cha_2", "cat_1", Some("opt_2"))],
            )
            .with(EntityKind::Options, &[opt("opt_1", "cha_1"), opt("opt_2", "cha_1")]);
        MergeEngine::new(fx.dyn_store())
            .merge(EntityKind::Options, "opt_1", &losers(&["opt_2"]))
            .await
            .unwrap();
        let c = fx.get(EntityKind::Characteristics, "cha_2").await.unwrap();
        assert_eq!(c.trigger_option_id(), Some("opt_1"));
        assert_eq!(fx.ids(EntityKind::Options).await, vec!["opt_1"]);
    }

    #[tokio::test]
    async fn trigger_repointed_to_an_owned_option_is_flagged() {
        let fx = Fixture::new()
            .with(
                EntityKind::Characteristics,
                &[chr("cha_1", "cat_1", Some("opt_2")), chr("cha_2", "cat_1", None)],
            )
            .with(EntityKind::Options, &[opt("opt_1", "cha_1"), opt("opt_2", "cha_2")]);
        let report = MergeEngine::new(fx.dyn_store())
            .merge(EntityKind::Options, "opt_1", &losers(&["opt_2"]))
            .await
            .unwrap();
        assert_eq!(
            report.warnings,
            vec![IntegrityWarning::SelfTrigger {
                characteristic: "cha_1".into(),
                option: "opt_1".into()
            }]
        );
        let c = fx.get(EntityKind::Characteristics, "cha_1").await.unwrap();
        assert_eq!(c.trigger_option_id(), Some("opt_1"));
    }

    #[tokio::test]
    async fn rewrites_keep_columns_outside_the_schema() {
        let fx = Fixture::new();
        let schema = Sheet::Entity(EntityKind::Categories).schema();
        let mut header = header_row(schema);
        header.push("legacy_note".into());
        let mut rows = vec![header];
        for (c, note) in [
            (cat("cat_1", None), "keep-1"),
            (cat("cat_2", None), "keep-2"),
            (cat("cat_3", Some("cat_2")), "keep-3"),
        ] {
            let mut row = record_to_row(schema, &c.fields);
            row.push(note.to_string());
            rows.push(row);
        }
        fx.workbook.put_raw("Categories", rows);

        MergeEngine::new(fx.dyn_store())
            .merge(EntityKind::Categories, "cat_1", &losers(&["cat_2"]))
            .await
            .unwrap();

        let snapshot = fx.workbook.snapshot();
        let sheet = &snapshot["Categories"];
        let notes: Vec<(&str, &str)> = sheet[1..]
            .iter()
            .map(|row| (row[0].as_str(), row.last().map(String::as_str).unwrap_or("")))
            .collect();
        assert_eq!(notes, vec![("cat_1", "keep-1"), ("cat_3", "keep-3")]);
        assert_eq!(parent(&fx.get(EntityKind::Categories, "cat_3").await.unwrap()), "cat_1");
    }

    #[tokio::test]
    async fn single_mapping_marketplaces_keep_the_master_mapping() {
        let kind = EntityKind::Brands;
        let fx = Fixture::new()
            .with(kind, &[brand("bra_1"), brand("bra_2"), brand("bra_3")])
            .with_marketplaces(&[marketplace("rztk", &[]), marketplace("epic", &[kind])])
            .with_mappings(
                kind,
                &[
                    mapping(kind, "m_master", "bra_1", "rztk"),
                    mapping(kind, "m_l1_rztk", "bra_2", "rztk"),
                    mapping(kind, "m_l1_epic", "bra_2", "epic"),
                    mapping(kind, "m_l2_epic", "bra_3", "epic"),
                    mapping(kind, "m_l2_allo", "bra_3", "allo"),
                ],
            );
        let report = MergeEngine::new(fx.dyn_store())
            .merge(kind, "bra_1", &losers(&["bra_2", "bra_3"]))
            .await
            .unwrap();
        assert_eq!(report.mappings_transferred, 3);
        assert_eq!(report.mappings_dropped, 1);

        let mut left: Vec<(String, String)> = fx
            .mappings(kind)
            .await
            .iter()
            .map(|m| (m.get("mapping_id").to_string(), m.mapping_owner(kind).to_string()))
            .collect();
        left.sort();
        assert_eq!(
            left,
            vec![
                ("m_l1_epic".to_string(), "bra_1".to_string()),
                ("m_l2_allo".to_string(), "bra_1".to_string()),
                ("m_l2_epic".to_string(), "bra_1".to_string()),
                ("m_master".to_string(), "bra_1".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn failed_rewrite_leaves_losers_and_drops_cache() {
        let fx = Fixture::new().with(
            EntityKind::Categories,
            &[cat("cat_1", None), cat("cat_2", None), cat("cat_3", Some("cat_2"))],
        );
        fx.store.list(EntityKind::Categories, false).await.unwrap();
        fx.workbook.fail_next_apply(EngineError::from_status(429, ""), 0);

        let err = MergeEngine::new(fx.dyn_store())
            .merge(EntityKind::Categories, "cat_1", &losers(&["cat_2"]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Backend { status: Some(429), .. }));
        assert_eq!(fx.ids(EntityKind::Categories).await, vec!["cat_1", "cat_2", "cat_3"]);
    }

    #[tokio::test]
    async fn failed_loser_delete_is_finished_by_a_rerun() {
        // No references or mappings to rewrite, so the first backend call
        // is the loser delete.
        let kind = EntityKind::Brands;
        let fx = Fixture::new().with(kind, &[brand("bra_1"), brand("bra_2"), brand("bra_3")]);
        fx.store.list(kind, false).await.unwrap();
        fx.workbook.fail_next_apply(EngineError::from_status(429, ""), 0);
        let engine = MergeEngine::new(fx.dyn_store());

        let err = engine
            .merge(kind, "bra_1", &losers(&["bra_2", "bra_3"]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Backend { status: Some(429), .. }));
        assert_eq!(fx.workbook.apply_calls(), 1);
        assert_eq!(fx.ids(kind).await, vec!["bra_1", "bra_2", "bra_3"]);

        let report = engine
            .merge(kind, "bra_1", &losers(&["bra_2", "bra_3"]))
            .await
            .unwrap();
        assert_eq!(report.rows_deleted, 2);
        assert_eq!(fx.ids(kind).await, vec!["bra_1"]);
    }
}
