use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::analysis::{AnalysisResult, DeleteTargets, DependentItem, IntegrityWarning};
use crate::domain::category_tree::find_parent_cycles;
use crate::domain::error::{EngineError, Result};
use crate::domain::ports::TabularStore;
use crate::domain::record::Record;
use crate::domain::schema::EntityKind;

// ─── Dependency Analyzer ───

/// Partitions a selection into dependency-free records and records that
/// others depend on, and computes the cascade closure.
///
/// Always reads fresh data: a delete decision taken on a stale cache could
/// remove the wrong rows.
pub struct DependencyAnalyzer {
    store: Arc<dyn TabularStore>,
}

impl DependencyAnalyzer {
    pub fn new(store: Arc<dyn TabularStore>) -> Self {
        Self { store }
    }

    pub async fn analyze(&self, kind: EntityKind, ids: &[String]) -> Result<AnalysisResult> {
        let selection = normalize_selection(ids)?;
        let result = match kind {
            EntityKind::Categories => {
                let categories = self.store.list(EntityKind::Categories, true).await?;
                analyze_categories(&categories, &selection)
            }
            EntityKind::Characteristics => {
                let (characteristics, options) = tokio::try_join!(
                    self.store.list(EntityKind::Characteristics, true),
                    self.store.list(EntityKind::Options, true),
                )?;
                analyze_characteristics(&characteristics, &options, &selection)
            }
            EntityKind::Options => {
                let (characteristics, options) = tokio::try_join!(
                    self.store.list(EntityKind::Characteristics, true),
                    self.store.list(EntityKind::Options, true),
                )?;
                analyze_options(&characteristics, &options, &selection)
            }
            EntityKind::Brands => {
                let brands = self.store.list(EntityKind::Brands, true).await?;
                analyze_brands(&brands, &selection)
            }
        };

        for w in &result.warnings {
            warn!(kind = %kind, "{}", w);
        }
        debug!(
            kind = %kind,
            selected = result.selected_count(),
            with_dependents = result.items_with_dependents.len(),
            cascade = result.cascade_delete_list.total(),
            "analysis completed"
        );
        Ok(result)
    }
}

/// Trim, drop duplicates, keep order. An empty selection is a validation error.
fn normalize_selection(ids: &[String]) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let selection: Vec<String> = ids
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.to_string()))
        .map(str::to_string)
        .collect();
    if selection.is_empty() {
        return Err(EngineError::Validation("no ids selected".into()));
    }
    Ok(selection)
}

fn index_by_id(records: &[Record]) -> HashMap<&str, &Record> {
    records.iter().map(|r| (r.id(), r)).collect()
}

/// Resolve selected ids, reporting the unknown ones.
fn resolve<'a>(
    kind: EntityKind,
    by_id: &HashMap<&str, &'a Record>,
    selection: &[String],
    warnings: &mut Vec<IntegrityWarning>,
) -> Vec<&'a Record> {
    selection
        .iter()
        .filter_map(|id| match by_id.get(id.as_str()) {
            Some(r) => Some(*r),
            None => {
                warnings.push(IntegrityWarning::UnknownId {
                    kind,
                    id: id.clone(),
                });
                None
            }
        })
        .collect()
}

// ─── Categories ───

pub fn analyze_categories(categories: &[Record], selection: &[String]) -> AnalysisResult {
    let by_id = index_by_id(categories);
    let mut children: HashMap<&str, Vec<&Record>> = HashMap::new();
    for c in categories {
        if let Some(parent) = c.parent_id() {
            children.entry(parent).or_default().push(c);
        }
    }

    let mut warnings = Vec::new();
    let selected = resolve(EntityKind::Categories, &by_id, selection, &mut warnings);

    let mut items_with_dependents = Vec::new();
    let mut safe_to_delete = Vec::new();
    for record in &selected {
        match children.get(record.id()) {
            Some(kids) => items_with_dependents.push(DependentItem {
                record: (*record).clone(),
                linked_entities: kids.iter().map(|k| (*k).clone()).collect(),
                linked_kind: EntityKind::Categories,
            }),
            None => safe_to_delete.push((*record).clone()),
        }
    }

    // Breadth-first over parent -> children. The visited set keeps malformed
    // parent chains from looping.
    let mut cascade = DeleteTargets::touching(&[EntityKind::Categories]);
    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    for record in &selected {
        if visited.insert(record.id()) {
            queue.push_back(record.id());
        }
    }
    while let Some(id) = queue.pop_front() {
        cascade.push(EntityKind::Categories, id);
        for child in children.get(id).into_iter().flatten() {
            if visited.insert(child.id()) {
                queue.push_back(child.id());
            }
        }
    }

    let closure: Vec<&str> = cascade
        .ids(EntityKind::Categories)
        .iter()
        .filter_map(|id| by_id.get_key_value(id.as_str()).map(|(k, _)| *k))
        .collect();
    warnings.extend(
        find_parent_cycles(&by_id, closure)
            .into_iter()
            .map(|members| IntegrityWarning::ParentCycle { members }),
    );

    AnalysisResult {
        kind: EntityKind::Categories,
        items_with_dependents,
        safe_to_delete,
        cascade_delete_list: cascade,
        warnings,
    }
}

// ─── Characteristics & options ───

/// Owner and trigger indexes over characteristics and options.
struct CharOptionGraph<'a> {
    characteristics: HashMap<&'a str, &'a Record>,
    options: HashMap<&'a str, &'a Record>,
    options_by_owner: HashMap<&'a str, Vec<&'a Record>>,
    triggered_by: HashMap<&'a str, Vec<&'a Record>>,
}

impl<'a> CharOptionGraph<'a> {
    fn new(characteristics: &'a [Record], options: &'a [Record]) -> Self {
        let mut options_by_owner: HashMap<&str, Vec<&Record>> = HashMap::new();
        for o in options {
            if let Some(owner) = o.owner_char_id() {
                options_by_owner.entry(owner).or_default().push(o);
            }
        }
        let mut triggered_by: HashMap<&str, Vec<&Record>> = HashMap::new();
        for c in characteristics {
            if let Some(trigger) = c.trigger_option_id() {
                triggered_by.entry(trigger).or_default().push(c);
            }
        }
        Self {
            characteristics: index_by_id(characteristics),
            options: index_by_id(options),
            options_by_owner,
            triggered_by,
        }
    }

    fn owned_options(&self, char_id: &str) -> &[&'a Record] {
        self.options_by_owner
            .get(char_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn triggered_characteristics(&self, option_id: &str) -> &[&'a Record] {
        self.triggered_by
            .get(option_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Fixed point of "characteristic owns option" and "option triggers
    /// characteristic", starting from the seeds already in `targets`.
    fn close_over(&self, targets: &mut DeleteTargets) {
        let mut queue: VecDeque<(EntityKind, String)> = targets
            .iter()
            .flat_map(|(kind, ids)| ids.iter().map(move |id| (kind, id.clone())))
            .collect();

        while let Some((kind, id)) = queue.pop_front() {
            let (next_kind, next) = match kind {
                EntityKind::Characteristics => (EntityKind::Options, self.owned_options(&id)),
                EntityKind::Options => {
                    (EntityKind::Characteristics, self.triggered_characteristics(&id))
                }
                _ => continue,
            };
            for record in next {
                if targets.push(next_kind, record.id()) {
                    queue.push_back((next_kind, record.id().to_string()));
                }
            }
        }
    }
}

pub fn analyze_characteristics(
    characteristics: &[Record],
    options: &[Record],
    selection: &[String],
) -> AnalysisResult {
    let graph = CharOptionGraph::new(characteristics, options);
    let mut warnings = Vec::new();
    let selected = resolve(
        EntityKind::Characteristics,
        &graph.characteristics,
        selection,
        &mut warnings,
    );

    let mut items_with_dependents = Vec::new();
    let mut safe_to_delete = Vec::new();
    let mut cascade =
        DeleteTargets::touching(&[EntityKind::Characteristics, EntityKind::Options]);
    for record in &selected {
        cascade.push(EntityKind::Characteristics, record.id());
        let owned = graph.owned_options(record.id());
        if owned.is_empty() {
            safe_to_delete.push((*record).clone());
        } else {
            items_with_dependents.push(DependentItem {
                record: (*record).clone(),
                linked_entities: owned.iter().map(|o| (*o).clone()).collect(),
                linked_kind: EntityKind::Options,
            });
        }
    }
    graph.close_over(&mut cascade);

    AnalysisResult {
        kind: EntityKind::Characteristics,
        items_with_dependents,
        safe_to_delete,
        cascade_delete_list: cascade,
        warnings,
    }
}

pub fn analyze_options(
    characteristics: &[Record],
    options: &[Record],
    selection: &[String],
) -> AnalysisResult {
    let graph = CharOptionGraph::new(characteristics, options);
    let mut warnings = Vec::new();
    let selected = resolve(EntityKind::Options, &graph.options, selection, &mut warnings);

    let mut items_with_dependents = Vec::new();
    let mut safe_to_delete = Vec::new();
    let mut cascade =
        DeleteTargets::touching(&[EntityKind::Options, EntityKind::Characteristics]);
    for record in &selected {
        cascade.push(EntityKind::Options, record.id());
        let triggered = graph.triggered_characteristics(record.id());
        if triggered.is_empty() {
            safe_to_delete.push((*record).clone());
        } else {
            items_with_dependents.push(DependentItem {
                record: (*record).clone(),
                linked_entities: triggered.iter().map(|c| (*c).clone()).collect(),
                linked_kind: EntityKind::Characteristics,
            });
        }
    }
    // Triggered characteristics take their own options with them.
    graph.close_over(&mut cascade);

    AnalysisResult {
        kind: EntityKind::Options,
        items_with_dependents,
        safe_to_delete,
        cascade_delete_list: cascade,
        warnings,
    }
}

// ─── Brands ───

pub fn analyze_brands(brands: &[Record], selection: &[String]) -> AnalysisResult {
    let by_id = index_by_id(brands);
    let mut warnings = Vec::new();
    let selected = resolve(EntityKind::Brands, &by_id, selection, &mut warnings);
    AnalysisResult {
        kind: EntityKind::Brands,
        items_with_dependents: Vec::new(),
        safe_to_delete: selected.iter().map(|r| (*r).clone()).collect(),
        cascade_delete_list: DeleteTargets::single(
            EntityKind::Brands,
            selected.iter().map(|r| r.id().to_string()),
        ),
        warnings,
    }
}
