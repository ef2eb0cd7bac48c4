use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::domain::record::Record;
use crate::domain::schema::EntityKind;

// ─── DeleteTargets ───────────────────────────────────────────────────────────

/// Ids to delete, grouped by entity kind.
///
/// Every kind an analysis touches is present as a key, even when its list is
/// empty, so consumers can iterate it uniformly. Ids keep insertion order and
/// are never duplicated within a kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DeleteTargets {
    ids: BTreeMap<EntityKind, Vec<String>>,
    #[serde(skip)]
    seen: HashSet<(EntityKind, String)>,
}

impl DeleteTargets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty lists for each of `kinds`.
    pub fn touching(kinds: &[EntityKind]) -> Self {
        Self {
            ids: kinds.iter().map(|k| (*k, Vec::new())).collect(),
            seen: HashSet::new(),
        }
    }

    pub fn single<I, S>(kind: EntityKind, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut targets = Self::touching(&[kind]);
        for id in ids {
            targets.push(kind, id);
        }
        targets
    }

    /// Append `id` under `kind`. Returns `false` when it was already there.
    pub fn push(&mut self, kind: EntityKind, id: impl Into<String>) -> bool {
        let id = id.into();
        let list = self.ids.entry(kind).or_default();
        if !self.seen.insert((kind, id.clone())) {
            return false;
        }
        list.push(id);
        true
    }

    pub fn ids(&self, kind: EntityKind) -> &[String] {
        self.ids.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, kind: EntityKind, id: &str) -> bool {
        self.seen.contains(&(kind, id.to_string()))
    }

    pub fn kinds(&self) -> impl Iterator<Item = EntityKind> + '_ {
        self.ids.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityKind, &[String])> {
        self.ids.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    /// Number of ids across all kinds.
    pub fn total(&self) -> usize {
        self.ids.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

// ─── Analysis output ─────────────────────────────────────────────────────────

/// A selected record that other records depend on.
#[derive(Debug, Clone, Serialize)]
pub struct DependentItem {
    pub record: Record,
    pub linked_entities: Vec<Record>,
    pub linked_kind: EntityKind,
}

/// Non-fatal anomaly found while analysing or merging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum IntegrityWarning {
    /// Categories whose parent chain loops back on itself.
    ParentCycle { members: Vec<String> },
    /// A selected id that does not exist in the loaded data.
    UnknownId { kind: EntityKind, id: String },
    /// A characteristic that ends up triggered by one of its own options.
    SelfTrigger {
        characteristic: String,
        option: String,
    },
}

impl fmt::Display for IntegrityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityWarning::ParentCycle { members } => {
                write!(f, "category parent cycle: {}", members.join(" -> "))
            }
            IntegrityWarning::UnknownId { kind, id } => {
                write!(f, "{} '{}' not found", kind, id)
            }
            IntegrityWarning::SelfTrigger {
                characteristic,
                option,
            } => write!(
                f,
                "characteristic '{}' is triggered by its own option '{}'",
                characteristic, option
            ),
        }
    }
}

/// What a delete of the selected ids would do.
///
/// `safe_to_delete` and `items_with_dependents` partition the selection;
/// `cascade_delete_list` is the full closure for a cascade delete.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub kind: EntityKind,
    pub items_with_dependents: Vec<DependentItem>,
    pub safe_to_delete: Vec<Record>,
    pub cascade_delete_list: DeleteTargets,
    pub warnings: Vec<IntegrityWarning>,
}

impl AnalysisResult {
    pub fn has_dependents(&self) -> bool {
        !self.items_with_dependents.is_empty()
    }

    pub fn selected_count(&self) -> usize {
        self.items_with_dependents.len() + self.safe_to_delete.len()
    }

    /// Targets for a "safe" delete: only the dependency-free selection.
    pub fn safe_targets(&self) -> DeleteTargets {
        DeleteTargets::single(self.kind, self.safe_to_delete.iter().map(|r| r.id().to_string()))
    }

    /// Targets for a plain delete of the whole selection.
    pub fn selection_targets(&self) -> DeleteTargets {
        let ids = self
            .items_with_dependents
            .iter()
            .map(|d| &d.record)
            .chain(self.safe_to_delete.iter())
            .map(|r| r.id().to_string());
        DeleteTargets::single(self.kind, ids)
    }
}

// ─── User decision ───────────────────────────────────────────────────────────

/// The three-way decision offered when the selection has dependents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteChoice {
    Safe,
    Cascade,
    Cancel,
}

/// Human-readable digest of an [`AnalysisResult`], shown before the choice.
#[derive(Debug, Clone, Serialize)]
pub struct DeletionSummary {
    pub kind: EntityKind,
    pub selected: usize,
    pub with_dependents: Vec<(String, usize)>,
    pub linked_kind: Option<EntityKind>,
    pub safe_count: usize,
    pub cascade_count: usize,
    pub warnings: Vec<String>,
}

impl DeletionSummary {
    pub fn from_analysis(analysis: &AnalysisResult) -> Self {
        Self {
            kind: analysis.kind,
            selected: analysis.selected_count(),
            with_dependents: analysis
                .items_with_dependents
                .iter()
                .map(|d| (d.record.name().to_string(), d.linked_entities.len()))
                .collect(),
            linked_kind: analysis.items_with_dependents.first().map(|d| d.linked_kind),
            safe_count: analysis.safe_to_delete.len(),
            cascade_count: analysis.cascade_delete_list.total(),
            warnings: analysis.warnings.iter().map(ToString::to_string).collect(),
        }
    }

    /// "Safe" is only offered when something is safe to delete.
    pub fn offers_safe(&self) -> bool {
        self.safe_count > 0
    }

    pub fn offers_cascade(&self) -> bool {
        !self.with_dependents.is_empty() && self.cascade_count > 0
    }

    fn dependency_noun(&self) -> &'static str {
        match self.linked_kind {
            Some(EntityKind::Categories) => "child categories",
            Some(EntityKind::Options) => "linked options",
            Some(EntityKind::Characteristics) => "dependent characteristics",
            _ => "dependents",
        }
    }
}

impl fmt::Display for DeletionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Selected {} {}. {} of them have dependents.",
            self.selected,
            self.kind,
            self.with_dependents.len()
        )?;
        let noun = self.dependency_noun();
        for (name, count) in &self.with_dependents {
            writeln!(f, "  - {} (has {} {})", name, count, noun)?;
        }
        for w in &self.warnings {
            writeln!(f, "  ! {}", w)?;
        }
        if self.offers_safe() {
            writeln!(f, "safe: delete {} item(s) without dependents", self.safe_count)?;
        }
        if self.offers_cascade() {
            writeln!(f, "cascade: delete all {} affected record(s)", self.cascade_count)?;
        }
        Ok(())
    }
}
