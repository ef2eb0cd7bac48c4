//! Fixtures shared by the unit tests.

use std::sync::Arc;

use crate::domain::ports::TabularStore;
use crate::domain::record::Record;
use crate::domain::schema::{EntityKind, Sheet};
use crate::infrastructure::store::cache::DEFAULT_TTL;
use crate::infrastructure::store::cached::CachedSheetStore;
use crate::infrastructure::store::memory::MemoryWorkbook;

pub fn cat(id: &str, parent: Option<&str>) -> Record {
    Record::from_pairs(&[
        ("local_id", id),
        ("parent_local_id", parent.unwrap_or("")),
        ("name_uk", &format!("Category {}", id)),
    ])
}

pub fn chr(id: &str, categories: &str, trigger: Option<&str>) -> Record {
    Record::from_pairs(&[
        ("local_id", id),
        ("name_uk", &format!("Characteristic {}", id)),
        ("category_local_ids", categories),
        ("triggering_option_id", trigger.unwrap_or("")),
        ("is_global", "FALSE"),
    ])
}

pub fn global_chr(id: &str) -> Record {
    Record::from_pairs(&[("local_id", id), ("is_global", "TRUE")])
}

pub fn opt(id: &str, owner: &str) -> Record {
    Record::from_pairs(&[
        ("local_id", id),
        ("char_local_id", owner),
        ("name_uk", &format!("Option {}", id)),
    ])
}

pub fn brand(id: &str) -> Record {
    Record::from_pairs(&[("local_id", id), ("name", &format!("Brand {}", id))])
}

pub fn mapping(kind: EntityKind, mapping_id: &str, owner: &str, marketplace: &str) -> Record {
    Record::from_pairs(&[
        ("mapping_id", mapping_id),
        (kind.mapping_owner_column(), owner),
        ("marketplace_id", marketplace),
        ("external_id", &format!("ext-{}", mapping_id)),
    ])
}

pub fn marketplace(id: &str, multi_map: &[EntityKind]) -> Record {
    let mut r = Record::from_pairs(&[("marketplace_id", id), ("display_name", id)]);
    for kind in multi_map {
        r.set(kind.multi_map_column(), "TRUE");
    }
    r
}

/// In-memory workbook behind a cached store.
pub struct Fixture {
    pub workbook: Arc<MemoryWorkbook>,
    pub store: Arc<CachedSheetStore>,
}

impl Fixture {
    pub fn new() -> Self {
        let workbook = Arc::new(MemoryWorkbook::new("test-store"));
        let store = Arc::new(CachedSheetStore::new(workbook.clone(), DEFAULT_TTL));
        Self { workbook, store }
    }

    pub fn with(self, kind: EntityKind, records: &[Record]) -> Self {
        self.workbook.seed(Sheet::Entity(kind), records);
        self
    }

    pub fn with_mappings(self, kind: EntityKind, records: &[Record]) -> Self {
        self.workbook.seed(Sheet::Mappings(kind), records);
        self
    }

    pub fn with_marketplaces(self, records: &[Record]) -> Self {
        self.workbook.seed(Sheet::Marketplaces, records);
        self
    }

    pub fn dyn_store(&self) -> Arc<dyn TabularStore> {
        self.store.clone()
    }

    /// Ids currently in the backend, in row order.
    pub async fn ids(&self, kind: EntityKind) -> Vec<String> {
        self.store
            .list(kind, true)
            .await
            .unwrap()
            .iter()
            .map(|r| r.id().to_string())
            .collect()
    }

    pub async fn get(&self, kind: EntityKind, id: &str) -> Option<Record> {
        self.store
            .list(kind, true)
            .await
            .unwrap()
            .into_iter()
            .find(|r| r.id() == id)
    }

    pub async fn mappings(&self, kind: EntityKind) -> Vec<Record> {
        self.store.list_mappings(kind, true).await.unwrap()
    }
}
