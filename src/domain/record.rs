use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::schema::{fields, EntityKind};
use crate::domain::value_objects::RowIndex;

/// A row as a map of column name → cell text.
pub type FieldMap = BTreeMap<String, String>;

/// One row of a sheet, with the physical position it was read from.
///
/// `row` is `None` for records that have not been written yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub row: Option<RowIndex>,
    pub fields: FieldMap,
}

impl Record {
    pub fn new(fields: FieldMap) -> Self {
        Self { row: None, fields }
    }

    pub fn at(row: RowIndex, fields: FieldMap) -> Self {
        Self {
            row: Some(row),
            fields,
        }
    }

    /// Build a record from `(column, value)` pairs.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    /// Cell value, empty when the column is absent.
    pub fn get(&self, field: &str) -> &str {
        self.fields.get(field).map(String::as_str).unwrap_or("")
    }

    /// Cell value trimmed, `None` when blank.
    pub fn get_opt(&self, field: &str) -> Option<&str> {
        let v = self.get(field).trim();
        (!v.is_empty()).then_some(v)
    }

    pub fn set(&mut self, field: &str, value: impl Into<String>) {
        self.fields.insert(field.to_string(), value.into());
    }

    pub fn id(&self) -> &str {
        self.get(fields::LOCAL_ID).trim()
    }

    /// Display name: `name_uk` for taxonomy entities, `name` for brands.
    pub fn name(&self) -> &str {
        self.get_opt(fields::NAME_UK)
            .or_else(|| self.get_opt(fields::NAME))
            .unwrap_or_else(|| self.id())
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.get_opt(fields::PARENT_ID)
    }

    pub fn owner_char_id(&self) -> Option<&str> {
        self.get_opt(fields::OWNER_CHAR)
    }

    pub fn trigger_option_id(&self) -> Option<&str> {
        self.get_opt(fields::TRIGGER_OPTION)
    }

    pub fn is_global(&self) -> bool {
        flag(self.get(fields::IS_GLOBAL))
    }

    /// Categories a characteristic applies to. Always empty for global ones.
    pub fn category_ids(&self) -> BTreeSet<&str> {
        if self.is_global() {
            return BTreeSet::new();
        }
        split_id_set(self.get(fields::CATEGORY_IDS))
    }

    /// Owner id of a mapping row of the given kind.
    pub fn mapping_owner(&self, kind: EntityKind) -> &str {
        self.get(kind.mapping_owner_column()).trim()
    }

    pub fn marketplace_id(&self) -> &str {
        self.get(fields::MARKETPLACE_ID).trim()
    }
}

/// Spreadsheet boolean: `TRUE` in any case.
pub fn flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("TRUE")
}

pub fn flag_str(value: bool) -> &'static str {
    if value {
        "TRUE"
    } else {
        "FALSE"
    }
}

/// Parse a comma-joined id list into a set, dropping blanks.
pub fn split_id_set(raw: &str) -> BTreeSet<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn join_id_set<'a>(ids: impl IntoIterator<Item = &'a str>) -> String {
    ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect::<Vec<_>>().join(",")
}
