use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::error::EngineError;

/// Layout version of every sheet schema below. Bump when a column list changes.
pub const SCHEMA_VERSION: u32 = 1;

/// Field names shared by the analyzers, the merge engine and the entity service.
pub mod fields {
    pub const LOCAL_ID: &str = "local_id";
    pub const PARENT_ID: &str = "parent_local_id";
    pub const NAME_UK: &str = "name_uk";
    pub const NAME: &str = "name";
    pub const CATEGORY_IDS: &str = "category_local_ids";
    pub const TRIGGER_OPTION: &str = "triggering_option_id";
    pub const IS_GLOBAL: &str = "is_global";
    pub const OWNER_CHAR: &str = "char_local_id";
    pub const MAPPING_ID: &str = "mapping_id";
    pub const MARKETPLACE_ID: &str = "marketplace_id";
    pub const FIELD_ID: &str = "field_id";
}

/// Fixed column layout of one sheet.
///
/// Rows are read and written positionally against `columns`; the header row
/// stored in the sheet must start with exactly these names.
#[derive(Debug, PartialEq, Eq)]
pub struct SheetSchema {
    pub sheet: &'static str,
    pub version: u32,
    pub id_field: &'static str,
    pub columns: &'static [&'static str],
}

static CATEGORIES: SheetSchema = SheetSchema {
    sheet: "Categories",
    version: SCHEMA_VERSION,
    id_field: fields::LOCAL_ID,
    columns: &[
        "local_id",
        "parent_local_id",
        "category_type",
        "name_uk",
        "name_ru",
        "etalon_id",
        "etalon_name",
        "rztk_id",
        "rztk_name",
        "epicenter_id",
        "epicenter_name",
        "allo_id",
        "allo_name",
        "fua_id",
        "fua_name",
        "maudau_id",
        "maudau_name",
    ],
};

static CHARACTERISTICS: SheetSchema = SheetSchema {
    sheet: "Characteristics",
    version: SCHEMA_VERSION,
    id_field: fields::LOCAL_ID,
    columns: &[
        "local_id",
        "name_uk",
        "name_ru",
        "category_local_ids",
        "triggering_option_id",
        "param_type",
        "unit",
        "filter_type",
        "is_global",
        "notes",
        "etalon_id",
        "etalon_name",
        "etalon_param_type",
        "etalon_filter_type",
        "etalon_unit",
        "rztk_id",
        "rztk_name",
        "rztk_param_type",
        "rztk_filter_type",
        "rztk_unit",
    ],
};

static OPTIONS: SheetSchema = SheetSchema {
    sheet: "Options",
    version: SCHEMA_VERSION,
    id_field: fields::LOCAL_ID,
    columns: &[
        "local_id",
        "char_local_id",
        "name_uk",
        "name_ru",
        "etalon_id",
        "etalon_name",
        "rztk_id",
        "rztk_name",
    ],
};

static BRANDS: SheetSchema = SheetSchema {
    sheet: "Brands",
    version: SCHEMA_VERSION,
    id_field: fields::LOCAL_ID,
    columns: &["local_id", "name", "notes"],
};

macro_rules! mapping_schema {
    ($name:ident, $sheet:literal, $owner:literal) => {
        static $name: SheetSchema = SheetSchema {
            sheet: $sheet,
            version: SCHEMA_VERSION,
            id_field: fields::MAPPING_ID,
            columns: &[
                "mapping_id",
                $owner,
                "marketplace_id",
                "external_id",
                "external_name",
                "attributes",
            ],
        };
    };
}

mapping_schema!(CATEGORY_MAPPINGS, "CategoryMappings", "category_local_id");
mapping_schema!(CHARACTERISTIC_MAPPINGS, "CharacteristicMappings", "characteristic_local_id");
mapping_schema!(OPTION_MAPPINGS, "OptionMappings", "option_local_id");
mapping_schema!(BRAND_MAPPINGS, "BrandMappings", "brand_local_id");

static MARKETPLACES: SheetSchema = SheetSchema {
    sheet: "Marketplaces",
    version: SCHEMA_VERSION,
    id_field: fields::MARKETPLACE_ID,
    columns: &[
        "marketplace_id",
        "display_name",
        "multi_map_categories",
        "multi_map_characteristics",
        "multi_map_options",
        "multi_map_brands",
    ],
};

static MARKETPLACE_FIELDS: SheetSchema = SheetSchema {
    sheet: "MarketplaceFields",
    version: SCHEMA_VERSION,
    id_field: fields::FIELD_ID,
    columns: &[
        "field_id",
        "entity_type",
        "marketplace_id",
        "field_key",
        "display_name",
        "field_type",
        "allow_multiple",
    ],
};

// ─── EntityKind ──────────────────────────────────────────────────────────────

/// The four entity kinds the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Categories,
    Characteristics,
    Options,
    Brands,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Categories,
        EntityKind::Characteristics,
        EntityKind::Options,
        EntityKind::Brands,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Categories => "categories",
            EntityKind::Characteristics => "characteristics",
            EntityKind::Options => "options",
            EntityKind::Brands => "brands",
        }
    }

    pub fn schema(&self) -> &'static SheetSchema {
        match self {
            EntityKind::Categories => &CATEGORIES,
            EntityKind::Characteristics => &CHARACTERISTICS,
            EntityKind::Options => &OPTIONS,
            EntityKind::Brands => &BRANDS,
        }
    }

    pub fn mapping_schema(&self) -> &'static SheetSchema {
        match self {
            EntityKind::Categories => &CATEGORY_MAPPINGS,
            EntityKind::Characteristics => &CHARACTERISTIC_MAPPINGS,
            EntityKind::Options => &OPTION_MAPPINGS,
            EntityKind::Brands => &BRAND_MAPPINGS,
        }
    }

    /// Column of the mapping sheet holding the owning entity's id.
    pub fn mapping_owner_column(&self) -> &'static str {
        self.mapping_schema().columns[1]
    }

    /// Prefix of generated ids: the sheet name's first three letters, lowercased.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            EntityKind::Categories => "cat",
            EntityKind::Characteristics => "cha",
            EntityKind::Options => "opt",
            EntityKind::Brands => "bra",
        }
    }

    /// Column of the `Marketplaces` sheet that enables multi-mapping for this kind.
    pub fn multi_map_column(&self) -> &'static str {
        match self {
            EntityKind::Categories => "multi_map_categories",
            EntityKind::Characteristics => "multi_map_characteristics",
            EntityKind::Options => "multi_map_options",
            EntityKind::Brands => "multi_map_brands",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "categories" | "category" => Ok(EntityKind::Categories),
            "characteristics" | "characteristic" => Ok(EntityKind::Characteristics),
            "options" | "option" => Ok(EntityKind::Options),
            "brands" | "brand" => Ok(EntityKind::Brands),
            other => Err(EngineError::Validation(format!(
                "unknown entity kind '{}'",
                other
            ))),
        }
    }
}

// ─── Sheet ───────────────────────────────────────────────────────────────────

/// Every sheet of the backing spreadsheet the engine reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Sheet {
    Entity(EntityKind),
    Mappings(EntityKind),
    Marketplaces,
    MarketplaceFields,
}

impl Sheet {
    pub fn schema(&self) -> &'static SheetSchema {
        match self {
            Sheet::Entity(kind) => kind.schema(),
            Sheet::Mappings(kind) => kind.mapping_schema(),
            Sheet::Marketplaces => &MARKETPLACES,
            Sheet::MarketplaceFields => &MARKETPLACE_FIELDS,
        }
    }

    pub fn name(&self) -> &'static str {
        self.schema().sheet
    }

    pub fn all() -> Vec<Sheet> {
        let mut sheets: Vec<Sheet> = EntityKind::ALL.iter().map(|k| Sheet::Entity(*k)).collect();
        sheets.extend(EntityKind::ALL.iter().map(|k| Sheet::Mappings(*k)));
        sheets.push(Sheet::Marketplaces);
        sheets.push(Sheet::MarketplaceFields);
        sheets
    }
}

impl fmt::Display for Sheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
