use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::error::Result;
use crate::domain::ports::TabularStore;
use crate::domain::record::{flag, Record};
use crate::domain::schema::{EntityKind, Sheet};

#[derive(Debug, Clone, Serialize)]
pub struct Marketplace {
    pub marketplace_id: String,
    pub display_name: String,
    /// Kinds for which this marketplace accepts several mappings per entity.
    pub multi_map: Vec<EntityKind>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketplaceField {
    pub field_id: String,
    pub entity_kind: EntityKind,
    pub marketplace_id: String,
    pub field_key: String,
    pub display_name: String,
    pub field_type: String,
    pub allow_multiple: bool,
}

/// Marketplaces and the mapping fields each one defines per entity kind.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MarketplaceConfig {
    pub marketplaces: BTreeMap<String, Marketplace>,
    pub fields: BTreeMap<(EntityKind, String), Vec<MarketplaceField>>,
}

impl MarketplaceConfig {
    /// Build from the raw `Marketplaces` and `MarketplaceFields` rows.
    /// Fields with an unknown `entity_type` are skipped.
    pub fn from_records(marketplaces: &[Record], fields: &[Record]) -> Self {
        let marketplaces = marketplaces
            .iter()
            .filter_map(|r| {
                let id = r.get_opt("marketplace_id")?.to_string();
                let multi_map = EntityKind::ALL
                    .iter()
                    .copied()
                    .filter(|k| flag(r.get(k.multi_map_column())))
                    .collect();
                Some((
                    id.clone(),
                    Marketplace {
                        marketplace_id: id,
                        display_name: r.get("display_name").to_string(),
                        multi_map,
                    },
                ))
            })
            .collect();

        let mut by_group: BTreeMap<(EntityKind, String), Vec<MarketplaceField>> = BTreeMap::new();
        for r in fields {
            let Ok(kind) = r.get("entity_type").parse::<EntityKind>() else {
                continue;
            };
            let field = MarketplaceField {
                field_id: r.get("field_id").to_string(),
                entity_kind: kind,
                marketplace_id: r.marketplace_id().to_string(),
                field_key: r.get("field_key").to_string(),
                display_name: r.get("display_name").to_string(),
                field_type: r.get("field_type").to_string(),
                allow_multiple: flag(r.get("allow_multiple")),
            };
            by_group
                .entry((kind, field.marketplace_id.clone()))
                .or_default()
                .push(field);
        }

        Self {
            marketplaces,
            fields: by_group,
        }
    }

    pub async fn load(store: &dyn TabularStore, force_refresh: bool) -> Result<Self> {
        let (marketplaces, fields) = tokio::try_join!(
            store.fetch(Sheet::Marketplaces, force_refresh),
            store.fetch(Sheet::MarketplaceFields, force_refresh),
        )?;
        Ok(Self::from_records(&marketplaces, &fields))
    }

    /// Whether an entity of `kind` may carry several mappings for `marketplace_id`.
    pub fn allows_multiple(&self, kind: EntityKind, marketplace_id: &str) -> bool {
        let marketplace_flag = self
            .marketplaces
            .get(marketplace_id)
            .map(|m| m.multi_map.contains(&kind))
            .unwrap_or(false);
        let field_flag = self
            .fields
            .get(&(kind, marketplace_id.to_string()))
            .map(|group| group.iter().any(|f| f.allow_multiple))
            .unwrap_or(false);
        marketplace_flag || field_flag
    }
}
