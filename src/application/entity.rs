use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::id_generator::IdGenerator;
use crate::domain::category_tree::would_create_cycle;
use crate::domain::error::{EngineError, Result};
use crate::domain::marketplace::MarketplaceConfig;
use crate::domain::ports::{TabularStore, WriteRequest};
use crate::domain::record::{flag_str, FieldMap, Record};
use crate::domain::schema::{fields, EntityKind, Sheet};

/// Create and update entities and their marketplace mappings.
pub struct EntityService {
    store: Arc<dyn TabularStore>,
    ids: Arc<IdGenerator>,
}

impl EntityService {
    pub fn new(store: Arc<dyn TabularStore>, ids: Arc<IdGenerator>) -> Self {
        Self { store, ids }
    }

    /// Save one record of `kind`.
    ///
    /// A record whose id exists is updated at its current row, with the
    /// given fields laid over the stored ones. A record with a blank id is
    /// created under a freshly generated one; ids are never chosen by the
    /// caller, so an unknown id is a validation error.
    pub async fn save(&self, kind: EntityKind, mut record: Record) -> Result<Record> {
        let sheet = Sheet::Entity(kind);
        let existing = self.store.list(kind, true).await?;
        let current = Some(record.id())
            .filter(|id| !id.is_empty())
            .and_then(|id| existing.iter().find(|r| r.id() == id));

        if current.is_none() && record.row.is_some() {
            return Err(EngineError::Validation(format!(
                "{} '{}' no longer exists",
                kind,
                record.id()
            )));
        }
        if current.is_none() && !record.id().is_empty() {
            return Err(EngineError::Validation(format!(
                "{} '{}' does not exist; leave {} blank to create a new record",
                kind,
                record.id(),
                fields::LOCAL_ID
            )));
        }
        if let Some(cur) = current {
            let mut merged = cur.fields.clone();
            merged.extend(record.fields);
            record = Record {
                row: cur.row,
                fields: merged,
            };
        }

        match kind {
            EntityKind::Categories => check_parent(&record, &existing)?,
            EntityKind::Characteristics => {
                normalize_global(&mut record);
                if record.trigger_option_id().is_some() {
                    let options = self.store.list(EntityKind::Options, true).await?;
                    check_trigger(&record, &existing, &options)?;
                }
            }
            EntityKind::Options => {
                let characteristics = self.store.list(EntityKind::Characteristics, true).await?;
                check_owner(&record, &characteristics)?;
            }
            EntityKind::Brands => {}
        }

        if current.is_some() {
            self.store.update(sheet, &record).await?;
            info!(kind = %kind, id = %record.id(), "record updated");
            return Ok(record);
        }

        let prefix = kind.id_prefix();
        self.ids.initialize(prefix, &existing);
        record.set(fields::LOCAL_ID, self.ids.next(prefix));
        let created = self.store.create(sheet, record).await?;
        info!(kind = %kind, id = %created.id(), row = ?created.row, "record created");
        Ok(created)
    }

    /// Replace every mapping of `owner_id` with `mappings`, in one batch.
    ///
    /// Missing `mapping_id`s are generated. Returns the number of mappings written.
    pub async fn save_mappings(
        &self,
        kind: EntityKind,
        owner_id: &str,
        mappings: Vec<FieldMap>,
    ) -> Result<usize> {
        let owner_id = owner_id.trim();
        if owner_id.is_empty() {
            return Err(EngineError::Validation("mapping owner id is required".into()));
        }
        let (existing, config) = tokio::try_join!(
            self.store.list_mappings(kind, true),
            MarketplaceConfig::load(self.store.as_ref(), true),
        )?;
        check_single_mappings(kind, &mappings, &config)?;

        let sheet = Sheet::Mappings(kind);
        let mut requests: Vec<WriteRequest> = existing
            .iter()
            .filter(|m| m.mapping_owner(kind) == owner_id)
            .filter_map(|m| m.row)
            .map(|row| WriteRequest::DeleteRow { sheet, row })
            .collect();
        let removed = requests.len();

        let written = mappings.len();
        for mut row in mappings {
            row.insert(kind.mapping_owner_column().to_string(), owner_id.to_string());
            let has_id = row
                .get(fields::MAPPING_ID)
                .is_some_and(|id| !id.trim().is_empty());
            if !has_id {
                row.insert(fields::MAPPING_ID.to_string(), new_mapping_id());
            }
            requests.push(WriteRequest::AppendRow { sheet, fields: row });
        }

        self.store.batch_write(requests).await?;
        debug!(kind = %kind, owner = owner_id, removed, written, "mappings replaced");
        Ok(written)
    }

    /// Options `characteristic` may be triggered by, sorted by name.
    pub async fn eligible_trigger_options(&self, characteristic: &Record) -> Result<Vec<Record>> {
        let (characteristics, options) = tokio::try_join!(
            self.store.list(EntityKind::Characteristics, false),
            self.store.list(EntityKind::Options, false),
        )?;
        Ok(eligible_trigger_options(characteristic, &characteristics, &options)
            .into_iter()
            .cloned()
            .collect())
    }
}

/// `map_<epoch millis>_<9 random chars>`.
pub fn new_mapping_id() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("map_{}_{}", Utc::now().timestamp_millis(), &random[..9])
}

/// A global characteristic applies everywhere, so it lists no categories.
fn normalize_global(record: &mut Record) {
    let global = record.is_global();
    record.set(fields::IS_GLOBAL, flag_str(global));
    if global {
        record.set(fields::CATEGORY_IDS, "");
    }
}

fn check_parent(record: &Record, categories: &[Record]) -> Result<()> {
    let Some(parent) = record.parent_id() else {
        return Ok(());
    };
    let by_id: HashMap<&str, &Record> = categories.iter().map(|c| (c.id(), c)).collect();
    if !by_id.contains_key(parent) {
        return Err(EngineError::Validation(format!(
            "parent category '{}' does not exist",
            parent
        )));
    }
    if !record.id().is_empty() && would_create_cycle(&by_id, record.id(), parent) {
        return Err(EngineError::Validation(format!(
            "'{}' cannot be placed under '{}': it would become its own ancestor",
            record.id(),
            parent
        )));
    }
    Ok(())
}

fn check_owner(option: &Record, characteristics: &[Record]) -> Result<()> {
    let owner = option
        .owner_char_id()
        .ok_or_else(|| EngineError::Validation("option must belong to a characteristic".into()))?;
    if characteristics.iter().any(|c| c.id() == owner) {
        return Ok(());
    }
    Err(EngineError::Validation(format!(
        "characteristic '{}' does not exist",
        owner
    )))
}

fn check_trigger(record: &Record, characteristics: &[Record], options: &[Record]) -> Result<()> {
    let Some(trigger) = record.trigger_option_id() else {
        return Ok(());
    };
    let eligible = eligible_trigger_options(record, characteristics, options);
    if eligible.iter().any(|o| o.id() == trigger) {
        return Ok(());
    }
    Err(EngineError::Validation(format!(
        "option '{}' cannot trigger '{}': its characteristic must be non-global and share a category",
        trigger,
        record.name()
    )))
}

/// Options owned by a non-global characteristic that shares at least one
/// category with `characteristic`. Its own options are excluded.
pub fn eligible_trigger_options<'a>(
    characteristic: &Record,
    characteristics: &'a [Record],
    options: &'a [Record],
) -> Vec<&'a Record> {
    let categories = characteristic.category_ids();
    let owners: HashMap<&str, &Record> = characteristics.iter().map(|c| (c.id(), c)).collect();
    let own_id = characteristic.id();

    let mut eligible: Vec<&Record> = options
        .iter()
        .filter(|o| {
            let Some(owner) = o.owner_char_id().and_then(|id| owners.get(id)) else {
                return false;
            };
            (own_id.is_empty() || owner.id() != own_id)
                && !owner.is_global()
                && owner.category_ids().iter().any(|c| categories.contains(c))
        })
        .collect();
    eligible.sort_by(|a, b| a.name().cmp(b.name()));
    eligible
}

/// Reject two mappings to one marketplace where only one is allowed.
fn check_single_mappings(
    kind: EntityKind,
    mappings: &[FieldMap],
    config: &MarketplaceConfig,
) -> Result<()> {
    let mut per_marketplace: BTreeMap<&str, usize> = BTreeMap::new();
    for m in mappings {
        let marketplace = m.get(fields::MARKETPLACE_ID).map(|s| s.trim()).unwrap_or("");
        if marketplace.is_empty() {
            return Err(EngineError::Validation("mapping needs a marketplace_id".into()));
        }
        *per_marketplace.entry(marketplace).or_default() += 1;
    }
    match per_marketplace
        .into_iter()
        .find(|(mp, n)| *n > 1 && !config.allows_multiple(kind, mp))
    {
        Some((mp, _)) => Err(EngineError::Validation(format!(
            "marketplace '{}' allows one {} mapping per record",
            mp,
            kind
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::RowIndex;
    use crate::testkit::{brand, cat, chr, global_chr, mapping, marketplace, opt, Fixture};

    fn service(fx: &Fixture) -> EntityService {
        EntityService::new(fx.dyn_store(), Arc::new(IdGenerator::new()))
    }

    #[tokio::test]
    async fn new_records_get_the_next_sequential_id() {
        let fx = Fixture::new().with(
            EntityKind::Brands,
            &[brand("bra_000000000004"), brand("bra_000000000011"), brand("legacy")],
        );
        let svc = service(&fx);

        let first = svc
            .save(EntityKind::Brands, Record::from_pairs(&[("name", "Acme")]))
            .await
            .unwrap();
        let second = svc
            .save(EntityKind::Brands, Record::from_pairs(&[("name", "Bolt")]))
            .await
            .unwrap();
        assert_eq!(first.id(), "bra_000000000012");
        assert_eq!(second.id(), "bra_000000000013");
        assert_eq!(second.row.map(|r| r.0), Some(6));
    }

    #[tokio::test]
    async fn update_merges_fields_at_the_current_row() {
        let fx = Fixture::new().with(EntityKind::Brands, &[brand("bra_1"), brand("bra_2")]);
        let svc = service(&fx);

        // Stale position; the id decides which row is written.
        let mut edit = Record::from_pairs(&[("local_id", "bra_2"), ("notes", "imported")]);
        edit.row = Some(RowIndex(2));
        let saved = svc.save(EntityKind::Brands, edit).await.unwrap();

        assert_eq!(saved.row.map(|r| r.0), Some(3));
        let stored = fx.get(EntityKind::Brands, "bra_2").await.unwrap();
        assert_eq!(stored.get("notes"), "imported");
        assert_eq!(stored.get("name"), "Brand bra_2");
        assert_eq!(fx.get(EntityKind::Brands, "bra_1").await.unwrap().get("notes"), "");
    }

    #[tokio::test]
    async fn deleted_record_cannot_be_updated() {
        let fx = Fixture::new();
        let mut edit = Record::from_pairs(&[("local_id", "bra_1")]);
        edit.row = Some(RowIndex(2));
        let err = service(&fx).save(EntityKind::Brands, edit).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn unknown_id_is_not_replaced_on_create() {
        let fx = Fixture::new().with(EntityKind::Brands, &[brand("bra_000000000001")]);
        let err = service(&fx)
            .save(
                EntityKind::Brands,
                Record::from_pairs(&[("local_id", "bra_custom"), ("name", "Acme")]),
            )
            .await
            .unwrap_err();
        assert!(err.is_validation(), "{err}");
        assert_eq!(fx.ids(EntityKind::Brands).await, vec!["bra_000000000001"]);
        assert_eq!(fx.workbook.apply_calls(), 0);
    }

    #[tokio::test]
    async fn category_parent_cannot_form_a_cycle() {
        let fx = Fixture::new().with(
            EntityKind::Categories,
            &[cat("cat_1", None), cat("cat_2", Some("cat_1")), cat("cat_3", Some("cat_2"))],
        );
        let svc = service(&fx);

        let err = svc
            .save(
                EntityKind::Categories,
                Record::from_pairs(&[("local_id", "cat_1"), ("parent_local_id", "cat_3")]),
            )
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = svc
            .save(
                EntityKind::Categories,
                Record::from_pairs(&[("name_uk", "New"), ("parent_local_id", "cat_404")]),
            )
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let moved = svc
            .save(
                EntityKind::Categories,
                Record::from_pairs(&[("local_id", "cat_3"), ("parent_local_id", "cat_1")]),
            )
            .await
            .unwrap();
        assert_eq!(moved.parent_id(), Some("cat_1"));
    }

    #[tokio::test]
    async fn global_characteristic_drops_its_categories() {
        let fx = Fixture::new();
        let saved = service(&fx)
            .save(
                EntityKind::Characteristics,
                Record::from_pairs(&[
                    ("name_uk", "Colour"),
                    ("is_global", "true"),
                    ("category_local_ids", "cat_1"),
                ]),
            )
            .await
            .unwrap();
        assert_eq!(saved.id(), "cha_000000000001");
        assert_eq!(saved.get("is_global"), "TRUE");
        assert_eq!(saved.get("category_local_ids"), "");
    }

    #[test]
    fn trigger_options_need_a_shared_non_global_owner() {
        let chars = vec![
            chr("cha_1", "cat_1,cat_2", None),
            chr("cha_2", "cat_2", None),
            chr("cha_3", "cat_9", None),
            global_chr("cha_4"),
        ];
        let opts = vec![
            opt("opt_b", "cha_1"),
            opt("opt_a", "cha_2"),
            opt("opt_c", "cha_3"),
            opt("opt_d", "cha_4"),
            opt("opt_e", "cha_missing"),
        ];
        let editing = chr("cha_5", "cat_2", None);
        let eligible: Vec<&str> = eligible_trigger_options(&editing, &chars, &opts)
            .iter()
            .map(|o| o.id())
            .collect();
        assert_eq!(eligible, vec!["opt_a", "opt_b"]);

        let own: Vec<&str> = eligible_trigger_options(&chars[1], &chars, &opts)
            .iter()
            .map(|o| o.id())
            .collect();
        assert_eq!(own, vec!["opt_b"]);
    }

    #[tokio::test]
    async fn ineligible_trigger_is_rejected() {
        let fx = Fixture::new()
            .with(EntityKind::Characteristics, &[chr("cha_1", "cat_9", None)])
            .with(EntityKind::Options, &[opt("opt_1", "cha_1")]);
        let err = service(&fx)
            .save(EntityKind::Characteristics, chr("", "cat_1", Some("opt_1")))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn option_needs_an_existing_owner() {
        let fx = Fixture::new().with(EntityKind::Characteristics, &[chr("cha_1", "cat_1", None)]);
        let svc = service(&fx);
        assert!(svc.save(EntityKind::Options, opt("", "cha_2")).await.is_err());
        let saved = svc.save(EntityKind::Options, opt("", "cha_1")).await.unwrap();
        assert_eq!(saved.id(), "opt_000000000001");
    }

    #[tokio::test]
    async fn save_mappings_replaces_the_owners_rows() {
        let kind = EntityKind::Categories;
        let fx = Fixture::new()
            .with_marketplaces(&[marketplace("rztk", &[]), marketplace("epic", &[kind])])
            .with_mappings(
                kind,
                &[
                    mapping(kind, "m1", "cat_1", "rztk"),
                    mapping(kind, "m2", "cat_2", "rztk"),
                    mapping(kind, "m3", "cat_1", "epic"),
                ],
            );
        let svc = service(&fx);
        let new = vec![
            Record::from_pairs(&[("marketplace_id", "epic"), ("external_id", "10")]).fields,
            Record::from_pairs(&[("marketplace_id", "epic"), ("external_id", "11")]).fields,
        ];
        assert_eq!(svc.save_mappings(kind, "cat_1", new).await.unwrap(), 2);

        let rows = fx.mappings(kind).await;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].get("mapping_id"), "m2");
        for m in &rows[1..] {
            assert_eq!(m.mapping_owner(kind), "cat_1");
            assert!(m.get("mapping_id").starts_with("map_"));
        }
        assert_eq!(fx.workbook.apply_calls(), 1);
    }

    #[tokio::test]
    async fn save_mappings_respects_single_mapping_marketplaces() {
        let kind = EntityKind::Options;
        let fx = Fixture::new().with_marketplaces(&[marketplace("rztk", &[])]);
        let new = vec![
            Record::from_pairs(&[("marketplace_id", "rztk")]).fields,
            Record::from_pairs(&[("marketplace_id", "rztk")]).fields,
        ];
        let err = service(&fx).save_mappings(kind, "opt_1", new).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn mapping_ids_have_the_expected_shape() {
        let id = new_mapping_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "map");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
    }
}
