//! Using taxonomist as a library: seed an in-memory workbook, inspect a
//! delete, then run the confirmation flow with a scripted prompt.
//!
//! cargo run --example delete_as_lib

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use taxonomist::{
    AppConfig, CacheConfig, DeleteChoice, DeletePrompt, DeletionSummary, EntityKind,
    MemoryWorkbook, Record, Sheet, StoreConfig,
};

struct CascadeEverything;

#[async_trait]
impl DeletePrompt for CascadeEverything {
    async fn confirm(&self, _kind: EntityKind, _count: usize) -> bool {
        true
    }

    async fn choose(&self, summary: &DeletionSummary) -> DeleteChoice {
        print!("{}", summary);
        DeleteChoice::Cascade
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let workbook = Arc::new(MemoryWorkbook::new("demo"));
    workbook.seed(
        Sheet::Entity(EntityKind::Categories),
        &[
            Record::from_pairs(&[("local_id", "cat_000000000001"), ("name_uk", "Electronics")]),
            Record::from_pairs(&[
                ("local_id", "cat_000000000002"),
                ("name_uk", "Phones"),
                ("parent_local_id", "cat_000000000001"),
            ]),
        ],
    );
    workbook.seed(
        Sheet::Entity(EntityKind::Characteristics),
        &[Record::from_pairs(&[
            ("local_id", "cha_000000000001"),
            ("name_uk", "Screen size"),
            ("category_local_ids", "cat_000000000002"),
            ("is_global", "FALSE"),
        ])],
    );

    let cfg = AppConfig {
        store: StoreConfig {
            store_id: "demo".into(),
            workbook_path: PathBuf::from("unused.json"),
        },
        cache: CacheConfig::default(),
    };
    let ctx = taxonomist::with_backend(workbook, &cfg);
    let mut changes = ctx.subscribe();

    let selection = vec!["cat_000000000001".to_string()];
    let analysis = ctx.analyze(EntityKind::Categories, &selection).await?;
    println!("{}", serde_json::to_string_pretty(&analysis)?);

    let outcome = ctx
        .confirm_and_delete(EntityKind::Categories, &selection, &CascadeEverything)
        .await;
    println!("{:?}: {}", outcome.status, outcome.message.unwrap_or_default());

    while let Ok(event) = changes.try_recv() {
        println!("changed: {}", event.kind);
    }
    Ok(())
}
