#![allow(dead_code)]

use billflow::application::engine::BillingEngine;
use billflow::config::EngineConfig;
use billflow::domain::catalog::CatalogEntry;
use billflow::domain::records::{CatalogRecord, PurchaseRecord, PurchaseState};
use billflow::infrastructure::in_memory::InMemoryBillingProvider;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub fn listing(id: &str, price: &str, micros: i64) -> CatalogRecord {
    CatalogRecord {
        id: id.to_string(),
        title: format!("{id} title"),
        description: format!("{id} description"),
        price: price.to_string(),
        price_amount_micros: micros,
        currency: "USD".to_string(),
    }
}

pub fn purchase(id: &str, token: &str, state: PurchaseState, acknowledged: bool) -> PurchaseRecord {
    PurchaseRecord {
        ids: vec![id.to_string()],
        token: token.to_string(),
        state,
        acknowledged,
    }
}

pub fn ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

pub fn engine(provider: &Arc<InMemoryBillingProvider>, entries: Vec<CatalogEntry>) -> BillingEngine {
    BillingEngine::new(provider.clone(), entries, EngineConfig::default())
}

/// Polls until the engine has `count` purchases waiting on the provider.
pub async fn wait_for_pending(engine: &BillingEngine, count: usize) {
    for _ in 0..200 {
        if engine.pending_purchases() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {count} pending purchases");
}

pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}
