pub mod api;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod inventory;
pub mod ledger;
pub mod memory;
pub mod models;
pub mod orchestrator;
pub mod schema;

use std::sync::Arc;

pub use catalog::{CatalogReader, PgCatalogStore};
pub use config::Config;
pub use db::DbPool;
pub use error::{ErrorKind, Result, ShopError};
pub use inventory::{InventoryTransactor, PgInventoryManager};
pub use ledger::{OrderLedger, PgOrderLedger};
pub use memory::InMemoryShop;
pub use orchestrator::ShopOrchestrator;

/// Wires the Postgres-backed components into an orchestrator.
pub fn postgres_orchestrator(pool: DbPool, config: &Config) -> ShopOrchestrator {
    let deadline = config.tx_timeout();
    ShopOrchestrator::new(
        Arc::new(PgCatalogStore::new(pool.clone(), config.default_page_size, deadline)),
        Arc::new(PgOrderLedger::new(pool.clone(), deadline)),
        Arc::new(PgInventoryManager::new(pool, deadline)),
        config.payment_base_url.clone(),
    )
}

/// Wires all three capabilities to one in-memory store.
pub fn in_memory_orchestrator(shop: &InMemoryShop, payment_base_url: &str) -> ShopOrchestrator {
    ShopOrchestrator::new(
        Arc::new(shop.clone()),
        Arc::new(shop.clone()),
        Arc::new(shop.clone()),
        payment_base_url,
    )
}
