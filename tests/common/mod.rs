#![allow(dead_code)]

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema, Set,
};
use std::sync::Arc;
use std::time::Duration;
use stockledger_api::{
    cache::{CacheBackend, InMemoryCache},
    entities::{inventory_record, order, product, warehouse},
    services::{BulkOperationsService, InventoryService, OrderService},
};
use uuid::Uuid;

pub struct TestContext {
    pub db: Arc<DatabaseConnection>,
    pub cache: Arc<InMemoryCache>,
    pub inventory: Arc<InventoryService>,
    pub bulk: Arc<BulkOperationsService>,
    pub orders: Arc<OrderService>,
    pub tenant_id: Uuid,
}

/// Fresh in-memory SQLite with the schema derived from the entities.
/// A single pooled connection keeps the memory database alive and
/// consistent across concurrent tasks.
pub async fn setup() -> TestContext {
    let mut opt = ConnectOptions::new("sqlite::memory:".to_string());
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.expect("sqlite connect");

    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    db.execute(backend.build(&schema.create_table_from_entity(inventory_record::Entity)))
        .await
        .expect("create inventory_records");
    db.execute(backend.build(&schema.create_table_from_entity(order::Entity)))
        .await
        .expect("create orders");
    db.execute(backend.build(&schema.create_table_from_entity(product::Entity)))
        .await
        .expect("create products");
    db.execute(backend.build(&schema.create_table_from_entity(warehouse::Entity)))
        .await
        .expect("create warehouses");

    let db = Arc::new(db);
    let cache = Arc::new(InMemoryCache::default());
    let cache_backend: Arc<dyn CacheBackend> = cache.clone();

    let inventory = Arc::new(InventoryService::new(
        db.clone(),
        cache_backend,
        Duration::from_secs(300),
        None,
    ));
    let bulk = Arc::new(BulkOperationsService::new(inventory.clone(), None));
    let orders = Arc::new(OrderService::new(db.clone(), inventory.clone(), None));

    TestContext {
        db,
        cache,
        inventory,
        bulk,
        orders,
        tenant_id: Uuid::new_v4(),
    }
}

impl TestContext {
    /// Seeds stock for a key via the ledger's own adjustment path.
    pub async fn seed_stock(&self, warehouse_id: Uuid, product_id: Uuid, quantity: i32) {
        self.inventory
            .adjust_stock(self.tenant_id, warehouse_id, product_id, quantity)
            .await
            .expect("seed stock");
    }

    pub async fn quantity(&self, warehouse_id: Uuid, product_id: Uuid) -> i32 {
        self.inventory
            .get_by_warehouse_and_product(self.tenant_id, warehouse_id, product_id)
            .await
            .expect("stock record should exist")
            .quantity
    }

    /// Inserts a named product row for search tests.
    pub async fn seed_product(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        product::ActiveModel {
            id: Set(id),
            tenant_id: Set(self.tenant_id),
            name: Set(name.to_string()),
            sku: Set(format!("SKU-{}", &id.to_string()[..8])),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("seed product");
        id
    }

    /// Inserts a named warehouse row for search tests.
    pub async fn seed_warehouse(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        warehouse::ActiveModel {
            id: Set(id),
            tenant_id: Set(self.tenant_id),
            name: Set(name.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("seed warehouse");
        id
    }
}
