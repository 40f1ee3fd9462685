use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Quantity-on-hand for one (tenant, warehouse, product) triple.
///
/// Logically unique per triple; uniqueness is upheld by routing every
/// mutation through the per-key lock in the inventory service rather
/// than by a database constraint. Records are created lazily at
/// quantity 0 and never auto-deleted. No foreign keys to the catalog
/// tables: records may reference products and warehouses the catalog
/// does not know yet, so search builds its joins ad hoc instead.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub warehouse_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
