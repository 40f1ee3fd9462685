use crate::{
    cache::{inventory_key, CacheBackend},
    db::DbPool,
    entities::{
        inventory_record::{self, Entity as InventoryRecord, Model as InventoryRecordModel},
        product, warehouse,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, JoinType, Order,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionError,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use strum::EnumString;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Default page size for list and search operations.
pub const DEFAULT_PAGE_SIZE: u64 = 50;

/// Serializes mutations per (tenant, warehouse, product) key.
///
/// Read-modify-write on a quantity would otherwise lose updates under
/// concurrency; holding the key's mutex across the whole mutation makes
/// the quantity invariants hold without a storage-level conditional
/// update. Lock entries are never reclaimed; the registry grows with
/// the set of touched keys, which is bounded by the catalog size.
#[derive(Debug, Default)]
pub struct KeyLockRegistry {
    locks: DashMap<(Uuid, Uuid, Uuid), Arc<Mutex<()>>>,
}

impl KeyLockRegistry {
    pub fn lock_for(&self, tenant_id: Uuid, warehouse_id: Uuid, product_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry((tenant_id, warehouse_id, product_id))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Locks every given key, deduplicated, in canonical key order. The
    /// same ordering rules single transfers, so batch and single-key
    /// callers cannot deadlock each other.
    pub async fn lock_all(&self, mut keys: Vec<(Uuid, Uuid, Uuid)>) -> Vec<OwnedMutexGuard<()>> {
        keys.sort_unstable();
        keys.dedup();
        let mut guards = Vec::with_capacity(keys.len());
        for (tenant_id, warehouse_id, product_id) in keys {
            let lock = self.lock_for(tenant_id, warehouse_id, product_id);
            guards.push(lock.lock_owned().await);
        }
        guards
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateInventoryRecordRequest {
    pub tenant_id: Uuid,
    pub warehouse_id: Uuid,
    pub product_id: Uuid,
    #[validate(range(min = 0, message = "Quantity must not be negative"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateInventoryRecordRequest {
    #[validate(range(min = 0, message = "Quantity must not be negative"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferStockRequest {
    pub tenant_id: Uuid,
    pub product_id: Uuid,
    pub from_warehouse_id: Uuid,
    pub to_warehouse_id: Uuid,
    pub quantity: i32,
}

/// AND-combination of optional predicates for `advanced_search`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventorySearchFilter {
    /// Free-text match against product or warehouse name.
    pub query: Option<String>,
    pub warehouse_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub min_quantity: Option<i32>,
    pub max_quantity: Option<i32>,
    /// Shorthand for `quantity <= threshold`.
    pub stock_threshold: Option<i32>,
    pub updated_after: Option<DateTime<Utc>>,
    pub updated_before: Option<DateTime<Utc>>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Allow-listed sort fields. Caller-supplied sort expressions are never
/// passed through to the query builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum InventorySortField {
    Quantity,
    UpdatedAt,
    ProductName,
    WarehouseName,
}

fn parse_sort_order(raw: Option<&str>) -> Result<Order, ServiceError> {
    match raw {
        None => Ok(Order::Desc),
        Some("asc") => Ok(Order::Asc),
        Some("desc") => Ok(Order::Desc),
        Some(other) => Err(ServiceError::ValidationFailed(format!(
            "unknown sort order '{}', expected 'asc' or 'desc'",
            other
        ))),
    }
}

/// The inventory ledger: the single owner of stock-quantity records.
///
/// All other components either read through it or delegate mutation to
/// it. Every successful mutation invalidates the touched cache key(s);
/// invalidation failure is logged and never fails the call.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DbPool>,
    cache: Arc<dyn CacheBackend>,
    cache_ttl: Duration,
    event_sender: Option<Arc<EventSender>>,
    locks: Arc<KeyLockRegistry>,
}

impl InventoryService {
    pub fn new(
        db: Arc<DbPool>,
        cache: Arc<dyn CacheBackend>,
        cache_ttl: Duration,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db,
            cache,
            cache_ttl,
            event_sender,
            locks: Arc::new(KeyLockRegistry::default()),
        }
    }

    /// Creates a stock record explicitly. Most records are instead
    /// created lazily by the first mutation touching their key.
    #[instrument(skip(self, request), fields(tenant_id = %request.tenant_id))]
    pub async fn create(
        &self,
        request: CreateInventoryRecordRequest,
    ) -> Result<InventoryRecordModel, ServiceError> {
        request.validate()?;
        if request.warehouse_id.is_nil() || request.product_id.is_nil() {
            return Err(ServiceError::ValidationFailed(
                "warehouse id and product id are required".to_string(),
            ));
        }

        let lock = self
            .locks
            .lock_for(request.tenant_id, request.warehouse_id, request.product_id);
        let _guard = lock.lock().await;

        let existing = InventoryRecord::find()
            .filter(inventory_record::Column::TenantId.eq(request.tenant_id))
            .filter(inventory_record::Column::WarehouseId.eq(request.warehouse_id))
            .filter(inventory_record::Column::ProductId.eq(request.product_id))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        if existing.is_some() {
            return Err(ServiceError::ValidationFailed(format!(
                "stock record already exists for product {} in warehouse {}",
                request.product_id, request.warehouse_id
            )));
        }

        let now = Utc::now();
        let model = inventory_record::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(request.tenant_id),
            warehouse_id: Set(request.warehouse_id),
            product_id: Set(request.product_id),
            quantity: Set(request.quantity),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::db_error)?;

        self.invalidate_cache(request.tenant_id, request.warehouse_id, request.product_id)
            .await;
        info!(record_id = %model.id, quantity = model.quantity, "stock record created");
        Ok(model)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, record_id = %record_id))]
    pub async fn get_by_id(
        &self,
        tenant_id: Uuid,
        record_id: Uuid,
    ) -> Result<InventoryRecordModel, ServiceError> {
        InventoryRecord::find_by_id(record_id)
            .filter(inventory_record::Column::TenantId.eq(tenant_id))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("stock record {} not found", record_id))
            })
    }

    /// Sets the on-hand quantity of an existing record outright.
    #[instrument(skip(self, request), fields(tenant_id = %tenant_id, record_id = %record_id))]
    pub async fn update(
        &self,
        tenant_id: Uuid,
        record_id: Uuid,
        request: UpdateInventoryRecordRequest,
    ) -> Result<InventoryRecordModel, ServiceError> {
        request.validate()?;
        let record = self.get_by_id(tenant_id, record_id).await?;

        let lock = self
            .locks
            .lock_for(tenant_id, record.warehouse_id, record.product_id);
        let _guard = lock.lock().await;

        // Re-read under the lock; the quantity may have moved.
        let record = self.get_by_id(tenant_id, record_id).await?;
        let previous = record.quantity;
        let (warehouse_id, product_id) = (record.warehouse_id, record.product_id);
        let updated = persist_quantity(&*self.db, record, request.quantity).await?;

        self.invalidate_cache(tenant_id, warehouse_id, product_id).await;
        self.emit(Event::InventoryAdjusted {
            tenant_id,
            warehouse_id,
            product_id,
            previous_quantity: previous,
            new_quantity: updated.quantity,
        })
        .await;
        Ok(updated)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, record_id = %record_id))]
    pub async fn delete(&self, tenant_id: Uuid, record_id: Uuid) -> Result<(), ServiceError> {
        let record = self.get_by_id(tenant_id, record_id).await?;
        let (warehouse_id, product_id) = (record.warehouse_id, record.product_id);

        let lock = self.locks.lock_for(tenant_id, warehouse_id, product_id);
        let _guard = lock.lock().await;

        InventoryRecord::delete_by_id(record.id)
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        self.invalidate_cache(tenant_id, warehouse_id, product_id).await;
        info!(record_id = %record_id, "stock record deleted");
        Ok(())
    }

    /// Lists a tenant's stock records, newest change first.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn list(
        &self,
        tenant_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<InventoryRecordModel>, u64), ServiceError> {
        let paginator = InventoryRecord::find()
            .filter(inventory_record::Column::TenantId.eq(tenant_id))
            .order_by_desc(inventory_record::Column::UpdatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let records = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((records, total))
    }

    /// Point lookup with read-through caching. Cache failures fall back
    /// to the store silently.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn get_by_warehouse_and_product(
        &self,
        tenant_id: Uuid,
        warehouse_id: Uuid,
        product_id: Uuid,
    ) -> Result<InventoryRecordModel, ServiceError> {
        let key = inventory_key(tenant_id, warehouse_id, product_id);
        match self.cache.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<InventoryRecordModel>(&raw) {
                Ok(model) => return Ok(model),
                Err(e) => warn!(key = %key, error = %e, "discarding undecodable cache entry"),
            },
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "cache read failed"),
        }

        let record = InventoryRecord::find()
            .filter(inventory_record::Column::TenantId.eq(tenant_id))
            .filter(inventory_record::Column::WarehouseId.eq(warehouse_id))
            .filter(inventory_record::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "no stock record for product {} in warehouse {}",
                    product_id, warehouse_id
                ))
            })?;

        match serde_json::to_string(&record) {
            Ok(raw) => {
                if let Err(e) = self.cache.set(&key, &raw, Some(self.cache_ttl)).await {
                    warn!(key = %key, error = %e, "cache populate failed");
                }
            }
            Err(e) => warn!(key = %key, error = %e, "cache encode failed"),
        }
        Ok(record)
    }

    /// Adds `delta` (which may be negative) to the on-hand quantity.
    ///
    /// A missing record is created at 0 first. A result below zero is
    /// silently clamped to zero rather than rejected; callers depend on
    /// this policy. Only persistence failures fail the call.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn adjust_stock(
        &self,
        tenant_id: Uuid,
        warehouse_id: Uuid,
        product_id: Uuid,
        delta: i32,
    ) -> Result<InventoryRecordModel, ServiceError> {
        let lock = self.locks.lock_for(tenant_id, warehouse_id, product_id);
        let _guard = lock.lock().await;

        let record = find_or_create(&*self.db, tenant_id, warehouse_id, product_id).await?;
        let previous = record.quantity;
        let new_quantity =
            (i64::from(previous) + i64::from(delta)).clamp(0, i64::from(i32::MAX)) as i32;
        let updated = persist_quantity(&*self.db, record, new_quantity).await?;

        self.invalidate_cache(tenant_id, warehouse_id, product_id).await;
        self.emit(Event::InventoryAdjusted {
            tenant_id,
            warehouse_id,
            product_id,
            previous_quantity: previous,
            new_quantity,
        })
        .await;
        info!(previous, new_quantity, delta, "stock adjusted");
        Ok(updated)
    }

    /// Exact deduction: fails with `InsufficientStock` instead of
    /// clamping, and mutates nothing on failure. Order processing
    /// commits stock through this path.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn deduct_stock(
        &self,
        tenant_id: Uuid,
        warehouse_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<InventoryRecordModel, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationFailed(
                "deduction quantity must be positive".to_string(),
            ));
        }
        let lock = self.locks.lock_for(tenant_id, warehouse_id, product_id);
        let _guard = lock.lock().await;

        let record = InventoryRecord::find()
            .filter(inventory_record::Column::TenantId.eq(tenant_id))
            .filter(inventory_record::Column::WarehouseId.eq(warehouse_id))
            .filter(inventory_record::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let available = record.as_ref().map_or(0, |r| r.quantity);
        if available < quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "requested {} but only {} on hand for product {} in warehouse {}",
                quantity, available, product_id, warehouse_id
            )));
        }
        // `available >= quantity > 0` implies the record exists.
        let record = record.ok_or_else(|| {
            ServiceError::Internal("stock record vanished under key lock".to_string())
        })?;

        let previous = record.quantity;
        let updated = persist_quantity(&*self.db, record, previous - quantity).await?;

        self.invalidate_cache(tenant_id, warehouse_id, product_id).await;
        self.emit(Event::InventoryAdjusted {
            tenant_id,
            warehouse_id,
            product_id,
            previous_quantity: previous,
            new_quantity: updated.quantity,
        })
        .await;
        Ok(updated)
    }

    /// Overflow-checked credit, creating the record if absent. Used by
    /// order cancellation and purchase receipt.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn restore_stock(
        &self,
        tenant_id: Uuid,
        warehouse_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<InventoryRecordModel, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationFailed(
                "restore quantity must be positive".to_string(),
            ));
        }
        let lock = self.locks.lock_for(tenant_id, warehouse_id, product_id);
        let _guard = lock.lock().await;

        let record = find_or_create(&*self.db, tenant_id, warehouse_id, product_id).await?;
        let previous = record.quantity;
        let new_quantity = previous.checked_add(quantity).ok_or_else(|| {
            ServiceError::Overflow(format!(
                "restoring {} to {} would exceed quantity bounds",
                quantity, previous
            ))
        })?;
        let updated = persist_quantity(&*self.db, record, new_quantity).await?;

        self.invalidate_cache(tenant_id, warehouse_id, product_id).await;
        self.emit(Event::InventoryAdjusted {
            tenant_id,
            warehouse_id,
            product_id,
            previous_quantity: previous,
            new_quantity,
        })
        .await;
        Ok(updated)
    }

    /// Moves stock between two warehouses. Fails with
    /// `InsufficientStock` and no mutation when the source cannot cover
    /// the quantity; otherwise both writes happen in one transaction.
    #[instrument(skip(self, request), fields(tenant_id = %request.tenant_id))]
    pub async fn transfer(
        &self,
        request: TransferStockRequest,
    ) -> Result<(InventoryRecordModel, InventoryRecordModel), ServiceError> {
        if request.quantity <= 0 {
            return Err(ServiceError::ValidationFailed(
                "transfer quantity must be positive".to_string(),
            ));
        }
        if request.from_warehouse_id == request.to_warehouse_id {
            return Err(ServiceError::ValidationFailed(
                "source and destination warehouse must differ".to_string(),
            ));
        }

        // Both key locks, in canonical order so crossing transfers
        // cannot deadlock.
        let (first, second) = if request.from_warehouse_id <= request.to_warehouse_id {
            (request.from_warehouse_id, request.to_warehouse_id)
        } else {
            (request.to_warehouse_id, request.from_warehouse_id)
        };
        let lock_a = self.locks.lock_for(request.tenant_id, first, request.product_id);
        let lock_b = self.locks.lock_for(request.tenant_id, second, request.product_id);
        let _guard_a = lock_a.lock().await;
        let _guard_b = lock_b.lock().await;

        let req = request.clone();
        let (source, destination) = self
            .db
            .transaction::<_, (InventoryRecordModel, InventoryRecordModel), ServiceError>(
                move |txn| {
                    Box::pin(async move {
                        let source = InventoryRecord::find()
                            .filter(inventory_record::Column::TenantId.eq(req.tenant_id))
                            .filter(
                                inventory_record::Column::WarehouseId.eq(req.from_warehouse_id),
                            )
                            .filter(inventory_record::Column::ProductId.eq(req.product_id))
                            .one(txn)
                            .await
                            .map_err(ServiceError::db_error)?;

                        let available = source.as_ref().map_or(0, |r| r.quantity);
                        if available < req.quantity {
                            return Err(ServiceError::InsufficientStock(format!(
                                "requested {} but only {} on hand for product {} in warehouse {}",
                                req.quantity, available, req.product_id, req.from_warehouse_id
                            )));
                        }
                        let source = source.ok_or_else(|| {
                            ServiceError::Internal(
                                "stock record vanished under key lock".to_string(),
                            )
                        })?;

                        let new_source_qty = source.quantity - req.quantity;
                        let source = persist_quantity(txn, source, new_source_qty).await?;

                        let destination = find_or_create(
                            txn,
                            req.tenant_id,
                            req.to_warehouse_id,
                            req.product_id,
                        )
                        .await?;
                        let new_dest_qty =
                            destination.quantity.checked_add(req.quantity).ok_or_else(|| {
                                ServiceError::Overflow(format!(
                                    "transferring {} into warehouse {} would exceed quantity bounds",
                                    req.quantity, req.to_warehouse_id
                                ))
                            })?;
                        let destination = persist_quantity(txn, destination, new_dest_qty).await?;

                        Ok((source, destination))
                    })
                },
            )
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        self.invalidate_cache(request.tenant_id, request.from_warehouse_id, request.product_id)
            .await;
        self.invalidate_cache(request.tenant_id, request.to_warehouse_id, request.product_id)
            .await;
        self.emit(Event::StockTransferred {
            tenant_id: request.tenant_id,
            product_id: request.product_id,
            from_warehouse_id: request.from_warehouse_id,
            to_warehouse_id: request.to_warehouse_id,
            quantity: request.quantity,
        })
        .await;
        info!(
            quantity = request.quantity,
            from = %request.from_warehouse_id,
            to = %request.to_warehouse_id,
            "stock transferred"
        );
        Ok((source, destination))
    }

    /// Records at or below the given threshold, lowest quantity first.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn low_stock_alerts(
        &self,
        tenant_id: Uuid,
        threshold: i32,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Vec<InventoryRecordModel>, ServiceError> {
        InventoryRecord::find()
            .filter(inventory_record::Column::TenantId.eq(tenant_id))
            .filter(inventory_record::Column::Quantity.lte(threshold))
            .order_by_asc(inventory_record::Column::Quantity)
            .offset(offset.unwrap_or(0))
            .limit(limit.unwrap_or(DEFAULT_PAGE_SIZE))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Filtered, sorted, paginated search across the tenant's ledger.
    /// Returns the matching page and the total match count.
    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id))]
    pub async fn advanced_search(
        &self,
        tenant_id: Uuid,
        filter: InventorySearchFilter,
    ) -> Result<(Vec<InventoryRecordModel>, u64), ServiceError> {
        let sort_field = match filter.sort_by.as_deref() {
            None => InventorySortField::UpdatedAt,
            Some(raw) => InventorySortField::from_str(raw).map_err(|_| {
                ServiceError::ValidationFailed(format!("unsupported sort field '{}'", raw))
            })?,
        };
        let sort_order = parse_sort_order(filter.sort_order.as_deref())?;

        // Ad-hoc joins: the catalog rows are optional, ledger records
        // exist for keys the catalog may not know.
        let mut query = InventoryRecord::find()
            .filter(inventory_record::Column::TenantId.eq(tenant_id))
            .join(
                JoinType::LeftJoin,
                InventoryRecord::belongs_to(product::Entity)
                    .from(inventory_record::Column::ProductId)
                    .to(product::Column::Id)
                    .into(),
            )
            .join(
                JoinType::LeftJoin,
                InventoryRecord::belongs_to(warehouse::Entity)
                    .from(inventory_record::Column::WarehouseId)
                    .to(warehouse::Column::Id)
                    .into(),
            );

        if let Some(text) = filter.query.as_deref().filter(|q| !q.is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(product::Column::Name.contains(text))
                    .add(warehouse::Column::Name.contains(text)),
            );
        }
        if let Some(warehouse_id) = filter.warehouse_id {
            query = query.filter(inventory_record::Column::WarehouseId.eq(warehouse_id));
        }
        if let Some(product_id) = filter.product_id {
            query = query.filter(inventory_record::Column::ProductId.eq(product_id));
        }
        if let Some(min) = filter.min_quantity {
            query = query.filter(inventory_record::Column::Quantity.gte(min));
        }
        if let Some(max) = filter.max_quantity {
            query = query.filter(inventory_record::Column::Quantity.lte(max));
        }
        if let Some(threshold) = filter.stock_threshold {
            query = query.filter(inventory_record::Column::Quantity.lte(threshold));
        }
        if let Some(after) = filter.updated_after {
            query = query.filter(inventory_record::Column::UpdatedAt.gte(after));
        }
        if let Some(before) = filter.updated_before {
            query = query.filter(inventory_record::Column::UpdatedAt.lte(before));
        }

        query = match sort_field {
            InventorySortField::Quantity => {
                query.order_by(inventory_record::Column::Quantity, sort_order)
            }
            InventorySortField::UpdatedAt => {
                query.order_by(inventory_record::Column::UpdatedAt, sort_order)
            }
            InventorySortField::ProductName => query.order_by(product::Column::Name, sort_order),
            InventorySortField::WarehouseName => {
                query.order_by(warehouse::Column::Name, sort_order)
            }
        };

        let total = query
            .clone()
            .count(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        let records = query
            .offset(filter.offset.unwrap_or(0))
            .limit(filter.limit.unwrap_or(DEFAULT_PAGE_SIZE))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok((records, total))
    }

    /// Locks a set of ledger keys for a multi-key mutation. Guards must
    /// be held until the mutation commits.
    pub(crate) async fn lock_keys(
        &self,
        keys: Vec<(Uuid, Uuid, Uuid)>,
    ) -> Vec<OwnedMutexGuard<()>> {
        self.locks.lock_all(keys).await
    }

    /// Writes absolute quantities for a set of keys in one transaction,
    /// creating absent records at the target value. Either every key is
    /// written or none is. Callers must hold every key lock and have
    /// validated the targets against current quantities.
    pub(crate) async fn commit_quantities(
        &self,
        tenant_id: Uuid,
        targets: Vec<(Uuid, Uuid, i32)>,
    ) -> Result<(), ServiceError> {
        let applied = self
            .db
            .transaction::<_, Vec<(Uuid, Uuid, i32, i32)>, ServiceError>(move |txn| {
                Box::pin(async move {
                    let mut applied = Vec::with_capacity(targets.len());
                    for (warehouse_id, product_id, quantity) in targets {
                        let record =
                            find_or_create(txn, tenant_id, warehouse_id, product_id).await?;
                        let previous = record.quantity;
                        persist_quantity(txn, record, quantity).await?;
                        applied.push((warehouse_id, product_id, previous, quantity));
                    }
                    Ok(applied)
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        for (warehouse_id, product_id, previous, new_quantity) in applied {
            self.invalidate_cache(tenant_id, warehouse_id, product_id).await;
            self.emit(Event::InventoryAdjusted {
                tenant_id,
                warehouse_id,
                product_id,
                previous_quantity: previous,
                new_quantity,
            })
            .await;
        }
        Ok(())
    }

    async fn invalidate_cache(&self, tenant_id: Uuid, warehouse_id: Uuid, product_id: Uuid) {
        let key = inventory_key(tenant_id, warehouse_id, product_id);
        if let Err(e) = self.cache.delete(&key).await {
            warn!(key = %key, error = %e, "cache invalidation failed");
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "failed to send inventory event");
            }
        }
    }
}

/// Looks up the record for a key, creating it at quantity 0 when absent.
/// Callers must hold the key lock.
async fn find_or_create<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    warehouse_id: Uuid,
    product_id: Uuid,
) -> Result<InventoryRecordModel, ServiceError> {
    let existing = InventoryRecord::find()
        .filter(inventory_record::Column::TenantId.eq(tenant_id))
        .filter(inventory_record::Column::WarehouseId.eq(warehouse_id))
        .filter(inventory_record::Column::ProductId.eq(product_id))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?;
    if let Some(model) = existing {
        return Ok(model);
    }

    let now = Utc::now();
    inventory_record::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: Set(tenant_id),
        warehouse_id: Set(warehouse_id),
        product_id: Set(product_id),
        quantity: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await
    .map_err(ServiceError::db_error)
}

async fn persist_quantity<C: ConnectionTrait>(
    conn: &C,
    record: InventoryRecordModel,
    quantity: i32,
) -> Result<InventoryRecordModel, ServiceError> {
    let mut active: inventory_record::ActiveModel = record.into();
    active.quantity = Set(quantity);
    active.updated_at = Set(Utc::now());
    active.update(conn).await.map_err(ServiceError::db_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_field_allow_list() {
        assert_eq!(
            InventorySortField::from_str("quantity").unwrap(),
            InventorySortField::Quantity
        );
        assert_eq!(
            InventorySortField::from_str("product_name").unwrap(),
            InventorySortField::ProductName
        );
        assert!(InventorySortField::from_str("quantity; DROP TABLE orders").is_err());
        assert!(InventorySortField::from_str("id").is_err());
    }

    #[test]
    fn sort_order_parsing() {
        assert!(matches!(parse_sort_order(None), Ok(Order::Desc)));
        assert!(matches!(parse_sort_order(Some("asc")), Ok(Order::Asc)));
        assert!(parse_sort_order(Some("sideways")).is_err());
    }

    #[tokio::test]
    async fn key_lock_registry_returns_same_lock_per_key() {
        let registry = KeyLockRegistry::default();
        let (t, w, p) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let a = registry.lock_for(t, w, p);
        let b = registry.lock_for(t, w, p);
        assert!(Arc::ptr_eq(&a, &b));
        let other = registry.lock_for(t, Uuid::new_v4(), p);
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[tokio::test]
    async fn lock_all_dedups_keys_and_does_not_self_deadlock() {
        let registry = KeyLockRegistry::default();
        let (t, w, p) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let w2 = Uuid::new_v4();
        let guards = registry
            .lock_all(vec![(t, w, p), (t, w2, p), (t, w, p)])
            .await;
        assert_eq!(guards.len(), 2);
    }
}
