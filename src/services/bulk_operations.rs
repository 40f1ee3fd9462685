use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    services::inventory::{InventoryService, TransferStockRequest},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use strum::{Display, EnumString};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// How per-item precondition failures are handled.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// A failing item is recorded as failed and skipped.
    Strict,
    /// The effect is normalized instead: deductions and transfers are
    /// clamped to the available quantity, landing at zero.
    SkipInvalid,
}

/// Whether effects apply all-or-nothing or independently.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionMode {
    /// A validation pass runs first against projected quantities, with
    /// every touched key locked; if any item fails it, nothing is
    /// applied, otherwise the whole batch commits in one database
    /// transaction.
    Atomic,
    /// Items apply independently in input order; prior successes are
    /// never rolled back.
    BestEffort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BulkOperationStatus {
    Processing,
    Completed,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BulkItemStatus {
    Success,
    Failed,
    /// Valid item left unapplied because an atomic batch aborted.
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkItemOutcome {
    pub item_index: usize,
    pub item_id: String,
    pub status: BulkItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkItemError {
    pub item_index: usize,
    pub item_id: String,
    pub error: String,
}

/// Ephemeral aggregate result of one bulk call. Never persisted; the
/// operation id exists only for caller correlation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkOperationResult {
    pub operation_id: Uuid,
    pub status: BulkOperationStatus,
    pub total_items: u32,
    pub processed_items: u32,
    pub failed_items: u32,
    pub progress: f32,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
    pub errors: Vec<BulkItemError>,
    pub items: Vec<BulkItemOutcome>,
}

impl BulkOperationResult {
    fn new(total_items: usize) -> Self {
        Self {
            operation_id: Uuid::new_v4(),
            status: BulkOperationStatus::Processing,
            total_items: total_items as u32,
            processed_items: 0,
            failed_items: 0,
            progress: 0.0,
            start_time: Utc::now(),
            completion_time: None,
            errors: Vec::new(),
            items: Vec::with_capacity(total_items),
        }
    }

    fn update_progress(&mut self, item_index: usize) {
        self.progress = ((item_index + 1) as f32 / self.total_items as f32) * 100.0;
    }

    fn record_success(&mut self, item_index: usize, item_id: String) {
        self.processed_items += 1;
        self.items.push(BulkItemOutcome {
            item_index,
            item_id,
            status: BulkItemStatus::Success,
            error: None,
        });
        self.update_progress(item_index);
    }

    fn record_failure(&mut self, item_index: usize, item_id: String, error: String) {
        self.failed_items += 1;
        self.errors.push(BulkItemError {
            item_index,
            item_id: item_id.clone(),
            error: error.clone(),
        });
        self.items.push(BulkItemOutcome {
            item_index,
            item_id,
            status: BulkItemStatus::Failed,
            error: Some(error),
        });
        self.update_progress(item_index);
    }

    fn record_skipped(&mut self, item_index: usize, item_id: String) {
        self.items.push(BulkItemOutcome {
            item_index,
            item_id,
            status: BulkItemStatus::Skipped,
            error: None,
        });
        self.update_progress(item_index);
    }

    fn finalize(&mut self) {
        self.completion_time = Some(Utc::now());
        self.status = if self.failed_items == 0 {
            BulkOperationStatus::Completed
        } else if self.processed_items > 0 {
            BulkOperationStatus::Partial
        } else {
            BulkOperationStatus::Failed
        };
    }

    fn abort(&mut self) {
        self.completion_time = Some(Utc::now());
        self.status = BulkOperationStatus::Failed;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockAdjustmentItem {
    pub warehouse_id: Uuid,
    pub product_id: Uuid,
    pub delta: i32,
}

impl StockAdjustmentItem {
    fn item_id(&self) -> String {
        format!("{}:{}", self.warehouse_id, self.product_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockTransferItem {
    pub product_id: Uuid,
    pub from_warehouse_id: Uuid,
    pub to_warehouse_id: Uuid,
    pub quantity: i32,
}

impl StockTransferItem {
    fn item_id(&self) -> String {
        format!(
            "{}->{}:{}",
            self.from_warehouse_id, self.to_warehouse_id, self.product_id
        )
    }
}

/// Generic multi-item processing harness over the inventory ledger.
///
/// Items are applied strictly sequentially in input order; item N+1
/// never starts before item N's outcome is recorded.
#[derive(Clone)]
pub struct BulkOperationsService {
    inventory: Arc<InventoryService>,
    event_sender: Option<Arc<EventSender>>,
}

impl BulkOperationsService {
    pub fn new(inventory: Arc<InventoryService>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            inventory,
            event_sender,
        }
    }

    /// Applies a list of stock adjustments under the given policies.
    #[instrument(skip(self, items), fields(tenant_id = %tenant_id, item_count = items.len()))]
    pub async fn bulk_adjust_stock(
        &self,
        tenant_id: Uuid,
        items: Vec<StockAdjustmentItem>,
        validation_mode: ValidationMode,
        transaction_mode: TransactionMode,
    ) -> Result<BulkOperationResult, ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::ValidationFailed(
                "bulk adjustment requires at least one item".to_string(),
            ));
        }

        let mut result = BulkOperationResult::new(items.len());

        if transaction_mode == TransactionMode::Atomic {
            return self
                .adjust_atomically(tenant_id, items, validation_mode, result)
                .await;
        }

        for (index, item) in items.iter().enumerate() {
            match self.apply_adjustment(tenant_id, item, validation_mode).await {
                Ok(()) => result.record_success(index, item.item_id()),
                Err(e) => {
                    warn!(item_index = index, error = %e, "bulk adjustment item failed");
                    result.record_failure(index, item.item_id(), e.to_string());
                }
            }
        }

        result.finalize();
        self.emit_completion(&result).await;
        info!(
            operation_id = %result.operation_id,
            status = %result.status,
            processed = result.processed_items,
            failed = result.failed_items,
            "bulk adjustment finished"
        );
        Ok(result)
    }

    /// Applies a list of warehouse-to-warehouse transfers under the
    /// given policies.
    #[instrument(skip(self, items), fields(tenant_id = %tenant_id, item_count = items.len()))]
    pub async fn bulk_transfer_stock(
        &self,
        tenant_id: Uuid,
        items: Vec<StockTransferItem>,
        validation_mode: ValidationMode,
        transaction_mode: TransactionMode,
    ) -> Result<BulkOperationResult, ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::ValidationFailed(
                "bulk transfer requires at least one item".to_string(),
            ));
        }

        let mut result = BulkOperationResult::new(items.len());

        if transaction_mode == TransactionMode::Atomic {
            return self
                .transfer_atomically(tenant_id, items, validation_mode, result)
                .await;
        }

        for (index, item) in items.iter().enumerate() {
            match self.apply_transfer(tenant_id, item, validation_mode).await {
                Ok(()) => result.record_success(index, item.item_id()),
                Err(e) => {
                    warn!(item_index = index, error = %e, "bulk transfer item failed");
                    result.record_failure(index, item.item_id(), e.to_string());
                }
            }
        }

        result.finalize();
        self.emit_completion(&result).await;
        info!(
            operation_id = %result.operation_id,
            status = %result.status,
            processed = result.processed_items,
            failed = result.failed_items,
            "bulk transfer finished"
        );
        Ok(result)
    }

    /// Takes every touched key lock, validates the whole batch against
    /// projected quantities, and commits the projected targets in one
    /// database transaction. Nothing is applied unless every item
    /// validates, and a persistence failure rolls the whole batch back.
    async fn adjust_atomically(
        &self,
        tenant_id: Uuid,
        items: Vec<StockAdjustmentItem>,
        validation_mode: ValidationMode,
        mut result: BulkOperationResult,
    ) -> Result<BulkOperationResult, ServiceError> {
        let keys: Vec<(Uuid, Uuid, Uuid)> = items
            .iter()
            .map(|item| (tenant_id, item.warehouse_id, item.product_id))
            .collect();
        let _guards = self.inventory.lock_keys(keys).await;

        let (invalid, projected) = self
            .prevalidate_adjustments(tenant_id, &items, validation_mode)
            .await?;
        if !invalid.is_empty() {
            for (index, item) in items.iter().enumerate() {
                match invalid.get(&index) {
                    Some(error) => result.record_failure(index, item.item_id(), error.clone()),
                    None => result.record_skipped(index, item.item_id()),
                }
            }
            result.abort();
            self.emit_completion(&result).await;
            return Ok(result);
        }

        let targets = projected
            .into_iter()
            .map(|((warehouse_id, product_id), quantity)| {
                (warehouse_id, product_id, quantity.clamp(0, i64::from(i32::MAX)) as i32)
            })
            .collect();
        self.inventory.commit_quantities(tenant_id, targets).await?;

        for (index, item) in items.iter().enumerate() {
            result.record_success(index, item.item_id());
        }
        result.finalize();
        self.emit_completion(&result).await;
        info!(
            operation_id = %result.operation_id,
            processed = result.processed_items,
            "atomic bulk adjustment committed"
        );
        Ok(result)
    }

    /// Atomic counterpart for transfers; both sides of every transfer
    /// are locked for the duration.
    async fn transfer_atomically(
        &self,
        tenant_id: Uuid,
        items: Vec<StockTransferItem>,
        validation_mode: ValidationMode,
        mut result: BulkOperationResult,
    ) -> Result<BulkOperationResult, ServiceError> {
        let mut keys = Vec::with_capacity(items.len() * 2);
        for item in &items {
            keys.push((tenant_id, item.from_warehouse_id, item.product_id));
            keys.push((tenant_id, item.to_warehouse_id, item.product_id));
        }
        let _guards = self.inventory.lock_keys(keys).await;

        let (invalid, projected) = self
            .prevalidate_transfers(tenant_id, &items, validation_mode)
            .await?;
        if !invalid.is_empty() {
            for (index, item) in items.iter().enumerate() {
                match invalid.get(&index) {
                    Some(error) => result.record_failure(index, item.item_id(), error.clone()),
                    None => result.record_skipped(index, item.item_id()),
                }
            }
            result.abort();
            self.emit_completion(&result).await;
            return Ok(result);
        }

        let targets = projected
            .into_iter()
            .map(|((warehouse_id, product_id), quantity)| {
                (warehouse_id, product_id, quantity.clamp(0, i64::from(i32::MAX)) as i32)
            })
            .collect();
        self.inventory.commit_quantities(tenant_id, targets).await?;

        for (index, item) in items.iter().enumerate() {
            result.record_success(index, item.item_id());
        }
        result.finalize();
        self.emit_completion(&result).await;
        info!(
            operation_id = %result.operation_id,
            processed = result.processed_items,
            "atomic bulk transfer committed"
        );
        Ok(result)
    }

    async fn apply_adjustment(
        &self,
        tenant_id: Uuid,
        item: &StockAdjustmentItem,
        validation_mode: ValidationMode,
    ) -> Result<(), ServiceError> {
        if item.delta < 0 && validation_mode == ValidationMode::Strict {
            // Exact deduction fails on shortfall instead of clamping.
            // Widened before negating: -i32::MIN does not fit an i32.
            let requested = -i64::from(item.delta);
            let quantity = i32::try_from(requested).map_err(|_| {
                ServiceError::InsufficientStock(format!(
                    "requested {} but at most {} can be on hand for product {} in warehouse {}",
                    requested, i32::MAX, item.product_id, item.warehouse_id
                ))
            })?;
            self.inventory
                .deduct_stock(tenant_id, item.warehouse_id, item.product_id, quantity)
                .await?;
        } else {
            self.inventory
                .adjust_stock(tenant_id, item.warehouse_id, item.product_id, item.delta)
                .await?;
        }
        Ok(())
    }

    async fn apply_transfer(
        &self,
        tenant_id: Uuid,
        item: &StockTransferItem,
        validation_mode: ValidationMode,
    ) -> Result<(), ServiceError> {
        match validation_mode {
            ValidationMode::Strict => {
                self.inventory
                    .transfer(TransferStockRequest {
                        tenant_id,
                        product_id: item.product_id,
                        from_warehouse_id: item.from_warehouse_id,
                        to_warehouse_id: item.to_warehouse_id,
                        quantity: item.quantity,
                    })
                    .await?;
            }
            ValidationMode::SkipInvalid => {
                if item.from_warehouse_id == item.to_warehouse_id {
                    return Err(ServiceError::ValidationFailed(
                        "source and destination warehouse must differ".to_string(),
                    ));
                }
                let available = self
                    .current_quantity(tenant_id, item.from_warehouse_id, item.product_id)
                    .await?;
                let effective = item.quantity.min(available).max(0);
                // A fully clamped transfer is a no-op that still counts
                // as processed.
                if effective > 0 {
                    self.inventory
                        .transfer(TransferStockRequest {
                            tenant_id,
                            product_id: item.product_id,
                            from_warehouse_id: item.from_warehouse_id,
                            to_warehouse_id: item.to_warehouse_id,
                            quantity: effective,
                        })
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Simulates every adjustment against projected quantities without
    /// writing. Returns per-index error messages for items that would
    /// fail under the validation mode, and the projected final quantity
    /// per key for the commit phase.
    async fn prevalidate_adjustments(
        &self,
        tenant_id: Uuid,
        items: &[StockAdjustmentItem],
        validation_mode: ValidationMode,
    ) -> Result<(HashMap<usize, String>, HashMap<(Uuid, Uuid), i64>), ServiceError> {
        let mut projected: HashMap<(Uuid, Uuid), i64> = HashMap::new();
        let mut invalid = HashMap::new();

        for (index, item) in items.iter().enumerate() {
            let key = (item.warehouse_id, item.product_id);
            let current = match projected.get(&key) {
                Some(q) => *q,
                None => {
                    let q = self
                        .current_quantity(tenant_id, item.warehouse_id, item.product_id)
                        .await?;
                    i64::from(q)
                }
            };
            let target = current + i64::from(item.delta);
            if target < 0 && validation_mode == ValidationMode::Strict {
                invalid.insert(
                    index,
                    format!(
                        "insufficient stock: requested {} but only {} on hand for product {} in warehouse {}",
                        -i64::from(item.delta), current, item.product_id, item.warehouse_id
                    ),
                );
                // Failed items do not consume projected stock.
                projected.insert(key, current);
            } else {
                projected.insert(key, target.clamp(0, i64::from(i32::MAX)));
            }
        }
        Ok((invalid, projected))
    }

    /// Same simulation for transfers.
    async fn prevalidate_transfers(
        &self,
        tenant_id: Uuid,
        items: &[StockTransferItem],
        validation_mode: ValidationMode,
    ) -> Result<(HashMap<usize, String>, HashMap<(Uuid, Uuid), i64>), ServiceError> {
        let mut projected: HashMap<(Uuid, Uuid), i64> = HashMap::new();
        let mut invalid = HashMap::new();

        for (index, item) in items.iter().enumerate() {
            if item.from_warehouse_id == item.to_warehouse_id {
                invalid.insert(
                    index,
                    "validation failed: source and destination warehouse must differ".to_string(),
                );
                continue;
            }
            if item.quantity <= 0 && validation_mode == ValidationMode::Strict {
                invalid.insert(
                    index,
                    "validation failed: transfer quantity must be positive".to_string(),
                );
                continue;
            }

            let source_key = (item.from_warehouse_id, item.product_id);
            let available = match projected.get(&source_key) {
                Some(q) => *q,
                None => {
                    let q = self
                        .current_quantity(tenant_id, item.from_warehouse_id, item.product_id)
                        .await?;
                    i64::from(q)
                }
            };

            let requested = i64::from(item.quantity.max(0));
            let effective = match validation_mode {
                ValidationMode::Strict => {
                    if requested > available {
                        invalid.insert(
                            index,
                            format!(
                                "insufficient stock: requested {} but only {} on hand for product {} in warehouse {}",
                                requested, available, item.product_id, item.from_warehouse_id
                            ),
                        );
                        projected.insert(source_key, available);
                        continue;
                    }
                    requested
                }
                ValidationMode::SkipInvalid => requested.min(available),
            };

            let dest_key = (item.to_warehouse_id, item.product_id);
            let dest = match projected.get(&dest_key) {
                Some(q) => *q,
                None => {
                    let q = self
                        .current_quantity(tenant_id, item.to_warehouse_id, item.product_id)
                        .await?;
                    i64::from(q)
                }
            };
            if dest + effective > i64::from(i32::MAX) {
                invalid.insert(
                    index,
                    format!(
                        "arithmetic overflow: transferring {} into warehouse {} would exceed quantity bounds",
                        effective, item.to_warehouse_id
                    ),
                );
                projected.insert(source_key, available);
                continue;
            }
            projected.insert(source_key, available - effective);
            projected.insert(dest_key, dest + effective);
        }
        Ok((invalid, projected))
    }

    /// Current on-hand quantity for a key, with absent records reading
    /// as zero. Persistence failures still propagate.
    async fn current_quantity(
        &self,
        tenant_id: Uuid,
        warehouse_id: Uuid,
        product_id: Uuid,
    ) -> Result<i32, ServiceError> {
        match self
            .inventory
            .get_by_warehouse_and_product(tenant_id, warehouse_id, product_id)
            .await
        {
            Ok(record) => Ok(record.quantity),
            Err(ServiceError::NotFound(_)) => Ok(0),
            Err(e) => Err(e),
        }
    }

    async fn emit_completion(&self, result: &BulkOperationResult) {
        if let Some(sender) = &self.event_sender {
            let event = Event::BulkOperationCompleted {
                operation_id: result.operation_id,
                status: result.status.to_string(),
                processed_items: result.processed_items,
                failed_items: result.failed_items,
                completed_at: result.completion_time.unwrap_or_else(Utc::now),
            };
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "failed to send bulk operation event");
            }
        }
    }
}
