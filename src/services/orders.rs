use crate::{
    db::DbPool,
    entities::order::{
        self, Entity as OrderEntity, Model as OrderModel, OrderStatus, OrderType,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::inventory::{InventoryService, DEFAULT_PAGE_SIZE},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, Order, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use strum::EnumString;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub tenant_id: Uuid,
    pub order_type: OrderType,
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    pub unit_price: Decimal,
    pub order_date: Option<DateTime<Utc>>,
    pub expected_delivery: Option<DateTime<Utc>>,
    pub supplier_id: Option<Uuid>,
    pub distributor_id: Option<Uuid>,
    pub notes: Option<String>,
}

/// Edits to an order's commercial fields; only pending orders accept
/// them. Status changes go through the named transitions exclusively.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateOrderRequest {
    pub quantity: Option<i32>,
    pub unit_price: Option<Decimal>,
    pub expected_delivery: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderSearchFilter {
    /// Free-text match against order notes.
    pub query: Option<String>,
    pub status: Option<String>,
    pub order_type: Option<String>,
    pub product_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,
    pub distributor_id: Option<Uuid>,
    pub order_date_from: Option<DateTime<Utc>>,
    pub order_date_to: Option<DateTime<Utc>>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case")]
enum OrderSortField {
    OrderDate,
    Quantity,
    UnitPrice,
    Status,
}

/// Aggregates over a tenant's orders within a date range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAnalytics {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub total_orders: u64,
    pub status_counts: HashMap<String, u64>,
    pub type_counts: HashMap<String, u64>,
    pub total_value: Decimal,
    pub average_order_value: Decimal,
}

/// Order lifecycle service. Stock is committed exactly once per order,
/// at `process_order`; there is no separate reservation counter, so an
/// approved order is not protected from competing stock consumers
/// between approval and processing.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    inventory: Arc<InventoryService>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(
        db: Arc<DbPool>,
        inventory: Arc<InventoryService>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db,
            inventory,
            event_sender,
        }
    }

    /// Creates an order in status `pending`. Validates party
    /// consistency and pre-checks stock availability; the pre-check is
    /// advisory only, nothing is reserved until processing.
    #[instrument(skip(self, request), fields(tenant_id = %request.tenant_id))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<OrderModel, ServiceError> {
        request.validate()?;
        if request.product_id.is_nil() || request.warehouse_id.is_nil() {
            return Err(ServiceError::ValidationFailed(
                "product id and warehouse id are required".to_string(),
            ));
        }
        if request.unit_price <= Decimal::ZERO {
            return Err(ServiceError::ValidationFailed(
                "unit price must be positive".to_string(),
            ));
        }
        validate_party_consistency(
            request.order_type,
            request.supplier_id,
            request.distributor_id,
        )?;

        let on_hand = self
            .current_quantity(request.tenant_id, request.warehouse_id, request.product_id)
            .await?;
        if on_hand < request.quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "order requests {} but only {} on hand for product {} in warehouse {}",
                request.quantity, on_hand, request.product_id, request.warehouse_id
            )));
        }

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let model = order::ActiveModel {
            id: Set(order_id),
            tenant_id: Set(request.tenant_id),
            order_type: Set(request.order_type.to_string()),
            product_id: Set(request.product_id),
            warehouse_id: Set(request.warehouse_id),
            quantity: Set(request.quantity),
            unit_price: Set(request.unit_price),
            status: Set(OrderStatus::Pending.to_string()),
            order_date: Set(request.order_date.unwrap_or(now)),
            expected_delivery: Set(request.expected_delivery),
            supplier_id: Set(request.supplier_id),
            distributor_id: Set(request.distributor_id),
            notes: Set(request.notes),
            created_at: Set(now),
            updated_at: Set(Some(now)),
            version: Set(1),
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::db_error)?;

        info!(order_id = %order_id, order_type = %model.order_type, "order created");
        self.emit(Event::OrderCreated(order_id)).await;
        Ok(model)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, order_id = %order_id))]
    pub async fn get_order(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderModel, ServiceError> {
        self.load_order(tenant_id, order_id).await
    }

    /// Lists a tenant's orders, newest first.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn list_orders(
        &self,
        tenant_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderModel>, u64), ServiceError> {
        let paginator = OrderEntity::find()
            .filter(order::Column::TenantId.eq(tenant_id))
            .order_by_desc(order::Column::OrderDate)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let orders = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((orders, total))
    }

    /// Edits commercial fields of a pending order.
    #[instrument(skip(self, request), fields(tenant_id = %tenant_id, order_id = %order_id))]
    pub async fn update_order(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
        request: UpdateOrderRequest,
    ) -> Result<OrderModel, ServiceError> {
        let order = self.load_order(tenant_id, order_id).await?;
        let status = self.parse_status(&order)?;
        if status != OrderStatus::Pending {
            return Err(ServiceError::InvalidStatusTransition(format!(
                "cannot edit order in status '{}'",
                status
            )));
        }
        if let Some(quantity) = request.quantity {
            if quantity < 1 {
                return Err(ServiceError::ValidationFailed(
                    "quantity must be at least 1".to_string(),
                ));
            }
        }
        if let Some(price) = request.unit_price {
            if price <= Decimal::ZERO {
                return Err(ServiceError::ValidationFailed(
                    "unit price must be positive".to_string(),
                ));
            }
        }

        let next_version = order.version + 1;
        let mut active: order::ActiveModel = order.into();
        if let Some(quantity) = request.quantity {
            active.quantity = Set(quantity);
        }
        if let Some(price) = request.unit_price {
            active.unit_price = Set(price);
        }
        if let Some(expected) = request.expected_delivery {
            active.expected_delivery = Set(Some(expected));
        }
        if let Some(notes) = request.notes {
            active.notes = Set(Some(notes));
        }
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(next_version);

        let updated = active
            .update(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        self.emit(Event::OrderUpdated(order_id)).await;
        Ok(updated)
    }

    /// Deletes an order that never committed stock (pending) or whose
    /// stock effect was already unwound (cancelled).
    #[instrument(skip(self), fields(tenant_id = %tenant_id, order_id = %order_id))]
    pub async fn delete_order(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> Result<(), ServiceError> {
        let order = self.load_order(tenant_id, order_id).await?;
        let status = self.parse_status(&order)?;
        if !matches!(status, OrderStatus::Pending | OrderStatus::Cancelled) {
            return Err(ServiceError::ValidationFailed(format!(
                "cannot delete order in status '{}'",
                status
            )));
        }
        OrderEntity::delete_by_id(order.id)
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        info!(order_id = %order_id, "order deleted");
        self.emit(Event::OrderDeleted(order_id)).await;
        Ok(())
    }

    /// Filtered, sorted, paginated order search.
    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id))]
    pub async fn search_orders(
        &self,
        tenant_id: Uuid,
        filter: OrderSearchFilter,
    ) -> Result<(Vec<OrderModel>, u64), ServiceError> {
        let sort_field = match filter.sort_by.as_deref() {
            None => OrderSortField::OrderDate,
            Some(raw) => OrderSortField::from_str(raw).map_err(|_| {
                ServiceError::ValidationFailed(format!("unsupported sort field '{}'", raw))
            })?,
        };
        let sort_order = match filter.sort_order.as_deref() {
            None => Order::Desc,
            Some("asc") => Order::Asc,
            Some("desc") => Order::Desc,
            Some(other) => {
                return Err(ServiceError::ValidationFailed(format!(
                    "unknown sort order '{}', expected 'asc' or 'desc'",
                    other
                )))
            }
        };

        let mut query = OrderEntity::find().filter(order::Column::TenantId.eq(tenant_id));

        if let Some(raw) = filter.status.as_deref() {
            let status: OrderStatus = raw.parse().map_err(|_| {
                ServiceError::ValidationFailed(format!("unknown order status '{}'", raw))
            })?;
            query = query.filter(order::Column::Status.eq(status.to_string()));
        }
        if let Some(raw) = filter.order_type.as_deref() {
            let order_type: OrderType = raw.parse().map_err(|_| {
                ServiceError::ValidationFailed(format!("unknown order type '{}'", raw))
            })?;
            query = query.filter(order::Column::OrderType.eq(order_type.to_string()));
        }
        if let Some(product_id) = filter.product_id {
            query = query.filter(order::Column::ProductId.eq(product_id));
        }
        if let Some(warehouse_id) = filter.warehouse_id {
            query = query.filter(order::Column::WarehouseId.eq(warehouse_id));
        }
        if let Some(supplier_id) = filter.supplier_id {
            query = query.filter(order::Column::SupplierId.eq(supplier_id));
        }
        if let Some(distributor_id) = filter.distributor_id {
            query = query.filter(order::Column::DistributorId.eq(distributor_id));
        }
        if let Some(from) = filter.order_date_from {
            query = query.filter(order::Column::OrderDate.gte(from));
        }
        if let Some(to) = filter.order_date_to {
            query = query.filter(order::Column::OrderDate.lte(to));
        }
        if let Some(text) = filter.query.as_deref().filter(|q| !q.is_empty()) {
            query = query.filter(order::Column::Notes.contains(text));
        }

        query = match sort_field {
            OrderSortField::OrderDate => query.order_by(order::Column::OrderDate, sort_order),
            OrderSortField::Quantity => query.order_by(order::Column::Quantity, sort_order),
            OrderSortField::UnitPrice => query.order_by(order::Column::UnitPrice, sort_order),
            OrderSortField::Status => query.order_by(order::Column::Status, sort_order),
        };

        let total = query
            .clone()
            .count(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        let orders = query
            .offset(filter.offset.unwrap_or(0))
            .limit(filter.limit.unwrap_or(DEFAULT_PAGE_SIZE))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        Ok((orders, total))
    }

    /// pending → approved. No inventory effect.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, order_id = %order_id))]
    pub async fn approve_order(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderModel, ServiceError> {
        let order = self.load_order(tenant_id, order_id).await?;
        self.guard_status(&order, &[OrderStatus::Pending], "approve")?;
        self.persist_status(order, OrderStatus::Approved).await
    }

    /// approved → processing. The single point stock is committed: the
    /// order quantity is deducted exactly, so a duplicate call fails the
    /// status guard and can never deduct twice.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, order_id = %order_id))]
    pub async fn process_order(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderModel, ServiceError> {
        let order = self.load_order(tenant_id, order_id).await?;
        self.guard_status(&order, &[OrderStatus::Approved], "process")?;
        if order.quantity < 1 {
            return Err(ServiceError::ValidationFailed(
                "quantity must be at least 1".to_string(),
            ));
        }
        if order.unit_price <= Decimal::ZERO {
            return Err(ServiceError::ValidationFailed(
                "unit price must be positive".to_string(),
            ));
        }

        let (warehouse_id, product_id, quantity) =
            (order.warehouse_id, order.product_id, order.quantity);
        self.inventory
            .deduct_stock(tenant_id, warehouse_id, product_id, quantity)
            .await?;

        match self.persist_status(order, OrderStatus::Processing).await {
            Ok(updated) => Ok(updated),
            Err(e) => {
                // Unwind the deduction so the stock commitment tracks
                // the recorded status.
                warn!(order_id = %order_id, error = %e, "status update failed after deduction, restoring stock");
                if let Err(restore_err) = self
                    .inventory
                    .restore_stock(tenant_id, warehouse_id, product_id, quantity)
                    .await
                {
                    warn!(order_id = %order_id, error = %restore_err, "compensating restore failed");
                }
                Err(e)
            }
        }
    }

    /// processing → shipped, optionally recording the expected
    /// delivery date. No inventory effect.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, order_id = %order_id))]
    pub async fn ship_order(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
        expected_delivery: Option<DateTime<Utc>>,
    ) -> Result<OrderModel, ServiceError> {
        let mut order = self.load_order(tenant_id, order_id).await?;
        self.guard_status(&order, &[OrderStatus::Processing], "ship")?;
        if let Some(expected) = expected_delivery {
            order.expected_delivery = Some(expected);
        }
        self.persist_status(order, OrderStatus::Shipped).await
    }

    /// shipped → delivered. Stock was already deducted at processing.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, order_id = %order_id))]
    pub async fn deliver_order(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderModel, ServiceError> {
        let order = self.load_order(tenant_id, order_id).await?;
        self.guard_status(&order, &[OrderStatus::Shipped], "deliver")?;
        self.persist_status(order, OrderStatus::Delivered).await
    }

    /// processing → delivered, purchase orders only: the received goods
    /// are credited to the ledger.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, order_id = %order_id))]
    pub async fn receive_order(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderModel, ServiceError> {
        let order = self.load_order(tenant_id, order_id).await?;
        let order_type = self.parse_type(&order)?;
        if order_type != OrderType::Purchase {
            return Err(ServiceError::ValidationFailed(
                "only purchase orders can be received".to_string(),
            ));
        }
        self.guard_status(&order, &[OrderStatus::Processing], "receive")?;

        let (warehouse_id, product_id, quantity) =
            (order.warehouse_id, order.product_id, order.quantity);
        self.inventory
            .restore_stock(tenant_id, warehouse_id, product_id, quantity)
            .await?;

        match self.persist_status(order, OrderStatus::Delivered).await {
            Ok(updated) => Ok(updated),
            Err(e) => {
                warn!(order_id = %order_id, error = %e, "status update failed after receipt credit, deducting back");
                if let Err(deduct_err) = self
                    .inventory
                    .deduct_stock(tenant_id, warehouse_id, product_id, quantity)
                    .await
                {
                    warn!(order_id = %order_id, error = %deduct_err, "compensating deduction failed");
                }
                Err(e)
            }
        }
    }

    /// {pending, approved, processing} → cancelled. When the order had
    /// progressed past pending, the order quantity is credited back to
    /// the ledger (overflow-checked).
    #[instrument(skip(self), fields(tenant_id = %tenant_id, order_id = %order_id))]
    pub async fn cancel_order(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
        reason: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        let mut order = self.load_order(tenant_id, order_id).await?;
        let status = self.guard_status(
            &order,
            &[
                OrderStatus::Pending,
                OrderStatus::Approved,
                OrderStatus::Processing,
            ],
            "cancel",
        )?;

        if matches!(status, OrderStatus::Approved | OrderStatus::Processing) {
            self.inventory
                .restore_stock(tenant_id, order.warehouse_id, order.product_id, order.quantity)
                .await?;
        }
        if let Some(reason) = reason {
            order.notes = Some(reason);
        }

        let updated = self.persist_status(order, OrderStatus::Cancelled).await?;
        self.emit(Event::OrderCancelled(order_id)).await;
        Ok(updated)
    }

    /// Aggregates order counts and value over a date range.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn get_order_analytics(
        &self,
        tenant_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<OrderAnalytics, ServiceError> {
        if from > to {
            return Err(ServiceError::ValidationFailed(
                "date range start must not be after its end".to_string(),
            ));
        }
        let orders = OrderEntity::find()
            .filter(order::Column::TenantId.eq(tenant_id))
            .filter(order::Column::OrderDate.gte(from))
            .filter(order::Column::OrderDate.lte(to))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let mut status_counts: HashMap<String, u64> = HashMap::new();
        let mut type_counts: HashMap<String, u64> = HashMap::new();
        let mut total_value = Decimal::ZERO;
        for o in &orders {
            *status_counts.entry(o.status.clone()).or_insert(0) += 1;
            *type_counts.entry(o.order_type.clone()).or_insert(0) += 1;
            total_value += Decimal::from(o.quantity) * o.unit_price;
        }
        let total_orders = orders.len() as u64;
        let average_order_value = if total_orders > 0 {
            total_value / Decimal::from(total_orders)
        } else {
            Decimal::ZERO
        };

        Ok(OrderAnalytics {
            from,
            to,
            total_orders,
            status_counts,
            type_counts,
            total_value,
            average_order_value,
        })
    }

    async fn load_order(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderModel, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .filter(order::Column::TenantId.eq(tenant_id))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", order_id)))
    }

    fn parse_status(&self, order: &OrderModel) -> Result<OrderStatus, ServiceError> {
        order.status().map_err(ServiceError::Internal)
    }

    fn parse_type(&self, order: &OrderModel) -> Result<OrderType, ServiceError> {
        order.order_type().map_err(ServiceError::Internal)
    }

    /// Returns the current status when it is in `allowed`, otherwise an
    /// `InvalidStatusTransition`. Every transition runs through this,
    /// which is what makes a repeated transition a no-op failure.
    fn guard_status(
        &self,
        order: &OrderModel,
        allowed: &[OrderStatus],
        operation: &str,
    ) -> Result<OrderStatus, ServiceError> {
        let status = self.parse_status(order)?;
        if allowed.contains(&status) {
            Ok(status)
        } else {
            Err(ServiceError::InvalidStatusTransition(format!(
                "cannot {} order in status '{}'",
                operation, status
            )))
        }
    }

    async fn persist_status(
        &self,
        order: OrderModel,
        new_status: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        let order_id = order.id;
        let old_status = order.status.clone();
        let next_version = order.version + 1;
        let expected_delivery = order.expected_delivery;
        let notes = order.notes.clone();

        let mut active: order::ActiveModel = order.into();
        active.status = Set(new_status.to_string());
        active.expected_delivery = Set(expected_delivery);
        active.notes = Set(notes);
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(next_version);

        let updated = active
            .update(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        info!(
            order_id = %order_id,
            old_status = %old_status,
            new_status = %new_status,
            "order status updated"
        );
        self.emit(Event::OrderStatusChanged {
            order_id,
            old_status,
            new_status: new_status.to_string(),
        })
        .await;
        Ok(updated)
    }

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

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "failed to send order event");
            }
        }
    }
}

/// Exactly one of supplier/distributor must be set, matching the order
/// type: purchase orders name a supplier, sales orders a distributor.
fn validate_party_consistency(
    order_type: OrderType,
    supplier_id: Option<Uuid>,
    distributor_id: Option<Uuid>,
) -> Result<(), ServiceError> {
    match order_type {
        OrderType::Purchase => {
            if supplier_id.is_none() || distributor_id.is_some() {
                return Err(ServiceError::ValidationFailed(
                    "purchase orders require a supplier id and no distributor id".to_string(),
                ));
            }
        }
        OrderType::Sales => {
            if distributor_id.is_none() || supplier_id.is_some() {
                return Err(ServiceError::ValidationFailed(
                    "sales orders require a distributor id and no supplier id".to_string(),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn party_consistency_is_an_xor() {
        let supplier = Some(Uuid::new_v4());
        let distributor = Some(Uuid::new_v4());

        assert!(validate_party_consistency(OrderType::Purchase, supplier, None).is_ok());
        assert!(validate_party_consistency(OrderType::Sales, None, distributor).is_ok());

        assert_matches!(
            validate_party_consistency(OrderType::Purchase, None, distributor),
            Err(ServiceError::ValidationFailed(_))
        );
        assert_matches!(
            validate_party_consistency(OrderType::Sales, supplier, None),
            Err(ServiceError::ValidationFailed(_))
        );
        assert_matches!(
            validate_party_consistency(OrderType::Purchase, supplier, distributor),
            Err(ServiceError::ValidationFailed(_))
        );
        assert_matches!(
            validate_party_consistency(OrderType::Sales, None, None),
            Err(ServiceError::ValidationFailed(_))
        );
    }

    #[test]
    fn sort_field_allow_list() {
        assert!(OrderSortField::from_str("order_date").is_ok());
        assert!(OrderSortField::from_str("unit_price").is_ok());
        assert!(OrderSortField::from_str("notes").is_err());
        assert!(OrderSortField::from_str("order_date; DELETE FROM orders").is_err());
    }
}
