mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use stockledger_api::entities::order::{OrderStatus, OrderType};
use stockledger_api::errors::ServiceError;
use stockledger_api::services::orders::{
    CreateOrderRequest, OrderSearchFilter, UpdateOrderRequest,
};
use uuid::Uuid;

fn sales_order(
    tenant_id: Uuid,
    warehouse_id: Uuid,
    product_id: Uuid,
    quantity: i32,
) -> CreateOrderRequest {
    CreateOrderRequest {
        tenant_id,
        order_type: OrderType::Sales,
        product_id,
        warehouse_id,
        quantity,
        unit_price: dec!(19.99),
        order_date: None,
        expected_delivery: None,
        supplier_id: None,
        distributor_id: Some(Uuid::new_v4()),
        notes: None,
    }
}

fn purchase_order(
    tenant_id: Uuid,
    warehouse_id: Uuid,
    product_id: Uuid,
    quantity: i32,
) -> CreateOrderRequest {
    CreateOrderRequest {
        tenant_id,
        order_type: OrderType::Purchase,
        product_id,
        warehouse_id,
        quantity,
        unit_price: dec!(7.50),
        order_date: None,
        expected_delivery: None,
        supplier_id: Some(Uuid::new_v4()),
        distributor_id: None,
        notes: None,
    }
}

#[tokio::test]
async fn sales_order_process_then_cancel_restores_stock() {
    let ctx = common::setup().await;
    let (w, p) = (Uuid::new_v4(), Uuid::new_v4());
    ctx.seed_stock(w, p, 10).await;

    let order = ctx
        .orders
        .create_order(sales_order(ctx.tenant_id, w, p, 5))
        .await
        .unwrap();
    assert_eq!(order.status, "pending");

    ctx.orders.approve_order(ctx.tenant_id, order.id).await.unwrap();
    let processed = ctx.orders.process_order(ctx.tenant_id, order.id).await.unwrap();
    assert_eq!(processed.status, "processing");
    assert_eq!(ctx.quantity(w, p).await, 5);

    let cancelled = ctx
        .orders
        .cancel_order(ctx.tenant_id, order.id, Some("customer change".to_string()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, "cancelled");
    assert_eq!(cancelled.notes.as_deref(), Some("customer change"));
    assert_eq!(ctx.quantity(w, p).await, 10);
}

#[tokio::test]
async fn purchase_order_receive_credits_stock_back() {
    let ctx = common::setup().await;
    let (w, p) = (Uuid::new_v4(), Uuid::new_v4());
    ctx.seed_stock(w, p, 25).await;

    let order = ctx
        .orders
        .create_order(purchase_order(ctx.tenant_id, w, p, 20))
        .await
        .unwrap();
    ctx.orders.approve_order(ctx.tenant_id, order.id).await.unwrap();
    ctx.orders.process_order(ctx.tenant_id, order.id).await.unwrap();
    assert_eq!(ctx.quantity(w, p).await, 5);

    let received = ctx.orders.receive_order(ctx.tenant_id, order.id).await.unwrap();
    assert_eq!(received.status, "delivered");
    assert_eq!(ctx.quantity(w, p).await, 25);
}

#[tokio::test]
async fn duplicate_process_fails_and_deducts_once() {
    let ctx = common::setup().await;
    let (w, p) = (Uuid::new_v4(), Uuid::new_v4());
    ctx.seed_stock(w, p, 10).await;

    let order = ctx
        .orders
        .create_order(sales_order(ctx.tenant_id, w, p, 4))
        .await
        .unwrap();
    ctx.orders.approve_order(ctx.tenant_id, order.id).await.unwrap();
    ctx.orders.process_order(ctx.tenant_id, order.id).await.unwrap();
    assert_eq!(ctx.quantity(w, p).await, 6);

    let second = ctx.orders.process_order(ctx.tenant_id, order.id).await;
    assert_matches!(second, Err(ServiceError::InvalidStatusTransition(_)));
    assert_eq!(ctx.quantity(w, p).await, 6, "stock must be deducted exactly once");
}

#[tokio::test]
async fn full_ship_deliver_path() {
    let ctx = common::setup().await;
    let (w, p) = (Uuid::new_v4(), Uuid::new_v4());
    ctx.seed_stock(w, p, 10).await;

    let order = ctx
        .orders
        .create_order(sales_order(ctx.tenant_id, w, p, 2))
        .await
        .unwrap();
    ctx.orders.approve_order(ctx.tenant_id, order.id).await.unwrap();
    ctx.orders.process_order(ctx.tenant_id, order.id).await.unwrap();

    let eta = Utc::now() + Duration::days(3);
    let shipped = ctx
        .orders
        .ship_order(ctx.tenant_id, order.id, Some(eta))
        .await
        .unwrap();
    assert_eq!(shipped.status, "shipped");
    assert!(shipped.expected_delivery.is_some());

    let delivered = ctx.orders.deliver_order(ctx.tenant_id, order.id).await.unwrap();
    assert_eq!(delivered.status, "delivered");
    // Delivery itself has no inventory effect.
    assert_eq!(ctx.quantity(w, p).await, 8);

    // Terminal: no further transitions.
    let cancel = ctx.orders.cancel_order(ctx.tenant_id, order.id, None).await;
    assert_matches!(cancel, Err(ServiceError::InvalidStatusTransition(_)));
}

#[tokio::test]
async fn cancel_from_approved_credits_order_quantity() {
    let ctx = common::setup().await;
    let (w, p) = (Uuid::new_v4(), Uuid::new_v4());
    ctx.seed_stock(w, p, 10).await;

    let order = ctx
        .orders
        .create_order(sales_order(ctx.tenant_id, w, p, 4))
        .await
        .unwrap();
    ctx.orders.approve_order(ctx.tenant_id, order.id).await.unwrap();
    // Approval deducts nothing.
    assert_eq!(ctx.quantity(w, p).await, 10);

    let cancelled = ctx
        .orders
        .cancel_order(ctx.tenant_id, order.id, None)
        .await
        .unwrap();
    assert_eq!(cancelled.status, "cancelled");
    // Cancelling an approved order credits the order quantity even
    // though processing never deducted it.
    assert_eq!(ctx.quantity(w, p).await, 14);
}

#[tokio::test]
async fn cancel_from_pending_leaves_inventory_alone() {
    let ctx = common::setup().await;
    let (w, p) = (Uuid::new_v4(), Uuid::new_v4());
    ctx.seed_stock(w, p, 10).await;

    let order = ctx
        .orders
        .create_order(sales_order(ctx.tenant_id, w, p, 5))
        .await
        .unwrap();
    let cancelled = ctx
        .orders
        .cancel_order(ctx.tenant_id, order.id, None)
        .await
        .unwrap();
    assert_eq!(cancelled.status, "cancelled");
    assert_eq!(ctx.quantity(w, p).await, 10);
}

#[tokio::test]
async fn create_rejects_insufficient_stock_and_bad_parties() {
    let ctx = common::setup().await;
    let (w, p) = (Uuid::new_v4(), Uuid::new_v4());
    ctx.seed_stock(w, p, 3).await;

    let too_many = ctx
        .orders
        .create_order(sales_order(ctx.tenant_id, w, p, 5))
        .await;
    assert_matches!(too_many, Err(ServiceError::InsufficientStock(_)));

    // Sales order with a supplier id instead of a distributor id.
    let mut bad_party = sales_order(ctx.tenant_id, w, p, 1);
    bad_party.distributor_id = None;
    bad_party.supplier_id = Some(Uuid::new_v4());
    let result = ctx.orders.create_order(bad_party).await;
    assert_matches!(result, Err(ServiceError::ValidationFailed(_)));

    // Both parties set on a purchase order.
    let mut both = purchase_order(ctx.tenant_id, w, p, 1);
    both.distributor_id = Some(Uuid::new_v4());
    let result = ctx.orders.create_order(both).await;
    assert_matches!(result, Err(ServiceError::ValidationFailed(_)));
}

#[tokio::test]
async fn receive_is_for_purchase_orders_only() {
    let ctx = common::setup().await;
    let (w, p) = (Uuid::new_v4(), Uuid::new_v4());
    ctx.seed_stock(w, p, 10).await;

    let order = ctx
        .orders
        .create_order(sales_order(ctx.tenant_id, w, p, 2))
        .await
        .unwrap();
    ctx.orders.approve_order(ctx.tenant_id, order.id).await.unwrap();
    ctx.orders.process_order(ctx.tenant_id, order.id).await.unwrap();

    let result = ctx.orders.receive_order(ctx.tenant_id, order.id).await;
    assert_matches!(result, Err(ServiceError::ValidationFailed(_)));
}

#[tokio::test]
async fn update_is_limited_to_pending_orders() {
    let ctx = common::setup().await;
    let (w, p) = (Uuid::new_v4(), Uuid::new_v4());
    ctx.seed_stock(w, p, 10).await;

    let order = ctx
        .orders
        .create_order(sales_order(ctx.tenant_id, w, p, 2))
        .await
        .unwrap();

    let updated = ctx
        .orders
        .update_order(
            ctx.tenant_id,
            order.id,
            UpdateOrderRequest {
                quantity: Some(3),
                notes: Some("rush".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.quantity, 3);
    assert_eq!(updated.version, order.version + 1);

    ctx.orders.approve_order(ctx.tenant_id, order.id).await.unwrap();
    let result = ctx
        .orders
        .update_order(
            ctx.tenant_id,
            order.id,
            UpdateOrderRequest {
                quantity: Some(4),
                ..Default::default()
            },
        )
        .await;
    assert_matches!(result, Err(ServiceError::InvalidStatusTransition(_)));
}

#[tokio::test]
async fn delete_refuses_orders_with_committed_stock() {
    let ctx = common::setup().await;
    let (w, p) = (Uuid::new_v4(), Uuid::new_v4());
    ctx.seed_stock(w, p, 10).await;

    let order = ctx
        .orders
        .create_order(sales_order(ctx.tenant_id, w, p, 2))
        .await
        .unwrap();
    ctx.orders.approve_order(ctx.tenant_id, order.id).await.unwrap();
    ctx.orders.process_order(ctx.tenant_id, order.id).await.unwrap();

    let result = ctx.orders.delete_order(ctx.tenant_id, order.id).await;
    assert_matches!(result, Err(ServiceError::ValidationFailed(_)));

    ctx.orders
        .cancel_order(ctx.tenant_id, order.id, None)
        .await
        .unwrap();
    ctx.orders.delete_order(ctx.tenant_id, order.id).await.unwrap();
    let gone = ctx.orders.get_order(ctx.tenant_id, order.id).await;
    assert_matches!(gone, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn search_filters_by_status_and_type() {
    let ctx = common::setup().await;
    let (w, p) = (Uuid::new_v4(), Uuid::new_v4());
    ctx.seed_stock(w, p, 100).await;

    let sales = ctx
        .orders
        .create_order(sales_order(ctx.tenant_id, w, p, 5))
        .await
        .unwrap();
    ctx.orders.approve_order(ctx.tenant_id, sales.id).await.unwrap();
    ctx.orders
        .create_order(purchase_order(ctx.tenant_id, w, p, 10))
        .await
        .unwrap();

    let (hits, total) = ctx
        .orders
        .search_orders(
            ctx.tenant_id,
            OrderSearchFilter {
                status: Some("approved".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(hits[0].id, sales.id);

    let (_, purchases) = ctx
        .orders
        .search_orders(
            ctx.tenant_id,
            OrderSearchFilter {
                order_type: Some("purchase".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(purchases, 1);

    let bad_sort = ctx
        .orders
        .search_orders(
            ctx.tenant_id,
            OrderSearchFilter {
                sort_by: Some("tenant_id".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert_matches!(bad_sort, Err(ServiceError::ValidationFailed(_)));
}

#[tokio::test]
async fn analytics_aggregate_counts_and_value() {
    let ctx = common::setup().await;
    let (w, p) = (Uuid::new_v4(), Uuid::new_v4());
    ctx.seed_stock(w, p, 100).await;

    let a = ctx
        .orders
        .create_order(sales_order(ctx.tenant_id, w, p, 2))
        .await
        .unwrap();
    ctx.orders.approve_order(ctx.tenant_id, a.id).await.unwrap();
    ctx.orders
        .create_order(purchase_order(ctx.tenant_id, w, p, 4))
        .await
        .unwrap();

    let from = Utc::now() - Duration::hours(1);
    let to = Utc::now() + Duration::hours(1);
    let analytics = ctx
        .orders
        .get_order_analytics(ctx.tenant_id, from, to)
        .await
        .unwrap();

    assert_eq!(analytics.total_orders, 2);
    assert_eq!(analytics.status_counts.get("approved"), Some(&1));
    assert_eq!(analytics.status_counts.get("pending"), Some(&1));
    assert_eq!(analytics.type_counts.get("sales"), Some(&1));
    assert_eq!(analytics.type_counts.get("purchase"), Some(&1));
    // 2 * 19.99 + 4 * 7.50
    assert_eq!(analytics.total_value, dec!(69.98));
    assert_eq!(analytics.average_order_value, dec!(34.99));

    let inverted = ctx.orders.get_order_analytics(ctx.tenant_id, to, from).await;
    assert_matches!(inverted, Err(ServiceError::ValidationFailed(_)));
}

#[tokio::test]
async fn status_enum_matches_stored_strings() {
    let ctx = common::setup().await;
    let (w, p) = (Uuid::new_v4(), Uuid::new_v4());
    ctx.seed_stock(w, p, 10).await;

    let order = ctx
        .orders
        .create_order(sales_order(ctx.tenant_id, w, p, 1))
        .await
        .unwrap();
    assert_eq!(order.status().unwrap(), OrderStatus::Pending);
    assert_eq!(order.order_type().unwrap(), OrderType::Sales);
}
