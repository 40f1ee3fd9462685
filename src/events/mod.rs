use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// Domain events emitted after successful mutations. Delivery is
/// best-effort: a send failure is reported to the caller as a warning,
/// never as a failure of the mutation itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order lifecycle
    OrderCreated(Uuid),
    OrderUpdated(Uuid),
    OrderDeleted(Uuid),
    OrderCancelled(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },

    // Inventory ledger
    InventoryAdjusted {
        tenant_id: Uuid,
        warehouse_id: Uuid,
        product_id: Uuid,
        previous_quantity: i32,
        new_quantity: i32,
    },
    StockTransferred {
        tenant_id: Uuid,
        product_id: Uuid,
        from_warehouse_id: Uuid,
        to_warehouse_id: Uuid,
        quantity: i32,
    },

    // Bulk engine
    BulkOperationCompleted {
        operation_id: Uuid,
        status: String,
        processed_items: u32,
        failed_items: u32,
        completed_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("failed to send event: {}", e))
    }
}

/// Creates a bounded event channel with an attached sender.
pub fn channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}

/// Drains the event channel, logging each event. Downstream consumers
/// (notification delivery, audit logging) hang off this loop and are
/// out of scope here.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        info!(event = ?event, "domain event");
    }
}
