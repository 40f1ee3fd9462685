pub mod bulk_operations;
pub mod inventory;
pub mod orders;

pub use bulk_operations::BulkOperationsService;
pub use inventory::InventoryService;
pub use orders::OrderService;
