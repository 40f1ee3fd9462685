pub mod inventory_record;
pub mod order;
pub mod product;
pub mod warehouse;
