// API rendering of quantity columns
pub mod quantity;

// Reference data mirrored from master-data services
pub mod material;
pub mod warehouse;

// Ledger
pub mod movement_type;
pub mod stock_movement;
pub mod warehouse_stock;

// Holds and workflows
pub mod picking_order;
pub mod picking_order_item;
pub mod restriction_order;
pub mod restriction_order_item;
