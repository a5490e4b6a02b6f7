// Reference data
pub mod movement_catalog;

// Ledger and projection
pub mod stock_ledger;
pub mod warehouse_stock;

// Availability
pub mod availability;

// Holds and workflows
pub mod picking_orders;
pub mod restriction_orders;
