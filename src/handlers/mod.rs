pub mod common;
pub mod health;
pub mod movements;
pub mod picking_orders;
pub mod restriction_orders;
pub mod stock;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::availability::{AvailabilityCache, AvailabilityService};
use crate::services::movement_catalog::MovementTypeCatalog;
use crate::services::picking_orders::PickingOrderService;
use crate::services::restriction_orders::RestrictionOrderService;
use crate::services::stock_ledger::StockLedgerService;
use crate::services::warehouse_stock::WarehouseStockService;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub ledger: StockLedgerService,
    pub stock: WarehouseStockService,
    pub availability: AvailabilityService,
    pub picking_orders: PickingOrderService,
    pub restriction_orders: RestrictionOrderService,
}

impl AppServices {
    /// Wires every service around one pool, one catalog and one availability cache.
    pub fn new(
        db_pool: Arc<DbPool>,
        catalog: Arc<MovementTypeCatalog>,
        event_sender: EventSender,
        config: &AppConfig,
    ) -> Self {
        let cache = AvailabilityCache::new(config.availability_cache_ttl());

        let ledger = StockLedgerService::new(
            db_pool.clone(),
            catalog,
            cache.clone(),
            event_sender.clone(),
        );
        let stock = WarehouseStockService::new(
            db_pool.clone(),
            ledger.clone(),
            cache.clone(),
            event_sender.clone(),
        );
        let availability = AvailabilityService::new(db_pool.clone(), cache.clone());
        let picking_orders = PickingOrderService::new(
            db_pool.clone(),
            ledger.clone(),
            cache.clone(),
            event_sender.clone(),
            config.pickup_deadline(),
        );
        let restriction_orders =
            RestrictionOrderService::new(db_pool, ledger.clone(), cache, event_sender);

        Self {
            ledger,
            stock,
            availability,
            picking_orders,
            restriction_orders,
        }
    }
}
