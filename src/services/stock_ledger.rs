//! The stock ledger: an append-only list of movements per (warehouse,
//! material). Appending a movement and updating the projection happen in one
//! transaction, so the projection never drifts from the ledger except through
//! out-of-band writes, which [`StockLedgerService::reconcile`] detects.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::entities::quantity::{serialize_optional_quantity, serialize_quantity};
use crate::entities::stock_movement::QUANTITY_SCALE;
use crate::entities::{
    material, picking_order, picking_order_item, stock_movement, warehouse,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::availability::AvailabilityCache;
use crate::services::movement_catalog::{MovementTypeCatalog, StockEffect};
use crate::services::warehouse_stock;

/// Rejects quantities finer than the storage scale; they would be rounded on
/// write, and a positive amount could be stored as zero.
pub fn check_quantity_scale(quantity: Decimal) -> Result<(), ServiceError> {
    if quantity.normalize().scale() > QUANTITY_SCALE {
        return Err(ServiceError::InvalidQuantity(format!(
            "{} has more than {} decimal places",
            quantity, QUANTITY_SCALE
        )));
    }
    Ok(())
}

/// What a movement was recorded for. At most one per movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MovementOrigin {
    MaintenanceRequest(Uuid),
    PickingOrderItem(Uuid),
    RestrictionOrderItem(Uuid),
}

impl MovementOrigin {
    /// Builds an origin from the three nullable reference columns.
    pub fn from_parts(
        maintenance_request_id: Option<Uuid>,
        picking_order_item_id: Option<Uuid>,
        restriction_order_item_id: Option<Uuid>,
    ) -> Result<Option<MovementOrigin>, ServiceError> {
        match (
            maintenance_request_id,
            picking_order_item_id,
            restriction_order_item_id,
        ) {
            (None, None, None) => Ok(None),
            (Some(id), None, None) => Ok(Some(MovementOrigin::MaintenanceRequest(id))),
            (None, Some(id), None) => Ok(Some(MovementOrigin::PickingOrderItem(id))),
            (None, None, Some(id)) => Ok(Some(MovementOrigin::RestrictionOrderItem(id))),
            _ => Err(ServiceError::ValidationError(
                "a movement references at most one origin".to_string(),
            )),
        }
    }

    /// Item links are written only by picking withdrawals and restriction
    /// write-offs, which keep the item counters in step.
    pub fn is_order_item(self) -> bool {
        matches!(
            self,
            MovementOrigin::PickingOrderItem(_) | MovementOrigin::RestrictionOrderItem(_)
        )
    }
}

/// Who physically took the material. At most one per movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Collector {
    User(Uuid),
    Worker(Uuid),
}

impl Collector {
    /// Builds a collector from the two nullable columns used on the wire.
    pub fn from_parts(
        user_id: Option<Uuid>,
        worker_id: Option<Uuid>,
    ) -> Result<Option<Collector>, ServiceError> {
        match (user_id, worker_id) {
            (Some(_), Some(_)) => Err(ServiceError::ValidationError(
                "a movement is collected by a user or a worker, not both".to_string(),
            )),
            (Some(user), None) => Ok(Some(Collector::User(user))),
            (None, Some(worker)) => Ok(Some(Collector::Worker(worker))),
            (None, None) => Ok(None),
        }
    }

    pub fn user_id(self) -> Option<Uuid> {
        match self {
            Collector::User(id) => Some(id),
            Collector::Worker(_) => None,
        }
    }

    pub fn worker_id(self) -> Option<Uuid> {
        match self {
            Collector::Worker(id) => Some(id),
            Collector::User(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewMovement {
    pub warehouse_id: Uuid,
    pub material_id: Uuid,
    pub movement_type: String,
    pub quantity: Decimal,
    pub movement_date: Option<DateTime<Utc>>,
    pub unit_price: Option<Decimal>,
    pub processed_by_user_id: Uuid,
    pub collector: Option<Collector>,
    pub origin: Option<MovementOrigin>,
    pub notes: Option<String>,
}

impl NewMovement {
    pub fn new(
        warehouse_id: Uuid,
        material_id: Uuid,
        movement_type: impl Into<String>,
        quantity: Decimal,
        processed_by_user_id: Uuid,
    ) -> Self {
        Self {
            warehouse_id,
            material_id,
            movement_type: movement_type.into(),
            quantity,
            movement_date: None,
            unit_price: None,
            processed_by_user_id,
            collector: None,
            origin: None,
            notes: None,
        }
    }

    pub fn with_origin(mut self, origin: MovementOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_collector(mut self, collector: Option<Collector>) -> Self {
        self.collector = collector;
        self
    }

    pub fn with_unit_price(mut self, unit_price: Option<Decimal>) -> Self {
        self.unit_price = unit_price;
        self
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItemResult {
    pub index: usize,
    pub movement_id: Option<i64>,
    pub error_code: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<BatchItemResult>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| at >= from) && self.to.map_or(true, |to| at < to)
    }
}

#[derive(Debug, Clone)]
pub struct MovementQuery {
    pub warehouse_id: Uuid,
    pub material_id: Option<Uuid>,
    pub range: DateRange,
    /// Return movements with an id strictly greater than this.
    pub cursor: Option<i64>,
    pub limit: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MovementPage {
    pub movements: Vec<stock_movement::Model>,
    pub next_cursor: Option<i64>,
}

/// Result of folding a movement history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplayedBalance {
    #[serde(serialize_with = "serialize_optional_quantity")]
    pub baseline: Option<Decimal>,
    #[serde(serialize_with = "serialize_quantity")]
    pub balance: Decimal,
}

impl ReplayedBalance {
    pub fn on_hand(&self) -> Option<Decimal> {
        crate::entities::warehouse_stock::on_hand(self.baseline, Some(self.balance))
    }
}

/// Folds `(effect, quantity)` pairs given in ledger order. The last baseline
/// wins and restarts the balance; the movements after it are summed, so their
/// relative order does not matter.
pub fn replay<I>(entries: I) -> ReplayedBalance
where
    I: IntoIterator<Item = (StockEffect, Decimal)>,
{
    entries.into_iter().fold(
        ReplayedBalance {
            baseline: None,
            balance: Decimal::ZERO,
        },
        |acc, (effect, quantity)| match effect {
            StockEffect::Baseline => ReplayedBalance {
                baseline: Some(quantity),
                balance: Decimal::ZERO,
            },
            other => ReplayedBalance {
                baseline: acc.baseline,
                balance: acc.balance + other.signed(quantity),
            },
        },
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemDiscrepancy {
    pub picking_order_item_id: Uuid,
    #[serde(serialize_with = "serialize_quantity")]
    pub recorded_withdrawn: Decimal,
    #[serde(serialize_with = "serialize_quantity")]
    pub ledger_withdrawn: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub warehouse_id: Uuid,
    pub material_id: Uuid,
    pub movement_count: usize,
    pub replayed: ReplayedBalance,
    #[serde(serialize_with = "serialize_optional_quantity")]
    pub projected_baseline: Option<Decimal>,
    #[serde(serialize_with = "serialize_optional_quantity")]
    pub projected_balance: Option<Decimal>,
    pub item_discrepancies: Vec<ItemDiscrepancy>,
    /// True when a previous flag was lifted by this run.
    pub flag_cleared: bool,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.projected_baseline == self.replayed.baseline
            && self.projected_balance.unwrap_or(Decimal::ZERO) == self.replayed.balance
            && self.item_discrepancies.is_empty()
    }

    fn detail(&self) -> String {
        let mut parts = Vec::new();
        if self.projected_baseline != self.replayed.baseline {
            parts.push(format!(
                "baseline {:?} in projection, {:?} in ledger",
                self.projected_baseline, self.replayed.baseline
            ));
        }
        if self.projected_balance.unwrap_or(Decimal::ZERO) != self.replayed.balance {
            parts.push(format!(
                "balance {:?} in projection, {} in ledger",
                self.projected_balance, self.replayed.balance
            ));
        }
        for item in &self.item_discrepancies {
            parts.push(format!(
                "picking item {} records {} withdrawn, ledger has {}",
                item.picking_order_item_id, item.recorded_withdrawn, item.ledger_withdrawn
            ));
        }
        parts.join("; ")
    }
}

/// Fails unless both the warehouse and the material exist and are active.
pub async fn check_references<C>(
    conn: &C,
    warehouse_id: Uuid,
    material_id: Uuid,
) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    check_warehouse(conn, warehouse_id).await?;
    check_material(conn, material_id).await
}

pub async fn check_warehouse<C>(conn: &C, warehouse_id: Uuid) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    match warehouse::Entity::find_by_id(warehouse_id).one(conn).await? {
        Some(w) if w.is_active => Ok(()),
        _ => Err(ServiceError::UnknownWarehouse(warehouse_id)),
    }
}

pub async fn check_material<C>(conn: &C, material_id: Uuid) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    match material::Entity::find_by_id(material_id).one(conn).await? {
        Some(m) if m.is_active => Ok(()),
        _ => Err(ServiceError::UnknownMaterial(material_id)),
    }
}

#[derive(Clone)]
pub struct StockLedgerService {
    db_pool: Arc<DatabaseConnection>,
    catalog: Arc<MovementTypeCatalog>,
    cache: AvailabilityCache,
    event_sender: EventSender,
}

impl StockLedgerService {
    pub fn new(
        db_pool: Arc<DatabaseConnection>,
        catalog: Arc<MovementTypeCatalog>,
        cache: AvailabilityCache,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db_pool,
            catalog,
            cache,
            event_sender,
        }
    }

    pub fn catalog(&self) -> &MovementTypeCatalog {
        &self.catalog
    }

    /// Validates and appends one movement on `txn`, updating the projection in
    /// the same transaction. The caller commits, then calls
    /// [`Self::publish_recorded`].
    pub async fn append_in_txn<C>(
        &self,
        txn: &C,
        movement: NewMovement,
    ) -> Result<stock_movement::Model, ServiceError>
    where
        C: ConnectionTrait,
    {
        let entry = self.catalog.resolve(&movement.movement_type)?;
        check_quantity_scale(movement.quantity)?;
        match entry.effect {
            StockEffect::None => {
                return Err(ServiceError::ValidationError(format!(
                    "movement type {} is a hold and cannot be recorded in the ledger",
                    entry.code
                )))
            }
            StockEffect::Baseline if movement.quantity.is_sign_negative() => {
                return Err(ServiceError::InvalidQuantity(format!(
                    "recount quantity must not be negative, got {}",
                    movement.quantity
                )))
            }
            StockEffect::Increase | StockEffect::Decrease if movement.quantity <= Decimal::ZERO => {
                return Err(ServiceError::InvalidQuantity(format!(
                    "movement quantity must be positive, got {}",
                    movement.quantity
                )))
            }
            _ => {}
        }
        if let Some(price) = movement.unit_price {
            if price.is_sign_negative() {
                return Err(ServiceError::InvalidQuantity(format!(
                    "unit price must not be negative, got {}",
                    price
                )));
            }
            check_quantity_scale(price)?;
        }

        check_references(txn, movement.warehouse_id, movement.material_id).await?;

        let row = warehouse_stock::lock_row(txn, movement.warehouse_id, movement.material_id).await?;
        if row.is_flagged() {
            return Err(ServiceError::InvariantViolation {
                warehouse_id: movement.warehouse_id,
                material_id: movement.material_id,
                detail: "pair is flagged for manual reconciliation".to_string(),
            });
        }

        match entry.effect {
            StockEffect::Baseline => {
                warehouse_stock::set_baseline(txn, row.id, movement.quantity).await?;
            }
            StockEffect::Decrease => {
                if let Some(on_hand) = row.on_hand() {
                    if on_hand < movement.quantity {
                        return Err(ServiceError::InsufficientOnHand {
                            material_id: movement.material_id,
                            requested: movement.quantity,
                            on_hand: Some(on_hand),
                        });
                    }
                }
                warehouse_stock::apply_delta(txn, row.id, -movement.quantity).await?;
            }
            StockEffect::Increase => {
                warehouse_stock::apply_delta(txn, row.id, movement.quantity).await?;
            }
            StockEffect::None => {}
        }

        let (maintenance_request_id, picking_order_item_id, restriction_order_item_id) =
            match movement.origin {
                Some(MovementOrigin::MaintenanceRequest(id)) => (Some(id), None, None),
                Some(MovementOrigin::PickingOrderItem(id)) => (None, Some(id), None),
                Some(MovementOrigin::RestrictionOrderItem(id)) => (None, None, Some(id)),
                None => (None, None, None),
            };

        let now = Utc::now();
        let active = stock_movement::ActiveModel {
            warehouse_id: Set(movement.warehouse_id),
            material_id: Set(movement.material_id),
            movement_type_id: Set(entry.id),
            quantity: Set(movement.quantity),
            movement_date: Set(movement.movement_date.unwrap_or(now)),
            unit_price: Set(movement.unit_price),
            processed_by_user_id: Set(movement.processed_by_user_id),
            collected_by_user_id: Set(movement.collector.and_then(Collector::user_id)),
            collected_by_worker_id: Set(movement.collector.and_then(Collector::worker_id)),
            maintenance_request_id: Set(maintenance_request_id),
            picking_order_item_id: Set(picking_order_item_id),
            restriction_order_item_id: Set(restriction_order_item_id),
            notes: Set(movement.notes),
            created_at: Set(now),
            ..Default::default()
        };

        Ok(active.insert(txn).await?)
    }

    /// Emits `MovementRecorded` for a committed movement.
    pub async fn publish_recorded(&self, movement: &stock_movement::Model) {
        let movement_type = self
            .catalog
            .by_id(movement.movement_type_id)
            .map(|entry| entry.code.clone())
            .unwrap_or_else(|_| movement.movement_type_id.to_string());
        self.event_sender
            .publish(Event::MovementRecorded {
                movement_id: movement.id,
                warehouse_id: movement.warehouse_id,
                material_id: movement.material_id,
                movement_type,
                quantity: movement.quantity,
            })
            .await;
    }

    /// Appends a single movement in its own transaction.
    #[instrument(skip(self), fields(movement_type = %movement.movement_type))]
    pub async fn record_movement(
        &self,
        movement: NewMovement,
    ) -> Result<stock_movement::Model, ServiceError> {
        if movement.origin.is_some_and(MovementOrigin::is_order_item) {
            return Err(ServiceError::ValidationError(
                "movements for picking or restriction order items are recorded through the order"
                    .to_string(),
            ));
        }

        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;
        let recorded = self.append_in_txn(&txn, movement).await?;
        txn.commit().await?;

        self.cache
            .invalidate(recorded.warehouse_id, recorded.material_id);
        self.publish_recorded(&recorded).await;
        info!(
            movement_id = recorded.id,
            warehouse_id = %recorded.warehouse_id,
            material_id = %recorded.material_id,
            quantity = %recorded.quantity,
            "Stock movement recorded"
        );
        Ok(recorded)
    }

    /// Bulk import. Each movement commits or fails on its own; a failure
    /// never rolls back earlier successes.
    #[instrument(skip(self, movements), fields(count = movements.len()))]
    pub async fn record_movements_batch(&self, movements: Vec<NewMovement>) -> BatchOutcome {
        let mut results = Vec::with_capacity(movements.len());
        let mut succeeded = 0;

        for (index, movement) in movements.into_iter().enumerate() {
            match self.record_movement(movement).await {
                Ok(recorded) => {
                    succeeded += 1;
                    results.push(BatchItemResult {
                        index,
                        movement_id: Some(recorded.id),
                        error_code: None,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!(index, error = %e, "Batch movement rejected");
                    results.push(BatchItemResult {
                        index,
                        movement_id: None,
                        error_code: Some(e.code().to_string()),
                        error: Some(e.response_message()),
                    });
                }
            }
        }

        let failed = results.len() - succeeded;
        info!(succeeded, failed, "Batch import finished");
        BatchOutcome {
            succeeded,
            failed,
            results,
        }
    }

    /// Pages through the ledger in id order.
    #[instrument(skip(self))]
    pub async fn list_movements(&self, query: MovementQuery) -> Result<MovementPage, ServiceError> {
        if query.limit == 0 {
            return Err(ServiceError::ValidationError(
                "limit must be at least 1".to_string(),
            ));
        }

        let mut select = stock_movement::Entity::find()
            .filter(stock_movement::Column::WarehouseId.eq(query.warehouse_id));
        if let Some(material_id) = query.material_id {
            select = select.filter(stock_movement::Column::MaterialId.eq(material_id));
        }
        if let Some(from) = query.range.from {
            select = select.filter(stock_movement::Column::MovementDate.gte(from));
        }
        if let Some(to) = query.range.to {
            select = select.filter(stock_movement::Column::MovementDate.lt(to));
        }
        if let Some(cursor) = query.cursor {
            select = select.filter(stock_movement::Column::Id.gt(cursor));
        }

        let mut movements = select
            .order_by_asc(stock_movement::Column::Id)
            .limit(query.limit + 1)
            .all(self.db_pool.as_ref())
            .await?;

        let next_cursor = if movements.len() as u64 > query.limit {
            movements.truncate(query.limit as usize);
            movements.last().map(|m| m.id)
        } else {
            None
        };

        Ok(MovementPage {
            movements,
            next_cursor,
        })
    }

    async fn history<C>(
        &self,
        conn: &C,
        warehouse_id: Uuid,
        material_id: Uuid,
    ) -> Result<Vec<stock_movement::Model>, ServiceError>
    where
        C: ConnectionTrait,
    {
        Ok(stock_movement::Entity::find()
            .filter(stock_movement::Column::WarehouseId.eq(warehouse_id))
            .filter(stock_movement::Column::MaterialId.eq(material_id))
            .order_by_asc(stock_movement::Column::Id)
            .all(conn)
            .await?)
    }

    fn replay_history(
        &self,
        history: &[stock_movement::Model],
    ) -> Result<ReplayedBalance, ServiceError> {
        let entries = history
            .iter()
            .map(|m| Ok((self.catalog.by_id(m.movement_type_id)?.effect, m.quantity)))
            .collect::<Result<Vec<_>, ServiceError>>()?;
        Ok(replay(entries))
    }

    /// Rebuilds the projection values from the full ledger without touching storage.
    #[instrument(skip(self))]
    pub async fn replay_balance(
        &self,
        warehouse_id: Uuid,
        material_id: Uuid,
    ) -> Result<ReplayedBalance, ServiceError> {
        let history = self
            .history(self.db_pool.as_ref(), warehouse_id, material_id)
            .await?;
        self.replay_history(&history)
    }

    /// Compares the projection and the picking item counters with the ledger.
    /// A mismatch flags the pair, which blocks further appends until an
    /// operator repairs it and a later run finds it consistent.
    #[instrument(skip(self))]
    pub async fn reconcile(
        &self,
        warehouse_id: Uuid,
        material_id: Uuid,
    ) -> Result<ReconciliationReport, ServiceError> {
        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;

        check_references(&txn, warehouse_id, material_id).await?;
        let row = warehouse_stock::lock_row(&txn, warehouse_id, material_id).await?;
        let history = self.history(&txn, warehouse_id, material_id).await?;
        let replayed = self.replay_history(&history)?;

        let mut withdrawn_by_item: HashMap<Uuid, Decimal> = HashMap::new();
        for movement in &history {
            if let Some(item_id) = movement.picking_order_item_id {
                let effect = self.catalog.by_id(movement.movement_type_id)?.effect;
                if effect == StockEffect::Decrease {
                    *withdrawn_by_item.entry(item_id).or_default() += movement.quantity;
                }
            }
        }
        let items = picking_order_item::Entity::find()
            .inner_join(picking_order::Entity)
            .filter(picking_order::Column::WarehouseId.eq(warehouse_id))
            .filter(picking_order_item::Column::MaterialId.eq(material_id))
            .all(&txn)
            .await?;
        let item_discrepancies: Vec<ItemDiscrepancy> = items
            .iter()
            .filter_map(|item| {
                let ledger_withdrawn = withdrawn_by_item
                    .get(&item.id)
                    .copied()
                    .unwrap_or(Decimal::ZERO);
                (ledger_withdrawn != item.quantity_withdrawn).then(|| ItemDiscrepancy {
                    picking_order_item_id: item.id,
                    recorded_withdrawn: item.quantity_withdrawn,
                    ledger_withdrawn,
                })
            })
            .collect();

        let mut report = ReconciliationReport {
            warehouse_id,
            material_id,
            movement_count: history.len(),
            replayed,
            projected_baseline: row.initial_stock_quantity,
            projected_balance: row.balance_in_minus_out,
            item_discrepancies,
            flag_cleared: false,
        };

        if report.is_consistent() {
            if row.is_flagged() {
                warehouse_stock::set_flag(&txn, row.id, None).await?;
                report.flag_cleared = true;
                info!("Reconciliation passed; clearing flag");
            }
            txn.commit().await?;
            self.cache.invalidate(warehouse_id, material_id);
            return Ok(report);
        }

        let detail = report.detail();
        if !row.is_flagged() {
            warehouse_stock::set_flag(&txn, row.id, Some(Utc::now())).await?;
        }
        txn.commit().await?;
        self.cache.invalidate(warehouse_id, material_id);

        error!(
            %warehouse_id,
            %material_id,
            detail = %detail,
            "Ledger and projection disagree; pair flagged for manual reconciliation"
        );
        self.event_sender
            .publish(Event::ReconciliationFlagged {
                warehouse_id,
                material_id,
                detail: detail.clone(),
            })
            .await;

        Err(ServiceError::InvariantViolation {
            warehouse_id,
            material_id,
            detail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    #[test]
    fn replay_without_baseline_keeps_on_hand_unknown() {
        let replayed = replay([
            (StockEffect::Increase, dec!(10)),
            (StockEffect::Decrease, dec!(4)),
        ]);
        assert_eq!(replayed.baseline, None);
        assert_eq!(replayed.balance, dec!(6));
        assert_eq!(replayed.on_hand(), None);
    }

    #[test]
    fn latest_baseline_restarts_the_balance() {
        let replayed = replay([
            (StockEffect::Increase, dec!(10)),
            (StockEffect::Baseline, dec!(100)),
            (StockEffect::Decrease, dec!(30)),
            (StockEffect::Baseline, dec!(65)),
            (StockEffect::Increase, dec!(5)),
        ]);
        assert_eq!(replayed.baseline, Some(dec!(65)));
        assert_eq!(replayed.balance, dec!(5));
        assert_eq!(replayed.on_hand(), Some(dec!(70)));
    }

    #[test]
    fn holds_do_not_move_the_balance() {
        let replayed = replay([(StockEffect::None, dec!(10))]);
        assert_eq!(replayed.balance, Decimal::ZERO);
    }

    #[test]
    fn collector_accepts_at_most_one_party() {
        let (user, worker) = (Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(
            Collector::from_parts(Some(user), None).unwrap(),
            Some(Collector::User(user))
        );
        assert_eq!(
            Collector::from_parts(None, Some(worker)).unwrap(),
            Some(Collector::Worker(worker))
        );
        assert_eq!(Collector::from_parts(None, None).unwrap(), None);
        assert_matches!(
            Collector::from_parts(Some(user), Some(worker)),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn date_range_is_half_open() {
        let from = Utc::now();
        let to = from + chrono::Duration::hours(1);
        let range = DateRange {
            from: Some(from),
            to: Some(to),
        };
        assert!(range.contains(from));
        assert!(!range.contains(to));
        assert!(DateRange::default().contains(to));
    }
}
