//! Picking orders: reserve material for a maintenance job, stage it, and hand
//! it out. Status changes go through [`PickingOrderStatus::next`]; this module
//! adds the guards that need storage and persists the result with an
//! optimistic version check.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::db;
use crate::entities::picking_order::{self, PickingEventKind, PickingOrderStatus};
use crate::entities::{picking_order_item, stock_movement};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::availability::{ensure_available, AvailabilityCache};
use crate::services::movement_catalog::{codes, StockEffect};
use crate::services::restriction_orders::requested_by_material;
use crate::services::stock_ledger::{
    check_material, check_quantity_scale, check_warehouse, Collector, MovementOrigin,
    NewMovement, StockLedgerService,
};
use crate::services::warehouse_stock;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewPickingItem {
    pub material_id: Uuid,
    pub material_instance_id: Option<Uuid>,
    pub quantity_to_pick: Decimal,
    pub material_request_item_id: Option<Uuid>,
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Clone, Validate)]
pub struct NewPickingOrder {
    pub warehouse_id: Uuid,
    pub maintenance_request_id: Option<Uuid>,
    pub material_request_id: Option<Uuid>,
    pub collector: Option<Collector>,
    pub desired_pickup_date: Option<DateTime<Utc>>,
    #[validate(length(min = 1))]
    pub items: Vec<NewPickingItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalRequest {
    pub item_id: Uuid,
    pub quantity: Decimal,
    pub processed_by_user_id: Uuid,
    /// Falls back to the collector named on the order.
    pub collector: Option<Collector>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickingOrderEvent {
    StartPreparation,
    MarkReady { staged_item_ids: Vec<Uuid> },
    Withdraw(WithdrawalRequest),
    Cancel,
    Expire,
}

impl PickingOrderEvent {
    pub fn kind(&self) -> PickingEventKind {
        match self {
            PickingOrderEvent::StartPreparation => PickingEventKind::StartPreparation,
            PickingOrderEvent::MarkReady { .. } => PickingEventKind::MarkReady,
            PickingOrderEvent::Withdraw(_) => PickingEventKind::Withdraw,
            PickingOrderEvent::Cancel => PickingEventKind::Cancel,
            PickingOrderEvent::Expire => PickingEventKind::Expire,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PickingOrderDetail {
    #[serde(flatten)]
    pub order: picking_order::Model,
    pub items: Vec<picking_order_item::Model>,
    /// The `OUT` movement appended by a withdrawal, if this call made one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub movement: Option<stock_movement::Model>,
}

#[derive(Debug, Clone, Default)]
pub struct PickingOrderFilter {
    pub warehouse_id: Option<Uuid>,
    pub status: Option<PickingOrderStatus>,
    pub page: u64,
    pub per_page: u64,
}

/// True once `now` is at or past the pickup deadline of an order made ready at `ready_at`.
pub fn is_overdue(ready_at: Option<DateTime<Utc>>, deadline: chrono::Duration, now: DateTime<Utc>) -> bool {
    matches!(ready_at, Some(ready_at) if now >= ready_at + deadline)
}

#[derive(Clone)]
pub struct PickingOrderService {
    db_pool: Arc<DatabaseConnection>,
    ledger: StockLedgerService,
    cache: AvailabilityCache,
    event_sender: EventSender,
    pickup_deadline: chrono::Duration,
}

impl PickingOrderService {
    pub fn new(
        db_pool: Arc<DatabaseConnection>,
        ledger: StockLedgerService,
        cache: AvailabilityCache,
        event_sender: EventSender,
        pickup_deadline: chrono::Duration,
    ) -> Self {
        Self {
            db_pool,
            ledger,
            cache,
            event_sender,
            pickup_deadline,
        }
    }

    /// Creates an order in PENDING_PREPARATION. Availability is checked now
    /// but nothing is held until preparation starts.
    #[instrument(skip(self), fields(warehouse_id = %request.warehouse_id))]
    pub async fn create_picking_order(
        &self,
        request: NewPickingOrder,
    ) -> Result<PickingOrderDetail, ServiceError> {
        request.validate()?;
        let requested = requested_by_material(
            request
                .items
                .iter()
                .map(|item| (item.material_id, item.quantity_to_pick)),
        )?;

        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;

        check_warehouse(&txn, request.warehouse_id).await?;
        for (material_id, quantity) in &requested {
            check_material(&txn, *material_id).await?;
            warehouse_stock::lock_row(&txn, request.warehouse_id, *material_id).await?;
            ensure_available(&txn, request.warehouse_id, *material_id, *quantity).await?;
        }

        let now = Utc::now();
        let order = picking_order::ActiveModel {
            id: Set(Uuid::new_v4()),
            warehouse_id: Set(request.warehouse_id),
            status: Set(PickingOrderStatus::PendingPreparation.to_string()),
            maintenance_request_id: Set(request.maintenance_request_id),
            material_request_id: Set(request.material_request_id),
            be_collected_by_user_id: Set(request.collector.and_then(Collector::user_id)),
            be_collected_by_worker_id: Set(request.collector.and_then(Collector::worker_id)),
            desired_pickup_date: Set(request.desired_pickup_date),
            ready_at: Set(None),
            version: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let saved = picking_order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                picking_order_id: Set(order.id),
                material_id: Set(item.material_id),
                material_instance_id: Set(item.material_instance_id),
                quantity_to_pick: Set(item.quantity_to_pick),
                quantity_withdrawn: Set(Decimal::ZERO),
                material_request_item_id: Set(item.material_request_item_id),
                unit_price: Set(item.unit_price),
            }
            .insert(&txn)
            .await?;
            items.push(saved);
        }

        txn.commit().await?;

        info!(picking_order_id = %order.id, items = items.len(), "Picking order created");
        Ok(PickingOrderDetail {
            order,
            items,
            movement: None,
        })
    }

    pub async fn transition_picking_order(
        &self,
        id: Uuid,
        event: PickingOrderEvent,
    ) -> Result<PickingOrderDetail, ServiceError> {
        self.transition_at(id, event, Utc::now()).await
    }

    /// Applies `event` as of `now`. Everything, including a withdrawal's
    /// ledger entry, commits atomically or not at all.
    #[instrument(skip(self), fields(kind = %event.kind()))]
    pub async fn transition_at(
        &self,
        id: Uuid,
        event: PickingOrderEvent,
        now: DateTime<Utc>,
    ) -> Result<PickingOrderDetail, ServiceError> {
        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;

        let order = db::for_update(picking_order::Entity::find_by_id(id), &txn)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Picking order {}", id)))?;
        let from = order.status()?;
        let mut items = order
            .find_related(picking_order_item::Entity)
            .order_by_asc(picking_order_item::Column::MaterialId)
            .all(&txn)
            .await?;

        let mut ready_at = order.ready_at;
        let mut movement = None;

        let to = match &event {
            PickingOrderEvent::StartPreparation => {
                let to = from.next(PickingEventKind::StartPreparation, false, id)?;
                let requested = requested_by_material(
                    items.iter().map(|item| (item.material_id, item.quantity_to_pick)),
                )?;
                for (material_id, quantity) in &requested {
                    warehouse_stock::lock_row(&txn, order.warehouse_id, *material_id).await?;
                    ensure_available(&txn, order.warehouse_id, *material_id, *quantity).await?;
                }
                to
            }
            PickingOrderEvent::MarkReady { staged_item_ids } => {
                let to = from.next(PickingEventKind::MarkReady, false, id)?;
                let staged: HashSet<Uuid> = staged_item_ids.iter().copied().collect();
                let all: HashSet<Uuid> = items.iter().map(|item| item.id).collect();
                if staged != all {
                    return Err(ServiceError::ValidationError(format!(
                        "every item must be staged before order {} is ready ({} of {} staged)",
                        id,
                        staged.intersection(&all).count(),
                        all.len()
                    )));
                }
                ready_at = Some(now);
                to
            }
            PickingOrderEvent::Withdraw(request) => {
                let (to, recorded) = self
                    .withdraw_in_txn(&txn, &order, from, &mut items, request)
                    .await?;
                movement = Some(recorded);
                to
            }
            PickingOrderEvent::Cancel => {
                let to = from.next(PickingEventKind::Cancel, false, id)?;
                if items.iter().any(|item| item.quantity_withdrawn > Decimal::ZERO) {
                    return Err(ServiceError::CancelAfterWithdrawalDenied(id));
                }
                to
            }
            PickingOrderEvent::Expire => {
                let to = from.next(PickingEventKind::Expire, false, id)?;
                if !is_overdue(order.ready_at, self.pickup_deadline, now) {
                    return Err(ServiceError::Conflict(format!(
                        "picking order {} has not reached its pickup deadline",
                        id
                    )));
                }
                to
            }
        };

        let result = picking_order::Entity::update_many()
            .col_expr(picking_order::Column::Status, Expr::value(to.to_string()))
            .col_expr(
                picking_order::Column::Version,
                Expr::col(picking_order::Column::Version).add(1),
            )
            .col_expr(picking_order::Column::ReadyAt, Expr::value(ready_at))
            .col_expr(picking_order::Column::UpdatedAt, Expr::value(now))
            .filter(picking_order::Column::Id.eq(id))
            .filter(picking_order::Column::Version.eq(order.version))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(id));
        }

        txn.commit().await?;

        self.cache.invalidate_many(
            order.warehouse_id,
            items.iter().map(|item| item.material_id),
        );
        if let Some(recorded) = &movement {
            self.ledger.publish_recorded(recorded).await;
        }
        self.event_sender
            .publish(Event::PickingOrderTransitioned {
                picking_order_id: id,
                from_status: from.to_string(),
                to_status: to.to_string(),
            })
            .await;
        info!(picking_order_id = %id, %from, %to, "Picking order transitioned");

        let order = picking_order::Model {
            status: to.to_string(),
            version: order.version + 1,
            ready_at,
            updated_at: now,
            ..order
        };
        Ok(PickingOrderDetail {
            order,
            items,
            movement,
        })
    }

    /// Withdrawal guards and effects. The item's remaining quantity is checked
    /// first so that a withdrawal racing a completed order reports
    /// `OverWithdrawal` rather than a state error.
    async fn withdraw_in_txn<C>(
        &self,
        txn: &C,
        order: &picking_order::Model,
        from: PickingOrderStatus,
        items: &mut [picking_order_item::Model],
        request: &WithdrawalRequest,
    ) -> Result<(PickingOrderStatus, stock_movement::Model), ServiceError>
    where
        C: ConnectionTrait,
    {
        if request.quantity <= Decimal::ZERO {
            return Err(ServiceError::InvalidQuantity(format!(
                "withdrawal quantity must be positive, got {}",
                request.quantity
            )));
        }
        check_quantity_scale(request.quantity)?;
        let position = items
            .iter()
            .position(|item| item.id == request.item_id)
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Item {} on picking order {}",
                    request.item_id, order.id
                ))
            })?;
        let item = items[position].clone();
        if request.quantity > item.remaining() {
            return Err(ServiceError::OverWithdrawal {
                item_id: item.id,
                requested: request.quantity,
                remaining: item.remaining(),
            });
        }

        let withdrawn_after = item.quantity_withdrawn + request.quantity;
        let all_items_withdrawn = items.iter().all(|other| {
            if other.id == item.id {
                withdrawn_after >= other.quantity_to_pick
            } else {
                other.is_fully_withdrawn()
            }
        });
        let to = from.next(PickingEventKind::Withdraw, all_items_withdrawn, order.id)?;

        let row = warehouse_stock::lock_row(txn, order.warehouse_id, item.material_id).await?;
        match row.on_hand() {
            Some(on_hand) if on_hand >= request.quantity => {}
            on_hand => {
                return Err(ServiceError::InsufficientOnHand {
                    material_id: item.material_id,
                    requested: request.quantity,
                    on_hand,
                })
            }
        }

        let guarded = picking_order_item::Entity::update_many()
            .col_expr(
                picking_order_item::Column::QuantityWithdrawn,
                Expr::col(picking_order_item::Column::QuantityWithdrawn).add(request.quantity),
            )
            .filter(picking_order_item::Column::Id.eq(item.id))
            .filter(
                Expr::col(picking_order_item::Column::QuantityWithdrawn).lte(
                    Expr::col(picking_order_item::Column::QuantityToPick).sub(request.quantity),
                ),
            )
            .exec(txn)
            .await?;
        if guarded.rows_affected == 0 {
            return Err(ServiceError::OverWithdrawal {
                item_id: item.id,
                requested: request.quantity,
                remaining: item.remaining(),
            });
        }

        let collector = request.collector.or(Collector::from_parts(
            order.be_collected_by_user_id,
            order.be_collected_by_worker_id,
        )?);
        let movement = self
            .ledger
            .append_in_txn(
                txn,
                NewMovement::new(
                    order.warehouse_id,
                    item.material_id,
                    codes::OUT_SERVICE_USAGE,
                    request.quantity,
                    request.processed_by_user_id,
                )
                .with_origin(MovementOrigin::PickingOrderItem(item.id))
                .with_collector(collector)
                .with_unit_price(item.unit_price),
            )
            .await?;

        items[position].quantity_withdrawn = withdrawn_after;
        debug!(item_id = %item.id, %withdrawn_after, "Item withdrawal recorded");
        Ok((to, movement))
    }

    #[instrument(skip(self))]
    pub async fn get_picking_order(&self, id: Uuid) -> Result<PickingOrderDetail, ServiceError> {
        let db = self.db_pool.as_ref();
        let order = picking_order::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Picking order {}", id)))?;
        let items = order
            .find_related(picking_order_item::Entity)
            .order_by_asc(picking_order_item::Column::MaterialId)
            .all(db)
            .await?;
        Ok(PickingOrderDetail {
            order,
            items,
            movement: None,
        })
    }

    /// Returns one page of orders, newest first, and the total count.
    #[instrument(skip(self))]
    pub async fn list_picking_orders(
        &self,
        filter: PickingOrderFilter,
    ) -> Result<(Vec<picking_order::Model>, u64), ServiceError> {
        let mut select = picking_order::Entity::find();
        if let Some(warehouse_id) = filter.warehouse_id {
            select = select.filter(picking_order::Column::WarehouseId.eq(warehouse_id));
        }
        if let Some(status) = filter.status {
            select = select.filter(picking_order::Column::Status.eq(status.to_string()));
        }

        let paginator = select
            .order_by_desc(picking_order::Column::CreatedAt)
            .paginate(self.db_pool.as_ref(), filter.per_page.max(1));
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(filter.page.saturating_sub(1)).await?;
        Ok((orders, total))
    }

    /// Sum of `OUT` movements linked to a picking item, straight from the ledger.
    pub async fn withdrawn_from_ledger(&self, item_id: Uuid) -> Result<Decimal, ServiceError> {
        let movements = stock_movement::Entity::find()
            .filter(stock_movement::Column::PickingOrderItemId.eq(item_id))
            .all(self.db_pool.as_ref())
            .await?;
        let catalog = self.ledger.catalog();
        let mut total = Decimal::ZERO;
        for movement in movements {
            if catalog.by_id(movement.movement_type_id)?.effect == StockEffect::Decrease {
                total += movement.quantity;
            }
        }
        Ok(total)
    }

    /// Expires every ready or partially withdrawn order whose pickup deadline
    /// has passed. Orders that change concurrently are skipped.
    #[instrument(skip(self))]
    pub async fn expire_overdue_orders(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let candidates = picking_order::Entity::find()
            .filter(picking_order::Column::Status.is_in([
                PickingOrderStatus::ReadyForPickup.to_string(),
                PickingOrderStatus::PartiallyWithdrawn.to_string(),
            ]))
            .all(self.db_pool.as_ref())
            .await?;

        let mut expired = 0;
        for order in candidates
            .into_iter()
            .filter(|order| is_overdue(order.ready_at, self.pickup_deadline, now))
        {
            match self
                .transition_at(order.id, PickingOrderEvent::Expire, now)
                .await
            {
                Ok(_) => expired += 1,
                Err(e) => warn!(picking_order_id = %order.id, error = %e, "Could not expire picking order"),
            }
        }

        if expired > 0 {
            info!(expired, "Expired overdue picking orders");
        }
        Ok(expired)
    }

    /// Runs [`Self::expire_overdue_orders`] every `interval` until the task is aborted.
    pub fn spawn_expiry_sweeper(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.expire_overdue_orders(Utc::now()).await {
                    warn!(error = %e, "Expiry sweep failed");
                }
            }
        })
    }
}
