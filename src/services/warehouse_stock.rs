//! Warehouse stock projection: one row per (warehouse, material) holding the
//! last counted baseline and the running in-minus-out balance since then.
//!
//! The free functions take any [`ConnectionTrait`] so the ledger can update
//! the projection inside the transaction that appends the movement.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, Func, OnConflict, SimpleExpr};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::db;
use crate::entities::quantity::{serialize_optional_quantity, serialize_quantity};
use crate::entities::{stock_movement, warehouse_stock};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::availability::{availability_in, AvailabilityCache};
use crate::services::movement_catalog::codes;
use crate::services::stock_ledger::{
    check_quantity_scale, check_references, NewMovement, StockLedgerService,
};

pub async fn find<C>(
    conn: &C,
    warehouse_id: Uuid,
    material_id: Uuid,
) -> Result<Option<warehouse_stock::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(warehouse_stock::Entity::find()
        .filter(warehouse_stock::Column::WarehouseId.eq(warehouse_id))
        .filter(warehouse_stock::Column::MaterialId.eq(material_id))
        .one(conn)
        .await?)
}

/// Creates the projection row if it does not exist yet. Concurrent callers
/// race on the unique (warehouse, material) index; the loser inserts nothing.
pub async fn ensure_row<C>(conn: &C, warehouse_id: Uuid, material_id: Uuid) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    let row = warehouse_stock::ActiveModel {
        id: Set(Uuid::new_v4()),
        warehouse_id: Set(warehouse_id),
        material_id: Set(material_id),
        initial_stock_quantity: Set(None),
        balance_in_minus_out: Set(None),
        reconciliation_flagged_at: Set(None),
        updated_at: Set(Utc::now()),
    };
    warehouse_stock::Entity::insert(row)
        .on_conflict(
            OnConflict::columns([
                warehouse_stock::Column::WarehouseId,
                warehouse_stock::Column::MaterialId,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;
    Ok(())
}

/// Ensures the row exists and takes its row lock for the rest of the
/// transaction.
pub async fn lock_row<C>(
    conn: &C,
    warehouse_id: Uuid,
    material_id: Uuid,
) -> Result<warehouse_stock::Model, ServiceError>
where
    C: ConnectionTrait,
{
    ensure_row(conn, warehouse_id, material_id).await?;
    let select = warehouse_stock::Entity::find()
        .filter(warehouse_stock::Column::WarehouseId.eq(warehouse_id))
        .filter(warehouse_stock::Column::MaterialId.eq(material_id));
    db::for_update(select, conn)
        .one(conn)
        .await?
        .ok_or_else(|| {
            ServiceError::InternalError(format!(
                "stock row for warehouse {} and material {} vanished after insert",
                warehouse_id, material_id
            ))
        })
}

/// `balance = COALESCE(balance, 0) + delta`, evaluated by the database.
pub async fn apply_delta<C>(conn: &C, row_id: Uuid, delta: Decimal) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    warehouse_stock::Entity::update_many()
        .col_expr(
            warehouse_stock::Column::BalanceInMinusOut,
            Expr::expr(Func::coalesce([
                SimpleExpr::from(Expr::col(warehouse_stock::Column::BalanceInMinusOut)),
                SimpleExpr::from(Expr::val(Decimal::ZERO)),
            ]))
            .add(delta),
        )
        .col_expr(warehouse_stock::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(warehouse_stock::Column::Id.eq(row_id))
        .exec(conn)
        .await?;
    Ok(())
}

/// A recount: the counted quantity becomes the baseline and the balance restarts.
pub async fn set_baseline<C>(conn: &C, row_id: Uuid, quantity: Decimal) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    warehouse_stock::Entity::update_many()
        .col_expr(
            warehouse_stock::Column::InitialStockQuantity,
            Expr::value(Some(quantity)),
        )
        .col_expr(
            warehouse_stock::Column::BalanceInMinusOut,
            Expr::value(Some(Decimal::ZERO)),
        )
        .col_expr(warehouse_stock::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(warehouse_stock::Column::Id.eq(row_id))
        .exec(conn)
        .await?;
    Ok(())
}

pub async fn set_flag<C>(
    conn: &C,
    row_id: Uuid,
    flagged_at: Option<DateTime<Utc>>,
) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    warehouse_stock::Entity::update_many()
        .col_expr(
            warehouse_stock::Column::ReconciliationFlaggedAt,
            Expr::value(flagged_at),
        )
        .filter(warehouse_stock::Column::Id.eq(row_id))
        .exec(conn)
        .await?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct StockSummary {
    pub warehouse_id: Uuid,
    pub material_id: Uuid,
    #[serde(serialize_with = "serialize_optional_quantity")]
    pub initial_stock_quantity: Option<Decimal>,
    #[serde(serialize_with = "serialize_optional_quantity")]
    pub balance_in_minus_out: Option<Decimal>,
    #[serde(serialize_with = "serialize_optional_quantity")]
    pub on_hand: Option<Decimal>,
    #[serde(serialize_with = "serialize_quantity")]
    pub restricted: Decimal,
    #[serde(serialize_with = "serialize_quantity")]
    pub reserved: Decimal,
    #[serde(serialize_with = "serialize_optional_quantity")]
    pub available_to_reserve: Option<Decimal>,
    pub reconciliation_flagged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BaselineRequest {
    pub warehouse_id: Uuid,
    pub material_id: Uuid,
    pub quantity: Decimal,
    pub processed_by_user_id: Uuid,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BaselineOutcome {
    /// The recount movement, or `None` when the baseline was already in place.
    pub movement: Option<stock_movement::Model>,
    #[serde(serialize_with = "serialize_quantity")]
    pub on_hand: Decimal,
}

#[derive(Clone)]
pub struct WarehouseStockService {
    db_pool: Arc<DatabaseConnection>,
    ledger: StockLedgerService,
    cache: AvailabilityCache,
    event_sender: EventSender,
}

impl WarehouseStockService {
    pub fn new(
        db_pool: Arc<DatabaseConnection>,
        ledger: StockLedgerService,
        cache: AvailabilityCache,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db_pool,
            ledger,
            cache,
            event_sender,
        }
    }

    /// On-hand quantity, or `None` if the pair has never been counted.
    #[instrument(skip(self))]
    pub async fn get_on_hand(
        &self,
        warehouse_id: Uuid,
        material_id: Uuid,
    ) -> Result<Option<Decimal>, ServiceError> {
        Ok(find(self.db_pool.as_ref(), warehouse_id, material_id)
            .await?
            .and_then(|row| row.on_hand()))
    }

    #[instrument(skip(self))]
    pub async fn get_stock_summary(
        &self,
        warehouse_id: Uuid,
        material_id: Uuid,
    ) -> Result<StockSummary, ServiceError> {
        let db = self.db_pool.as_ref();
        check_references(db, warehouse_id, material_id).await?;

        let row = find(db, warehouse_id, material_id).await?;
        let availability = availability_in(db, warehouse_id, material_id).await?;

        Ok(StockSummary {
            warehouse_id,
            material_id,
            initial_stock_quantity: row.as_ref().and_then(|r| r.initial_stock_quantity),
            balance_in_minus_out: row.as_ref().and_then(|r| r.balance_in_minus_out),
            on_hand: availability.on_hand,
            restricted: availability.restricted,
            reserved: availability.reserved,
            available_to_reserve: availability.available_to_reserve,
            reconciliation_flagged_at: row.and_then(|r| r.reconciliation_flagged_at),
        })
    }

    /// Records a physical count. Repeating the same count with nothing in
    /// between writes nothing.
    #[instrument(skip(self))]
    pub async fn initialize_baseline(
        &self,
        request: BaselineRequest,
    ) -> Result<BaselineOutcome, ServiceError> {
        request.validate()?;
        if request.quantity.is_sign_negative() {
            return Err(ServiceError::InvalidQuantity(format!(
                "baseline must not be negative, got {}",
                request.quantity
            )));
        }
        check_quantity_scale(request.quantity)?;

        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;

        check_references(&txn, request.warehouse_id, request.material_id).await?;
        let row = lock_row(&txn, request.warehouse_id, request.material_id).await?;
        if row.initial_stock_quantity == Some(request.quantity)
            && row.balance_in_minus_out.unwrap_or(Decimal::ZERO).is_zero()
            && !row.is_flagged()
        {
            txn.commit().await?;
            info!("Baseline already at {}; nothing to record", request.quantity);
            return Ok(BaselineOutcome {
                movement: None,
                on_hand: request.quantity,
            });
        }

        let movement = self
            .ledger
            .append_in_txn(
                &txn,
                NewMovement::new(
                    request.warehouse_id,
                    request.material_id,
                    codes::ADJUSTMENT_RECOUNT,
                    request.quantity,
                    request.processed_by_user_id,
                )
                .with_notes(request.notes.clone()),
            )
            .await?;

        txn.commit().await?;

        self.cache
            .invalidate(request.warehouse_id, request.material_id);
        self.ledger.publish_recorded(&movement).await;
        self.event_sender
            .publish(Event::BaselineInitialized {
                warehouse_id: request.warehouse_id,
                material_id: request.material_id,
                quantity: request.quantity,
            })
            .await;

        info!(
            movement_id = movement.id,
            "Baseline for warehouse {} material {} set to {}",
            request.warehouse_id,
            request.material_id,
            request.quantity
        );

        Ok(BaselineOutcome {
            movement: Some(movement),
            on_hand: request.quantity,
        })
    }
}
