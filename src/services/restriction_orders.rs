use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    ModelTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::db;
use crate::entities::quantity::serialize_quantity;
use crate::entities::restriction_order::{self, RestrictionOrderStatus};
use crate::entities::{restriction_order_item, stock_movement};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::availability::{ensure_available, AvailabilityCache};
use crate::services::movement_catalog::codes;
use crate::services::stock_ledger::{
    check_material, check_quantity_scale, check_warehouse, MovementOrigin, NewMovement,
    StockLedgerService,
};
use crate::services::warehouse_stock;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewRestrictionItem {
    pub material_id: Uuid,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewRestrictionOrder {
    pub warehouse_id: Uuid,
    #[validate(length(min = 1))]
    pub items: Vec<NewRestrictionItem>,
    pub processed_by_user_id: Uuid,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestrictionOrderDetail {
    #[serde(flatten)]
    pub order: restriction_order::Model,
    pub items: Vec<restriction_order_item::Model>,
    /// Sum of the item quantities.
    #[serde(serialize_with = "serialize_quantity")]
    pub quantity_restricted: Decimal,
}

impl RestrictionOrderDetail {
    fn new(order: restriction_order::Model, items: Vec<restriction_order_item::Model>) -> Self {
        let quantity_restricted = items.iter().map(|i| i.quantity_restricted).sum();
        Self {
            order,
            items,
            quantity_restricted,
        }
    }
}

/// Sums requested quantities per material. The map's order is the lock order.
pub(crate) fn requested_by_material<I>(items: I) -> Result<BTreeMap<Uuid, Decimal>, ServiceError>
where
    I: IntoIterator<Item = (Uuid, Decimal)>,
{
    let mut requested = BTreeMap::new();
    for (material_id, quantity) in items {
        if quantity <= Decimal::ZERO {
            return Err(ServiceError::InvalidQuantity(format!(
                "quantity for material {} must be positive, got {}",
                material_id, quantity
            )));
        }
        check_quantity_scale(quantity)?;
        *requested.entry(material_id).or_insert(Decimal::ZERO) += quantity;
    }
    Ok(requested)
}

#[derive(Clone)]
pub struct RestrictionOrderService {
    db_pool: Arc<DatabaseConnection>,
    ledger: StockLedgerService,
    cache: AvailabilityCache,
    event_sender: EventSender,
}

impl RestrictionOrderService {
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

    /// Holds `quantity` of one material.
    pub async fn open_restriction_order(
        &self,
        warehouse_id: Uuid,
        material_id: Uuid,
        quantity: Decimal,
        processed_by_user_id: Uuid,
    ) -> Result<RestrictionOrderDetail, ServiceError> {
        self.open_restriction_order_with_items(NewRestrictionOrder {
            warehouse_id,
            items: vec![NewRestrictionItem {
                material_id,
                quantity,
            }],
            processed_by_user_id,
            notes: None,
        })
        .await
    }

    #[instrument(skip(self), fields(warehouse_id = %request.warehouse_id))]
    pub async fn open_restriction_order_with_items(
        &self,
        request: NewRestrictionOrder,
    ) -> Result<RestrictionOrderDetail, ServiceError> {
        request.validate()?;
        let requested =
            requested_by_material(request.items.iter().map(|i| (i.material_id, i.quantity)))?;

        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;

        check_warehouse(&txn, request.warehouse_id).await?;
        for (material_id, quantity) in &requested {
            check_material(&txn, *material_id).await?;
            warehouse_stock::lock_row(&txn, request.warehouse_id, *material_id).await?;
            ensure_available(&txn, request.warehouse_id, *material_id, *quantity).await?;
        }

        let now = Utc::now();
        let order = restriction_order::ActiveModel {
            id: Set(Uuid::new_v4()),
            warehouse_id: Set(request.warehouse_id),
            status: Set(RestrictionOrderStatus::Open.to_string()),
            notes: Set(request.notes.clone()),
            processed_by_user_id: Set(request.processed_by_user_id),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let saved = restriction_order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                restriction_order_id: Set(order.id),
                material_id: Set(item.material_id),
                quantity_restricted: Set(item.quantity),
            }
            .insert(&txn)
            .await?;
            items.push(saved);
        }

        txn.commit().await?;

        self.cache
            .invalidate_many(order.warehouse_id, requested.keys().copied());
        self.publish_status(&order).await;
        info!(restriction_order_id = %order.id, "Restriction order opened");

        Ok(RestrictionOrderDetail::new(order, items))
    }

    /// Lifts the hold without touching stock.
    #[instrument(skip(self))]
    pub async fn release(&self, id: Uuid) -> Result<RestrictionOrderDetail, ServiceError> {
        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;

        let order = self.load_for_update(&txn, id).await?;
        Self::ensure_open(&order, "release")?;
        let items = order
            .find_related(restriction_order_item::Entity)
            .all(&txn)
            .await?;
        let updated = self
            .set_status(&txn, order, RestrictionOrderStatus::Released)
            .await?;

        txn.commit().await?;

        self.cache.invalidate_many(
            updated.warehouse_id,
            items.iter().map(|item| item.material_id),
        );
        self.publish_status(&updated).await;
        info!(restriction_order_id = %id, "Restriction order released");

        Ok(RestrictionOrderDetail::new(updated, items))
    }

    /// Writes the held quantity off through the ledger, one movement per item.
    #[instrument(skip(self))]
    pub async fn consume(
        &self,
        id: Uuid,
        processed_by_user_id: Uuid,
    ) -> Result<RestrictionOrderDetail, ServiceError> {
        let db = self.db_pool.as_ref();
        let txn = db.begin().await?;

        let order = self.load_for_update(&txn, id).await?;
        Self::ensure_open(&order, "consume")?;
        let items = order
            .find_related(restriction_order_item::Entity)
            .order_by_asc(restriction_order_item::Column::MaterialId)
            .all(&txn)
            .await?;

        let mut movements: Vec<stock_movement::Model> = Vec::with_capacity(items.len());
        for item in &items {
            let movement = self
                .ledger
                .append_in_txn(
                    &txn,
                    NewMovement::new(
                        order.warehouse_id,
                        item.material_id,
                        codes::OUT_RESTRICTION_WRITE_OFF,
                        item.quantity_restricted,
                        processed_by_user_id,
                    )
                    .with_origin(MovementOrigin::RestrictionOrderItem(item.id)),
                )
                .await?;
            movements.push(movement);
        }

        let updated = self
            .set_status(&txn, order, RestrictionOrderStatus::Consumed)
            .await?;

        txn.commit().await?;

        self.cache.invalidate_many(
            updated.warehouse_id,
            items.iter().map(|item| item.material_id),
        );
        for movement in &movements {
            self.ledger.publish_recorded(movement).await;
        }
        self.publish_status(&updated).await;
        info!(
            restriction_order_id = %id,
            movements = movements.len(),
            "Restriction order consumed"
        );

        Ok(RestrictionOrderDetail::new(updated, items))
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<RestrictionOrderDetail, ServiceError> {
        let db = self.db_pool.as_ref();
        let order = restriction_order::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Restriction order {}", id)))?;
        let items = order
            .find_related(restriction_order_item::Entity)
            .all(db)
            .await?;
        Ok(RestrictionOrderDetail::new(order, items))
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        warehouse_id: Uuid,
        status: Option<RestrictionOrderStatus>,
    ) -> Result<Vec<restriction_order::Model>, ServiceError> {
        let mut select = restriction_order::Entity::find()
            .filter(restriction_order::Column::WarehouseId.eq(warehouse_id));
        if let Some(status) = status {
            select = select.filter(restriction_order::Column::Status.eq(status.to_string()));
        }
        Ok(select
            .order_by_desc(restriction_order::Column::CreatedAt)
            .all(self.db_pool.as_ref())
            .await?)
    }

    async fn load_for_update<C>(&self, txn: &C, id: Uuid) -> Result<restriction_order::Model, ServiceError>
    where
        C: ConnectionTrait,
    {
        db::for_update(restriction_order::Entity::find_by_id(id), txn)
            .one(txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Restriction order {}", id)))
    }

    fn ensure_open(order: &restriction_order::Model, event: &str) -> Result<(), ServiceError> {
        let status = order.status()?;
        if status == RestrictionOrderStatus::Open {
            Ok(())
        } else {
            Err(ServiceError::InvalidTransition {
                from: status.to_string(),
                event: event.to_string(),
            })
        }
    }

    /// Moves an OPEN order to `status`. The status filter makes a lost race
    /// visible as zero affected rows.
    async fn set_status<C>(
        &self,
        txn: &C,
        order: restriction_order::Model,
        status: RestrictionOrderStatus,
    ) -> Result<restriction_order::Model, ServiceError>
    where
        C: ConnectionTrait,
    {
        let now = Utc::now();
        let result = restriction_order::Entity::update_many()
            .col_expr(restriction_order::Column::Status, Expr::value(status.to_string()))
            .col_expr(restriction_order::Column::UpdatedAt, Expr::value(now))
            .filter(restriction_order::Column::Id.eq(order.id))
            .filter(restriction_order::Column::Status.eq(RestrictionOrderStatus::Open.to_string()))
            .exec(txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(order.id));
        }
        Ok(restriction_order::Model {
            status: status.to_string(),
            updated_at: now,
            ..order
        })
    }

    async fn publish_status(&self, order: &restriction_order::Model) {
        self.event_sender
            .publish(Event::RestrictionOrderChanged {
                restriction_order_id: order.id,
                status: order.status.clone(),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    #[test]
    fn requested_quantities_are_summed_per_material_in_id_order() {
        let (a, b) = (Uuid::from_u128(1), Uuid::from_u128(2));
        let requested =
            requested_by_material([(b, dec!(3)), (a, dec!(1)), (b, dec!(2))]).unwrap();
        assert_eq!(requested.keys().copied().collect::<Vec<_>>(), vec![a, b]);
        assert_eq!(requested[&b], dec!(5));
    }

    #[test]
    fn non_positive_quantities_are_rejected() {
        assert_matches!(
            requested_by_material([(Uuid::nil(), dec!(0))]),
            Err(ServiceError::InvalidQuantity(_))
        );
        assert_matches!(
            requested_by_material([(Uuid::nil(), dec!(-1))]),
            Err(ServiceError::InvalidQuantity(_))
        );
    }
}
