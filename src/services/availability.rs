//! Availability = on hand − open restrictions − open picking reservations.
//!
//! Guards call [`availability_in`] inside their own transaction after locking
//! the projection row. [`AvailabilityService`] is the read-only variant used
//! for display and may serve a slightly stale value from a short-lived cache.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::Serialize;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::entities::picking_order::{self, PickingOrderStatus};
use crate::entities::quantity::{serialize_optional_quantity, serialize_quantity};
use crate::entities::restriction_order::{self, RestrictionOrderStatus};
use crate::entities::{picking_order_item, restriction_order_item};
use crate::errors::ServiceError;
use crate::services::warehouse_stock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Availability {
    #[serde(serialize_with = "serialize_optional_quantity")]
    pub on_hand: Option<Decimal>,
    /// Sum over items of OPEN restriction orders.
    #[serde(serialize_with = "serialize_quantity")]
    pub restricted: Decimal,
    /// Unwithdrawn quantity of picking orders that hold stock.
    #[serde(serialize_with = "serialize_quantity")]
    pub reserved: Decimal,
    #[serde(serialize_with = "serialize_optional_quantity")]
    pub available_to_reserve: Option<Decimal>,
}

impl Availability {
    pub fn new(on_hand: Option<Decimal>, restricted: Decimal, reserved: Decimal) -> Self {
        Self {
            on_hand,
            restricted,
            reserved,
            available_to_reserve: available_to_reserve(on_hand, restricted, reserved),
        }
    }

    /// Whether `requested` fits. Unknown on-hand never fits.
    pub fn covers(&self, requested: Decimal) -> bool {
        matches!(self.available_to_reserve, Some(available) if available >= requested)
    }
}

pub fn available_to_reserve(
    on_hand: Option<Decimal>,
    restricted: Decimal,
    reserved: Decimal,
) -> Option<Decimal> {
    on_hand.map(|on_hand| on_hand - restricted - reserved)
}

/// Computes availability on `conn`, typically an open transaction that
/// already holds the projection row lock.
pub async fn availability_in<C>(
    conn: &C,
    warehouse_id: Uuid,
    material_id: Uuid,
) -> Result<Availability, ServiceError>
where
    C: ConnectionTrait,
{
    let on_hand = warehouse_stock::find(conn, warehouse_id, material_id)
        .await?
        .and_then(|row| row.on_hand());
    let restricted = restricted_in(conn, warehouse_id, material_id).await?;
    let reserved = reserved_in(conn, warehouse_id, material_id).await?;
    Ok(Availability::new(on_hand, restricted, reserved))
}

/// Fails with `InsufficientAvailability` unless `requested` fits.
pub async fn ensure_available<C>(
    conn: &C,
    warehouse_id: Uuid,
    material_id: Uuid,
    requested: Decimal,
) -> Result<Availability, ServiceError>
where
    C: ConnectionTrait,
{
    let availability = availability_in(conn, warehouse_id, material_id).await?;
    if availability.covers(requested) {
        Ok(availability)
    } else {
        Err(ServiceError::InsufficientAvailability {
            material_id,
            requested,
            available: availability.available_to_reserve,
        })
    }
}

async fn restricted_in<C>(conn: &C, warehouse_id: Uuid, material_id: Uuid) -> Result<Decimal, ServiceError>
where
    C: ConnectionTrait,
{
    let items = restriction_order_item::Entity::find()
        .inner_join(restriction_order::Entity)
        .filter(restriction_order::Column::WarehouseId.eq(warehouse_id))
        .filter(restriction_order::Column::Status.eq(RestrictionOrderStatus::Open.as_ref()))
        .filter(restriction_order_item::Column::MaterialId.eq(material_id))
        .all(conn)
        .await?;
    Ok(items.iter().map(|item| item.quantity_restricted).sum())
}

async fn reserved_in<C>(conn: &C, warehouse_id: Uuid, material_id: Uuid) -> Result<Decimal, ServiceError>
where
    C: ConnectionTrait,
{
    let holding: Vec<String> = PickingOrderStatus::HOLDING
        .iter()
        .map(|status| status.to_string())
        .collect();
    let items = picking_order_item::Entity::find()
        .inner_join(picking_order::Entity)
        .filter(picking_order::Column::WarehouseId.eq(warehouse_id))
        .filter(picking_order::Column::Status.is_in(holding))
        .filter(picking_order_item::Column::MaterialId.eq(material_id))
        .all(conn)
        .await?;
    Ok(items.iter().map(|item| item.remaining()).sum())
}

#[derive(Debug, Clone)]
struct CachedAvailability {
    value: Availability,
    stored_at: Instant,
}

/// Display cache keyed by (warehouse, material). Writers invalidate the pair
/// after commit; readers tolerate values up to `ttl` old.
#[derive(Debug, Clone)]
pub struct AvailabilityCache {
    entries: Arc<DashMap<(Uuid, Uuid), CachedAvailability>>,
    ttl: Duration,
}

impl AvailabilityCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn get(&self, warehouse_id: Uuid, material_id: Uuid) -> Option<Availability> {
        if self.ttl.is_zero() {
            return None;
        }
        let key = (warehouse_id, material_id);
        let fresh = self
            .entries
            .get(&key)
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.value);
        if fresh.is_none() {
            self.entries.remove(&key);
        }
        fresh
    }

    pub fn put(&self, warehouse_id: Uuid, material_id: Uuid, value: Availability) {
        if self.ttl.is_zero() {
            return;
        }
        self.entries.insert(
            (warehouse_id, material_id),
            CachedAvailability {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, warehouse_id: Uuid, material_id: Uuid) {
        self.entries.remove(&(warehouse_id, material_id));
    }

    pub fn invalidate_many<I>(&self, warehouse_id: Uuid, material_ids: I)
    where
        I: IntoIterator<Item = Uuid>,
    {
        for material_id in material_ids {
            self.invalidate(warehouse_id, material_id);
        }
    }
}

/// Read-side availability for dashboards and the stock summary endpoint.
#[derive(Clone)]
pub struct AvailabilityService {
    db_pool: Arc<DatabaseConnection>,
    cache: AvailabilityCache,
}

impl AvailabilityService {
    pub fn new(db_pool: Arc<DatabaseConnection>, cache: AvailabilityCache) -> Self {
        Self { db_pool, cache }
    }

    #[instrument(skip(self))]
    pub async fn availability(
        &self,
        warehouse_id: Uuid,
        material_id: Uuid,
    ) -> Result<Availability, ServiceError> {
        if let Some(cached) = self.cache.get(warehouse_id, material_id) {
            debug!("availability cache hit");
            return Ok(cached);
        }
        let value = availability_in(self.db_pool.as_ref(), warehouse_id, material_id).await?;
        self.cache.put(warehouse_id, material_id, value);
        Ok(value)
    }

    pub async fn available_to_reserve(
        &self,
        warehouse_id: Uuid,
        material_id: Uuid,
    ) -> Result<Option<Decimal>, ServiceError> {
        Ok(self
            .availability(warehouse_id, material_id)
            .await?
            .available_to_reserve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn unknown_on_hand_is_never_available() {
        let availability = Availability::new(None, dec!(0), dec!(0));
        assert_eq!(availability.available_to_reserve, None);
        assert!(!availability.covers(dec!(0)));
    }

    #[test]
    fn holds_reduce_availability() {
        let availability = Availability::new(Some(dec!(100)), dec!(15), dec!(30));
        assert_eq!(availability.available_to_reserve, Some(dec!(55)));
        assert!(availability.covers(dec!(55)));
        assert!(!availability.covers(dec!(56)));
    }

    #[test]
    fn cache_respects_ttl_and_invalidation() {
        let (w, m) = (Uuid::new_v4(), Uuid::new_v4());
        let value = Availability::new(Some(dec!(10)), dec!(0), dec!(0));

        let cache = AvailabilityCache::new(Duration::from_secs(60));
        cache.put(w, m, value);
        assert_eq!(cache.get(w, m), Some(value));
        cache.invalidate(w, m);
        assert_eq!(cache.get(w, m), None);

        let disabled = AvailabilityCache::new(Duration::ZERO);
        disabled.put(w, m, value);
        assert_eq!(disabled.get(w, m), None);
    }
}
