use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};

use super::quantity::{serialize_optional_quantity, serialize_quantity};

/// Decimal places stored by every quantity column.
pub const QUANTITY_SCALE: u32 = 4;

/// One ledger entry. Rows are append-only: corrections are new `ADJUSTMENT`
/// rows, never edits.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    /// Ledger sequence; strictly increasing in insertion order.
    #[sea_orm(primary_key)]
    pub id: i64,
    pub warehouse_id: Uuid,
    pub material_id: Uuid,
    pub movement_type_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    #[serde(serialize_with = "serialize_quantity")]
    pub quantity: Decimal,
    pub movement_date: DateTime<Utc>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    #[serde(serialize_with = "serialize_optional_quantity")]
    pub unit_price: Option<Decimal>,
    pub processed_by_user_id: Uuid,
    pub collected_by_user_id: Option<Uuid>,
    pub collected_by_worker_id: Option<Uuid>,
    pub maintenance_request_id: Option<Uuid>,
    pub picking_order_item_id: Option<Uuid>,
    pub restriction_order_item_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::movement_type::Entity",
        from = "Column::MovementTypeId",
        to = "super::movement_type::Column::Id"
    )]
    MovementType,
}

impl Related<super::movement_type::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MovementType.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        if !insert {
            return Err(DbErr::Custom(
                "stock movements are append-only and cannot be updated".to_string(),
            ));
        }
        let mut active_model = self;
        if let ActiveValue::NotSet = active_model.created_at {
            active_model.created_at = Set(Utc::now());
        }
        Ok(active_model)
    }

    async fn before_delete<C>(self, _db: &C) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        Err(DbErr::Custom(
            "stock movements are append-only and cannot be deleted".to_string(),
        ))
    }
}
