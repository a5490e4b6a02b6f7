use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::quantity::{serialize_optional_quantity, serialize_quantity};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "picking_order_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub picking_order_id: Uuid,
    pub material_id: Uuid,
    pub material_instance_id: Option<Uuid>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    #[serde(serialize_with = "serialize_quantity")]
    pub quantity_to_pick: Decimal,
    /// Mirrors the sum of `OUT` movements linked to this item.
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    #[serde(serialize_with = "serialize_quantity")]
    pub quantity_withdrawn: Decimal,
    pub material_request_item_id: Option<Uuid>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    #[serde(serialize_with = "serialize_optional_quantity")]
    pub unit_price: Option<Decimal>,
}

impl Model {
    pub fn remaining(&self) -> Decimal {
        (self.quantity_to_pick - self.quantity_withdrawn).max(Decimal::ZERO)
    }

    pub fn is_fully_withdrawn(&self) -> bool {
        self.quantity_withdrawn >= self.quantity_to_pick
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::picking_order::Entity",
        from = "Column::PickingOrderId",
        to = "super::picking_order::Column::Id"
    )]
    PickingOrder,
}

impl Related<super::picking_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PickingOrder.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
