use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::quantity::serialize_quantity;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "restriction_order_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub restriction_order_id: Uuid,
    pub material_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    #[serde(serialize_with = "serialize_quantity")]
    pub quantity_restricted: Decimal,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::restriction_order::Entity",
        from = "Column::RestrictionOrderId",
        to = "super::restriction_order::Column::Id"
    )]
    RestrictionOrder,
}

impl Related<super::restriction_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RestrictionOrder.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
