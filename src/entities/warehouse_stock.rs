use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::quantity::serialize_optional_quantity;

/// Per (warehouse, material) projection of the ledger.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "warehouse_stocks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub warehouse_id: Uuid,
    pub material_id: Uuid,
    /// Baseline set by the last recount; `None` until the pair is counted.
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    #[serde(serialize_with = "serialize_optional_quantity")]
    pub initial_stock_quantity: Option<Decimal>,
    /// Signed sum of movements since the baseline.
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    #[serde(serialize_with = "serialize_optional_quantity")]
    pub balance_in_minus_out: Option<Decimal>,
    /// Set when reconciliation found the projection out of step with the ledger.
    pub reconciliation_flagged_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn on_hand(&self) -> Option<Decimal> {
        on_hand(self.initial_stock_quantity, self.balance_in_minus_out)
    }

    pub fn is_flagged(&self) -> bool {
        self.reconciliation_flagged_at.is_some()
    }
}

/// On-hand quantity of a projection row. An unset baseline means the pair
/// was never counted, so the result is unknown even if movements exist.
pub fn on_hand(initial: Option<Decimal>, balance: Option<Decimal>) -> Option<Decimal> {
    initial.map(|baseline| baseline + balance.unwrap_or(Decimal::ZERO))
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::warehouse::Entity",
        from = "Column::WarehouseId",
        to = "super::warehouse::Column::Id"
    )]
    Warehouse,
    #[sea_orm(
        belongs_to = "super::material::Entity",
        from = "Column::MaterialId",
        to = "super::material::Column::Id"
    )]
    Material,
}

impl Related<super::warehouse::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Warehouse.def()
    }
}

impl Related<super::material::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Material.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
