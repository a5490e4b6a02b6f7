//! Registry of movement types, loaded once at startup.
//!
//! Movement types are rows with an open-ended `code`, but every code maps onto
//! a closed [`Operation`] and, for adjustments, an [`AdjustmentDirection`].
//! The pair is folded into a [`StockEffect`] here so the rest of the crate
//! never branches on code strings.

use std::collections::HashMap;

use rust_decimal::Decimal;
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::movement_type::{self, AdjustmentDirection, Operation};
use crate::errors::ServiceError;

/// Well-known codes the service itself emits.
pub mod codes {
    pub const OUT_SERVICE_USAGE: &str = "OUT_SERVICE_USAGE";
    pub const OUT_RESTRICTION_WRITE_OFF: &str = "OUT_RESTRICTION_WRITE_OFF";
    pub const ADJUSTMENT_RECOUNT: &str = "ADJUSTMENT_RECOUNT";
}

/// How a movement changes the projection of its pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StockEffect {
    Increase,
    Decrease,
    /// Replaces the baseline and zeroes the running balance.
    Baseline,
    /// Holds never appear in the ledger.
    None,
}

impl StockEffect {
    pub fn from_parts(
        operation: Operation,
        direction: Option<AdjustmentDirection>,
    ) -> Option<StockEffect> {
        match (operation, direction) {
            (Operation::In, None) => Some(StockEffect::Increase),
            (Operation::Out, None) => Some(StockEffect::Decrease),
            (Operation::Adjustment, Some(AdjustmentDirection::Increase)) => {
                Some(StockEffect::Increase)
            }
            (Operation::Adjustment, Some(AdjustmentDirection::Decrease)) => {
                Some(StockEffect::Decrease)
            }
            (Operation::Adjustment, Some(AdjustmentDirection::Baseline)) => {
                Some(StockEffect::Baseline)
            }
            (Operation::Reservation | Operation::Restriction, None) => Some(StockEffect::None),
            _ => None,
        }
    }

    /// Contribution of `quantity` to `balance_in_minus_out`. Baselines and
    /// holds contribute nothing.
    pub fn signed(self, quantity: Decimal) -> Decimal {
        match self {
            StockEffect::Increase => quantity,
            StockEffect::Decrease => -quantity,
            StockEffect::Baseline | StockEffect::None => Decimal::ZERO,
        }
    }

    pub fn moves_stock(self) -> bool {
        self != StockEffect::None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementTypeEntry {
    pub id: Uuid,
    pub code: String,
    pub operation: Operation,
    pub adjustment_direction: Option<AdjustmentDirection>,
    pub effect: StockEffect,
    pub description: Option<String>,
}

impl TryFrom<movement_type::Model> for MovementTypeEntry {
    type Error = ServiceError;

    fn try_from(model: movement_type::Model) -> Result<Self, Self::Error> {
        let operation: Operation = model.operation.parse().map_err(|_| {
            ServiceError::InternalError(format!(
                "movement type {} has unknown operation {}",
                model.code, model.operation
            ))
        })?;
        let adjustment_direction = model
            .adjustment_direction
            .as_deref()
            .map(str::parse::<AdjustmentDirection>)
            .transpose()
            .map_err(|_| {
                ServiceError::InternalError(format!(
                    "movement type {} has unknown adjustment direction",
                    model.code
                ))
            })?;
        let effect = StockEffect::from_parts(operation, adjustment_direction).ok_or_else(|| {
            ServiceError::InternalError(format!(
                "movement type {}: adjustment direction is required for ADJUSTMENT and forbidden otherwise",
                model.code
            ))
        })?;

        Ok(Self {
            id: model.id,
            code: model.code,
            operation,
            adjustment_direction,
            effect,
            description: model.description,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct MovementTypeCatalog {
    by_code: HashMap<String, MovementTypeEntry>,
    by_id: HashMap<Uuid, String>,
}

impl MovementTypeCatalog {
    /// Reads every movement type row. Fails if any row is malformed.
    #[instrument(skip(db))]
    pub async fn load(db: &DatabaseConnection) -> Result<Self, ServiceError> {
        let rows = movement_type::Entity::find().all(db).await?;
        let catalog = Self::from_models(rows)?;
        info!("Loaded {} movement types", catalog.len());
        Ok(catalog)
    }

    pub fn from_models(rows: Vec<movement_type::Model>) -> Result<Self, ServiceError> {
        let mut catalog = Self::default();
        for row in rows {
            let entry = MovementTypeEntry::try_from(row)?;
            catalog.by_id.insert(entry.id, entry.code.clone());
            catalog.by_code.insert(entry.code.clone(), entry);
        }
        Ok(catalog)
    }

    pub fn resolve(&self, code: &str) -> Result<&MovementTypeEntry, ServiceError> {
        self.by_code
            .get(code)
            .ok_or_else(|| ServiceError::UnknownMovementType(code.to_string()))
    }

    pub fn by_id(&self, id: Uuid) -> Result<&MovementTypeEntry, ServiceError> {
        self.by_id
            .get(&id)
            .and_then(|code| self.by_code.get(code))
            .ok_or_else(|| {
                ServiceError::InternalError(format!("movement type {} is not in the catalog", id))
            })
    }

    pub fn entries(&self) -> impl Iterator<Item = &MovementTypeEntry> {
        self.by_code.values()
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn row(code: &str, operation: &str, direction: Option<&str>) -> movement_type::Model {
        movement_type::Model {
            id: Uuid::new_v4(),
            operation: operation.to_string(),
            code: code.to_string(),
            adjustment_direction: direction.map(str::to_string),
            description: None,
        }
    }

    #[rstest]
    #[case("IN", None, StockEffect::Increase)]
    #[case("OUT", None, StockEffect::Decrease)]
    #[case("ADJUSTMENT", Some("INCREASE"), StockEffect::Increase)]
    #[case("ADJUSTMENT", Some("DECREASE"), StockEffect::Decrease)]
    #[case("ADJUSTMENT", Some("BASELINE"), StockEffect::Baseline)]
    #[case("RESERVATION", None, StockEffect::None)]
    #[case("RESTRICTION", None, StockEffect::None)]
    fn effect_follows_operation_and_direction(
        #[case] operation: &str,
        #[case] direction: Option<&str>,
        #[case] expected: StockEffect,
    ) {
        let entry = MovementTypeEntry::try_from(row("X", operation, direction)).unwrap();
        assert_eq!(entry.effect, expected);
    }

    #[rstest]
    #[case("ADJUSTMENT", None)]
    #[case("IN", Some("INCREASE"))]
    #[case("SIDEWAYS", None)]
    fn malformed_rows_fail_the_load(#[case] operation: &str, #[case] direction: Option<&str>) {
        let result = MovementTypeCatalog::from_models(vec![row("BAD", operation, direction)]);
        assert_matches!(result, Err(ServiceError::InternalError(_)));
    }

    #[test]
    fn resolves_by_code_and_id() {
        let purchase = row("IN_PURCHASE", "IN", None);
        let id = purchase.id;
        let catalog = MovementTypeCatalog::from_models(vec![
            purchase,
            row("OUT_SERVICE_USAGE", "OUT", None),
        ])
        .unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.by_id(id).unwrap().code, "IN_PURCHASE");
        assert_eq!(
            catalog.resolve("OUT_SERVICE_USAGE").unwrap().effect,
            StockEffect::Decrease
        );
        assert_matches!(
            catalog.resolve("IN_GIFT"),
            Err(ServiceError::UnknownMovementType(code)) if code == "IN_GIFT"
        );
    }

    #[test]
    fn signed_quantities() {
        assert_eq!(StockEffect::Increase.signed(dec!(5)), dec!(5));
        assert_eq!(StockEffect::Decrease.signed(dec!(5)), dec!(-5));
        assert_eq!(StockEffect::Baseline.signed(dec!(5)), Decimal::ZERO);
        assert!(!StockEffect::None.moves_stock());
    }
}
