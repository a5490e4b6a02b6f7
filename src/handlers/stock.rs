use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::handlers::common::{serialize_optional_quantity, serialize_quantity, success_response};
use crate::handlers::AppState;
use crate::services::availability::Availability;
use crate::services::warehouse_stock::{BaselineRequest, StockSummary};

/// Stock position of one pair. Quantities that were never counted render as `null`.
#[derive(Debug, Serialize)]
pub struct StockResponse {
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

impl From<StockSummary> for StockResponse {
    fn from(summary: StockSummary) -> Self {
        Self {
            warehouse_id: summary.warehouse_id,
            material_id: summary.material_id,
            initial_stock_quantity: summary.initial_stock_quantity,
            balance_in_minus_out: summary.balance_in_minus_out,
            on_hand: summary.on_hand,
            restricted: summary.restricted,
            reserved: summary.reserved,
            available_to_reserve: summary.available_to_reserve,
            reconciliation_flagged_at: summary.reconciliation_flagged_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub warehouse_id: Uuid,
    pub material_id: Uuid,
    #[serde(serialize_with = "serialize_optional_quantity")]
    pub on_hand: Option<Decimal>,
    #[serde(serialize_with = "serialize_quantity")]
    pub restricted: Decimal,
    #[serde(serialize_with = "serialize_quantity")]
    pub reserved: Decimal,
    #[serde(serialize_with = "serialize_optional_quantity")]
    pub available_to_reserve: Option<Decimal>,
}

impl AvailabilityResponse {
    fn new(warehouse_id: Uuid, material_id: Uuid, availability: Availability) -> Self {
        Self {
            warehouse_id,
            material_id,
            on_hand: availability.on_hand,
            restricted: availability.restricted,
            reserved: availability.reserved,
            available_to_reserve: availability.available_to_reserve,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SetBaselineRequest {
    pub quantity: Decimal,
    pub processed_by_user_id: Uuid,
    pub notes: Option<String>,
}

/// Full stock position, read straight from storage
pub async fn get_stock(
    State(state): State<AppState>,
    Path((warehouse_id, material_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ServiceError> {
    let summary = state
        .services
        .stock
        .get_stock_summary(warehouse_id, material_id)
        .await?;
    Ok(success_response(StockResponse::from(summary)))
}

/// Availability for display; may be served from the short-lived cache
pub async fn get_availability(
    State(state): State<AppState>,
    Path((warehouse_id, material_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ServiceError> {
    let availability = state
        .services
        .availability
        .availability(warehouse_id, material_id)
        .await?;
    Ok(success_response(AvailabilityResponse::new(
        warehouse_id,
        material_id,
        availability,
    )))
}

/// Record a physical count as the new baseline
pub async fn set_baseline(
    State(state): State<AppState>,
    Path((warehouse_id, material_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<SetBaselineRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state
        .services
        .stock
        .initialize_baseline(BaselineRequest {
            warehouse_id,
            material_id,
            quantity: payload.quantity,
            processed_by_user_id: payload.processed_by_user_id,
            notes: payload.notes,
        })
        .await?;
    Ok(success_response(outcome))
}

/// Check the projection against the ledger
pub async fn reconcile(
    State(state): State<AppState>,
    Path((warehouse_id, material_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ServiceError> {
    let report = state
        .services
        .ledger
        .reconcile(warehouse_id, material_id)
        .await?;
    Ok(success_response(report))
}

pub fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/:warehouse_id/:material_id", get(get_stock))
        .route("/:warehouse_id/:material_id/availability", get(get_availability))
        .route("/:warehouse_id/:material_id/baseline", put(set_baseline))
        .route("/:warehouse_id/:material_id/reconcile", post(reconcile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn unknown_quantities_render_as_null() {
        let response = AvailabilityResponse::new(
            Uuid::nil(),
            Uuid::nil(),
            Availability::new(None, dec!(0), dec!(2.5000)),
        );
        let json = serde_json::to_value(&response).unwrap();
        assert!(json["on_hand"].is_null());
        assert!(json["available_to_reserve"].is_null());
        assert_eq!(json["reserved"], "2.5");
    }
}
