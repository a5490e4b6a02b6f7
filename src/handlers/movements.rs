use axum::{
    extract::{Json, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;
use crate::handlers::common::{created_response, success_response, validate_input};
use crate::handlers::AppState;
use crate::services::stock_ledger::{Collector, DateRange, MovementOrigin, MovementQuery, NewMovement};

/// Body of `POST /movements`. Origin and collector arrive as flat nullable
/// columns and are folded into their enums here.
#[derive(Debug, Deserialize, Validate)]
pub struct RecordMovementRequest {
    pub warehouse_id: Uuid,
    pub material_id: Uuid,
    #[validate(length(min = 1, max = 64))]
    pub movement_type: String,
    pub quantity: Decimal,
    pub movement_date: Option<DateTime<Utc>>,
    pub unit_price: Option<Decimal>,
    pub processed_by_user_id: Uuid,
    pub collected_by_user_id: Option<Uuid>,
    pub collected_by_worker_id: Option<Uuid>,
    pub maintenance_request_id: Option<Uuid>,
    pub picking_order_item_id: Option<Uuid>,
    pub restriction_order_item_id: Option<Uuid>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

impl RecordMovementRequest {
    fn into_new_movement(self) -> Result<NewMovement, ServiceError> {
        validate_input(&self)?;
        let collector = Collector::from_parts(self.collected_by_user_id, self.collected_by_worker_id)?;
        let origin = MovementOrigin::from_parts(
            self.maintenance_request_id,
            self.picking_order_item_id,
            self.restriction_order_item_id,
        )?;

        let mut movement = NewMovement::new(
            self.warehouse_id,
            self.material_id,
            self.movement_type,
            self.quantity,
            self.processed_by_user_id,
        )
        .with_collector(collector)
        .with_unit_price(self.unit_price)
        .with_notes(self.notes);
        movement.movement_date = self.movement_date;
        if let Some(origin) = origin {
            movement = movement.with_origin(origin);
        }
        Ok(movement)
    }
}

#[derive(Debug, Deserialize)]
pub struct BatchMovementRequest {
    pub movements: Vec<RecordMovementRequest>,
}

#[derive(Debug, Deserialize)]
pub struct ListMovementsParams {
    pub warehouse_id: Uuid,
    pub material_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub cursor: Option<i64>,
    pub limit: Option<u64>,
}

/// Append one movement to the ledger
pub async fn record_movement(
    State(state): State<AppState>,
    Json(payload): Json<RecordMovementRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let movement = payload.into_new_movement()?;
    let recorded = state.services.ledger.record_movement(movement).await?;
    Ok(created_response(recorded))
}

/// Bulk import. A malformed entry rejects the whole request; business
/// failures are reported per entry.
pub async fn record_movements_batch(
    State(state): State<AppState>,
    Json(payload): Json<BatchMovementRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    if payload.movements.is_empty() {
        return Err(ServiceError::ValidationError(
            "batch must contain at least one movement".to_string(),
        ));
    }
    let movements = payload
        .movements
        .into_iter()
        .enumerate()
        .map(|(index, request)| {
            request.into_new_movement().map_err(|e| {
                ServiceError::ValidationError(format!("movement {}: {}", index, e.response_message()))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let outcome = state.services.ledger.record_movements_batch(movements).await;
    Ok(success_response(outcome))
}

/// Page through the ledger of a warehouse
pub async fn list_movements(
    State(state): State<AppState>,
    Query(params): Query<ListMovementsParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let limit = params
        .limit
        .unwrap_or(state.config.api_default_page_size)
        .min(state.config.api_max_page_size);
    let page = state
        .services
        .ledger
        .list_movements(MovementQuery {
            warehouse_id: params.warehouse_id,
            material_id: params.material_id,
            range: DateRange {
                from: params.from,
                to: params.to,
            },
            cursor: params.cursor,
            limit,
        })
        .await?;
    Ok(success_response(page))
}

/// The movement type catalog, ordered by code
pub async fn list_movement_types(State(state): State<AppState>) -> impl IntoResponse {
    let mut entries: Vec<_> = state.services.ledger.catalog().entries().cloned().collect();
    entries.sort_by(|a, b| a.code.cmp(&b.code));
    success_response(entries)
}

pub fn movement_type_routes() -> Router<AppState> {
    Router::new().route("/", get(list_movement_types))
}

pub fn movement_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_movements).post(record_movement))
        .route("/batch", post(record_movements_batch))
}
