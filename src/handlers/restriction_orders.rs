use std::str::FromStr;

use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::entities::restriction_order::RestrictionOrderStatus;
use crate::errors::ServiceError;
use crate::handlers::common::{created_response, success_response};
use crate::handlers::AppState;
use crate::services::restriction_orders::NewRestrictionOrder;

#[derive(Debug, Deserialize)]
pub struct ConsumeRequest {
    pub processed_by_user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ListRestrictionOrdersParams {
    pub warehouse_id: Uuid,
    pub status: Option<String>,
}

/// Hold stock against reservation
pub async fn open_restriction_order(
    State(state): State<AppState>,
    Json(payload): Json<NewRestrictionOrder>,
) -> Result<impl IntoResponse, ServiceError> {
    let detail = state
        .services
        .restriction_orders
        .open_restriction_order_with_items(payload)
        .await?;
    Ok(created_response(detail))
}

pub async fn get_restriction_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let detail = state.services.restriction_orders.get(id).await?;
    Ok(success_response(detail))
}

pub async fn list_restriction_orders(
    State(state): State<AppState>,
    Query(params): Query<ListRestrictionOrdersParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let status = params
        .status
        .as_deref()
        .map(RestrictionOrderStatus::from_str)
        .transpose()
        .map_err(|_| {
            ServiceError::ValidationError("unknown restriction order status".to_string())
        })?;
    let orders = state
        .services
        .restriction_orders
        .list(params.warehouse_id, status)
        .await?;
    Ok(success_response(orders))
}

/// Lift the hold without moving stock
pub async fn release_restriction_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let detail = state.services.restriction_orders.release(id).await?;
    Ok(success_response(detail))
}

/// Write the held stock off
pub async fn consume_restriction_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ConsumeRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let detail = state
        .services
        .restriction_orders
        .consume(id, payload.processed_by_user_id)
        .await?;
    Ok(success_response(detail))
}

pub fn restriction_order_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(list_restriction_orders).post(open_restriction_order),
        )
        .route("/:id", get(get_restriction_order))
        .route("/:id/release", post(release_restriction_order))
        .route("/:id/consume", post(consume_restriction_order))
}
