use std::str::FromStr;

use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::entities::picking_order::PickingOrderStatus;
use crate::errors::ServiceError;
use crate::handlers::common::{created_response, success_response, PaginatedResponse};
use crate::handlers::AppState;
use crate::services::picking_orders::{
    NewPickingItem, NewPickingOrder, PickingOrderEvent, PickingOrderFilter, WithdrawalRequest,
};
use crate::services::stock_ledger::Collector;

#[derive(Debug, Deserialize)]
pub struct CreatePickingOrderRequest {
    pub warehouse_id: Uuid,
    pub maintenance_request_id: Option<Uuid>,
    pub material_request_id: Option<Uuid>,
    pub be_collected_by_user_id: Option<Uuid>,
    pub be_collected_by_worker_id: Option<Uuid>,
    pub desired_pickup_date: Option<DateTime<Utc>>,
    pub items: Vec<NewPickingItem>,
}

impl TryFrom<CreatePickingOrderRequest> for NewPickingOrder {
    type Error = ServiceError;

    fn try_from(request: CreatePickingOrderRequest) -> Result<Self, Self::Error> {
        Ok(NewPickingOrder {
            warehouse_id: request.warehouse_id,
            maintenance_request_id: request.maintenance_request_id,
            material_request_id: request.material_request_id,
            collector: Collector::from_parts(
                request.be_collected_by_user_id,
                request.be_collected_by_worker_id,
            )?,
            desired_pickup_date: request.desired_pickup_date,
            items: request.items,
        })
    }
}

/// Body of `POST /picking-orders/:id/transitions`, tagged by `event`.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TransitionRequest {
    StartPreparation,
    MarkReady {
        #[serde(default)]
        staged_item_ids: Vec<Uuid>,
    },
    Withdraw {
        item_id: Uuid,
        quantity: Decimal,
        processed_by_user_id: Uuid,
        collected_by_user_id: Option<Uuid>,
        collected_by_worker_id: Option<Uuid>,
    },
    Cancel,
    Expire,
}

impl TryFrom<TransitionRequest> for PickingOrderEvent {
    type Error = ServiceError;

    fn try_from(request: TransitionRequest) -> Result<Self, Self::Error> {
        Ok(match request {
            TransitionRequest::StartPreparation => PickingOrderEvent::StartPreparation,
            TransitionRequest::MarkReady { staged_item_ids } => {
                PickingOrderEvent::MarkReady { staged_item_ids }
            }
            TransitionRequest::Withdraw {
                item_id,
                quantity,
                processed_by_user_id,
                collected_by_user_id,
                collected_by_worker_id,
            } => PickingOrderEvent::Withdraw(WithdrawalRequest {
                item_id,
                quantity,
                processed_by_user_id,
                collector: Collector::from_parts(collected_by_user_id, collected_by_worker_id)?,
            }),
            TransitionRequest::Cancel => PickingOrderEvent::Cancel,
            TransitionRequest::Expire => PickingOrderEvent::Expire,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ListPickingOrdersParams {
    pub warehouse_id: Option<Uuid>,
    pub status: Option<String>,
    #[serde(default = "default_page")]
    pub page: u64,
    pub per_page: Option<u64>,
}

fn default_page() -> u64 {
    1
}

/// Create a picking order in PENDING_PREPARATION
pub async fn create_picking_order(
    State(state): State<AppState>,
    Json(payload): Json<CreatePickingOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let detail = state
        .services
        .picking_orders
        .create_picking_order(payload.try_into()?)
        .await?;
    Ok(created_response(detail))
}

/// Get a picking order with its items
pub async fn get_picking_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let detail = state.services.picking_orders.get_picking_order(id).await?;
    Ok(success_response(detail))
}

/// List picking orders, newest first
pub async fn list_picking_orders(
    State(state): State<AppState>,
    Query(params): Query<ListPickingOrdersParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let status = params
        .status
        .as_deref()
        .map(PickingOrderStatus::from_str)
        .transpose()
        .map_err(|_| ServiceError::ValidationError("unknown picking order status".to_string()))?;
    let per_page = params
        .per_page
        .unwrap_or(state.config.api_default_page_size)
        .clamp(1, state.config.api_max_page_size.max(1));
    let page = params.page.max(1);

    let (orders, total) = state
        .services
        .picking_orders
        .list_picking_orders(PickingOrderFilter {
            warehouse_id: params.warehouse_id,
            status,
            page,
            per_page,
        })
        .await?;
    Ok(success_response(PaginatedResponse::new(
        orders, page, per_page, total,
    )))
}

/// Apply one lifecycle event
pub async fn transition_picking_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransitionRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let detail = state
        .services
        .picking_orders
        .transition_picking_order(id, payload.try_into()?)
        .await?;
    Ok(success_response(detail))
}

pub fn picking_order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_picking_orders).post(create_picking_order))
        .route("/:id", get(get_picking_order))
        .route("/:id/transitions", post(transition_picking_order))
}
