use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

fn display_quantity(quantity: &Option<Decimal>) -> String {
    quantity
        .map(|q| q.normalize().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Error body returned by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Conflict")
    pub error: String,
    /// Stable machine-readable code (e.g., "over_withdrawal")
    pub code: String,
    /// Human-readable error description
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// RFC 3339 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Unknown material: {0}")]
    UnknownMaterial(Uuid),

    #[error("Unknown warehouse: {0}")]
    UnknownWarehouse(Uuid),

    #[error("Unknown movement type: {0}")]
    UnknownMovementType(String),

    #[error(
        "Insufficient availability for material {material_id}: requested {requested}, available {}",
        display_quantity(.available)
    )]
    InsufficientAvailability {
        material_id: Uuid,
        requested: Decimal,
        available: Option<Decimal>,
    },

    #[error(
        "Insufficient on-hand quantity for material {material_id}: requested {requested}, on hand {}",
        display_quantity(.on_hand)
    )]
    InsufficientOnHand {
        material_id: Uuid,
        requested: Decimal,
        on_hand: Option<Decimal>,
    },

    #[error("Over-withdrawal on item {item_id}: requested {requested}, remaining {remaining}")]
    OverWithdrawal {
        item_id: Uuid,
        requested: Decimal,
        remaining: Decimal,
    },

    #[error("Invalid transition: cannot apply {event} to an order in {from}")]
    InvalidTransition { from: String, event: String },

    #[error("Picking order {0} has withdrawals and can no longer be cancelled")]
    CancelAfterWithdrawalDenied(Uuid),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(
        "Ledger invariant violated for warehouse {warehouse_id}, material {material_id}: {detail}"
    )]
    InvariantViolation {
        warehouse_id: Uuid,
        material_id: Uuid,
        detail: String,
    },

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) | Self::UnknownMaterial(_) | Self::UnknownWarehouse(_) => {
                StatusCode::NOT_FOUND
            }
            Self::ValidationError(_) | Self::InvalidQuantity(_) | Self::UnknownMovementType(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::InsufficientAvailability { .. } | Self::InsufficientOnHand { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::OverWithdrawal { .. }
            | Self::InvalidTransition { .. }
            | Self::CancelAfterWithdrawalDenied(_)
            | Self::ConcurrentModification(_)
            | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::DatabaseError(_)
            | Self::InvariantViolation { .. }
            | Self::EventError(_)
            | Self::InternalError(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable snake_case identifier, one per variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::InvalidQuantity(_) => "invalid_quantity",
            Self::UnknownMaterial(_) => "unknown_material",
            Self::UnknownWarehouse(_) => "unknown_warehouse",
            Self::UnknownMovementType(_) => "unknown_movement_type",
            Self::InsufficientAvailability { .. } => "insufficient_availability",
            Self::InsufficientOnHand { .. } => "insufficient_on_hand",
            Self::OverWithdrawal { .. } => "over_withdrawal",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::CancelAfterWithdrawalDenied(_) => "cancel_after_withdrawal_denied",
            Self::ConcurrentModification(_) => "concurrent_modification",
            Self::Conflict(_) => "conflict",
            Self::InvariantViolation { .. } => "invariant_violation",
            Self::EventError(_) => "event_error",
            Self::InternalError(_) => "internal_error",
            Self::Other(_) => "internal_error",
        }
    }

    /// True for errors a caller may retry after re-reading current state.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self.status_code(),
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY
        )
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::EventError(_) | Self::InternalError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            Self::InvariantViolation {
                warehouse_id,
                material_id,
                ..
            } => format!(
                "Stock for warehouse {} and material {} is flagged for manual reconciliation",
                warehouse_id, material_id
            ),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "request failed");
        }

        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: self.code().to_string(),
            message: self.response_message(),
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn service_error_response_includes_request_id() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("req-123"), async {
                ServiceError::NotFound("missing".into()).into_response()
            })
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.request_id.as_deref(), Some("req-123"));
        assert_eq!(payload.code, "not_found");
    }

    #[test]
    fn domain_errors_map_to_status_codes() {
        let material_id = Uuid::new_v4();
        assert_eq!(
            ServiceError::InvalidQuantity("zero".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::UnknownMaterial(material_id).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::InsufficientAvailability {
                material_id,
                requested: dec!(5),
                available: None,
            }
            .status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::OverWithdrawal {
                item_id: Uuid::new_v4(),
                requested: dec!(1),
                remaining: dec!(0),
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::CancelAfterWithdrawalDenied(Uuid::new_v4()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::InvariantViolation {
                warehouse_id: Uuid::new_v4(),
                material_id,
                detail: "mismatch".into(),
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unknown_quantities_render_as_unknown() {
        let err = ServiceError::InsufficientAvailability {
            material_id: Uuid::nil(),
            requested: dec!(30),
            available: None,
        };
        assert!(err.to_string().ends_with("available unknown"));
        assert!(err.is_conflict());
    }

    #[test]
    fn internal_details_are_hidden() {
        assert_eq!(
            ServiceError::InternalError("pool exhausted".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::NotFound("Picking order x".into()).response_message(),
            "Not found: Picking order x"
        );
    }
}
