use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

/// Lifecycle of a picking order.
///
/// ```text
/// PENDING_PREPARATION -> IN_PREPARATION -> READY_FOR_PICKUP -> PARTIALLY_WITHDRAWN* -> FULLY_WITHDRAWN
///        \__________________\____________________\-> CANCELLED
///                                  READY_FOR_PICKUP / PARTIALLY_WITHDRAWN -> EXPIRED
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
    strum::EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PickingOrderStatus {
    PendingPreparation,
    InPreparation,
    ReadyForPickup,
    PartiallyWithdrawn,
    FullyWithdrawn,
    Cancelled,
    Expired,
}

/// Event names, stripped of their payloads, as seen by the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum PickingEventKind {
    StartPreparation,
    MarkReady,
    Withdraw,
    Cancel,
    Expire,
}

impl PickingOrderStatus {
    /// Statuses whose unwithdrawn item quantities count against availability.
    pub const HOLDING: [PickingOrderStatus; 3] = [
        PickingOrderStatus::InPreparation,
        PickingOrderStatus::ReadyForPickup,
        PickingOrderStatus::PartiallyWithdrawn,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PickingOrderStatus::FullyWithdrawn
                | PickingOrderStatus::Cancelled
                | PickingOrderStatus::Expired
        )
    }

    pub fn holds_reservation(self) -> bool {
        Self::HOLDING.contains(&self)
    }

    /// Applies the transition table. `all_items_withdrawn` is only consulted
    /// for withdrawals and describes the item state after the withdrawal.
    /// Guards that need storage (availability, on-hand, deadlines) are
    /// checked by the caller.
    pub fn next(
        self,
        event: PickingEventKind,
        all_items_withdrawn: bool,
        order_id: Uuid,
    ) -> Result<PickingOrderStatus, ServiceError> {
        use PickingEventKind as E;
        use PickingOrderStatus as S;

        match (self, event) {
            (S::PendingPreparation, E::StartPreparation) => Ok(S::InPreparation),
            (S::InPreparation, E::MarkReady) => Ok(S::ReadyForPickup),
            (S::ReadyForPickup | S::PartiallyWithdrawn, E::Withdraw) => {
                if all_items_withdrawn {
                    Ok(S::FullyWithdrawn)
                } else {
                    Ok(S::PartiallyWithdrawn)
                }
            }
            (S::PendingPreparation | S::InPreparation | S::ReadyForPickup, E::Cancel) => {
                Ok(S::Cancelled)
            }
            (S::PartiallyWithdrawn, E::Cancel) => {
                Err(ServiceError::CancelAfterWithdrawalDenied(order_id))
            }
            (S::ReadyForPickup | S::PartiallyWithdrawn, E::Expire) => Ok(S::Expired),
            (from, event) => Err(ServiceError::InvalidTransition {
                from: from.to_string(),
                event: event.to_string(),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "picking_orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub warehouse_id: Uuid,
    pub status: String,
    pub maintenance_request_id: Option<Uuid>,
    pub material_request_id: Option<Uuid>,
    pub be_collected_by_user_id: Option<Uuid>,
    pub be_collected_by_worker_id: Option<Uuid>,
    pub desired_pickup_date: Option<DateTime<Utc>>,
    /// When the order reached READY_FOR_PICKUP; the pickup deadline runs from here.
    pub ready_at: Option<DateTime<Utc>>,
    /// Bumped on every transition; writers compare-and-swap on it.
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn status(&self) -> Result<PickingOrderStatus, ServiceError> {
        self.status.parse().map_err(|_| {
            ServiceError::InternalError(format!(
                "picking order {} has unrecognised status {}",
                self.id, self.status
            ))
        })
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::picking_order_item::Entity")]
    Items,
}

impl Related<super::picking_order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use strum::IntoEnumIterator;

    fn allowed(from: PickingOrderStatus, event: PickingEventKind) -> bool {
        use PickingEventKind as E;
        use PickingOrderStatus as S;
        matches!(
            (from, event),
            (S::PendingPreparation, E::StartPreparation)
                | (S::InPreparation, E::MarkReady)
                | (S::ReadyForPickup | S::PartiallyWithdrawn, E::Withdraw)
                | (
                    S::PendingPreparation | S::InPreparation | S::ReadyForPickup,
                    E::Cancel
                )
                | (S::ReadyForPickup | S::PartiallyWithdrawn, E::Expire)
        )
    }

    #[test]
    fn every_pair_outside_the_table_is_rejected() {
        let id = Uuid::new_v4();
        for status in PickingOrderStatus::iter() {
            for event in PickingEventKind::iter() {
                let result = status.next(event, false, id);
                if allowed(status, event) {
                    assert!(result.is_ok(), "{status} + {event} should be accepted");
                } else if status == PickingOrderStatus::PartiallyWithdrawn
                    && event == PickingEventKind::Cancel
                {
                    assert_matches!(result, Err(ServiceError::CancelAfterWithdrawalDenied(got)) if got == id);
                } else {
                    assert_matches!(
                        result,
                        Err(ServiceError::InvalidTransition { .. }),
                        "{status} + {event} should be rejected"
                    );
                }
            }
        }
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for status in PickingOrderStatus::iter().filter(|s| s.is_terminal()) {
            assert!(!status.holds_reservation());
            for event in PickingEventKind::iter() {
                assert!(status.next(event, true, Uuid::nil()).is_err());
            }
        }
    }

    #[test]
    fn withdrawal_outcome_depends_on_remaining_items() {
        let s = PickingOrderStatus::ReadyForPickup;
        assert_eq!(
            s.next(PickingEventKind::Withdraw, false, Uuid::nil()).unwrap(),
            PickingOrderStatus::PartiallyWithdrawn
        );
        assert_eq!(
            PickingOrderStatus::PartiallyWithdrawn
                .next(PickingEventKind::Withdraw, true, Uuid::nil())
                .unwrap(),
            PickingOrderStatus::FullyWithdrawn
        );
    }

    #[test]
    fn status_strings_round_trip() {
        assert_eq!(
            PickingOrderStatus::ReadyForPickup.to_string(),
            "READY_FOR_PICKUP"
        );
        assert_eq!(
            "PARTIALLY_WITHDRAWN".parse::<PickingOrderStatus>().unwrap(),
            PickingOrderStatus::PartiallyWithdrawn
        );
        assert_eq!(PickingEventKind::StartPreparation.to_string(), "start_preparation");
    }
}
