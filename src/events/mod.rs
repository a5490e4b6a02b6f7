use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event after the owning transaction committed. The write has
    /// already happened, so a closed channel is logged rather than returned.
    pub async fn publish(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropping domain event: {}", e);
        }
    }
}

/// Domain events emitted after a successful commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    MovementRecorded {
        movement_id: i64,
        warehouse_id: Uuid,
        material_id: Uuid,
        movement_type: String,
        quantity: Decimal,
    },
    BaselineInitialized {
        warehouse_id: Uuid,
        material_id: Uuid,
        quantity: Decimal,
    },
    PickingOrderTransitioned {
        picking_order_id: Uuid,
        from_status: String,
        to_status: String,
    },
    RestrictionOrderChanged {
        restriction_order_id: Uuid,
        status: String,
    },
    ReconciliationFlagged {
        warehouse_id: Uuid,
        material_id: Uuid,
        detail: String,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::MovementRecorded { .. } => "movement_recorded",
            Event::BaselineInitialized { .. } => "baseline_initialized",
            Event::PickingOrderTransitioned { .. } => "picking_order_transitioned",
            Event::RestrictionOrderChanged { .. } => "restriction_order_changed",
            Event::ReconciliationFlagged { .. } => "reconciliation_flagged",
        }
    }
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::MovementRecorded {
                movement_id,
                warehouse_id,
                material_id,
                movement_type,
                quantity,
            } => info!(
                event = event.name(),
                movement_id,
                %warehouse_id,
                %material_id,
                movement_type = %movement_type,
                %quantity,
                "stock movement recorded"
            ),
            Event::BaselineInitialized {
                warehouse_id,
                material_id,
                quantity,
            } => info!(
                event = event.name(),
                %warehouse_id,
                %material_id,
                %quantity,
                "stock baseline initialized"
            ),
            Event::PickingOrderTransitioned {
                picking_order_id,
                from_status,
                to_status,
            } => info!(
                event = event.name(),
                %picking_order_id,
                from = %from_status,
                to = %to_status,
                "picking order transitioned"
            ),
            Event::RestrictionOrderChanged {
                restriction_order_id,
                status,
            } => info!(
                event = event.name(),
                %restriction_order_id,
                status = %status,
                "restriction order changed"
            ),
            Event::ReconciliationFlagged {
                warehouse_id,
                material_id,
                detail,
            } => error!(
                event = event.name(),
                %warehouse_id,
                %material_id,
                detail = %detail,
                "stock pair flagged for manual reconciliation"
            ),
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn publish_after_receiver_dropped_does_not_fail() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        let event = Event::BaselineInitialized {
            warehouse_id: Uuid::nil(),
            material_id: Uuid::nil(),
            quantity: dec!(50),
        };
        assert!(sender.send(event.clone()).await.is_err());
        sender.publish(event).await;
    }

    #[tokio::test]
    async fn processing_stops_when_senders_are_gone() {
        let (tx, rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        sender
            .send(Event::RestrictionOrderChanged {
                restriction_order_id: Uuid::new_v4(),
                status: "OPEN".into(),
            })
            .await
            .unwrap();
        drop(sender);
        process_events(rx).await;
    }
}
