mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;
use stockroom_api::entities::picking_order::PickingOrderStatus;
use stockroom_api::errors::ServiceError;
use stockroom_api::services::picking_orders::{PickingOrderEvent, WithdrawalRequest};
use stockroom_api::services::stock_ledger::{DateRange, MovementQuery};
use uuid::Uuid;

async fn ready_order(app: &TestApp, material_id: Uuid, quantity: i64) -> (Uuid, Uuid) {
    let service = &app.services().picking_orders;
    let created = app.create_picking_order(material_id, quantity).await;
    let (order_id, item_id) = (created.order.id, created.items[0].id);
    service
        .transition_picking_order(order_id, PickingOrderEvent::StartPreparation)
        .await
        .expect("start preparation");
    service
        .transition_picking_order(
            order_id,
            PickingOrderEvent::MarkReady {
                staged_item_ids: vec![item_id],
            },
        )
        .await
        .expect("mark ready");
    (order_id, item_id)
}

#[tokio::test]
async fn concurrent_withdrawals_cannot_double_spend_an_item() {
    let app = TestApp::new().await;
    let material_id = app.seed_counted_material("PUMP-01", 100).await;
    let (order_id, item_id) = ready_order(&app, material_id, 20).await;

    let mut tasks = vec![];
    for _ in 0..2 {
        let service = app.services().picking_orders.clone();
        let user = app.user_id;
        tasks.push(tokio::spawn(async move {
            service
                .transition_picking_order(
                    order_id,
                    PickingOrderEvent::Withdraw(WithdrawalRequest {
                        item_id,
                        quantity: dec!(20),
                        processed_by_user_id: user,
                        collector: None,
                    }),
                )
                .await
        }));
    }

    let results: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1, "exactly one withdrawal should win: {:?}", results);
    let failure = results.into_iter().find_map(Result::err).unwrap();
    assert_matches!(failure, ServiceError::OverWithdrawal { .. });

    let order = app
        .services()
        .picking_orders
        .get_picking_order(order_id)
        .await
        .unwrap();
    assert_eq!(order.order.status().unwrap(), PickingOrderStatus::FullyWithdrawn);
    assert_eq!(order.items[0].quantity_withdrawn, dec!(20));
    assert_eq!(app.on_hand(material_id).await, Some(dec!(80)));

    let page = app
        .services()
        .ledger
        .list_movements(MovementQuery {
            warehouse_id: app.warehouse_id,
            material_id: Some(material_id),
            range: DateRange::default(),
            cursor: None,
            limit: 10,
        })
        .await
        .unwrap();
    let withdrawals: Vec<_> = page
        .movements
        .iter()
        .filter(|m| m.picking_order_item_id == Some(item_id))
        .collect();
    assert_eq!(withdrawals.len(), 1);
}

#[tokio::test]
async fn cancel_racing_a_withdrawal_has_one_winner() {
    let app = TestApp::new().await;
    let material_id = app.seed_counted_material("MOTOR-02", 100).await;
    let (order_id, item_id) = ready_order(&app, material_id, 10).await;

    let cancel = {
        let service = app.services().picking_orders.clone();
        tokio::spawn(async move {
            service
                .transition_picking_order(order_id, PickingOrderEvent::Cancel)
                .await
        })
    };
    let withdraw = {
        let service = app.services().picking_orders.clone();
        let user = app.user_id;
        tokio::spawn(async move {
            service
                .transition_picking_order(
                    order_id,
                    PickingOrderEvent::Withdraw(WithdrawalRequest {
                        item_id,
                        quantity: dec!(5),
                        processed_by_user_id: user,
                        collector: None,
                    }),
                )
                .await
        })
    };

    let cancel = cancel.await.expect("cancel task");
    let withdraw = withdraw.await.expect("withdraw task");

    match (&cancel, &withdraw) {
        (Ok(_), Err(e)) => {
            assert!(e.is_conflict(), "unexpected error: {}", e);
            assert_eq!(app.on_hand(material_id).await, Some(dec!(100)));
        }
        (Err(e), Ok(_)) => {
            assert_matches!(e, ServiceError::CancelAfterWithdrawalDenied(_));
            assert_eq!(app.on_hand(material_id).await, Some(dec!(95)));
        }
        other => panic!("expected exactly one winner, got {:?}", other),
    }
}

#[tokio::test]
async fn concurrent_receipts_are_not_lost() {
    let app = TestApp::new().await;
    let material_id = app.seed_counted_material("FAN-03", 0).await;

    let mut tasks = vec![];
    for _ in 0..10 {
        let ledger = app.services().ledger.clone();
        let movement = app.movement(material_id, "IN_PURCHASE", 1);
        tasks.push(tokio::spawn(async move { ledger.record_movement(movement).await }));
    }
    for joined in futures::future::join_all(tasks).await {
        joined.expect("task panicked").expect("receipt recorded");
    }

    assert_eq!(app.on_hand(material_id).await, Some(dec!(10)));
    let report = app
        .services()
        .ledger
        .reconcile(app.warehouse_id, material_id)
        .await
        .unwrap();
    assert!(report.is_consistent());
}
