mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use stockroom_api::entities::warehouse_stock;
use stockroom_api::errors::ServiceError;
use stockroom_api::services::stock_ledger::{DateRange, MovementOrigin, MovementQuery};
use stockroom_api::services::warehouse_stock::BaselineRequest;
use uuid::Uuid;

#[tokio::test]
async fn movements_before_a_count_leave_on_hand_unknown() {
    let app = TestApp::new().await;
    let material_id = app.seed_material("FILTER-01").await;
    let ledger = &app.services().ledger;

    ledger
        .record_movement(app.movement(material_id, "IN_PURCHASE", 10))
        .await
        .expect("purchase recorded");

    assert_eq!(app.on_hand(material_id).await, None);
    assert_eq!(app.available(material_id).await, None);

    let summary = app
        .services()
        .stock
        .get_stock_summary(app.warehouse_id, material_id)
        .await
        .unwrap();
    assert_eq!(summary.initial_stock_quantity, None);
    assert_eq!(summary.balance_in_minus_out, Some(dec!(10)));
    assert_eq!(summary.on_hand, None);

    // The count replaces everything recorded before it.
    app.services()
        .stock
        .initialize_baseline(BaselineRequest {
            warehouse_id: app.warehouse_id,
            material_id,
            quantity: dec!(100),
            processed_by_user_id: app.user_id,
            notes: None,
        })
        .await
        .unwrap();
    assert_eq!(app.on_hand(material_id).await, Some(dec!(100)));
}

#[tokio::test]
async fn in_and_out_movements_move_on_hand() {
    let app = TestApp::new().await;
    let material_id = app.seed_counted_material("BELT-02", 100).await;
    let ledger = &app.services().ledger;

    ledger
        .record_movement(app.movement(material_id, "IN_PURCHASE", 20))
        .await
        .unwrap();
    ledger
        .record_movement(app.movement(material_id, "OUT_DISPOSAL_DAMAGE", 30))
        .await
        .unwrap();

    assert_eq!(app.on_hand(material_id).await, Some(dec!(90)));
    let replayed = ledger
        .replay_balance(app.warehouse_id, material_id)
        .await
        .unwrap();
    assert_eq!(replayed.on_hand(), Some(dec!(90)));
}

#[tokio::test]
async fn repeated_baseline_writes_nothing() {
    let app = TestApp::new().await;
    let material_id = app.seed_counted_material("LAMP-03", 40).await;

    let outcome = app
        .services()
        .stock
        .initialize_baseline(BaselineRequest {
            warehouse_id: app.warehouse_id,
            material_id,
            quantity: dec!(40),
            processed_by_user_id: app.user_id,
            notes: None,
        })
        .await
        .unwrap();
    assert!(outcome.movement.is_none());
    assert_eq!(outcome.on_hand, dec!(40));

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
    assert_eq!(page.movements.len(), 1);
}

#[tokio::test]
async fn rejected_movements_leave_no_trace() {
    let app = TestApp::new().await;
    let material_id = app.seed_counted_material("VALVE-04", 5).await;
    let ledger = &app.services().ledger;

    assert_matches!(
        ledger
            .record_movement(app.movement(material_id, "OUT_TRANSFER", 6))
            .await,
        Err(ServiceError::InsufficientOnHand { on_hand: Some(on_hand), .. }) if on_hand == dec!(5)
    );
    assert_matches!(
        ledger
            .record_movement(app.movement(material_id, "IN_TELEPORT", 1))
            .await,
        Err(ServiceError::UnknownMovementType(code)) if code == "IN_TELEPORT"
    );
    assert_matches!(
        ledger
            .record_movement(app.movement(material_id, "IN_PURCHASE", 0))
            .await,
        Err(ServiceError::InvalidQuantity(_))
    );
    assert_matches!(
        ledger
            .record_movement(app.movement(material_id, "RESERVATION_PICKING_ORDER", 1))
            .await,
        Err(ServiceError::ValidationError(_))
    );
    let unknown = Uuid::new_v4();
    assert_matches!(
        ledger
            .record_movement(app.movement(unknown, "IN_PURCHASE", 1))
            .await,
        Err(ServiceError::UnknownMaterial(id)) if id == unknown
    );

    assert_eq!(app.on_hand(material_id).await, Some(dec!(5)));
}

#[tokio::test]
async fn batch_keeps_successes_when_an_entry_fails() {
    let app = TestApp::new().await;
    let material_id = app.seed_counted_material("PIPE-05", 10).await;

    let outcome = app
        .services()
        .ledger
        .record_movements_batch(vec![
            app.movement(material_id, "IN_DONATION", 5),
            app.movement(material_id, "OUT_SERVICE_USAGE", 50),
            app.movement(material_id, "OUT_SERVICE_USAGE", 3),
        ])
        .await;

    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.failed, 1);
    assert!(outcome.results[0].movement_id.is_some());
    assert_eq!(
        outcome.results[1].error_code.as_deref(),
        Some("insufficient_on_hand")
    );
    assert_eq!(app.on_hand(material_id).await, Some(dec!(12)));
}

#[tokio::test]
async fn movements_page_in_insertion_order() {
    let app = TestApp::new().await;
    let material_id = app.seed_counted_material("NUT-06", 0).await;
    let ledger = &app.services().ledger;
    for quantity in 1..=4 {
        ledger
            .record_movement(app.movement(material_id, "IN_PURCHASE", quantity))
            .await
            .unwrap();
    }

    let query = |cursor| MovementQuery {
        warehouse_id: app.warehouse_id,
        material_id: Some(material_id),
        range: DateRange::default(),
        cursor,
        limit: 2,
    };

    let first = ledger.list_movements(query(None)).await.unwrap();
    assert_eq!(first.movements.len(), 2);
    let cursor = first.next_cursor.expect("more pages");
    let second = ledger.list_movements(query(Some(cursor))).await.unwrap();
    assert_eq!(second.movements.len(), 2);
    let cursor = second.next_cursor.expect("one more entry");
    let third = ledger.list_movements(query(Some(cursor))).await.unwrap();
    assert_eq!(third.movements.len(), 1);
    assert!(third.next_cursor.is_none());

    let ids: Vec<i64> = first
        .movements
        .iter()
        .chain(&second.movements)
        .chain(&third.movements)
        .map(|m| m.id)
        .collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));

    assert_matches!(
        ledger
            .list_movements(MovementQuery {
                limit: 0,
                ..query(None)
            })
            .await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn reconciliation_flags_a_drifted_projection_until_repaired() {
    let app = TestApp::new().await;
    let material_id = app.seed_counted_material("GASKET-07", 50).await;
    let ledger = &app.services().ledger;
    ledger
        .record_movement(app.movement(material_id, "OUT_SERVICE_USAGE", 10))
        .await
        .unwrap();

    let report = ledger.reconcile(app.warehouse_id, material_id).await.unwrap();
    assert!(report.is_consistent());
    assert!(!report.flag_cleared);

    let set_balance = |balance: Decimal| {
        warehouse_stock::Entity::update_many()
            .col_expr(
                warehouse_stock::Column::BalanceInMinusOut,
                Expr::value(balance),
            )
            .filter(warehouse_stock::Column::WarehouseId.eq(app.warehouse_id))
            .filter(warehouse_stock::Column::MaterialId.eq(material_id))
            .exec(app.state.db.as_ref())
    };

    // Out-of-band write.
    set_balance(dec!(7)).await.unwrap();
    assert_matches!(
        ledger.reconcile(app.warehouse_id, material_id).await,
        Err(ServiceError::InvariantViolation { .. })
    );

    let summary = app
        .services()
        .stock
        .get_stock_summary(app.warehouse_id, material_id)
        .await
        .unwrap();
    assert!(summary.reconciliation_flagged_at.is_some());
    assert_matches!(
        ledger
            .record_movement(app.movement(material_id, "IN_PURCHASE", 1))
            .await,
        Err(ServiceError::InvariantViolation { .. })
    );

    // Operator repair.
    set_balance(dec!(-10)).await.unwrap();
    let report = ledger.reconcile(app.warehouse_id, material_id).await.unwrap();
    assert!(report.flag_cleared);
    ledger
        .record_movement(app.movement(material_id, "IN_PURCHASE", 1))
        .await
        .expect("appends resume after repair");
    assert_eq!(app.on_hand(material_id).await, Some(dec!(41)));
}

#[tokio::test]
async fn direct_movements_cannot_claim_order_items() {
    let app = TestApp::new().await;
    let material_id = app.seed_counted_material("HOSE-06", 100).await;
    let order = app.create_picking_order(material_id, 20).await;
    let item_id = order.items[0].id;
    let ledger = &app.services().ledger;

    let linked = |origin: MovementOrigin| {
        app.movement(material_id, "OUT_SERVICE_USAGE", 50)
            .with_origin(origin)
    };
    assert_matches!(
        ledger
            .record_movement(linked(MovementOrigin::PickingOrderItem(item_id)))
            .await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        ledger
            .record_movement(linked(MovementOrigin::RestrictionOrderItem(Uuid::new_v4())))
            .await,
        Err(ServiceError::ValidationError(_))
    );

    let outcome = ledger
        .record_movements_batch(vec![linked(MovementOrigin::PickingOrderItem(item_id))])
        .await;
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.results[0].error_code.as_deref(), Some("validation_error"));

    assert_eq!(app.on_hand(material_id).await, Some(dec!(100)));
    assert_eq!(
        app.services()
            .picking_orders
            .withdrawn_from_ledger(item_id)
            .await
            .unwrap(),
        Decimal::ZERO
    );
    let report = ledger.reconcile(app.warehouse_id, material_id).await.unwrap();
    assert!(report.is_consistent());

    // Maintenance links stay open to direct movements.
    ledger
        .record_movement(linked(MovementOrigin::MaintenanceRequest(Uuid::new_v4())))
        .await
        .expect("service usage recorded");
    assert_eq!(app.on_hand(material_id).await, Some(dec!(50)));
}

#[tokio::test]
async fn quantities_finer_than_storage_scale_are_rejected() {
    let app = TestApp::new().await;
    let material_id = app.seed_counted_material("TAPE-07", 10).await;
    let ledger = &app.services().ledger;
    let with_quantity = |quantity: Decimal| {
        let mut movement = app.movement(material_id, "IN_PURCHASE", 1);
        movement.quantity = quantity;
        movement
    };

    assert_matches!(
        ledger.record_movement(with_quantity(dec!(0.00001))).await,
        Err(ServiceError::InvalidQuantity(_))
    );
    assert_matches!(
        ledger.record_movement(with_quantity(dec!(1.23456))).await,
        Err(ServiceError::InvalidQuantity(_))
    );
    let overly_precise_price = app
        .movement(material_id, "IN_PURCHASE", 1)
        .with_unit_price(Some(dec!(0.12345)));
    assert_matches!(
        ledger.record_movement(overly_precise_price).await,
        Err(ServiceError::InvalidQuantity(_))
    );
    // Trailing zeros beyond the scale carry no value and are accepted.
    ledger
        .record_movement(with_quantity(dec!(1.250000)))
        .await
        .expect("padded quantity recorded");
    assert_eq!(app.on_hand(material_id).await, Some(dec!(11.25)));

    assert_matches!(
        app.services()
            .stock
            .initialize_baseline(BaselineRequest {
                warehouse_id: app.warehouse_id,
                material_id,
                quantity: dec!(9.99999),
                processed_by_user_id: app.user_id,
                notes: None,
            })
            .await,
        Err(ServiceError::InvalidQuantity(_))
    );
    assert_matches!(
        app.services()
            .restriction_orders
            .open_restriction_order(app.warehouse_id, material_id, dec!(0.00001), app.user_id)
            .await,
        Err(ServiceError::InvalidQuantity(_))
    );
    assert_eq!(app.on_hand(material_id).await, Some(dec!(11.25)));
}
