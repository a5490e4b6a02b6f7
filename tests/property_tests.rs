//! Property-based tests for the ledger arithmetic and the picking state machine.
//!
//! Most of these exercise the pure pieces the services are built on: replaying
//! a movement history, deriving on-hand and availability, and the transition
//! table. The ledger guard is driven through the service on a fresh database.

mod common;

use common::TestApp;
use proptest::prelude::*;
use rust_decimal::Decimal;
use strum::IntoEnumIterator;
use uuid::Uuid;

use stockroom_api::entities::picking_order::{PickingEventKind, PickingOrderStatus};
use stockroom_api::entities::warehouse_stock::on_hand;
use stockroom_api::errors::ServiceError;
use stockroom_api::services::availability::available_to_reserve;
use stockroom_api::services::movement_catalog::StockEffect;
use stockroom_api::services::stock_ledger::replay;
use stockroom_api::services::warehouse_stock::BaselineRequest;

fn quantity_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..10_000, 0u32..3).prop_map(|(units, scale)| Decimal::new(units, scale))
}

fn flow_strategy() -> impl Strategy<Value = (StockEffect, Decimal)> {
    (
        prop_oneof![Just(StockEffect::Increase), Just(StockEffect::Decrease)],
        quantity_strategy(),
    )
}

// Property: after a count, the order of later receipts and issues does not matter
proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn replay_after_baseline_is_order_independent(
        baseline in quantity_strategy(),
        flows in prop::collection::vec(flow_strategy(), 0..30),
    ) {
        let mut history = vec![(StockEffect::Baseline, baseline)];
        history.extend(flows.iter().copied());
        let forward = replay(history.clone());

        let mut reversed = vec![(StockEffect::Baseline, baseline)];
        reversed.extend(flows.iter().rev().copied());
        let backward = replay(reversed);

        prop_assert_eq!(forward, backward);
        let net: Decimal = flows.iter().map(|(effect, q)| effect.signed(*q)).sum();
        prop_assert_eq!(forward.on_hand(), Some(baseline + net));
    }

    #[test]
    fn on_hand_stays_unknown_without_a_count(
        flows in prop::collection::vec(flow_strategy(), 0..30),
    ) {
        let replayed = replay(flows);
        prop_assert_eq!(replayed.on_hand(), None);
        prop_assert_eq!(on_hand(None, Some(replayed.balance)), None);
    }

    #[test]
    fn availability_propagates_unknown_on_hand(
        restricted in quantity_strategy(),
        reserved in quantity_strategy(),
        counted in prop::option::of(quantity_strategy()),
    ) {
        let available = available_to_reserve(counted, restricted, reserved);
        match counted {
            None => prop_assert_eq!(available, None),
            Some(q) => prop_assert_eq!(available, Some(q - restricted - reserved)),
        }
    }
}

// Property: every (state, event) pair yields a state or a typed rejection
proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn transition_table_is_total(all_withdrawn in any::<bool>()) {
        let order_id = Uuid::new_v4();
        for from in PickingOrderStatus::iter() {
            for event in PickingEventKind::iter() {
                match from.next(event, all_withdrawn, order_id) {
                    Ok(_) => prop_assert!(!from.is_terminal(), "{} left a terminal state", from),
                    Err(ServiceError::InvalidTransition { .. })
                    | Err(ServiceError::CancelAfterWithdrawalDenied(_)) => {}
                    Err(other) => prop_assert!(false, "unexpected error {:?}", other),
                }
            }
        }
    }
}

// Property: whatever the caller sends, the ledger never lets on-hand drop below zero
proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn ledger_never_drives_on_hand_negative(
        baseline in 0i64..50,
        flows in prop::collection::vec((any::<bool>(), 1i64..40), 1..15),
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let app = TestApp::new().await;
            let material_id = app.seed_material("GREASE-10").await;
            app.services()
                .stock
                .initialize_baseline(BaselineRequest {
                    warehouse_id: app.warehouse_id,
                    material_id,
                    quantity: Decimal::from(baseline),
                    processed_by_user_id: app.user_id,
                    notes: None,
                })
                .await
                .unwrap();

            let mut expected = Decimal::from(baseline);
            for (is_receipt, units) in flows {
                let quantity = Decimal::from(units);
                let code = if is_receipt { "IN_PURCHASE" } else { "OUT_SERVICE_USAGE" };
                let result = app
                    .services()
                    .ledger
                    .record_movement(app.movement(material_id, code, units))
                    .await;

                match result {
                    Ok(_) if is_receipt => expected += quantity,
                    Ok(_) => {
                        prop_assert!(
                            quantity <= expected,
                            "issue of {} accepted at {}",
                            quantity,
                            expected
                        );
                        expected -= quantity;
                    }
                    Err(ServiceError::InsufficientOnHand { .. }) => {
                        prop_assert!(!is_receipt && quantity > expected);
                    }
                    Err(other) => prop_assert!(false, "unexpected error {:?}", other),
                }

                let on_hand = app.on_hand(material_id).await;
                prop_assert_eq!(on_hand, Some(expected));
                prop_assert!(expected >= Decimal::ZERO);
            }
            Ok(())
        })?;
    }
}
