#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use stockroom_api::{
    config::AppConfig,
    db,
    entities::{material, warehouse},
    events::{self, EventSender},
    handlers::AppServices,
    services::movement_catalog::MovementTypeCatalog,
    services::picking_orders::{NewPickingItem, NewPickingOrder, PickingOrderDetail},
    services::stock_ledger::NewMovement,
    services::warehouse_stock::BaselineRequest,
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Helper harness for spinning up an application state backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub warehouse_id: Uuid,
    pub user_id: Uuid,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with a fresh schema and one active warehouse.
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.auto_migrate = true;
        // One connection keeps the in-memory database alive and serialises writers.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.availability_cache_ttl_secs = 0;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let catalog = MovementTypeCatalog::load(&pool)
            .await
            .expect("seeded movement types should load");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(
            db_arc.clone(),
            Arc::new(catalog),
            event_sender.clone(),
            &cfg,
        );

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let warehouse_id = Uuid::new_v4();
        warehouse::ActiveModel {
            id: Set(warehouse_id),
            name: Set("Central stockroom".to_string()),
            is_active: Set(true),
            maintenance_instance_id: Set(None),
        }
        .insert(state.db.as_ref())
        .await
        .expect("seed warehouse");

        let router = stockroom_api::build_router(state.clone());

        Self {
            router,
            state,
            warehouse_id,
            user_id: Uuid::new_v4(),
            _event_task: event_task,
        }
    }

    pub fn services(&self) -> &AppServices {
        &self.state.services
    }

    /// Seeds an active material and returns its id.
    pub async fn seed_material(&self, code: &str) -> Uuid {
        let id = Uuid::new_v4();
        material::ActiveModel {
            id: Set(id),
            code: Set(code.to_string()),
            name: Set(format!("Material {}", code)),
            unit_of_measure: Set("EA".to_string()),
            is_active: Set(true),
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed material");
        id
    }

    /// Seeds a material counted at `quantity` in the test warehouse.
    pub async fn seed_counted_material(&self, code: &str, quantity: i64) -> Uuid {
        let material_id = self.seed_material(code).await;
        self.services()
            .stock
            .initialize_baseline(BaselineRequest {
                warehouse_id: self.warehouse_id,
                material_id,
                quantity: Decimal::from(quantity),
                processed_by_user_id: self.user_id,
                notes: Some("opening count".to_string()),
            })
            .await
            .expect("seed baseline");
        material_id
    }

    pub fn movement(&self, material_id: Uuid, code: &str, quantity: i64) -> NewMovement {
        NewMovement::new(
            self.warehouse_id,
            material_id,
            code,
            Decimal::from(quantity),
            self.user_id,
        )
    }

    pub async fn on_hand(&self, material_id: Uuid) -> Option<Decimal> {
        self.services()
            .stock
            .get_on_hand(self.warehouse_id, material_id)
            .await
            .expect("read on-hand")
    }

    pub async fn available(&self, material_id: Uuid) -> Option<Decimal> {
        self.services()
            .availability
            .available_to_reserve(self.warehouse_id, material_id)
            .await
            .expect("read availability")
    }

    /// Creates a single-item picking order.
    pub async fn create_picking_order(&self, material_id: Uuid, quantity: i64) -> PickingOrderDetail {
        self.services()
            .picking_orders
            .create_picking_order(NewPickingOrder {
                warehouse_id: self.warehouse_id,
                maintenance_request_id: Some(Uuid::new_v4()),
                material_request_id: None,
                collector: None,
                desired_pickup_date: None,
                items: vec![NewPickingItem {
                    material_id,
                    material_instance_id: None,
                    quantity_to_pick: Decimal::from(quantity),
                    material_request_item_id: None,
                    unit_price: None,
                }],
            })
            .await
            .expect("create picking order")
    }

    /// Send a request against the full router.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Sends a request and decodes the JSON body.
    pub async fn request_json(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let response = self.request(method, uri, body).await;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read response body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("response body should be JSON")
        };
        (status, json)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}
