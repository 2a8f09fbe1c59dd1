#![allow(dead_code)]

use rust_decimal_macros::dec;
use std::sync::Arc;
use stockroom_api::auth::{Identity, OverrideCredential, Role, StaticOverrideAuthorizer};
use stockroom_api::config::AppConfig;
use stockroom_api::entities::ItemModel;
use stockroom_api::events::{self, EventSender};
use stockroom_api::services::{AddLineItemInput, NewItemInput};
use stockroom_api::{db, AppServices};
use tokio::sync::mpsc;
use uuid::Uuid;

pub const OVERRIDE_USER: &str = "manager";
pub const OVERRIDE_SECRET: &str = "override-secret";

/// Test harness wiring the engine services over an in-memory SQLite
/// database with migrations applied.
pub struct TestApp {
    pub services: AppServices,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new("sqlite::memory:".to_string(), "test".to_string());
        // A single connection keeps the in-memory database shared across
        // the pool.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let authorizer = Arc::new(StaticOverrideAuthorizer::new([(
            OVERRIDE_USER.to_string(),
            OVERRIDE_SECRET.to_string(),
        )]));

        let services = AppServices::new(db_arc, event_sender, authorizer);

        Self {
            services,
            _event_task: event_task,
        }
    }

    pub fn staff(&self) -> Identity {
        Identity::new("clerk", Role::Staff)
    }

    pub fn admin(&self) -> Identity {
        Identity::new("boss", Role::Admin)
    }

    pub fn override_credential(&self) -> OverrideCredential {
        OverrideCredential {
            username: OVERRIDE_USER.to_string(),
            secret: OVERRIDE_SECRET.to_string(),
        }
    }

    /// Seed one catalog item with stock under a shared vendor/category/brand.
    pub async fn seed_item(&self, product_name: &str, quantity: i32) -> ItemModel {
        self.seed_item_with_vendor(product_name, "Acme Corp", quantity)
            .await
    }

    pub async fn seed_item_with_vendor(
        &self,
        product_name: &str,
        vendor: &str,
        quantity: i32,
    ) -> ItemModel {
        self.services
            .catalog
            .add_item(NewItemInput {
                product_name: product_name.to_string(),
                cost: dec!(9.99),
                vendor: vendor.to_string(),
                category: "Supplies".to_string(),
                brand: "Generic".to_string(),
                quantity,
            })
            .await
            .expect("seed item for tests")
    }

    /// Stage a line on a cart.
    pub async fn stage(&self, cart_id: Uuid, product_name: &str, quantity: i32) -> Uuid {
        self.services
            .carts
            .add_line_item(
                cart_id,
                AddLineItemInput {
                    product_name: product_name.to_string(),
                    quantity,
                },
            )
            .await
            .expect("stage line item for tests")
    }

    /// Current stock for a product name.
    pub async fn quantity(&self, product_name: &str) -> i32 {
        let item = self
            .services
            .catalog
            .get_item(product_name)
            .await
            .expect("item exists for tests");
        self.services
            .inventory
            .get_quantity(item.id)
            .await
            .expect("inventory row exists for tests")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}
