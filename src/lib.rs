//! Stockroom API Library
//!
//! Cart-to-inventory transaction engine for a single store: catalog
//! store, inventory ledger, cart aggregate, reservation/approval engine,
//! and catalog normalizer.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod services;

use crate::auth::OverrideAuthorizer;
use crate::events::EventSender;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Engine services wired over one connection pool.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<services::CatalogService>,
    pub inventory: Arc<services::InventoryService>,
    pub carts: Arc<services::CartService>,
    pub approvals: Arc<services::ApprovalService>,
    pub normalizer: Arc<services::NormalizerService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        authorizer: Arc<dyn OverrideAuthorizer>,
    ) -> Self {
        Self {
            catalog: Arc::new(services::CatalogService::new(
                db.clone(),
                event_sender.clone(),
            )),
            inventory: Arc::new(services::InventoryService::new(
                db.clone(),
                event_sender.clone(),
            )),
            carts: Arc::new(services::CartService::new(db.clone(), event_sender.clone())),
            approvals: Arc::new(services::ApprovalService::new(
                db.clone(),
                event_sender.clone(),
                authorizer,
            )),
            normalizer: Arc::new(services::NormalizerService::new(db, event_sender)),
        }
    }
}

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: EventSender,
    pub services: AppServices,
}
