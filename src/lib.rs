//! Stockledger API Library
//!
//! Multi-tenant inventory ledger, order fulfillment state machine and
//! bulk stock mutation engine. HTTP/job layers consume the services in
//! [`services`]; they are out of scope for this crate.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod cache;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod services;

use crate::cache::{CacheBackend, InMemoryCache};
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::errors::ServiceError;
use crate::events::EventSender;
use crate::services::{BulkOperationsService, InventoryService, OrderService};
use std::sync::Arc;

/// Shared application state wired at startup and handed to the
/// transport layer.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: AppConfig,
    pub cache: Arc<dyn CacheBackend>,
    pub event_sender: EventSender,
    pub inventory_service: Arc<InventoryService>,
    pub bulk_operations_service: Arc<BulkOperationsService>,
    pub order_service: Arc<OrderService>,
}

impl AppState {
    /// Builds the full service graph on top of an established database
    /// connection. The caller owns the event receiver loop (see
    /// [`events::process_events`]).
    pub fn build(
        db: Arc<DbPool>,
        config: AppConfig,
        event_sender: EventSender,
    ) -> Result<Self, ServiceError> {
        let cache: Arc<dyn CacheBackend> = Arc::new(InMemoryCache::new(config.cache.max_entries));
        let sender = Arc::new(event_sender.clone());

        let inventory_service = Arc::new(InventoryService::new(
            db.clone(),
            cache.clone(),
            config.cache.default_ttl(),
            Some(sender.clone()),
        ));
        let bulk_operations_service = Arc::new(BulkOperationsService::new(
            inventory_service.clone(),
            Some(sender.clone()),
        ));
        let order_service = Arc::new(OrderService::new(
            db.clone(),
            inventory_service.clone(),
            Some(sender),
        ));

        Ok(Self {
            db,
            config,
            cache,
            event_sender,
            inventory_service,
            bulk_operations_service,
            order_service,
        })
    }
}

/// Initializes the tracing subscriber from the log settings. Call once
/// at startup; returns quietly if a subscriber is already installed.
pub fn init_tracing(settings: &config::LogSettings) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.clone()));

    if settings.json {
        let _ = tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init();
    }
}
