// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Termsklad - Terminal Lifecycle & Warehouse Placement Engine
//!
//! The binary wires the pieces together:
//! - persistence backend picked from the database URL scheme
//! - FGIS registry client
//! - HTTP API server

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use termsklad_core::config::Config;
use termsklad_core::persistence::{PostgresStore, SqliteStore, Store};
use termsklad_core::registry::FgisClient;
use termsklad_core::server::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("termsklad_core=info".parse().unwrap()),
        )
        .init();

    info!("Starting Termsklad");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        http_addr = %config.http_addr,
        registry_url = %config.registry_url,
        "Configuration loaded"
    );

    // Connect, migrate, and pick the backend by URL scheme
    info!("Connecting to database...");
    let store: Arc<dyn Store> = if config.database_url.starts_with("sqlite:") {
        Arc::new(SqliteStore::from_url(&config.database_url).await?)
    } else {
        Arc::new(PostgresStore::from_url(&config.database_url).await?)
    };
    store.health_check().await?;
    info!("Database connection established");

    let state = AppState {
        store,
        registry: Arc::new(FgisClient::new(config.registry_url.clone())),
        registry_retry_delay: config.registry_retry_delay,
    };

    info!("Termsklad initialized successfully");
    server::serve(config.http_addr, state).await
}
