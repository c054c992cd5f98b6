// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

/// Termsklad configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL or SQLite connection URL
    pub database_url: String,
    /// HTTP listen address
    pub http_addr: SocketAddr,
    /// Base URL of the FGIS verification registry
    pub registry_url: String,
    /// Delay before the single registry lookup retry
    pub registry_retry_delay: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `TERMSKLAD_DATABASE_URL`: PostgreSQL or SQLite connection string
    ///
    /// Optional (with defaults):
    /// - `TERMSKLAD_HTTP_PORT`: HTTP server port (default: 8080)
    /// - `TERMSKLAD_REGISTRY_URL`: FGIS registry base URL (default: https://fgis.gost.ru)
    /// - `TERMSKLAD_REGISTRY_RETRY_DELAY_MS`: registry retry delay in milliseconds (default: 3000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("TERMSKLAD_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("TERMSKLAD_DATABASE_URL"))?;

        let http_port: u16 = std::env::var("TERMSKLAD_HTTP_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("TERMSKLAD_HTTP_PORT", "must be a valid port number")
            })?;

        let registry_url = std::env::var("TERMSKLAD_REGISTRY_URL")
            .unwrap_or_else(|_| "https://fgis.gost.ru".to_string());

        let registry_retry_delay_ms: u64 = std::env::var("TERMSKLAD_REGISTRY_RETRY_DELAY_MS")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid(
                    "TERMSKLAD_REGISTRY_RETRY_DELAY_MS",
                    "must be a duration in milliseconds",
                )
            })?;

        Ok(Self {
            database_url,
            http_addr: SocketAddr::from(([0, 0, 0, 0], http_port)),
            registry_url,
            registry_retry_delay: Duration::from_millis(registry_retry_delay_ms),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
