// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Termsklad - Terminal Lifecycle & Warehouse Placement Engine
//!
//! This crate tracks measurement terminals through their verification
//! lifecycle and their physical placement on warehouse shelves, persisting
//! all state to PostgreSQL or SQLite.
//!
//! # Status state machine
//!
//! ```text
//!                ┌──────────────┐  request / mark  ┌─────────┐
//!        ┌──────▶│ not_verified │─────────────────▶│ pending │──────┐
//!        │       └──────────────┘                  └─────────┘      │ results
//!        │ reset        ▲  ▲                            │           ▼
//!        │              │  │ return (rental)            │      ┌──────────┐
//!        └──────────────┘  └───────────────┐            │      │ verified │
//!                                          │            │      └──────────┘
//!   window lapsed (sweep, actor «Система») │            │        │   │
//!        ┌──────────┐                      │            │ ship   │   │ ship
//!        │ expired  │◀─────────────────────┼────────────┼────────┘   ▼
//!        └──────────┘                   ┌──────────┐    ▼      ┌─────────┐
//!          │     │ ship / rent          │  rented  │◀──────────│ shipped │
//!          │     └─────────────────────▶└──────────┘  rent     └─────────┘
//!          │                                                        ▲
//!          ▼                                                        │ results
//!   ┌─────────────────────────────────────┐                         │
//!   │ awaits_verification_after_shipping  │─────────────────────────┘
//!   └─────────────────────────────────────┘
//! ```
//!
//! # Placement
//!
//! Shelf sections are fixed-size grids on three tiers («Верхний», «Нижний»,
//! «Аренда»). A non-empty section is locked to the box type of its
//! occupants; new terminals take the first free cell. Rental-category
//! terminals (serials prefixed `1792`) live only on the rental tier.
//!
//! # Configuration
//!
//! | Variable | Default | Purpose |
//! |----------|---------|---------|
//! | `TERMSKLAD_DATABASE_URL` | (required) | `postgres:` or `sqlite:` connection string |
//! | `TERMSKLAD_HTTP_PORT` | 8080 | HTTP API port |
//! | `TERMSKLAD_REGISTRY_URL` | https://fgis.gost.ru | FGIS registry base URL |
//! | `TERMSKLAD_REGISTRY_RETRY_DELAY_MS` | 3000 | delay before the single registry retry |
//!
//! # Modules
//!
//! - [`model`]: domain types, statuses, and the structured history log
//! - [`lifecycle`]: the pure status transition table
//! - [`placement`]: grid allocation and box-type/tier rules
//! - [`terminals`], [`shipment`], [`requests`], [`expiry`]: operations
//! - [`registry`]: FGIS «Аршин» lookup client
//! - [`persistence`]: the [`persistence::Store`] trait and both backends
//! - [`server`]: the HTTP API
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod expiry;
pub mod lifecycle;
pub mod migrations;
pub mod model;
pub mod persistence;
pub mod placement;
pub mod registry;
pub mod requests;
pub mod server;
pub mod shipment;
pub mod terminals;

pub use error::{CoreError, Result};
