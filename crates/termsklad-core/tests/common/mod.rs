// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for termsklad-core integration tests.
//!
//! Provides a TestContext backed by a throwaway SQLite database with the
//! seeded shelf layout, plus helpers for walking terminals through the
//! lifecycle.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use termsklad_core::model::{BoxType, Terminal};
use termsklad_core::persistence::SqliteStore;
use termsklad_core::terminals::{self, ManualStatus};

/// Actor used by the test helpers.
pub const OPERATOR: &str = "Оператор Тестов";

/// Test context with a throwaway SQLite database.
pub struct TestContext {
    pub store: SqliteStore,
    _dir: TempDir,
}

impl TestContext {
    /// Create a fresh database with migrations (including the seeded
    /// shelf sections) applied.
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = SqliteStore::from_path(dir.path().join("termsklad.db"))
            .await
            .expect("Failed to create store");
        Self { store, _dir: dir }
    }

    /// Add a terminal, optionally placing it.
    pub async fn add(
        &self,
        serial: &str,
        box_type: BoxType,
        section_id: Option<&str>,
    ) -> Terminal {
        terminals::add_terminal(&self.store, serial, box_type, section_id, OPERATOR)
            .await
            .expect("Failed to add terminal")
    }

    /// Walk a terminal to `verified`: mark pending, then enter results.
    pub async fn make_verified(
        &self,
        serial: &str,
        date: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Terminal {
        terminals::set_status(&self.store, serial, ManualStatus::Pending, OPERATOR)
            .await
            .expect("Failed to mark pending");
        terminals::set_status(
            &self.store,
            serial,
            ManualStatus::Verified { date, until },
            OPERATOR,
        )
        .await
        .expect("Failed to enter verification results")
    }
}

/// Midnight UTC on the given day.
pub fn day(year: i32, month: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, d, 0, 0, 0).unwrap()
}
