// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Verification expiry sweep.
//!
//! Verified terminals whose window ended before today flip to `expired`
//! with a system-actor history entry. The comparison is by calendar date:
//! a window ending today is still valid. The sweep is idempotent and runs
//! lazily on the terminal list read path.

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::error::CoreError;
use crate::model::TerminalStatus;
use crate::persistence::Store;

/// Expire every verified terminal whose window ended before `now`'s date.
///
/// Returns how many terminals were expired. Terminals that changed status
/// between the read and the write are skipped, so concurrent sweeps never
/// double-append.
#[instrument(skip(store, now))]
pub async fn run_expiry_sweep(store: &dyn Store, now: DateTime<Utc>) -> Result<u64, CoreError> {
    let today = now.date_naive();
    let lapsed: Vec<String> = store
        .list_terminals()
        .await?
        .into_iter()
        .filter(|t| {
            t.status == TerminalStatus::Verified
                && t.verified_until
                    .is_some_and(|until| until.date_naive() < today)
        })
        .map(|t| t.serial_number)
        .collect();

    if lapsed.is_empty() {
        return Ok(0);
    }

    let expired = store.expire_verified(&lapsed, now).await?;
    if expired > 0 {
        info!(expired, "Expired lapsed verifications");
    }
    Ok(expired)
}
