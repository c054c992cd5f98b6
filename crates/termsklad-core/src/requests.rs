// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Verification request batches.
//!
//! A request groups terminals sent to the metrology lab together. Creating
//! one moves every referenced terminal to `pending` and stamps its history
//! with the request id; renaming rewrites those references structurally.

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::error::CoreError;
use crate::model::VerificationRequest;
use crate::persistence::Store;

/// Create a verification request over the given terminals.
///
/// The id is either the caller's or generated from the running request
/// count («Заявка №0001» style). Every referenced terminal must exist;
/// each one is set to `pending` with a history entry naming the request,
/// all in one transaction.
#[instrument(skip(store, terminal_ids), fields(count = terminal_ids.len()))]
pub async fn create_request(
    store: &dyn Store,
    custom_id: Option<&str>,
    terminal_ids: &[String],
    created_by: &str,
) -> Result<VerificationRequest, CoreError> {
    if terminal_ids.is_empty() {
        return Err(CoreError::validation(
            "terminalIds",
            "at least one terminal is required",
        ));
    }
    if created_by.trim().is_empty() {
        return Err(CoreError::validation("user", "must not be empty"));
    }
    if let Some(id) = custom_id
        && id.trim().is_empty()
    {
        return Err(CoreError::validation("id", "must not be empty"));
    }

    let request = store
        .create_request(custom_id, terminal_ids, created_by, Utc::now())
        .await?;
    info!(request_id = %request.id, "Verification request created");
    Ok(request)
}

/// Mark a request as processed and stamp the processing time.
#[instrument(skip(store), fields(request_id = %request_id))]
pub async fn process_request(
    store: &dyn Store,
    request_id: &str,
) -> Result<VerificationRequest, CoreError> {
    let request = store.process_request(request_id, Utc::now()).await?;
    info!("Verification request processed");
    Ok(request)
}

/// Rename a request and move its creation date.
///
/// When the id changes, the `added_to_request` history entries of the
/// referenced terminals are updated to point at the new id.
#[instrument(skip(store, new_date), fields(request_id = %request_id, new_id = %new_id))]
pub async fn rename_request(
    store: &dyn Store,
    request_id: &str,
    new_id: &str,
    new_date: DateTime<Utc>,
) -> Result<VerificationRequest, CoreError> {
    if new_id.trim().is_empty() {
        return Err(CoreError::validation("id", "must not be empty"));
    }
    let request = store.rename_request(request_id, new_id, new_date).await?;
    info!("Verification request renamed");
    Ok(request)
}
