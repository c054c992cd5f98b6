// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shipment and rental workflow.
//!
//! Shipping records a shipment row and frees the shelf cell; renting only
//! hands the terminal over (rentals are tracked through status and history,
//! not the shipment log). Both upsert the receiving contragent into the
//! directory. Terminals shipped before their verification was entered land
//! in `awaits_verification_after_shipping` and finish through
//! [`verify_after_ship`].

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::error::CoreError;
use crate::lifecycle::{self, TransitionRequest};
use crate::model::{Terminal, TerminalCategory};
use crate::persistence::{NewShipment, Store};

fn require_non_empty(field: &'static str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::validation(field, "must not be empty"));
    }
    Ok(())
}

async fn load(store: &dyn Store, serial: &str) -> Result<Terminal, CoreError> {
    store
        .get_terminal(serial)
        .await?
        .ok_or_else(|| CoreError::TerminalNotFound {
            serial: serial.to_string(),
        })
}

/// Ship a terminal to a contragent.
///
/// Never-verified terminals are rejected with `NotVerifiable`. A terminal
/// whose verification is pending or lapsed ships into
/// `awaits_verification_after_shipping`; a verified one ships plainly. The
/// shipment row keeps the status the terminal had at the moment of
/// shipping.
#[instrument(skip(store), fields(serial = %serial, contragent = %contragent))]
pub async fn ship(
    store: &dyn Store,
    serial: &str,
    contragent: &str,
    actor: &str,
) -> Result<Terminal, CoreError> {
    require_non_empty("contragent", contragent)?;
    require_non_empty("user", actor)?;

    let terminal = load(store, serial).await?;
    let now = Utc::now();
    let change = lifecycle::plan(
        serial,
        terminal.status,
        TransitionRequest::Ship { contragent },
        actor,
        now,
    )?;
    let new_status = change.new_status;

    let shipment = NewShipment {
        terminal_id: serial.to_string(),
        shipping_date: now,
        contragent: contragent.to_string(),
        status_before_shipment: terminal.status,
    };
    let terminal = store
        .apply_shipment(serial, terminal.status, &change, &shipment)
        .await?;
    info!(status = %new_status, "Terminal shipped");
    Ok(terminal)
}

/// Hand a rental-pool terminal to a contragent.
///
/// Only rental-category terminals can be rented, and never straight from
/// `not_verified`; a terminal with a lapsed verification rents with the
/// lapsed qualifier in its history. No shipment row is recorded.
#[instrument(skip(store), fields(serial = %serial, contragent = %contragent))]
pub async fn rent(
    store: &dyn Store,
    serial: &str,
    contragent: &str,
    actor: &str,
) -> Result<Terminal, CoreError> {
    require_non_empty("contragent", contragent)?;
    require_non_empty("user", actor)?;

    let terminal = load(store, serial).await?;
    if terminal.category != TerminalCategory::Rental {
        return Err(CoreError::validation(
            "serialNumber",
            "terminal is not part of the rental pool",
        ));
    }

    let change = lifecycle::plan(
        serial,
        terminal.status,
        TransitionRequest::Rent { contragent },
        actor,
        Utc::now(),
    )?;
    let terminal = store
        .apply_rental(serial, terminal.status, &change, contragent)
        .await?;
    info!("Terminal rented");
    Ok(terminal)
}

/// Enter verification results for a terminal that already shipped.
///
/// `awaits_verification_after_shipping` completes into `shipped`; a plain
/// `shipped` terminal re-verified in the field becomes `verified`.
#[instrument(skip(store, date, until), fields(serial = %serial))]
pub async fn verify_after_ship(
    store: &dyn Store,
    serial: &str,
    date: DateTime<Utc>,
    until: DateTime<Utc>,
    actor: &str,
) -> Result<Terminal, CoreError> {
    require_non_empty("user", actor)?;

    let terminal = load(store, serial).await?;
    let change = lifecycle::plan(
        serial,
        terminal.status,
        TransitionRequest::VerifyAfterShip { date, until },
        actor,
        Utc::now(),
    )?;
    let new_status = change.new_status;
    let terminal = store
        .apply_transition(serial, terminal.status, &change)
        .await?;
    info!(status = %new_status, "Post-shipment verification entered");
    Ok(terminal)
}

/// Take a rented terminal back into the pool.
///
/// The terminal returns as `not_verified` with cleared verification dates
/// and no placement. Its history is replaced by the retention policy:
/// only verification results and the rental-pool intake entry survive,
/// followed by the return entry itself.
#[instrument(skip(store), fields(serial = %serial))]
pub async fn return_from_rental(
    store: &dyn Store,
    serial: &str,
    actor: &str,
) -> Result<Terminal, CoreError> {
    require_non_empty("user", actor)?;

    let terminal = load(store, serial).await?;
    let change = lifecycle::plan(
        serial,
        terminal.status,
        TransitionRequest::Return,
        actor,
        Utc::now(),
    )?;
    let terminal = store
        .apply_transition(serial, terminal.status, &change)
        .await?;
    info!("Terminal returned from rental");
    Ok(terminal)
}

/// Correct the shipping date of a terminal's shipment.
///
/// Rewrites the shipment rows and the date of the first regular shipped
/// history entry so the log and the history stay in step.
#[instrument(skip(store, new_date), fields(serial = %terminal_id))]
pub async fn update_shipment_date(
    store: &dyn Store,
    terminal_id: &str,
    new_date: DateTime<Utc>,
) -> Result<(), CoreError> {
    store.update_shipment_date(terminal_id, new_date).await?;
    info!("Shipment date updated");
    Ok(())
}
