// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Terminal stock operations: adding, moving, manual status entry, and the
//! shelf occupancy view.
//!
//! Handlers validate input and plan status changes, then hand a single
//! atomic unit of work to the [`Store`]. Placement decisions happen inside
//! the store's writing transaction, not here.

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::error::CoreError;
use crate::lifecycle::{self, TransitionRequest};
use crate::model::{BoxType, SectionView, Terminal};
use crate::persistence::{NewTerminal, Store};
use crate::placement::Occupancy;

fn require_non_empty(field: &'static str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::validation(field, "must not be empty"));
    }
    Ok(())
}

/// Register a new terminal, optionally placing it on a shelf.
///
/// The category and model are derived from the serial number prefix; the
/// first history entry records the intake into the main stock or the rental
/// pool. With a target section, a cell is allocated in the same transaction
/// that inserts the row.
#[instrument(skip(store), fields(serial = %serial))]
pub async fn add_terminal(
    store: &dyn Store,
    serial: &str,
    box_type: BoxType,
    section_id: Option<&str>,
    actor: &str,
) -> Result<Terminal, CoreError> {
    require_non_empty("serialNumber", serial)?;
    require_non_empty("user", actor)?;

    let new = NewTerminal {
        serial_number: serial.trim().to_string(),
        box_type,
        section_id: section_id.map(str::to_string),
        actor: actor.to_string(),
        now: Utc::now(),
    };
    let terminal = store.insert_terminal(&new).await?;
    info!(
        category = %terminal.category.as_str(),
        placed = terminal.location.is_some(),
        "Terminal added"
    );
    Ok(terminal)
}

/// Move a terminal to (or place it in) a section.
///
/// Rejected for terminals that are off the shelf (shipped, awaiting
/// post-shipment verification, or rented). The destination cell is the
/// first free one; moving within the same section re-validates against the
/// other occupants only.
#[instrument(skip(store), fields(serial = %serial, section = %section_id))]
pub async fn move_terminal(
    store: &dyn Store,
    serial: &str,
    section_id: &str,
    box_type: BoxType,
    actor: &str,
) -> Result<Terminal, CoreError> {
    require_non_empty("sectionId", section_id)?;
    require_non_empty("user", actor)?;

    let terminal = store
        .move_terminal(serial, section_id, box_type, actor, Utc::now())
        .await?;
    info!(position = ?terminal.position, "Terminal moved");
    Ok(terminal)
}

/// Manual status entry: the statuses an operator can set directly.
#[derive(Debug, Clone, Copy)]
pub enum ManualStatus {
    /// Enter verification results; both dates are required.
    Verified {
        /// Date of the verification.
        date: DateTime<Utc>,
        /// End of the verification window.
        until: DateTime<Utc>,
    },
    /// Mark the terminal as sent for verification outside a batch request.
    Pending,
    /// Reset verification data.
    NotVerified,
}

/// Set a terminal's status manually.
///
/// The transition is planned against the currently stored status and
/// applied with a compare-and-swap guard; concurrent changes surface as
/// [`CoreError::StatusConflict`].
#[instrument(skip(store, target), fields(serial = %serial))]
pub async fn set_status(
    store: &dyn Store,
    serial: &str,
    target: ManualStatus,
    actor: &str,
) -> Result<Terminal, CoreError> {
    require_non_empty("user", actor)?;

    let terminal = store
        .get_terminal(serial)
        .await?
        .ok_or_else(|| CoreError::TerminalNotFound {
            serial: serial.to_string(),
        })?;

    let request = match target {
        ManualStatus::Verified { date, until } => TransitionRequest::SetVerified { date, until },
        ManualStatus::Pending => TransitionRequest::MarkPending,
        ManualStatus::NotVerified => TransitionRequest::Reset,
    };
    let change = lifecycle::plan(serial, terminal.status, request, actor, Utc::now())?;
    let new_status = change.new_status;

    let terminal = store
        .apply_transition(serial, terminal.status, &change)
        .await?;
    info!(status = %new_status, "Terminal status set");
    Ok(terminal)
}

/// Build the shelf occupancy view: every section with its current box-type
/// lock and its occupants ordered by cell.
#[instrument(skip(store))]
pub async fn section_views(store: &dyn Store) -> Result<Vec<SectionView>, CoreError> {
    let sections = store.list_sections().await?;
    let terminals = store.list_terminals().await?;

    let mut views = Vec::with_capacity(sections.len());
    for section in sections {
        let mut occupants: Vec<Terminal> = terminals
            .iter()
            .filter(|t| {
                t.location
                    .as_ref()
                    .is_some_and(|l| l.section_id == section.id)
            })
            .cloned()
            .collect();
        occupants.sort_by_key(|t| t.position);

        let occupancy = Occupancy::from_placed(
            occupants
                .iter()
                .filter_map(|t| t.position.map(|p| (t.box_type, p))),
        );
        views.push(SectionView {
            section,
            current_box_type: occupancy.current_box_type,
            terminals: occupants,
        });
    }
    Ok(views)
}

/// Fetch a terminal; `TerminalNotFound` when absent.
pub async fn get_terminal(store: &dyn Store, serial: &str) -> Result<Terminal, CoreError> {
    store
        .get_terminal(serial)
        .await?
        .ok_or_else(|| CoreError::TerminalNotFound {
            serial: serial.to_string(),
        })
}
