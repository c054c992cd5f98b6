// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Capacity-constrained placement within shelf sections.
//!
//! Pure decision logic over an occupancy snapshot. The store builds the
//! snapshot and applies the result inside the same transaction, holding a
//! lock on the section row, so two concurrent placements cannot be handed
//! the same cell.

use std::collections::BTreeSet;

use crate::error::CoreError;
use crate::model::{BoxType, SectionCapacity, TerminalCategory, Tier};

/// Occupancy snapshot of one section at a single point in time.
///
/// `current_box_type` is the box type of any terminal already placed there
/// (a non-empty section is locked to it), `occupied` the set of taken
/// 0-based positions. When re-validating a move, the moving terminal is
/// excluded from both.
#[derive(Debug, Clone, Default)]
pub struct Occupancy {
    /// Box type the section is locked to, if non-empty.
    pub current_box_type: Option<BoxType>,
    /// Taken 0-based positions.
    pub occupied: BTreeSet<u32>,
}

impl Occupancy {
    /// Snapshot from `(box_type, position)` pairs of placed terminals.
    pub fn from_placed(placed: impl IntoIterator<Item = (BoxType, u32)>) -> Self {
        let mut current_box_type = None;
        let mut occupied = BTreeSet::new();
        for (box_type, position) in placed {
            current_box_type.get_or_insert(box_type);
            occupied.insert(position);
        }
        Self {
            current_box_type,
            occupied,
        }
    }
}

/// Validate that a terminal category may enter a section tier: rental
/// stock only on the rental tier, regular stock never there.
pub fn check_tier(
    section_id: &str,
    tier: Tier,
    category: TerminalCategory,
) -> Result<(), CoreError> {
    let allowed = match category {
        TerminalCategory::Rental => tier == Tier::Rental,
        TerminalCategory::Standard => tier != Tier::Rental,
    };
    if allowed {
        Ok(())
    } else {
        Err(CoreError::TierMismatch {
            section_id: section_id.to_string(),
            tier,
        })
    }
}

/// Assign the lowest free position in the section for the requested box
/// type.
///
/// Capacity is measured against the section's effective box type: the
/// locked type while the section is non-empty, otherwise the requested
/// one. Fails with `BoxTypeMismatch` when locked to a different type and
/// `SectionFull` when every cell is taken.
pub fn allocate(
    section_id: &str,
    capacity: &SectionCapacity,
    occupancy: &Occupancy,
    requested: BoxType,
) -> Result<u32, CoreError> {
    if let Some(current) = occupancy.current_box_type
        && current != requested
    {
        return Err(CoreError::BoxTypeMismatch {
            section_id: section_id.to_string(),
            section_box_type: current,
            requested,
        });
    }

    let effective = occupancy.current_box_type.unwrap_or(requested);
    let total_cells = capacity.for_box_type(effective).total_cells();

    (0..total_cells)
        .find(|position| !occupancy.occupied.contains(position))
        .ok_or_else(|| CoreError::SectionFull {
            section_id: section_id.to_string(),
        })
}
