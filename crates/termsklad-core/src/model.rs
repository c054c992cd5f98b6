// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Domain model for the terminal warehouse.
//!
//! Types here serialize to the exact wire strings the rest of the system
//! (and the persisted rows) use: statuses as `not_verified`/`pending`/…,
//! box types as `type_A`/`type_B`, tiers as their Russian shelf labels.
//! History entries are structured, tagged events; the human-readable
//! Russian text is derived from them via `Display`, never parsed back.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Serial numbers with this prefix belong to the rental pool.
pub const RENTAL_SERIAL_PREFIX: &str = "1792";

/// Actor recorded on history entries written by the expiry sweep.
pub const SYSTEM_ACTOR: &str = "Система";

/// Verification status of a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    /// Never verified, or verification data cleared.
    NotVerified,
    /// Included in a verification request, awaiting results.
    Pending,
    /// Verified; both verification dates are set.
    Verified,
    /// Verification window lapsed.
    Expired,
    /// Shipped to a contragent.
    Shipped,
    /// Shipped before verification results arrived.
    AwaitsVerificationAfterShipping,
    /// Handed out from the rental pool.
    Rented,
}

impl TerminalStatus {
    /// Wire/database string for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotVerified => "not_verified",
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Expired => "expired",
            Self::Shipped => "shipped",
            Self::AwaitsVerificationAfterShipping => "awaits_verification_after_shipping",
            Self::Rented => "rented",
        }
    }

    /// True for statuses in which a terminal is off the shelves and may not
    /// carry a location.
    pub fn is_off_shelf(&self) -> bool {
        matches!(
            self,
            Self::Shipped | Self::AwaitsVerificationAfterShipping | Self::Rented
        )
    }
}

impl fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TerminalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_verified" => Ok(Self::NotVerified),
            "pending" => Ok(Self::Pending),
            "verified" => Ok(Self::Verified),
            "expired" => Ok(Self::Expired),
            "shipped" => Ok(Self::Shipped),
            "awaits_verification_after_shipping" => Ok(Self::AwaitsVerificationAfterShipping),
            "rented" => Ok(Self::Rented),
            other => Err(format!("unknown terminal status '{}'", other)),
        }
    }
}

/// Physical packaging of a terminal; determines grid capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoxType {
    /// Small box.
    #[serde(rename = "type_A")]
    TypeA,
    /// Large box.
    #[serde(rename = "type_B")]
    TypeB,
}

impl BoxType {
    /// Wire/database string for this box type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TypeA => "type_A",
            Self::TypeB => "type_B",
        }
    }
}

impl fmt::Display for BoxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BoxType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "type_A" => Ok(Self::TypeA),
            "type_B" => Ok(Self::TypeB),
            other => Err(format!("unknown box type '{}'", other)),
        }
    }
}

/// Shelf tier. The rental tier is reserved for rental-pool terminals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    /// Upper shelves.
    #[serde(rename = "Верхний")]
    Upper,
    /// Lower shelves.
    #[serde(rename = "Нижний")]
    Lower,
    /// Rental-pool shelves.
    #[serde(rename = "Аренда")]
    Rental,
}

impl Tier {
    /// Wire/database string for this tier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upper => "Верхний",
            Self::Lower => "Нижний",
            Self::Rental => "Аренда",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Верхний" => Ok(Self::Upper),
            "Нижний" => Ok(Self::Lower),
            "Аренда" => Ok(Self::Rental),
            other => Err(format!("unknown tier '{}'", other)),
        }
    }
}

/// Stock category of a terminal, fixed at creation time.
///
/// Derived once from the serial-number prefix and stored explicitly;
/// placement validates it against the target section's tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalCategory {
    /// Regular warehouse stock.
    Standard,
    /// Rental-pool stock (serials prefixed `1792`).
    Rental,
}

impl TerminalCategory {
    /// Classify a serial number at creation time.
    pub fn from_serial(serial: &str) -> Self {
        if serial.starts_with(RENTAL_SERIAL_PREFIX) {
            Self::Rental
        } else {
            Self::Standard
        }
    }

    /// Wire/database string for this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Rental => "rental",
        }
    }

    /// Display model name for terminals of this category.
    pub fn model_name(&self) -> &'static str {
        match self {
            Self::Standard => "Инспектор 1",
            Self::Rental => "Инспектор 1 (Аренда)",
        }
    }
}

impl FromStr for TerminalCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Self::Standard),
            "rental" => Ok(Self::Rental),
            other => Err(format!("unknown terminal category '{}'", other)),
        }
    }
}

/// Grid dimensions for one box type within a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSize {
    /// Number of rows.
    pub rows: u32,
    /// Number of columns.
    pub cols: u32,
}

impl GridSize {
    /// Total number of cells in the grid.
    pub fn total_cells(&self) -> u32 {
        self.rows * self.cols
    }
}

/// Per-box-type capacity of a shelf section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionCapacity {
    /// Grid for `type_A` boxes.
    #[serde(rename = "type_A")]
    pub type_a: GridSize,
    /// Grid for `type_B` boxes.
    #[serde(rename = "type_B")]
    pub type_b: GridSize,
}

impl SectionCapacity {
    /// Grid for the given box type.
    pub fn for_box_type(&self, box_type: BoxType) -> GridSize {
        match box_type {
            BoxType::TypeA => self.type_a,
            BoxType::TypeB => self.type_b,
        }
    }
}

/// A shelf section: static reference data seeded by migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShelfSection {
    /// Section identifier as printed on the shelf.
    pub id: String,
    /// Tier the section belongs to.
    pub tier: Tier,
    /// Per-box-type grid capacity.
    pub capacity: SectionCapacity,
}

/// Grid placement of a terminal, as displayed: `cell` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Section the terminal sits in.
    pub section_id: String,
    /// 1-based cell number (`position + 1`).
    pub cell: u32,
}

/// Structured history event. The Russian event text shown to users is
/// produced by `Display`; domain lookups match on the variant and its
/// payload fields instead of scanning text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryEvent {
    /// Terminal created as regular stock.
    AddedToStock,
    /// Terminal created as rental-pool stock.
    AddedToRentalPool,
    /// Terminal placed in a section; no prior location.
    Placed {
        /// Destination section.
        section_id: String,
    },
    /// Terminal moved between sections.
    Moved {
        /// Origin section.
        from: String,
        /// Destination section.
        to: String,
    },
    /// Terminal included in a verification request.
    AddedToRequest {
        /// The request the terminal was added to.
        request_id: String,
    },
    /// Verification data entered; terminal verified.
    Verified,
    /// Manually marked pending outside of a request.
    MarkedPending,
    /// Verification data cleared.
    ResetNotVerified,
    /// Terminal shipped to a contragent.
    Shipped {
        /// Receiving contragent.
        contragent: String,
        /// True when the terminal's verification had lapsed at shipping time.
        lapsed: bool,
    },
    /// Terminal handed out from the rental pool.
    Rented {
        /// Receiving contragent.
        contragent: String,
        /// True when the terminal's verification had lapsed at handoff time.
        lapsed: bool,
    },
    /// Terminal returned to the rental stock.
    ReturnedFromRental,
    /// Verification data entered for an already-shipped terminal.
    PostShipmentVerified,
    /// Verification window lapsed; set by the expiry sweep.
    Expired,
}

impl HistoryEvent {
    /// Rental-return retention policy: on return from rental the history is
    /// replaced with only the entries this returns `true` for. Prior
    /// shipments and moves are deliberately discarded; pending product
    /// confirmation this mirrors the long-standing behavior.
    pub fn survives_rental_return(&self) -> bool {
        matches!(self, Self::Verified | Self::AddedToRentalPool)
    }
}

impl fmt::Display for HistoryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddedToStock => f.write_str("Добавлен на склад"),
            Self::AddedToRentalPool => f.write_str("Добавлен в арендный фонд"),
            Self::Placed { section_id } => {
                write!(f, "Размещен на стеллаже {}", section_id)
            }
            Self::Moved { from, to } => {
                write!(f, "Перемещен со стеллажа {} на {}", from, to)
            }
            Self::AddedToRequest { request_id } => {
                write!(f, "Добавлен в заявку на поверку {}", request_id)
            }
            Self::Verified => f.write_str("Поверен"),
            Self::MarkedPending => f.write_str("Переведен в статус \"Ожидание\""),
            Self::ResetNotVerified => f.write_str("Статус сброшен на \"Не поверен\""),
            Self::Shipped { contragent, lapsed } => {
                if *lapsed {
                    write!(
                        f,
                        "Отгружен контрагенту (с истекшим сроком поверки): {}",
                        contragent
                    )
                } else {
                    write!(f, "Отгружен контрагенту: {}", contragent)
                }
            }
            Self::Rented { contragent, lapsed } => {
                if *lapsed {
                    write!(
                        f,
                        "Передан в аренду контрагенту (с истекшим сроком поверки): {}",
                        contragent
                    )
                } else {
                    write!(f, "Передан в аренду контрагенту: {}", contragent)
                }
            }
            Self::ReturnedFromRental => f.write_str("Возвращен на арендный склад"),
            Self::PostShipmentVerified => {
                f.write_str("Данные о поверке внесены (после отгрузки)")
            }
            Self::Expired => f.write_str(
                "Статус изменен на \"Просрочен\" из-за истечения срока поверки",
            ),
        }
    }
}

/// One appended history record: what happened, when, and who did it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Wall-clock time of the operation.
    pub date: DateTime<Utc>,
    /// The structured event.
    pub event: HistoryEvent,
    /// Actor who performed the operation.
    pub responsible: String,
}

impl HistoryEntry {
    /// Build an entry timestamped `date`.
    pub fn new(date: DateTime<Utc>, event: HistoryEvent, responsible: impl Into<String>) -> Self {
        Self {
            date,
            event,
            responsible: responsible.into(),
        }
    }
}

/// Apply the rental-return retention policy to a history.
///
/// Returns the surviving prefix of `history` in original order; the caller
/// appends the return entry afterwards.
pub fn prune_for_rental_return(history: &[HistoryEntry]) -> Vec<HistoryEntry> {
    history
        .iter()
        .filter(|e| e.event.survives_rental_return())
        .cloned()
        .collect()
}

/// Rewrite `added_to_request` entries referencing `old_id` to reference
/// `new_id`. Returns true when at least one entry changed.
pub fn rewrite_request_references(
    history: &mut [HistoryEntry],
    old_id: &str,
    new_id: &str,
) -> bool {
    let mut changed = false;
    for entry in history.iter_mut() {
        if let HistoryEvent::AddedToRequest { request_id } = &mut entry.event
            && request_id == old_id
        {
            *request_id = new_id.to_string();
            changed = true;
        }
    }
    changed
}

/// A measurement terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Terminal {
    /// Unique, immutable serial number.
    pub serial_number: String,
    /// Display model name, fixed at creation from the category.
    pub model: String,
    /// Stock category, fixed at creation from the serial prefix.
    pub category: TerminalCategory,
    /// Current lifecycle status.
    pub status: TerminalStatus,
    /// Box type; constrains which sections the terminal may share.
    pub box_type: BoxType,
    /// Shelf placement, absent while shipped/rented.
    pub location: Option<Location>,
    /// 0-based grid position backing `location`.
    pub position: Option<u32>,
    /// Date of the last verification, set together with `verified_until`.
    pub last_verification_date: Option<DateTime<Utc>>,
    /// End of the verification window, set together with
    /// `last_verification_date`.
    pub verified_until: Option<DateTime<Utc>>,
    /// Append-only operation history (replaced only on rental return).
    pub history: Vec<HistoryEntry>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Status of a verification request batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Submitted, awaiting processing.
    Pending,
    /// Processed by the verification lab.
    Processed,
}

impl RequestStatus {
    /// Wire/database string for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
        }
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processed" => Ok(Self::Processed),
            other => Err(format!("unknown request status '{}'", other)),
        }
    }
}

/// A named batch of terminals sent for external verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    /// Request identifier, user-facing (`Заявка №0007` unless custom).
    pub id: String,
    /// Processing status.
    pub status: RequestStatus,
    /// When the request was created.
    pub created_at: DateTime<Utc>,
    /// When the request was processed, if it has been.
    pub processed_at: Option<DateTime<Utc>>,
    /// Serial numbers of the batched terminals.
    pub terminal_ids: Vec<String>,
    /// Actor who created the request.
    pub created_by: String,
}

/// Generated id for the `n`-th request (1-based), zero-padded to 4 digits.
pub fn generated_request_id(n: i64) -> String {
    format!("Заявка №{:04}", n)
}

/// An outbound shipment record. Rentals do not create shipments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shipment {
    /// Database key.
    pub id: i64,
    /// Serial number of the shipped terminal.
    pub terminal_id: String,
    /// When the terminal shipped.
    pub shipping_date: DateTime<Utc>,
    /// Receiving contragent.
    pub contragent: String,
    /// Terminal status at the moment of shipping.
    pub status_before_shipment: TerminalStatus,
}

/// Computed occupancy view of a section. Never persisted; recomputed from
/// the terminal collection on every read.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionView {
    /// The underlying section.
    #[serde(flatten)]
    pub section: ShelfSection,
    /// Box type the section is currently locked to, if non-empty.
    pub current_box_type: Option<BoxType>,
    /// Terminals currently placed in the section, by ascending position.
    pub terminals: Vec<Terminal>,
}
