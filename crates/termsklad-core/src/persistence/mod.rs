//! Persistence interfaces and backends for termsklad-core.
//!
//! The [`Store`] trait exposes coarse, per-operation methods: every
//! mutating method runs as one all-or-nothing transaction, and placement
//! decisions are made inside the writing transaction so allocation cannot
//! race. Two backends implement it, PostgreSQL and SQLite.

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresStore;
pub use self::sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CoreError;
use crate::lifecycle::TerminalChange;
use crate::model::{
    BoxType, HistoryEntry, Location, SectionCapacity, ShelfSection, Shipment, Terminal,
    TerminalCategory, TerminalStatus, VerificationRequest,
};

/// Terminal row as stored; columns shared by both backends.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TerminalRow {
    /// Primary key.
    pub serial_number: String,
    /// Display model name.
    pub model: String,
    /// Stock category wire string.
    pub category: String,
    /// Status wire string.
    pub status: String,
    /// Box type wire string.
    pub box_type: String,
    /// Section the terminal is placed in, if any.
    pub section_id: Option<String>,
    /// 0-based grid position, present iff `section_id` is.
    pub position: Option<i32>,
    /// Date of the last verification.
    pub last_verification_date: Option<DateTime<Utc>>,
    /// End of the verification window.
    pub verified_until: Option<DateTime<Utc>>,
    /// History entries as a JSON array.
    pub history: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl TerminalRow {
    /// Decode into the domain type; malformed stored data surfaces as a
    /// `DatabaseError` with the decode context.
    pub fn into_terminal(self) -> Result<Terminal, CoreError> {
        let decode = |what: &str, err: String| CoreError::DatabaseError {
            operation: format!("decode terminal {}", what),
            details: err,
        };
        let status: TerminalStatus = self.status.parse().map_err(|e| decode("status", e))?;
        let box_type: BoxType = self.box_type.parse().map_err(|e| decode("box_type", e))?;
        let category: TerminalCategory =
            self.category.parse().map_err(|e| decode("category", e))?;
        let history: Vec<HistoryEntry> = serde_json::from_str(&self.history)
            .map_err(|e| decode("history", e.to_string()))?;
        let position = self.position.map(|p| p as u32);
        let location = match (&self.section_id, position) {
            (Some(section_id), Some(position)) => Some(Location {
                section_id: section_id.clone(),
                cell: position + 1,
            }),
            _ => None,
        };
        Ok(Terminal {
            serial_number: self.serial_number,
            model: self.model,
            category,
            status,
            box_type,
            location,
            position,
            last_verification_date: self.last_verification_date,
            verified_until: self.verified_until,
            history,
            created_at: self.created_at,
        })
    }
}

/// Shelf section row as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SectionRow {
    /// Primary key.
    pub id: String,
    /// Tier wire string.
    pub tier: String,
    /// Capacity as JSON.
    pub capacity: String,
}

impl SectionRow {
    /// Decode into the domain type.
    pub fn into_section(self) -> Result<ShelfSection, CoreError> {
        let tier = self.tier.parse().map_err(|e: String| CoreError::DatabaseError {
            operation: "decode section tier".to_string(),
            details: e,
        })?;
        let capacity: SectionCapacity =
            serde_json::from_str(&self.capacity).map_err(|e| CoreError::DatabaseError {
                operation: "decode section capacity".to_string(),
                details: e.to_string(),
            })?;
        Ok(ShelfSection {
            id: self.id,
            tier,
            capacity,
        })
    }
}

/// Shipment row as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ShipmentRow {
    /// Primary key.
    pub id: i64,
    /// Serial number of the shipped terminal.
    pub terminal_id: String,
    /// When the terminal shipped.
    pub shipping_date: DateTime<Utc>,
    /// Receiving contragent.
    pub contragent: String,
    /// Status wire string at the moment of shipping.
    pub status_before_shipment: String,
}

impl ShipmentRow {
    /// Decode into the domain type.
    pub fn into_shipment(self) -> Result<Shipment, CoreError> {
        let status_before_shipment =
            self.status_before_shipment
                .parse()
                .map_err(|e: String| CoreError::DatabaseError {
                    operation: "decode shipment status".to_string(),
                    details: e,
                })?;
        Ok(Shipment {
            id: self.id,
            terminal_id: self.terminal_id,
            shipping_date: self.shipping_date,
            contragent: self.contragent,
            status_before_shipment,
        })
    }
}

/// Verification request row as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RequestRow {
    /// Primary key, user-facing.
    pub id: String,
    /// Status wire string.
    pub status: String,
    /// When the request was created.
    pub created_at: DateTime<Utc>,
    /// When the request was processed.
    pub processed_at: Option<DateTime<Utc>>,
    /// Batched serial numbers as a JSON array.
    pub terminal_ids: String,
    /// Actor who created the request.
    pub created_by: String,
}

impl RequestRow {
    /// Decode into the domain type.
    pub fn into_request(self) -> Result<VerificationRequest, CoreError> {
        let status = self
            .status
            .parse()
            .map_err(|e: String| CoreError::DatabaseError {
                operation: "decode request status".to_string(),
                details: e,
            })?;
        let terminal_ids: Vec<String> =
            serde_json::from_str(&self.terminal_ids).map_err(|e| CoreError::DatabaseError {
                operation: "decode request terminal_ids".to_string(),
                details: e.to_string(),
            })?;
        Ok(VerificationRequest {
            id: self.id,
            status,
            created_at: self.created_at,
            processed_at: self.processed_at,
            terminal_ids,
            created_by: self.created_by,
        })
    }
}

/// Inputs for creating a terminal.
#[derive(Debug, Clone)]
pub struct NewTerminal {
    /// Unique serial number.
    pub serial_number: String,
    /// Box type.
    pub box_type: BoxType,
    /// Initial placement target, if any.
    pub section_id: Option<String>,
    /// Actor creating the terminal.
    pub actor: String,
    /// Creation time.
    pub now: DateTime<Utc>,
}

/// Inputs for recording an outbound shipment.
#[derive(Debug, Clone)]
pub struct NewShipment {
    /// Serial number of the shipped terminal.
    pub terminal_id: String,
    /// Shipping time.
    pub shipping_date: DateTime<Utc>,
    /// Receiving contragent.
    pub contragent: String,
    /// Terminal status before the shipment.
    pub status_before_shipment: TerminalStatus,
}

/// Persistence interface used by the operation handlers.
///
/// Mutating methods are atomic: on any failure the transaction rolls back
/// and nothing is visible. Status transitions carry the status they were
/// planned against and are applied with a compare-and-swap guard; a stale
/// plan surfaces as [`CoreError::StatusConflict`].
#[async_trait]
pub trait Store: Send + Sync {
    /// Check database connectivity.
    async fn health_check(&self) -> Result<bool, CoreError>;

    /// Fetch a terminal by serial number.
    async fn get_terminal(&self, serial: &str) -> Result<Option<Terminal>, CoreError>;

    /// List all terminals, ordered by serial number.
    async fn list_terminals(&self) -> Result<Vec<Terminal>, CoreError>;

    /// Fetch a section by id.
    async fn get_section(&self, section_id: &str) -> Result<Option<ShelfSection>, CoreError>;

    /// List all sections, ordered by id.
    async fn list_sections(&self) -> Result<Vec<ShelfSection>, CoreError>;

    /// List shipments, newest first.
    async fn list_shipments(&self) -> Result<Vec<Shipment>, CoreError>;

    /// List verification requests, newest first.
    async fn list_requests(&self) -> Result<Vec<VerificationRequest>, CoreError>;

    /// Fetch a verification request by id.
    async fn get_request(&self, request_id: &str)
    -> Result<Option<VerificationRequest>, CoreError>;

    /// List contragent names, sorted.
    async fn list_contragents(&self) -> Result<Vec<String>, CoreError>;

    /// Add a contragent; returns false if it already existed.
    async fn add_contragent(&self, name: &str) -> Result<bool, CoreError>;

    /// Delete a contragent by name.
    async fn delete_contragent(&self, name: &str) -> Result<(), CoreError>;

    /// Create a terminal, optionally allocating a cell in the target
    /// section. Duplicate serials fail with `DuplicateSerial`; allocation
    /// failures with `SectionFull`/`BoxTypeMismatch`/`TierMismatch`.
    async fn insert_terminal(&self, new: &NewTerminal) -> Result<Terminal, CoreError>;

    /// Allocate a cell in the destination section and relocate the
    /// terminal, appending a move/placement history entry. The moving
    /// terminal is excluded from the destination occupancy snapshot.
    async fn move_terminal(
        &self,
        serial: &str,
        new_section_id: &str,
        box_type: BoxType,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<Terminal, CoreError>;

    /// Apply a planned lifecycle transition.
    async fn apply_transition(
        &self,
        serial: &str,
        expected: TerminalStatus,
        change: &TerminalChange,
    ) -> Result<Terminal, CoreError>;

    /// Apply a ship transition together with its shipment row and the
    /// contragent upsert.
    async fn apply_shipment(
        &self,
        serial: &str,
        expected: TerminalStatus,
        change: &TerminalChange,
        shipment: &NewShipment,
    ) -> Result<Terminal, CoreError>;

    /// Apply a rent transition together with the contragent upsert. No
    /// shipment row: rentals are not shipments.
    async fn apply_rental(
        &self,
        serial: &str,
        expected: TerminalStatus,
        change: &TerminalChange,
        contragent: &str,
    ) -> Result<Terminal, CoreError>;

    /// Rewrite the shipping date of the terminal's shipment rows and of
    /// the first matching shipped history entry.
    async fn update_shipment_date(
        &self,
        terminal_id: &str,
        new_date: DateTime<Utc>,
    ) -> Result<(), CoreError>;

    /// Create a verification request and transition every referenced
    /// terminal to pending with a history entry naming the request. The
    /// id is generated from the request count when `custom_id` is absent.
    async fn create_request(
        &self,
        custom_id: Option<&str>,
        terminal_ids: &[String],
        created_by: &str,
        now: DateTime<Utc>,
    ) -> Result<VerificationRequest, CoreError>;

    /// Mark a request processed and stamp the processing time.
    async fn process_request(
        &self,
        request_id: &str,
        now: DateTime<Utc>,
    ) -> Result<VerificationRequest, CoreError>;

    /// Rename a request and move its creation date. When the id changes,
    /// the referenced terminals' request-reference history payloads are
    /// rewritten to the new id.
    async fn rename_request(
        &self,
        request_id: &str,
        new_id: &str,
        new_date: DateTime<Utc>,
    ) -> Result<VerificationRequest, CoreError>;

    /// Expire the given terminals that are still verified, appending one
    /// system history entry each. Returns how many rows changed; already
    /// non-verified terminals are skipped, making the sweep idempotent.
    async fn expire_verified(
        &self,
        serials: &[String],
        now: DateTime<Utc>,
    ) -> Result<u64, CoreError>;
}
