//! SQLite-backed store implementation.
//!
//! The pool is capped at one connection: every transaction is the sole
//! writer, so the read-then-write of a placement allocation or a status
//! compare-and-swap cannot interleave with another operation.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::CoreError;
use crate::lifecycle::{DateChange, TerminalChange};
use crate::model::{
    BoxType, HistoryEntry, HistoryEvent, ShelfSection, Shipment, Terminal, TerminalCategory,
    TerminalStatus, VerificationRequest, generated_request_id, prune_for_rental_return,
    rewrite_request_references,
};
use crate::placement;

use super::{
    NewShipment, NewTerminal, RequestRow, SectionRow, ShipmentRow, Store, TerminalRow,
};

const TERMINAL_COLUMNS: &str = "serial_number, model, category, status, box_type, section_id, \
     position, last_verification_date, verified_until, history, created_at";

/// SQLite-backed store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a store from an existing pool. Migrations must already have
    /// run.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create and initialize a store from a database file path.
    ///
    /// Creates parent directories and the database file as needed,
    /// connects with a single-connection pool, and runs all migrations.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::DatabaseError {
                operation: "create_dir".to_string(),
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
        Self::from_url(&url).await
    }

    /// Create and initialize a store from a `sqlite:` URL.
    pub async fn from_url(url: &str) -> Result<Self, CoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at {}: {}", url, e),
            })?;

        crate::migrations::run_sqlite(&pool)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "migrate".to_string(),
                details: format!("Failed to run migrations: {}", e),
            })?;

        Ok(Self { pool })
    }
}

async fn fetch_terminal_row(
    conn: &mut SqliteConnection,
    serial: &str,
) -> Result<Option<TerminalRow>, CoreError> {
    let row = sqlx::query_as::<_, TerminalRow>(&format!(
        "SELECT {} FROM terminals WHERE serial_number = ?",
        TERMINAL_COLUMNS
    ))
    .bind(serial)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

async fn fetch_terminal(
    conn: &mut SqliteConnection,
    serial: &str,
) -> Result<Option<Terminal>, CoreError> {
    match fetch_terminal_row(conn, serial).await? {
        Some(row) => Ok(Some(row.into_terminal()?)),
        None => Ok(None),
    }
}

async fn fetch_section(
    conn: &mut SqliteConnection,
    section_id: &str,
) -> Result<Option<ShelfSection>, CoreError> {
    let row = sqlx::query_as::<_, SectionRow>(
        "SELECT id, tier, capacity FROM shelf_sections WHERE id = ?",
    )
    .bind(section_id)
    .fetch_optional(&mut *conn)
    .await?;
    match row {
        Some(row) => Ok(Some(row.into_section()?)),
        None => Ok(None),
    }
}

/// Occupancy snapshot of a section, excluding `exclude` when given (the
/// moving terminal re-validates against the others only).
async fn section_occupancy(
    conn: &mut SqliteConnection,
    section_id: &str,
    exclude: Option<&str>,
) -> Result<placement::Occupancy, CoreError> {
    let rows: Vec<(String, i32)> = sqlx::query_as(
        "SELECT box_type, position FROM terminals \
         WHERE section_id = ? AND position IS NOT NULL AND serial_number <> ?",
    )
    .bind(section_id)
    .bind(exclude.unwrap_or(""))
    .fetch_all(&mut *conn)
    .await?;

    let mut placed = Vec::with_capacity(rows.len());
    for (box_type, position) in rows {
        let box_type: BoxType = box_type.parse().map_err(|e| CoreError::DatabaseError {
            operation: "decode occupancy box_type".to_string(),
            details: e,
        })?;
        placed.push((box_type, position as u32));
    }
    Ok(placement::Occupancy::from_placed(placed))
}

async fn write_history(
    conn: &mut SqliteConnection,
    serial: &str,
    history: &[HistoryEntry],
) -> Result<(), CoreError> {
    let json = serde_json::to_string(history)?;
    sqlx::query("UPDATE terminals SET history = ? WHERE serial_number = ?")
        .bind(json)
        .bind(serial)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Apply a planned transition under a compare-and-swap on the expected
/// status: status, dates, location, and history change as one statement.
async fn apply_change(
    conn: &mut SqliteConnection,
    serial: &str,
    expected: TerminalStatus,
    change: &TerminalChange,
) -> Result<Terminal, CoreError> {
    let row = fetch_terminal_row(conn, serial)
        .await?
        .ok_or_else(|| CoreError::TerminalNotFound {
            serial: serial.to_string(),
        })?;
    if row.status != expected.as_str() {
        return Err(CoreError::StatusConflict {
            serial: serial.to_string(),
            expected,
        });
    }

    let mut history: Vec<HistoryEntry> = serde_json::from_str(&row.history)?;
    if change.prune_history {
        history = prune_for_rental_return(&history);
    }
    history.push(change.entry.clone());
    let history_json = serde_json::to_string(&history)?;

    let (date, until) = match change.dates {
        DateChange::Keep => (row.last_verification_date, row.verified_until),
        DateChange::Set { date, until } => (Some(date), Some(until)),
        DateChange::Clear => (None, None),
    };
    let (section_id, position) = if change.clear_location {
        (None, None)
    } else {
        (row.section_id.clone(), row.position)
    };

    let result = sqlx::query(
        "UPDATE terminals \
         SET status = ?, last_verification_date = ?, verified_until = ?, \
             section_id = ?, position = ?, history = ? \
         WHERE serial_number = ? AND status = ?",
    )
    .bind(change.new_status.as_str())
    .bind(date)
    .bind(until)
    .bind(&section_id)
    .bind(position)
    .bind(&history_json)
    .bind(serial)
    .bind(expected.as_str())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::StatusConflict {
            serial: serial.to_string(),
            expected,
        });
    }

    fetch_terminal(conn, serial)
        .await?
        .ok_or_else(|| CoreError::TerminalNotFound {
            serial: serial.to_string(),
        })
}

async fn upsert_contragent(conn: &mut SqliteConnection, name: &str) -> Result<(), CoreError> {
    sqlx::query("INSERT INTO contragents (name) VALUES (?) ON CONFLICT (name) DO NOTHING")
        .bind(name)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn health_check(&self) -> Result<bool, CoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(true)
    }

    async fn get_terminal(&self, serial: &str) -> Result<Option<Terminal>, CoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_terminal(&mut conn, serial).await
    }

    async fn list_terminals(&self) -> Result<Vec<Terminal>, CoreError> {
        let rows = sqlx::query_as::<_, TerminalRow>(&format!(
            "SELECT {} FROM terminals ORDER BY serial_number ASC",
            TERMINAL_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TerminalRow::into_terminal).collect()
    }

    async fn get_section(&self, section_id: &str) -> Result<Option<ShelfSection>, CoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_section(&mut conn, section_id).await
    }

    async fn list_sections(&self) -> Result<Vec<ShelfSection>, CoreError> {
        let rows = sqlx::query_as::<_, SectionRow>(
            "SELECT id, tier, capacity FROM shelf_sections ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(SectionRow::into_section).collect()
    }

    async fn list_shipments(&self) -> Result<Vec<Shipment>, CoreError> {
        let rows = sqlx::query_as::<_, ShipmentRow>(
            "SELECT id, terminal_id, shipping_date, contragent, status_before_shipment \
             FROM shipments ORDER BY shipping_date DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ShipmentRow::into_shipment).collect()
    }

    async fn list_requests(&self) -> Result<Vec<VerificationRequest>, CoreError> {
        let rows = sqlx::query_as::<_, RequestRow>(
            "SELECT id, status, created_at, processed_at, terminal_ids, created_by \
             FROM verification_requests ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RequestRow::into_request).collect()
    }

    async fn get_request(
        &self,
        request_id: &str,
    ) -> Result<Option<VerificationRequest>, CoreError> {
        let row = sqlx::query_as::<_, RequestRow>(
            "SELECT id, status, created_at, processed_at, terminal_ids, created_by \
             FROM verification_requests WHERE id = ?",
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(row.into_request()?)),
            None => Ok(None),
        }
    }

    async fn list_contragents(&self) -> Result<Vec<String>, CoreError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM contragents ORDER BY name ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn add_contragent(&self, name: &str) -> Result<bool, CoreError> {
        let result = sqlx::query(
            "INSERT INTO contragents (name) VALUES (?) ON CONFLICT (name) DO NOTHING",
        )
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_contragent(&self, name: &str) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM contragents WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_terminal(&self, new: &NewTerminal) -> Result<Terminal, CoreError> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(String,)> =
            sqlx::query_as("SELECT serial_number FROM terminals WHERE serial_number = ?")
                .bind(&new.serial_number)
                .fetch_optional(&mut *tx)
                .await?;
        if existing.is_some() {
            return Err(CoreError::DuplicateSerial {
                serial: new.serial_number.clone(),
            });
        }

        let category = TerminalCategory::from_serial(&new.serial_number);

        let mut section_id: Option<String> = None;
        let mut position: Option<i32> = None;
        if let Some(target) = &new.section_id {
            let section = fetch_section(&mut tx, target).await?.ok_or_else(|| {
                CoreError::SectionNotFound {
                    section_id: target.clone(),
                }
            })?;
            placement::check_tier(&section.id, section.tier, category)?;
            let occupancy = section_occupancy(&mut tx, target, None).await?;
            let cell =
                placement::allocate(&section.id, &section.capacity, &occupancy, new.box_type)?;
            section_id = Some(target.clone());
            position = Some(cell as i32);
        }

        let initial_event = match category {
            TerminalCategory::Rental => HistoryEvent::AddedToRentalPool,
            TerminalCategory::Standard => HistoryEvent::AddedToStock,
        };
        let history = vec![HistoryEntry::new(new.now, initial_event, &new.actor)];
        let history_json = serde_json::to_string(&history)?;

        sqlx::query(
            "INSERT INTO terminals \
             (serial_number, model, category, status, box_type, section_id, position, \
              last_verification_date, verified_until, history, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, NULL, NULL, ?, ?)",
        )
        .bind(&new.serial_number)
        .bind(category.model_name())
        .bind(category.as_str())
        .bind(TerminalStatus::NotVerified.as_str())
        .bind(new.box_type.as_str())
        .bind(&section_id)
        .bind(position)
        .bind(&history_json)
        .bind(new.now)
        .execute(&mut *tx)
        .await?;

        let terminal = fetch_terminal(&mut tx, &new.serial_number)
            .await?
            .ok_or_else(|| CoreError::TerminalNotFound {
                serial: new.serial_number.clone(),
            })?;
        tx.commit().await?;
        Ok(terminal)
    }

    async fn move_terminal(
        &self,
        serial: &str,
        new_section_id: &str,
        box_type: BoxType,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<Terminal, CoreError> {
        let mut tx = self.pool.begin().await?;

        let terminal = fetch_terminal(&mut tx, serial)
            .await?
            .ok_or_else(|| CoreError::TerminalNotFound {
                serial: serial.to_string(),
            })?;
        if terminal.status.is_off_shelf() {
            return Err(CoreError::InvalidTransition {
                serial: serial.to_string(),
                from: terminal.status,
                operation: "move",
            });
        }

        let section = fetch_section(&mut tx, new_section_id).await?.ok_or_else(|| {
            CoreError::SectionNotFound {
                section_id: new_section_id.to_string(),
            }
        })?;
        placement::check_tier(&section.id, section.tier, terminal.category)?;

        let occupancy = section_occupancy(&mut tx, new_section_id, Some(serial)).await?;
        let cell = placement::allocate(&section.id, &section.capacity, &occupancy, box_type)?;

        let event = match &terminal.location {
            Some(location) => HistoryEvent::Moved {
                from: location.section_id.clone(),
                to: new_section_id.to_string(),
            },
            None => HistoryEvent::Placed {
                section_id: new_section_id.to_string(),
            },
        };
        let mut history = terminal.history;
        history.push(HistoryEntry::new(now, event, actor));
        let history_json = serde_json::to_string(&history)?;

        sqlx::query(
            "UPDATE terminals SET section_id = ?, position = ?, history = ? \
             WHERE serial_number = ?",
        )
        .bind(new_section_id)
        .bind(cell as i32)
        .bind(&history_json)
        .bind(serial)
        .execute(&mut *tx)
        .await?;

        let terminal = fetch_terminal(&mut tx, serial)
            .await?
            .ok_or_else(|| CoreError::TerminalNotFound {
                serial: serial.to_string(),
            })?;
        tx.commit().await?;
        Ok(terminal)
    }

    async fn apply_transition(
        &self,
        serial: &str,
        expected: TerminalStatus,
        change: &TerminalChange,
    ) -> Result<Terminal, CoreError> {
        let mut tx = self.pool.begin().await?;
        let terminal = apply_change(&mut tx, serial, expected, change).await?;
        tx.commit().await?;
        Ok(terminal)
    }

    async fn apply_shipment(
        &self,
        serial: &str,
        expected: TerminalStatus,
        change: &TerminalChange,
        shipment: &NewShipment,
    ) -> Result<Terminal, CoreError> {
        let mut tx = self.pool.begin().await?;

        upsert_contragent(&mut tx, &shipment.contragent).await?;
        sqlx::query(
            "INSERT INTO shipments (terminal_id, shipping_date, contragent, status_before_shipment) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(&shipment.terminal_id)
        .bind(shipment.shipping_date)
        .bind(&shipment.contragent)
        .bind(shipment.status_before_shipment.as_str())
        .execute(&mut *tx)
        .await?;

        let terminal = apply_change(&mut tx, serial, expected, change).await?;
        tx.commit().await?;
        Ok(terminal)
    }

    async fn apply_rental(
        &self,
        serial: &str,
        expected: TerminalStatus,
        change: &TerminalChange,
        contragent: &str,
    ) -> Result<Terminal, CoreError> {
        let mut tx = self.pool.begin().await?;
        upsert_contragent(&mut tx, contragent).await?;
        let terminal = apply_change(&mut tx, serial, expected, change).await?;
        tx.commit().await?;
        Ok(terminal)
    }

    async fn update_shipment_date(
        &self,
        terminal_id: &str,
        new_date: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await?;

        let terminal = fetch_terminal(&mut tx, terminal_id)
            .await?
            .ok_or_else(|| CoreError::TerminalNotFound {
                serial: terminal_id.to_string(),
            })?;

        sqlx::query("UPDATE shipments SET shipping_date = ? WHERE terminal_id = ?")
            .bind(new_date)
            .bind(terminal_id)
            .execute(&mut *tx)
            .await?;

        // The first regular shipped entry follows the shipment row's date.
        let mut history = terminal.history;
        let matching = history
            .iter_mut()
            .find(|e| matches!(e.event, HistoryEvent::Shipped { lapsed: false, .. }));
        if let Some(entry) = matching {
            entry.date = new_date;
            write_history(&mut tx, terminal_id, &history).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn create_request(
        &self,
        custom_id: Option<&str>,
        terminal_ids: &[String],
        created_by: &str,
        now: DateTime<Utc>,
    ) -> Result<VerificationRequest, CoreError> {
        let mut tx = self.pool.begin().await?;

        let id = match custom_id {
            Some(id) => id.to_string(),
            None => {
                let (count,): (i64,) =
                    sqlx::query_as("SELECT COUNT(*) FROM verification_requests")
                        .fetch_one(&mut *tx)
                        .await?;
                generated_request_id(count + 1)
            }
        };

        let terminal_ids_json = serde_json::to_string(terminal_ids)?;
        sqlx::query(
            "INSERT INTO verification_requests (id, status, created_at, processed_at, terminal_ids, created_by) \
             VALUES (?, 'pending', ?, NULL, ?, ?)",
        )
        .bind(&id)
        .bind(now)
        .bind(&terminal_ids_json)
        .bind(created_by)
        .execute(&mut *tx)
        .await?;

        for serial in terminal_ids {
            let row = fetch_terminal_row(&mut tx, serial).await?.ok_or_else(|| {
                CoreError::TerminalNotFound {
                    serial: serial.clone(),
                }
            })?;
            let mut history: Vec<HistoryEntry> = serde_json::from_str(&row.history)?;
            history.push(HistoryEntry::new(
                now,
                HistoryEvent::AddedToRequest {
                    request_id: id.clone(),
                },
                created_by,
            ));
            let history_json = serde_json::to_string(&history)?;
            sqlx::query(
                "UPDATE terminals SET status = 'pending', history = ? WHERE serial_number = ?",
            )
            .bind(&history_json)
            .bind(serial)
            .execute(&mut *tx)
            .await?;
        }

        let row = sqlx::query_as::<_, RequestRow>(
            "SELECT id, status, created_at, processed_at, terminal_ids, created_by \
             FROM verification_requests WHERE id = ?",
        )
        .bind(&id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        row.into_request()
    }

    async fn process_request(
        &self,
        request_id: &str,
        now: DateTime<Utc>,
    ) -> Result<VerificationRequest, CoreError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE verification_requests SET status = 'processed', processed_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(request_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::RequestNotFound {
                request_id: request_id.to_string(),
            });
        }
        let row = sqlx::query_as::<_, RequestRow>(
            "SELECT id, status, created_at, processed_at, terminal_ids, created_by \
             FROM verification_requests WHERE id = ?",
        )
        .bind(request_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        row.into_request()
    }

    async fn rename_request(
        &self,
        request_id: &str,
        new_id: &str,
        new_date: DateTime<Utc>,
    ) -> Result<VerificationRequest, CoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, RequestRow>(
            "SELECT id, status, created_at, processed_at, terminal_ids, created_by \
             FROM verification_requests WHERE id = ?",
        )
        .bind(request_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CoreError::RequestNotFound {
            request_id: request_id.to_string(),
        })?;
        let request = row.into_request()?;

        sqlx::query("UPDATE verification_requests SET id = ?, created_at = ? WHERE id = ?")
            .bind(new_id)
            .bind(new_date)
            .bind(request_id)
            .execute(&mut *tx)
            .await?;

        if new_id != request_id {
            for serial in &request.terminal_ids {
                let Some(terminal) = fetch_terminal(&mut tx, serial).await? else {
                    continue;
                };
                let mut history = terminal.history;
                if rewrite_request_references(&mut history, request_id, new_id) {
                    write_history(&mut tx, serial, &history).await?;
                }
            }
        }

        let row = sqlx::query_as::<_, RequestRow>(
            "SELECT id, status, created_at, processed_at, terminal_ids, created_by \
             FROM verification_requests WHERE id = ?",
        )
        .bind(new_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        row.into_request()
    }

    async fn expire_verified(
        &self,
        serials: &[String],
        now: DateTime<Utc>,
    ) -> Result<u64, CoreError> {
        let mut tx = self.pool.begin().await?;
        let mut expired = 0u64;

        for serial in serials {
            let row: Option<(String,)> = sqlx::query_as(
                "SELECT history FROM terminals WHERE serial_number = ? AND status = 'verified'",
            )
            .bind(serial)
            .fetch_optional(&mut *tx)
            .await?;
            let Some((history_json,)) = row else {
                continue;
            };
            let mut history: Vec<HistoryEntry> = serde_json::from_str(&history_json)?;
            history.push(HistoryEntry::new(
                now,
                HistoryEvent::Expired,
                crate::model::SYSTEM_ACTOR,
            ));
            let history_json = serde_json::to_string(&history)?;
            let result = sqlx::query(
                "UPDATE terminals SET status = 'expired', history = ? \
                 WHERE serial_number = ? AND status = 'verified'",
            )
            .bind(&history_json)
            .bind(serial)
            .execute(&mut *tx)
            .await?;
            expired += result.rows_affected();
        }

        tx.commit().await?;
        Ok(expired)
    }
}
