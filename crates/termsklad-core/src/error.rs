// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for termsklad-core.
//!
//! One unified error type covers validation, lookup failures, lifecycle
//! guards, capacity errors, and storage failures. Every variant carries a
//! stable machine-readable code used by the HTTP layer.

use std::fmt;

use crate::model::{BoxType, TerminalStatus, Tier};

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur during request processing.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CoreError {
    /// Input validation failed; nothing was mutated.
    ValidationError {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// Terminal was not found in the database.
    TerminalNotFound {
        /// The serial number that was not found.
        serial: String,
    },

    /// Shelf section was not found.
    SectionNotFound {
        /// The section id that was not found.
        section_id: String,
    },

    /// Verification request was not found.
    RequestNotFound {
        /// The request id that was not found.
        request_id: String,
    },

    /// A terminal with this serial number already exists.
    DuplicateSerial {
        /// The conflicting serial number.
        serial: String,
    },

    /// The requested status change is not in the transition table.
    InvalidTransition {
        /// The terminal's serial number.
        serial: String,
        /// The terminal's current status.
        from: TerminalStatus,
        /// The attempted operation.
        operation: &'static str,
    },

    /// A never-verified terminal cannot be shipped.
    NotVerifiable {
        /// The terminal's serial number.
        serial: String,
    },

    /// The target section has no free cells.
    SectionFull {
        /// The full section.
        section_id: String,
    },

    /// The target section is locked to a different box type.
    BoxTypeMismatch {
        /// The target section.
        section_id: String,
        /// The box type the section is locked to.
        section_box_type: BoxType,
        /// The box type that was requested.
        requested: BoxType,
    },

    /// The terminal's category does not match the section's tier.
    TierMismatch {
        /// The target section.
        section_id: String,
        /// The target section's tier.
        tier: Tier,
    },

    /// The terminal's status changed between read and write; the operation
    /// was not applied.
    StatusConflict {
        /// The terminal's serial number.
        serial: String,
        /// The status the operation was planned against.
        expected: TerminalStatus,
    },

    /// The verification registry returned no results for a serial, even
    /// after the bounded retry.
    RegistryNotFound {
        /// The serial number that was looked up.
        serial: String,
    },

    /// The verification registry could not be reached or returned garbage.
    RegistryUnavailable {
        /// What went wrong.
        reason: String,
    },

    /// Database operation failed; the transaction was rolled back.
    DatabaseError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl CoreError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::TerminalNotFound { .. } => "TERMINAL_NOT_FOUND",
            Self::SectionNotFound { .. } => "SECTION_NOT_FOUND",
            Self::RequestNotFound { .. } => "REQUEST_NOT_FOUND",
            Self::DuplicateSerial { .. } => "DUPLICATE_SERIAL",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::NotVerifiable { .. } => "NOT_VERIFIABLE",
            Self::SectionFull { .. } => "SECTION_FULL",
            Self::BoxTypeMismatch { .. } => "BOX_TYPE_MISMATCH",
            Self::TierMismatch { .. } => "TIER_MISMATCH",
            Self::StatusConflict { .. } => "CONFLICT",
            Self::RegistryNotFound { .. } => "REGISTRY_NOT_FOUND",
            Self::RegistryUnavailable { .. } => "REGISTRY_UNAVAILABLE",
            Self::DatabaseError { .. } => "DATABASE_ERROR",
        }
    }

    /// Convenience constructor for validation errors.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationError { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
            Self::TerminalNotFound { serial } => {
                write!(f, "Terminal '{}' not found", serial)
            }
            Self::SectionNotFound { section_id } => {
                write!(f, "Shelf section '{}' not found", section_id)
            }
            Self::RequestNotFound { request_id } => {
                write!(f, "Verification request '{}' not found", request_id)
            }
            Self::DuplicateSerial { serial } => {
                write!(f, "Terminal with serial number '{}' already exists", serial)
            }
            Self::InvalidTransition {
                serial,
                from,
                operation,
            } => {
                write!(
                    f,
                    "Terminal '{}' cannot '{}' from status '{}'",
                    serial, operation, from
                )
            }
            Self::NotVerifiable { serial } => {
                write!(
                    f,
                    "Terminal '{}' has never been verified and cannot be shipped",
                    serial
                )
            }
            Self::SectionFull { section_id } => {
                write!(f, "No available cells in section '{}'", section_id)
            }
            Self::BoxTypeMismatch {
                section_id,
                section_box_type,
                requested,
            } => {
                write!(
                    f,
                    "Section '{}' holds '{}' boxes, cannot place '{}'",
                    section_id, section_box_type, requested
                )
            }
            Self::TierMismatch { section_id, tier } => {
                write!(
                    f,
                    "Section '{}' on tier '{}' cannot hold this terminal category",
                    section_id, tier
                )
            }
            Self::StatusConflict { serial, expected } => {
                write!(
                    f,
                    "Terminal '{}' is no longer in status '{}'; operation not applied",
                    serial, expected
                )
            }
            Self::RegistryNotFound { serial } => {
                write!(f, "Verification registry has no results for '{}'", serial)
            }
            Self::RegistryUnavailable { reason } => {
                write!(f, "Verification registry unavailable: {}", reason)
            }
            Self::DatabaseError { operation, details } => {
                write!(f, "Database error during '{}': {}", operation, details)
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::DatabaseError {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::DatabaseError {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        let cases: Vec<(CoreError, &str)> = vec![
            (
                CoreError::validation("serialNumber", "must not be empty"),
                "VALIDATION_ERROR",
            ),
            (
                CoreError::TerminalNotFound {
                    serial: "1000001".into(),
                },
                "TERMINAL_NOT_FOUND",
            ),
            (
                CoreError::DuplicateSerial {
                    serial: "1000001".into(),
                },
                "DUPLICATE_SERIAL",
            ),
            (
                CoreError::InvalidTransition {
                    serial: "1000001".into(),
                    from: TerminalStatus::Rented,
                    operation: "ship",
                },
                "INVALID_TRANSITION",
            ),
            (
                CoreError::SectionFull {
                    section_id: "12121".into(),
                },
                "SECTION_FULL",
            ),
            (
                CoreError::BoxTypeMismatch {
                    section_id: "12121".into(),
                    section_box_type: BoxType::TypeA,
                    requested: BoxType::TypeB,
                },
                "BOX_TYPE_MISMATCH",
            ),
            (
                CoreError::StatusConflict {
                    serial: "1000001".into(),
                    expected: TerminalStatus::Pending,
                },
                "CONFLICT",
            ),
            (
                CoreError::DatabaseError {
                    operation: "insert".into(),
                    details: "connection refused".into(),
                },
                "DATABASE_ERROR",
            ),
        ];
        for (error, code) in cases {
            assert_eq!(error.error_code(), code, "wrong code for {:?}", error);
            assert!(!error.to_string().is_empty());
        }
    }

    #[test]
    fn test_display_messages() {
        let err = CoreError::InvalidTransition {
            serial: "1000001".into(),
            from: TerminalStatus::Rented,
            operation: "ship",
        };
        assert_eq!(
            err.to_string(),
            "Terminal '1000001' cannot 'ship' from status 'rented'"
        );

        let err = CoreError::BoxTypeMismatch {
            section_id: "12121".into(),
            section_box_type: BoxType::TypeA,
            requested: BoxType::TypeB,
        };
        assert_eq!(
            err.to_string(),
            "Section '12121' holds 'type_A' boxes, cannot place 'type_B'"
        );
    }
}
