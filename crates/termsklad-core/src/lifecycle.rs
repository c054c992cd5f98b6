// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The terminal status state machine.
//!
//! `plan` is pure: given the current status and a requested transition it
//! either returns a [`TerminalChange`] describing every field mutation and
//! the history entry to append, or rejects the request. The store applies a
//! change atomically, guarded by a compare-and-swap on the status it was
//! planned against.

use chrono::{DateTime, Utc};

use crate::error::CoreError;
use crate::model::{HistoryEntry, HistoryEvent, TerminalStatus};

/// A requested lifecycle transition.
#[derive(Debug, Clone)]
pub enum TransitionRequest<'a> {
    /// Batch path: terminal added to a verification request.
    RequestVerification {
        /// Id of the request the terminal joins.
        request_id: &'a str,
    },
    /// Manual path: mark pending outside of a request.
    MarkPending,
    /// Verification results entered.
    SetVerified {
        /// Date of the verification.
        date: DateTime<Utc>,
        /// End of the verification window.
        until: DateTime<Utc>,
    },
    /// Clear verification data.
    Reset,
    /// Expiry sweep: verification window lapsed.
    AutoExpire,
    /// Outbound shipment.
    Ship {
        /// Receiving contragent.
        contragent: &'a str,
    },
    /// Rental handoff.
    Rent {
        /// Receiving contragent.
        contragent: &'a str,
    },
    /// Return from rental.
    Return,
    /// Verification results entered for a shipped terminal.
    VerifyAfterShip {
        /// Date of the verification.
        date: DateTime<Utc>,
        /// End of the verification window.
        until: DateTime<Utc>,
    },
}

impl TransitionRequest<'_> {
    fn operation(&self) -> &'static str {
        match self {
            Self::RequestVerification { .. } => "request_verification",
            Self::MarkPending => "mark_pending",
            Self::SetVerified { .. } => "set_verified",
            Self::Reset => "reset",
            Self::AutoExpire => "auto_expire",
            Self::Ship { .. } => "ship",
            Self::Rent { .. } => "rent",
            Self::Return => "return",
            Self::VerifyAfterShip { .. } => "verify_after_ship",
        }
    }
}

/// What happens to the verification date pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateChange {
    /// Leave both fields as they are.
    Keep,
    /// Set both fields.
    Set {
        /// New last-verification date.
        date: DateTime<Utc>,
        /// New end of the verification window.
        until: DateTime<Utc>,
    },
    /// Clear both fields.
    Clear,
}

/// The full effect of one successful transition. Applied by the store as a
/// single atomic unit: status, dates, location, and the history append
/// happen together or not at all.
#[derive(Debug, Clone)]
pub struct TerminalChange {
    /// Status after the transition.
    pub new_status: TerminalStatus,
    /// Effect on the verification date pair.
    pub dates: DateChange,
    /// Whether the shelf placement is cleared.
    pub clear_location: bool,
    /// Whether the rental-return retention policy replaces the history
    /// before the append.
    pub prune_history: bool,
    /// The entry appended on success.
    pub entry: HistoryEntry,
}

/// Plan a transition for a terminal currently in `status`.
///
/// Returns `InvalidTransition` for anything outside the table, and
/// `NotVerifiable` for the never-verified shipping guard. The caller may
/// have pre-filtered; the guards here are authoritative.
pub fn plan(
    serial: &str,
    status: TerminalStatus,
    request: TransitionRequest<'_>,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<TerminalChange, CoreError> {
    use TerminalStatus::*;

    let invalid = || CoreError::InvalidTransition {
        serial: serial.to_string(),
        from: status,
        operation: request.operation(),
    };

    let change = match &request {
        TransitionRequest::RequestVerification { request_id } => match status {
            NotVerified | Expired => TerminalChange {
                new_status: Pending,
                dates: DateChange::Keep,
                clear_location: false,
                prune_history: false,
                entry: HistoryEntry::new(
                    now,
                    HistoryEvent::AddedToRequest {
                        request_id: request_id.to_string(),
                    },
                    actor,
                ),
            },
            _ => return Err(invalid()),
        },

        TransitionRequest::MarkPending => match status {
            NotVerified | Expired => TerminalChange {
                new_status: Pending,
                dates: DateChange::Keep,
                clear_location: false,
                prune_history: false,
                entry: HistoryEntry::new(now, HistoryEvent::MarkedPending, actor),
            },
            _ => return Err(invalid()),
        },

        TransitionRequest::SetVerified { date, until } => match status {
            Pending | Expired => TerminalChange {
                new_status: Verified,
                dates: DateChange::Set {
                    date: *date,
                    until: *until,
                },
                clear_location: false,
                prune_history: false,
                entry: HistoryEntry::new(now, HistoryEvent::Verified, actor),
            },
            _ => return Err(invalid()),
        },

        TransitionRequest::Reset => match status {
            Pending => TerminalChange {
                new_status: NotVerified,
                dates: DateChange::Clear,
                clear_location: false,
                prune_history: false,
                entry: HistoryEntry::new(now, HistoryEvent::ResetNotVerified, actor),
            },
            _ => return Err(invalid()),
        },

        TransitionRequest::AutoExpire => match status {
            Verified => TerminalChange {
                new_status: Expired,
                dates: DateChange::Keep,
                clear_location: false,
                prune_history: false,
                entry: HistoryEntry::new(now, HistoryEvent::Expired, actor),
            },
            _ => return Err(invalid()),
        },

        TransitionRequest::Ship { contragent } => match status {
            NotVerified => {
                return Err(CoreError::NotVerifiable {
                    serial: serial.to_string(),
                });
            }
            Pending | Expired | Verified => {
                // Unverified stock ships into a holding status until the
                // verification results arrive.
                let new_status = if status == Verified {
                    Shipped
                } else {
                    AwaitsVerificationAfterShipping
                };
                TerminalChange {
                    new_status,
                    dates: DateChange::Keep,
                    clear_location: true,
                    prune_history: false,
                    entry: HistoryEntry::new(
                        now,
                        HistoryEvent::Shipped {
                            contragent: contragent.to_string(),
                            lapsed: status == Expired,
                        },
                        actor,
                    ),
                }
            }
            _ => return Err(invalid()),
        },

        TransitionRequest::Rent { contragent } => match status {
            // A never-verified terminal cannot leave the warehouse; once
            // expired it may still be rented, with the lapsed qualifier.
            NotVerified => return Err(invalid()),
            Pending | Verified | Expired | Shipped => TerminalChange {
                new_status: Rented,
                dates: DateChange::Keep,
                clear_location: true,
                prune_history: false,
                entry: HistoryEntry::new(
                    now,
                    HistoryEvent::Rented {
                        contragent: contragent.to_string(),
                        lapsed: status == Expired,
                    },
                    actor,
                ),
            },
            _ => return Err(invalid()),
        },

        TransitionRequest::Return => match status {
            Rented => TerminalChange {
                new_status: NotVerified,
                dates: DateChange::Clear,
                clear_location: true,
                prune_history: true,
                entry: HistoryEntry::new(now, HistoryEvent::ReturnedFromRental, actor),
            },
            _ => return Err(invalid()),
        },

        TransitionRequest::VerifyAfterShip { date, until } => match status {
            AwaitsVerificationAfterShipping | Shipped => {
                // A terminal that was waiting stays shipped; entering data
                // for a plain shipped terminal records it as verified.
                let new_status = if status == AwaitsVerificationAfterShipping {
                    Shipped
                } else {
                    Verified
                };
                TerminalChange {
                    new_status,
                    dates: DateChange::Set {
                        date: *date,
                        until: *until,
                    },
                    clear_location: false,
                    prune_history: false,
                    entry: HistoryEntry::new(now, HistoryEvent::PostShipmentVerified, actor),
                }
            }
            _ => return Err(invalid()),
        },
    };

    Ok(change)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap()
    }

    fn dates() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2025, 5, 20, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 5, 20, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_request_verification_from_not_verified_and_expired() {
        for from in [TerminalStatus::NotVerified, TerminalStatus::Expired] {
            let change = plan(
                "1000001",
                from,
                TransitionRequest::RequestVerification {
                    request_id: "Заявка №0001",
                },
                "m",
                now(),
            )
            .unwrap();
            assert_eq!(change.new_status, TerminalStatus::Pending);
            assert_eq!(change.dates, DateChange::Keep);
        }
        assert!(matches!(
            plan(
                "1000001",
                TerminalStatus::Verified,
                TransitionRequest::RequestVerification {
                    request_id: "Заявка №0001"
                },
                "m",
                now(),
            ),
            Err(CoreError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_set_verified_sets_both_dates() {
        let (date, until) = dates();
        for from in [TerminalStatus::Pending, TerminalStatus::Expired] {
            let change = plan(
                "1000001",
                from,
                TransitionRequest::SetVerified { date, until },
                "m",
                now(),
            )
            .unwrap();
            assert_eq!(change.new_status, TerminalStatus::Verified);
            assert_eq!(change.dates, DateChange::Set { date, until });
            assert_eq!(change.entry.event, HistoryEvent::Verified);
        }
    }

    #[test]
    fn test_reset_only_from_pending() {
        let change = plan(
            "1000001",
            TerminalStatus::Pending,
            TransitionRequest::Reset,
            "m",
            now(),
        )
        .unwrap();
        assert_eq!(change.new_status, TerminalStatus::NotVerified);
        assert_eq!(change.dates, DateChange::Clear);

        assert!(
            plan(
                "1000001",
                TerminalStatus::Verified,
                TransitionRequest::Reset,
                "m",
                now(),
            )
            .is_err()
        );
    }

    #[test]
    fn test_auto_expire_only_from_verified() {
        let change = plan(
            "1000001",
            TerminalStatus::Verified,
            TransitionRequest::AutoExpire,
            crate::model::SYSTEM_ACTOR,
            now(),
        )
        .unwrap();
        assert_eq!(change.new_status, TerminalStatus::Expired);
        assert_eq!(change.entry.responsible, "Система");

        assert!(
            plan(
                "1000001",
                TerminalStatus::Expired,
                TransitionRequest::AutoExpire,
                "m",
                now(),
            )
            .is_err()
        );
    }

    #[test]
    fn test_ship_routing_and_guard() {
        // Never-verified stock cannot ship at all.
        assert!(matches!(
            plan(
                "1000001",
                TerminalStatus::NotVerified,
                TransitionRequest::Ship { contragent: "ООО X" },
                "m",
                now(),
            ),
            Err(CoreError::NotVerifiable { .. })
        ));

        // Pending and expired ship into the holding status.
        for from in [TerminalStatus::Pending, TerminalStatus::Expired] {
            let change = plan(
                "1000001",
                from,
                TransitionRequest::Ship { contragent: "ООО X" },
                "m",
                now(),
            )
            .unwrap();
            assert_eq!(
                change.new_status,
                TerminalStatus::AwaitsVerificationAfterShipping
            );
            assert!(change.clear_location);
        }

        // Verified ships straight to shipped.
        let change = plan(
            "1000001",
            TerminalStatus::Verified,
            TransitionRequest::Ship { contragent: "ООО X" },
            "m",
            now(),
        )
        .unwrap();
        assert_eq!(change.new_status, TerminalStatus::Shipped);

        // The lapsed qualifier appears only for expired stock.
        let change = plan(
            "1000001",
            TerminalStatus::Expired,
            TransitionRequest::Ship { contragent: "ООО X" },
            "m",
            now(),
        )
        .unwrap();
        assert_eq!(
            change.entry.event,
            HistoryEvent::Shipped {
                contragent: "ООО X".into(),
                lapsed: true
            }
        );
    }

    #[test]
    fn test_rent_guard_and_lapsed_qualifier() {
        assert!(matches!(
            plan(
                "1792001",
                TerminalStatus::NotVerified,
                TransitionRequest::Rent { contragent: "ООО X" },
                "m",
                now(),
            ),
            Err(CoreError::InvalidTransition { .. })
        ));

        let change = plan(
            "1792001",
            TerminalStatus::Expired,
            TransitionRequest::Rent { contragent: "ООО X" },
            "m",
            now(),
        )
        .unwrap();
        assert_eq!(change.new_status, TerminalStatus::Rented);
        assert_eq!(
            change.entry.event,
            HistoryEvent::Rented {
                contragent: "ООО X".into(),
                lapsed: true
            }
        );

        // Renting an already-rented terminal is rejected.
        assert!(
            plan(
                "1792001",
                TerminalStatus::Rented,
                TransitionRequest::Rent { contragent: "ООО X" },
                "m",
                now(),
            )
            .is_err()
        );
    }

    #[test]
    fn test_return_only_from_rented_and_prunes() {
        let change = plan(
            "1792001",
            TerminalStatus::Rented,
            TransitionRequest::Return,
            "m",
            now(),
        )
        .unwrap();
        assert_eq!(change.new_status, TerminalStatus::NotVerified);
        assert!(change.prune_history);
        assert!(change.clear_location);
        assert_eq!(change.dates, DateChange::Clear);

        assert!(
            plan(
                "1792001",
                TerminalStatus::Shipped,
                TransitionRequest::Return,
                "m",
                now(),
            )
            .is_err()
        );
    }

    #[test]
    fn test_verify_after_ship_routing() {
        let (date, until) = dates();

        // Awaiting terminals become plain shipped, not verified.
        let change = plan(
            "1000001",
            TerminalStatus::AwaitsVerificationAfterShipping,
            TransitionRequest::VerifyAfterShip { date, until },
            "m",
            now(),
        )
        .unwrap();
        assert_eq!(change.new_status, TerminalStatus::Shipped);
        assert_eq!(change.dates, DateChange::Set { date, until });
        assert!(!change.clear_location);

        // A shipped terminal that never waited records as verified.
        let change = plan(
            "1000001",
            TerminalStatus::Shipped,
            TransitionRequest::VerifyAfterShip { date, until },
            "m",
            now(),
        )
        .unwrap();
        assert_eq!(change.new_status, TerminalStatus::Verified);

        assert!(
            plan(
                "1000001",
                TerminalStatus::Pending,
                TransitionRequest::VerifyAfterShip { date, until },
                "m",
                now(),
            )
            .is_err()
        );
    }
}
