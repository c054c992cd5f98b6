// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Integration tests for shipping, rentals, and returns.

mod common;

use common::*;
use termsklad_core::error::CoreError;
use termsklad_core::expiry;
use termsklad_core::model::{BoxType, HistoryEvent, TerminalStatus};
use termsklad_core::persistence::Store;
use termsklad_core::shipment;

#[tokio::test]
async fn test_ship_never_verified_is_rejected() {
    let ctx = TestContext::new().await;

    ctx.add("555001", BoxType::TypeA, None).await;
    let err = shipment::ship(&ctx.store, "555001", "ООО Ромашка", OPERATOR)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotVerifiable { .. }));
    assert!(ctx.store.list_shipments().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ship_pending_awaits_verification() {
    let ctx = TestContext::new().await;

    ctx.add("555001", BoxType::TypeA, Some("12121")).await;
    termsklad_core::terminals::set_status(
        &ctx.store,
        "555001",
        termsklad_core::terminals::ManualStatus::Pending,
        OPERATOR,
    )
    .await
    .unwrap();

    let shipped = shipment::ship(&ctx.store, "555001", "ООО Ромашка", OPERATOR)
        .await
        .unwrap();
    assert_eq!(
        shipped.status,
        TerminalStatus::AwaitsVerificationAfterShipping
    );
    assert!(shipped.location.is_none());
    assert!(shipped.position.is_none());

    let shipments = ctx.store.list_shipments().await.unwrap();
    assert_eq!(shipments.len(), 1);
    assert_eq!(shipments[0].terminal_id, "555001");
    assert_eq!(shipments[0].contragent, "ООО Ромашка");
    assert_eq!(
        shipments[0].status_before_shipment,
        TerminalStatus::Pending
    );

    // The contragent landed in the directory.
    let contragents = ctx.store.list_contragents().await.unwrap();
    assert_eq!(contragents, vec!["ООО Ромашка".to_string()]);
}

#[tokio::test]
async fn test_verify_after_ship_completes_to_shipped() {
    let ctx = TestContext::new().await;

    ctx.add("555001", BoxType::TypeA, None).await;
    termsklad_core::terminals::set_status(
        &ctx.store,
        "555001",
        termsklad_core::terminals::ManualStatus::Pending,
        OPERATOR,
    )
    .await
    .unwrap();
    shipment::ship(&ctx.store, "555001", "ООО Ромашка", OPERATOR)
        .await
        .unwrap();

    let date = day(2025, 4, 1);
    let until = day(2026, 3, 31);
    let verified = shipment::verify_after_ship(&ctx.store, "555001", date, until, OPERATOR)
        .await
        .unwrap();
    assert_eq!(verified.status, TerminalStatus::Shipped);
    assert_eq!(verified.last_verification_date, Some(date));
    assert_eq!(verified.verified_until, Some(until));
    assert!(matches!(
        verified.history.last().unwrap().event,
        HistoryEvent::PostShipmentVerified
    ));
}

#[tokio::test]
async fn test_ship_verified_goes_straight_to_shipped() {
    let ctx = TestContext::new().await;

    ctx.add("555001", BoxType::TypeA, None).await;
    ctx.make_verified("555001", day(2025, 3, 14), day(2026, 3, 13))
        .await;

    let shipped = shipment::ship(&ctx.store, "555001", "ООО Ромашка", OPERATOR)
        .await
        .unwrap();
    assert_eq!(shipped.status, TerminalStatus::Shipped);
    assert!(matches!(
        &shipped.history.last().unwrap().event,
        HistoryEvent::Shipped { lapsed: false, .. }
    ));

    // Re-verified in the field: shipped -> verified.
    let reverified = shipment::verify_after_ship(
        &ctx.store,
        "555001",
        day(2026, 4, 1),
        day(2027, 3, 31),
        OPERATOR,
    )
    .await
    .unwrap();
    assert_eq!(reverified.status, TerminalStatus::Verified);
}

#[tokio::test]
async fn test_ship_expired_carries_lapsed_qualifier() {
    let ctx = TestContext::new().await;

    ctx.add("555001", BoxType::TypeA, None).await;
    ctx.make_verified("555001", day(2024, 1, 10), day(2025, 1, 9))
        .await;
    expiry::run_expiry_sweep(&ctx.store, day(2025, 6, 1))
        .await
        .unwrap();

    let shipped = shipment::ship(&ctx.store, "555001", "ООО Ромашка", OPERATOR)
        .await
        .unwrap();
    assert_eq!(
        shipped.status,
        TerminalStatus::AwaitsVerificationAfterShipping
    );
    let last = shipped.history.last().unwrap();
    assert!(matches!(
        &last.event,
        HistoryEvent::Shipped { lapsed: true, .. }
    ));
    assert_eq!(
        last.event.to_string(),
        "Отгружен контрагенту (с истекшим сроком поверки): ООО Ромашка"
    );
    assert_eq!(
        ctx.store.list_shipments().await.unwrap()[0].status_before_shipment,
        TerminalStatus::Expired
    );
}

#[tokio::test]
async fn test_rent_guards() {
    let ctx = TestContext::new().await;

    // Standard stock cannot be rented.
    ctx.add("555001", BoxType::TypeA, None).await;
    let err = shipment::rent(&ctx.store, "555001", "ООО Ромашка", OPERATOR)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ValidationError { .. }));

    // A never-verified rental terminal cannot be handed out.
    ctx.add("1792001", BoxType::TypeA, None).await;
    let err = shipment::rent(&ctx.store, "1792001", "ООО Ромашка", OPERATOR)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::InvalidTransition {
            from: TerminalStatus::NotVerified,
            ..
        }
    ));
}

#[tokio::test]
async fn test_rent_expired_is_allowed_with_lapsed_qualifier() {
    let ctx = TestContext::new().await;

    ctx.add("1792001", BoxType::TypeA, None).await;
    ctx.make_verified("1792001", day(2024, 1, 10), day(2025, 1, 9))
        .await;
    expiry::run_expiry_sweep(&ctx.store, day(2025, 6, 1))
        .await
        .unwrap();

    let rented = shipment::rent(&ctx.store, "1792001", "ООО Ромашка", OPERATOR)
        .await
        .unwrap();
    assert_eq!(rented.status, TerminalStatus::Rented);
    assert!(rented.location.is_none());
    assert!(matches!(
        &rented.history.last().unwrap().event,
        HistoryEvent::Rented { lapsed: true, .. }
    ));

    // Rentals do not go through the shipment log.
    assert!(ctx.store.list_shipments().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_return_resets_and_prunes_history() {
    let ctx = TestContext::new().await;

    ctx.add("1792001", BoxType::TypeA, Some("12131")).await;
    ctx.make_verified("1792001", day(2025, 3, 14), day(2026, 3, 13))
        .await;
    shipment::rent(&ctx.store, "1792001", "ООО Ромашка", OPERATOR)
        .await
        .unwrap();

    let returned = shipment::return_from_rental(&ctx.store, "1792001", OPERATOR)
        .await
        .unwrap();
    assert_eq!(returned.status, TerminalStatus::NotVerified);
    assert!(returned.last_verification_date.is_none());
    assert!(returned.verified_until.is_none());
    assert!(returned.location.is_none());

    // Only the pool intake and verification entries survive, plus the
    // return entry itself. The pending and rental handoff entries are gone.
    let kinds: Vec<_> = returned.history.iter().map(|e| &e.event).collect();
    assert_eq!(kinds.len(), 3);
    assert!(matches!(kinds[0], HistoryEvent::AddedToRentalPool));
    assert!(matches!(kinds[1], HistoryEvent::Verified));
    assert!(matches!(kinds[2], HistoryEvent::ReturnedFromRental));
}

#[tokio::test]
async fn test_return_requires_rented_status() {
    let ctx = TestContext::new().await;

    ctx.add("1792001", BoxType::TypeA, None).await;
    let err = shipment::return_from_rental(&ctx.store, "1792001", OPERATOR)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_update_shipment_date_rewrites_log_and_history() {
    let ctx = TestContext::new().await;

    ctx.add("555001", BoxType::TypeA, None).await;
    ctx.make_verified("555001", day(2025, 3, 14), day(2026, 3, 13))
        .await;
    shipment::ship(&ctx.store, "555001", "ООО Ромашка", OPERATOR)
        .await
        .unwrap();

    let corrected = day(2025, 5, 20);
    shipment::update_shipment_date(&ctx.store, "555001", corrected)
        .await
        .unwrap();

    let shipments = ctx.store.list_shipments().await.unwrap();
    assert_eq!(shipments[0].shipping_date, corrected);

    let terminal = termsklad_core::terminals::get_terminal(&ctx.store, "555001")
        .await
        .unwrap();
    let entry = terminal
        .history
        .iter()
        .find(|e| matches!(e.event, HistoryEvent::Shipped { lapsed: false, .. }))
        .expect("shipped entry present");
    assert_eq!(entry.date, corrected);
}
