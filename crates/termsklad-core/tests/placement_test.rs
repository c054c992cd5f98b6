// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Integration tests for shelf placement and the occupancy view.

mod common;

use common::*;
use termsklad_core::error::CoreError;
use termsklad_core::model::{BoxType, HistoryEvent};
use termsklad_core::terminals;

#[tokio::test]
async fn test_first_free_cell_allocation() {
    let ctx = TestContext::new().await;

    let first = ctx.add("555001", BoxType::TypeA, Some("12121")).await;
    assert_eq!(first.position, Some(0));
    let location = first.location.expect("first terminal should be placed");
    assert_eq!(location.section_id, "12121");
    assert_eq!(location.cell, 1);

    let second = ctx.add("555002", BoxType::TypeA, Some("12121")).await;
    assert_eq!(second.position, Some(1));
    assert_eq!(second.location.unwrap().cell, 2);
}

#[tokio::test]
async fn test_add_without_section_has_no_location() {
    let ctx = TestContext::new().await;

    let terminal = ctx.add("555001", BoxType::TypeA, None).await;
    assert!(terminal.location.is_none());
    assert!(terminal.position.is_none());
}

#[tokio::test]
async fn test_box_type_lock_rejects_mismatch() {
    let ctx = TestContext::new().await;

    ctx.add("555001", BoxType::TypeA, Some("12121")).await;
    let err = terminals::add_terminal(
        &ctx.store,
        "555002",
        BoxType::TypeB,
        Some("12121"),
        OPERATOR,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CoreError::BoxTypeMismatch { .. }));

    // An empty section accepts either type.
    let other = ctx.add("555003", BoxType::TypeB, Some("12122")).await;
    assert_eq!(other.position, Some(0));
}

#[tokio::test]
async fn test_section_full() {
    let ctx = TestContext::new().await;

    // Rental section 12131 holds 1x5 = 5 boxes of type_B.
    for i in 0..5 {
        ctx.add(&format!("179200{}", i), BoxType::TypeB, Some("12131"))
            .await;
    }
    let err = terminals::add_terminal(
        &ctx.store,
        "1792005",
        BoxType::TypeB,
        Some("12131"),
        OPERATOR,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CoreError::SectionFull { section_id } if section_id == "12131"));
}

#[tokio::test]
async fn test_tier_rules() {
    let ctx = TestContext::new().await;

    // Standard terminals never go to the rental tier.
    let err = terminals::add_terminal(
        &ctx.store,
        "555001",
        BoxType::TypeA,
        Some("12131"),
        OPERATOR,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CoreError::TierMismatch { .. }));

    // Rental terminals go only to the rental tier.
    let err = terminals::add_terminal(
        &ctx.store,
        "1792001",
        BoxType::TypeA,
        Some("12121"),
        OPERATOR,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CoreError::TierMismatch { .. }));

    let ok = ctx.add("1792001", BoxType::TypeA, Some("12131")).await;
    assert_eq!(ok.location.unwrap().section_id, "12131");
}

#[tokio::test]
async fn test_move_frees_old_cell_and_records_history() {
    let ctx = TestContext::new().await;

    ctx.add("555001", BoxType::TypeA, Some("12121")).await;
    let moved = terminals::move_terminal(&ctx.store, "555001", "12122", BoxType::TypeA, OPERATOR)
        .await
        .unwrap();
    assert_eq!(moved.location.as_ref().unwrap().section_id, "12122");
    assert_eq!(moved.position, Some(0));

    let last = moved.history.last().unwrap();
    assert!(matches!(
        &last.event,
        HistoryEvent::Moved { from, to } if from == "12121" && to == "12122"
    ));
    assert_eq!(
        last.event.to_string(),
        "Перемещен со стеллажа 12121 на 12122"
    );

    // The vacated cell is reused.
    let next = ctx.add("555002", BoxType::TypeA, Some("12121")).await;
    assert_eq!(next.position, Some(0));
}

#[tokio::test]
async fn test_placing_an_unplaced_terminal_records_placed_event() {
    let ctx = TestContext::new().await;

    ctx.add("555001", BoxType::TypeA, None).await;
    let placed = terminals::move_terminal(&ctx.store, "555001", "12121", BoxType::TypeA, OPERATOR)
        .await
        .unwrap();
    let last = placed.history.last().unwrap();
    assert!(matches!(
        &last.event,
        HistoryEvent::Placed { section_id } if section_id == "12121"
    ));
}

#[tokio::test]
async fn test_move_within_same_section_keeps_terminal_placed() {
    let ctx = TestContext::new().await;

    ctx.add("555001", BoxType::TypeA, Some("12121")).await;
    ctx.add("555002", BoxType::TypeA, Some("12121")).await;

    // The moving terminal is excluded from the occupancy snapshot, so the
    // move lands on the first cell not taken by the others.
    let moved = terminals::move_terminal(&ctx.store, "555001", "12121", BoxType::TypeA, OPERATOR)
        .await
        .unwrap();
    assert_eq!(moved.position, Some(0));
}

#[tokio::test]
async fn test_section_views_expose_lock_and_occupants() {
    let ctx = TestContext::new().await;

    ctx.add("555002", BoxType::TypeA, Some("12121")).await;
    ctx.add("555001", BoxType::TypeA, Some("12121")).await;

    let views = terminals::section_views(&ctx.store).await.unwrap();
    assert_eq!(views.len(), 9);

    let view = views.iter().find(|v| v.section.id == "12121").unwrap();
    assert_eq!(view.current_box_type, Some(BoxType::TypeA));
    let serials: Vec<_> = view
        .terminals
        .iter()
        .map(|t| t.serial_number.as_str())
        .collect();
    // Ordered by cell, not serial.
    assert_eq!(serials, vec!["555002", "555001"]);

    let empty = views.iter().find(|v| v.section.id == "12122").unwrap();
    assert_eq!(empty.current_box_type, None);
    assert!(empty.terminals.is_empty());
}

#[tokio::test]
async fn test_duplicate_serial_rejected() {
    let ctx = TestContext::new().await;

    ctx.add("555001", BoxType::TypeA, None).await;
    let err = terminals::add_terminal(&ctx.store, "555001", BoxType::TypeB, None, OPERATOR)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::DuplicateSerial { serial } if serial == "555001"));
}
