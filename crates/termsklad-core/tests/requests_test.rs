// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Integration tests for verification request batches.

mod common;

use common::*;
use termsklad_core::error::CoreError;
use termsklad_core::model::{BoxType, HistoryEvent, RequestStatus, TerminalStatus};
use termsklad_core::persistence::Store;
use termsklad_core::requests;
use termsklad_core::terminals;

#[tokio::test]
async fn test_generated_ids_are_sequential_and_padded() {
    let ctx = TestContext::new().await;

    for i in 1..=4 {
        ctx.add(&format!("55500{}", i), BoxType::TypeA, None).await;
    }

    for i in 1..=3 {
        let serial = format!("55500{}", i);
        let request = requests::create_request(&ctx.store, None, &[serial], OPERATOR)
            .await
            .unwrap();
        assert_eq!(request.id, format!("Заявка №000{}", i));
    }

    let fourth = requests::create_request(
        &ctx.store,
        None,
        &["555004".to_string()],
        OPERATOR,
    )
    .await
    .unwrap();
    assert_eq!(fourth.id, "Заявка №0004");
}

#[tokio::test]
async fn test_create_marks_terminals_pending_with_reference() {
    let ctx = TestContext::new().await;

    ctx.add("555001", BoxType::TypeA, None).await;
    ctx.add("555002", BoxType::TypeA, None).await;

    let request = requests::create_request(
        &ctx.store,
        None,
        &["555001".to_string(), "555002".to_string()],
        OPERATOR,
    )
    .await
    .unwrap();
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.terminal_ids.len(), 2);
    assert_eq!(request.created_by, OPERATOR);

    for serial in ["555001", "555002"] {
        let terminal = terminals::get_terminal(&ctx.store, serial).await.unwrap();
        assert_eq!(terminal.status, TerminalStatus::Pending);
        let last = terminal.history.last().unwrap();
        assert!(matches!(
            &last.event,
            HistoryEvent::AddedToRequest { request_id } if *request_id == request.id
        ));
        assert_eq!(
            last.event.to_string(),
            format!("Добавлен в заявку на поверку {}", request.id)
        );
    }
}

#[tokio::test]
async fn test_custom_id_is_honored() {
    let ctx = TestContext::new().await;

    ctx.add("555001", BoxType::TypeA, None).await;
    let request = requests::create_request(
        &ctx.store,
        Some("Заявка №A-17"),
        &["555001".to_string()],
        OPERATOR,
    )
    .await
    .unwrap();
    assert_eq!(request.id, "Заявка №A-17");
}

#[tokio::test]
async fn test_create_with_unknown_terminal_rolls_back() {
    let ctx = TestContext::new().await;

    ctx.add("555001", BoxType::TypeA, None).await;
    let err = requests::create_request(
        &ctx.store,
        None,
        &["555001".to_string(), "999999".to_string()],
        OPERATOR,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CoreError::TerminalNotFound { serial } if serial == "999999"));

    // Nothing was committed: no request, terminal untouched.
    assert!(ctx.store.list_requests().await.unwrap().is_empty());
    let terminal = terminals::get_terminal(&ctx.store, "555001").await.unwrap();
    assert_eq!(terminal.status, TerminalStatus::NotVerified);
    assert_eq!(terminal.history.len(), 1);
}

#[tokio::test]
async fn test_process_request() {
    let ctx = TestContext::new().await;

    ctx.add("555001", BoxType::TypeA, None).await;
    let request = requests::create_request(&ctx.store, None, &["555001".to_string()], OPERATOR)
        .await
        .unwrap();

    let processed = requests::process_request(&ctx.store, &request.id)
        .await
        .unwrap();
    assert_eq!(processed.status, RequestStatus::Processed);
    assert!(processed.processed_at.is_some());

    let err = requests::process_request(&ctx.store, "Заявка №9999")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::RequestNotFound { .. }));
}

#[tokio::test]
async fn test_rename_updates_terminal_references() {
    let ctx = TestContext::new().await;

    ctx.add("555001", BoxType::TypeA, None).await;
    let request = requests::create_request(&ctx.store, None, &["555001".to_string()], OPERATOR)
        .await
        .unwrap();

    let new_date = day(2025, 2, 1);
    let renamed = requests::rename_request(&ctx.store, &request.id, "Заявка №0100", new_date)
        .await
        .unwrap();
    assert_eq!(renamed.id, "Заявка №0100");
    assert_eq!(renamed.created_at, new_date);

    let terminal = terminals::get_terminal(&ctx.store, "555001").await.unwrap();
    assert!(matches!(
        &terminal.history.last().unwrap().event,
        HistoryEvent::AddedToRequest { request_id } if request_id == "Заявка №0100"
    ));

    // The old id no longer resolves.
    assert!(ctx.store.get_request(&request.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_rename_missing_request() {
    let ctx = TestContext::new().await;

    let err = requests::rename_request(&ctx.store, "Заявка №0001", "Заявка №0002", day(2025, 2, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::RequestNotFound { .. }));
}
