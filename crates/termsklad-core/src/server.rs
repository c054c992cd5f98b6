// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP API surface.
//!
//! Thin axum handlers over the operation modules: decode the JSON payload,
//! call the handler, map [`CoreError`] onto a status code and a
//! `{error, code}` body. Dates are accepted both as RFC 3339 timestamps
//! and as plain `YYYY-MM-DD` from date pickers.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::error::CoreError;
use crate::model::BoxType;
use crate::persistence::Store;
use crate::registry::{RegistryLookup, lookup_with_retry};
use crate::{expiry, requests, shipment, terminals};

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Persistence backend.
    pub store: Arc<dyn Store>,
    /// Verification registry client.
    pub registry: Arc<dyn RegistryLookup>,
    /// Delay before the single registry lookup retry.
    pub registry_retry_delay: Duration,
}

/// Error envelope returned by every failing endpoint.
struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            CoreError::TerminalNotFound { .. }
            | CoreError::SectionNotFound { .. }
            | CoreError::RequestNotFound { .. }
            | CoreError::RegistryNotFound { .. } => StatusCode::NOT_FOUND,
            CoreError::DuplicateSerial { .. } | CoreError::StatusConflict { .. } => {
                StatusCode::CONFLICT
            }
            CoreError::InvalidTransition { .. }
            | CoreError::NotVerifiable { .. }
            | CoreError::SectionFull { .. }
            | CoreError::BoxTypeMismatch { .. }
            | CoreError::TierMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::RegistryUnavailable { .. } => StatusCode::BAD_GATEWAY,
            CoreError::DatabaseError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self.0, "Request failed");
        }
        let body = json!({
            "error": self.0.to_string(),
            "code": self.0.error_code(),
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Accept RFC 3339 or a bare calendar date.
fn parse_date(field: &'static str, raw: &str) -> Result<DateTime<Utc>, CoreError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
        .ok_or_else(|| CoreError::validation(field, "must be an RFC 3339 timestamp or YYYY-MM-DD"))
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/terminals", get(list_terminals).post(add_terminal))
        .route("/api/terminals/{id}/move", put(move_terminal))
        .route("/api/terminals/{id}/status", put(set_status))
        .route("/api/terminals/{id}/verify-shipped", put(verify_shipped))
        .route("/api/terminals/return", post(return_terminal))
        .route("/api/shipments", get(list_shipments).post(create_shipment))
        .route("/api/shipments/{id}", put(update_shipment_date))
        .route("/api/shelves", get(list_shelves))
        .route(
            "/api/contragents",
            get(list_contragents)
                .post(add_contragent)
                .delete(delete_contragent),
        )
        .route("/api/requests", get(list_requests).post(create_request))
        .route("/api/requests/{id}", put(update_request))
        .route("/api/registry/lookup", post(registry_lookup))
        .with_state(state)
}

/// Bind and serve the API until the task is cancelled.
pub async fn serve(addr: std::net::SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    state.store.health_check().await?;
    Ok(Json(json!({"status": "ok"})))
}

/// The list read path runs the expiry sweep first, so lapsed verifications
/// are never served as current.
async fn list_terminals(State(state): State<AppState>) -> ApiResult<Response> {
    expiry::run_expiry_sweep(state.store.as_ref(), Utc::now()).await?;
    let terminals = state.store.list_terminals().await?;
    Ok(Json(terminals).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddTerminalBody {
    serial_number: String,
    box_type: BoxType,
    #[serde(default)]
    section_id: Option<String>,
    user: String,
}

async fn add_terminal(
    State(state): State<AppState>,
    Json(body): Json<AddTerminalBody>,
) -> ApiResult<Response> {
    let terminal = terminals::add_terminal(
        state.store.as_ref(),
        &body.serial_number,
        body.box_type,
        body.section_id.as_deref(),
        &body.user,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(terminal)).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MoveTerminalBody {
    new_section_id: String,
    #[serde(default)]
    box_type: Option<BoxType>,
    user: String,
}

async fn move_terminal(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<MoveTerminalBody>,
) -> ApiResult<Response> {
    let box_type = match body.box_type {
        Some(box_type) => box_type,
        None => terminals::get_terminal(state.store.as_ref(), &id).await?.box_type,
    };
    let terminal = terminals::move_terminal(
        state.store.as_ref(),
        &id,
        &body.new_section_id,
        box_type,
        &body.user,
    )
    .await?;
    Ok(Json(terminal).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetStatusBody {
    status: String,
    #[serde(default)]
    verification_date: Option<String>,
    #[serde(default)]
    verified_until: Option<String>,
    user: String,
}

async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SetStatusBody>,
) -> ApiResult<Response> {
    let target = match body.status.as_str() {
        "verified" => {
            let (date, until) = match (&body.verification_date, &body.verified_until) {
                (Some(date), Some(until)) => (
                    parse_date("verificationDate", date)?,
                    parse_date("verifiedUntil", until)?,
                ),
                _ => {
                    return Err(CoreError::validation(
                        "verificationDate",
                        "both verification dates are required for verified",
                    )
                    .into());
                }
            };
            terminals::ManualStatus::Verified { date, until }
        }
        "pending" => terminals::ManualStatus::Pending,
        "not_verified" => terminals::ManualStatus::NotVerified,
        other => {
            return Err(CoreError::validation(
                "status",
                format!("unsupported manual status: {}", other),
            )
            .into());
        }
    };
    let terminal = terminals::set_status(state.store.as_ref(), &id, target, &body.user).await?;
    Ok(Json(terminal).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyShippedBody {
    verification_date: String,
    verified_until: String,
    user: String,
}

async fn verify_shipped(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<VerifyShippedBody>,
) -> ApiResult<Response> {
    let date = parse_date("verificationDate", &body.verification_date)?;
    let until = parse_date("verifiedUntil", &body.verified_until)?;
    let terminal =
        shipment::verify_after_ship(state.store.as_ref(), &id, date, until, &body.user).await?;
    Ok(Json(terminal).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReturnBody {
    terminal_id: String,
    user: String,
}

async fn return_terminal(
    State(state): State<AppState>,
    Json(body): Json<ReturnBody>,
) -> ApiResult<Response> {
    let terminal =
        shipment::return_from_rental(state.store.as_ref(), &body.terminal_id, &body.user).await?;
    Ok(Json(terminal).into_response())
}

async fn list_shipments(State(state): State<AppState>) -> ApiResult<Response> {
    let shipments = state.store.list_shipments().await?;
    Ok(Json(shipments).into_response())
}

/// Kind of outbound handoff.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
enum HandoffKind {
    Ship,
    Rent,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateShipmentBody {
    terminal_id: String,
    contragent: String,
    #[serde(rename = "type")]
    kind: HandoffKind,
    user: String,
}

async fn create_shipment(
    State(state): State<AppState>,
    Json(body): Json<CreateShipmentBody>,
) -> ApiResult<Response> {
    let terminal = match body.kind {
        HandoffKind::Ship => {
            shipment::ship(
                state.store.as_ref(),
                &body.terminal_id,
                &body.contragent,
                &body.user,
            )
            .await?
        }
        HandoffKind::Rent => {
            shipment::rent(
                state.store.as_ref(),
                &body.terminal_id,
                &body.contragent,
                &body.user,
            )
            .await?
        }
    };
    Ok((StatusCode::CREATED, Json(terminal)).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShipmentDateBody {
    new_shipping_date: String,
}

async fn update_shipment_date(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ShipmentDateBody>,
) -> ApiResult<Response> {
    let new_date = parse_date("newShippingDate", &body.new_shipping_date)?;
    shipment::update_shipment_date(state.store.as_ref(), &id, new_date).await?;
    Ok(Json(json!({"success": true})).into_response())
}

async fn list_shelves(State(state): State<AppState>) -> ApiResult<Response> {
    let views = terminals::section_views(state.store.as_ref()).await?;
    Ok(Json(views).into_response())
}

async fn list_contragents(State(state): State<AppState>) -> ApiResult<Response> {
    let contragents = state.store.list_contragents().await?;
    Ok(Json(contragents).into_response())
}

#[derive(Debug, Deserialize)]
struct ContragentBody {
    name: String,
}

async fn add_contragent(
    State(state): State<AppState>,
    Json(body): Json<ContragentBody>,
) -> ApiResult<Response> {
    if body.name.trim().is_empty() {
        return Err(CoreError::validation("name", "must not be empty").into());
    }
    state.store.add_contragent(body.name.trim()).await?;
    Ok((StatusCode::CREATED, Json(json!({"message": "Contragent added"}))).into_response())
}

async fn delete_contragent(
    State(state): State<AppState>,
    Json(body): Json<ContragentBody>,
) -> ApiResult<Response> {
    state.store.delete_contragent(&body.name).await?;
    Ok(Json(json!({"message": "Contragent deleted"})).into_response())
}

async fn list_requests(State(state): State<AppState>) -> ApiResult<Response> {
    let requests = state.store.list_requests().await?;
    Ok(Json(requests).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequestBody {
    terminal_ids: Vec<String>,
    #[serde(default)]
    custom_id: Option<String>,
    user: String,
}

async fn create_request(
    State(state): State<AppState>,
    Json(body): Json<CreateRequestBody>,
) -> ApiResult<Response> {
    let request = requests::create_request(
        state.store.as_ref(),
        body.custom_id.as_deref(),
        &body.terminal_ids,
        &body.user,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(request)).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequestBody {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    new_id: Option<String>,
    #[serde(default)]
    new_date: Option<String>,
}

async fn update_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateRequestBody>,
) -> ApiResult<Response> {
    let request = match (&body.status, &body.new_id, &body.new_date) {
        (Some(status), _, _) if status == "processed" => {
            requests::process_request(state.store.as_ref(), &id).await?
        }
        (None, Some(new_id), Some(new_date)) => {
            let new_date = parse_date("newDate", new_date)?;
            requests::rename_request(state.store.as_ref(), &id, new_id, new_date).await?
        }
        _ => {
            return Err(CoreError::validation(
                "body",
                "expected {\"status\": \"processed\"} or {\"newId\", \"newDate\"}",
            )
            .into());
        }
    };
    Ok(Json(request).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistryLookupBody {
    serial_number: String,
}

async fn registry_lookup(
    State(state): State<AppState>,
    Json(body): Json<RegistryLookupBody>,
) -> ApiResult<Response> {
    if body.serial_number.trim().is_empty() {
        return Err(CoreError::validation("serialNumber", "must not be empty").into());
    }
    let dates = lookup_with_retry(
        state.registry.as_ref(),
        body.serial_number.trim(),
        state.registry_retry_delay,
    )
    .await?;
    Ok(Json(json!({
        "lastVerificationDate": dates.last_verification_date,
        "verifiedUntil": dates.verified_until,
    }))
    .into_response())
}
