// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client for the FGIS «Аршин» verification registry.
//!
//! Looks a serial number up in the public metrology registry and extracts
//! the verification date pair from the matching ЭСМО record. The registry
//! indexes fresh results with a lag, so [`lookup_with_retry`] retries a
//! miss exactly once after a fixed delay before giving up.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::error::CoreError;

/// The type designation the registry lists our terminals under.
const TARGET_TYPE: &str = "ЭСМО";

/// Verification date pair extracted from a registry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationDates {
    /// Date of the verification.
    pub last_verification_date: DateTime<Utc>,
    /// End of the verification window.
    pub verified_until: DateTime<Utc>,
}

/// A verification registry.
///
/// `Ok(None)` means the registry answered but holds no matching record;
/// transport and decoding failures are `RegistryUnavailable`.
#[async_trait]
pub trait RegistryLookup: Send + Sync {
    /// Look up the verification dates for a serial number.
    async fn lookup(&self, serial: &str) -> Result<Option<VerificationDates>, CoreError>;
}

/// Look a serial up, retrying a miss exactly once after `delay`.
///
/// A record published moments ago may not be indexed yet; one bounded
/// retry covers that without turning the caller into a poller. A second
/// miss surfaces as [`CoreError::RegistryNotFound`].
pub async fn lookup_with_retry(
    registry: &dyn RegistryLookup,
    serial: &str,
    delay: Duration,
) -> Result<VerificationDates, CoreError> {
    if let Some(dates) = registry.lookup(serial).await? {
        return Ok(dates);
    }
    debug!(serial, ?delay, "Registry miss, retrying once");
    tokio::time::sleep(delay).await;
    match registry.lookup(serial).await? {
        Some(dates) => Ok(dates),
        None => Err(CoreError::RegistryNotFound {
            serial: serial.to_string(),
        }),
    }
}

#[derive(Debug, Deserialize)]
struct VriResponse {
    result: VriResult,
}

#[derive(Debug, Deserialize)]
struct VriResult {
    #[serde(default)]
    items: Vec<VriItem>,
}

#[derive(Debug, Deserialize)]
struct VriItem {
    #[serde(default)]
    mi_mitype: String,
    #[serde(default)]
    verification_date: String,
    #[serde(default)]
    valid_date: String,
}

/// Registry dates arrive as `DD.MM.YYYY`; some mirrors serve ISO dates.
fn parse_registry_date(raw: &str) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(raw, "%d.%m.%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

/// reqwest-backed [`RegistryLookup`] against the FGIS eAPI.
#[derive(Clone)]
pub struct FgisClient {
    http: reqwest::Client,
    base_url: String,
}

impl FgisClient {
    /// Create a client for the registry at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl RegistryLookup for FgisClient {
    #[instrument(skip(self), fields(serial = %serial))]
    async fn lookup(&self, serial: &str) -> Result<Option<VerificationDates>, CoreError> {
        let url = format!(
            "{}/fundmetrology/eapi/vri?search={}&rows=20",
            self.base_url.trim_end_matches('/'),
            serial
        );

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| CoreError::RegistryUnavailable {
                reason: format!("request failed: {}", e),
            })?;
        if !response.status().is_success() {
            return Err(CoreError::RegistryUnavailable {
                reason: format!("registry returned HTTP {}", response.status()),
            });
        }

        let body: VriResponse =
            response
                .json()
                .await
                .map_err(|e| CoreError::RegistryUnavailable {
                    reason: format!("malformed registry response: {}", e),
                })?;

        let Some(item) = body
            .result
            .items
            .iter()
            .find(|item| item.mi_mitype.contains(TARGET_TYPE))
        else {
            debug!("No matching registry record");
            return Ok(None);
        };

        let dates = match (
            parse_registry_date(&item.verification_date),
            parse_registry_date(&item.valid_date),
        ) {
            (Some(last_verification_date), Some(verified_until)) => VerificationDates {
                last_verification_date,
                verified_until,
            },
            _ => {
                warn!(
                    verification_date = %item.verification_date,
                    valid_date = %item.valid_date,
                    "Registry record has unparseable dates"
                );
                return Err(CoreError::RegistryUnavailable {
                    reason: "registry record has unparseable dates".to_string(),
                });
            }
        };
        Ok(Some(dates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubRegistry {
        calls: AtomicUsize,
        /// Results returned per call, in order. Exhausting it repeats the
        /// last one.
        results: Vec<Option<VerificationDates>>,
    }

    impl StubRegistry {
        fn new(results: Vec<Option<VerificationDates>>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                results,
            }
        }
    }

    #[async_trait]
    impl RegistryLookup for StubRegistry {
        async fn lookup(&self, _serial: &str) -> Result<Option<VerificationDates>, CoreError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let index = call.min(self.results.len() - 1);
            Ok(self.results[index])
        }
    }

    fn dates() -> VerificationDates {
        VerificationDates {
            last_verification_date: parse_registry_date("14.03.2025").unwrap(),
            verified_until: parse_registry_date("13.03.2026").unwrap(),
        }
    }

    #[test]
    fn test_parse_registry_date_formats() {
        let parsed = parse_registry_date("01.02.2025").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2025-02-01T00:00:00+00:00");
        let iso = parse_registry_date("2025-02-01").unwrap();
        assert_eq!(parsed, iso);
        assert!(parse_registry_date("").is_none());
        assert!(parse_registry_date("31.02.2025").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_on_first_attempt_does_not_retry() {
        let stub = StubRegistry::new(vec![Some(dates())]);
        let result = lookup_with_retry(&stub, "111222333", Duration::from_secs(3))
            .await
            .unwrap();
        assert_eq!(result, dates());
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_miss_retries_exactly_once_then_succeeds() {
        let stub = StubRegistry::new(vec![None, Some(dates())]);
        let result = lookup_with_retry(&stub, "111222333", Duration::from_secs(3))
            .await
            .unwrap();
        assert_eq!(result, dates());
        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_misses_surface_not_found() {
        let stub = StubRegistry::new(vec![None]);
        let err = lookup_with_retry(&stub, "111222333", Duration::from_secs(3))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::RegistryNotFound { .. }));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
    }
}
