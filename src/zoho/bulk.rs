//! Bulk update engine for the Lead-status field.
//!
//! Drives the actual mutation: partitions the confirmed work list into
//! fixed-size batches, issues one `PUT /crm/v8/Leads` per batch, decodes
//! the per-item response array, and retries transient failures with
//! bounded exponential backoff. One bad batch never aborts the run; its
//! records are marked Failed and the remaining batches still execute.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{sanitize_message, AppError};
use crate::report::{BatchReport, UpdateResult};
use crate::zoho::client::{parse_error_response, retry_after_secs, ZohoClient};
use crate::zoho::{leads_path, FIELD_TO_UPDATE, UPDATE_BATCH_CEILING};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Maximum attempts for a batch whose call fails at the transport level
/// (network error, timeout, 5xx).
pub const MAX_TRANSPORT_ATTEMPTS: u32 = 3;

/// Maximum attempts for a batch that keeps being rate limited. Counted
/// separately from the transport budget so a 429 never eats into it.
pub const MAX_RATE_LIMIT_ATTEMPTS: u32 = 5;

/// Initial backoff delay; doubles per retry.
const BACKOFF_BASE: Duration = Duration::from_secs(2);

/// Per-item status value Zoho uses for accepted records.
const ITEM_STATUS_SUCCESS: &str = "success";

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// A record with its status materialized, ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdate {
    /// Numeric Zoho record id.
    pub id: String,
    /// Status value to submit for this record.
    pub status: String,
}

/// Per-item entry of the bulk update response. Items come back in
/// submission order.
#[derive(Debug, Deserialize)]
struct WireItemResult {
    #[serde(default)]
    code: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct WireUpdateResponse {
    #[serde(default)]
    data: Vec<WireItemResult>,
}

// ─────────────────────────────────────────────────────────────────────────────
// BulkUpdateEngine
// ─────────────────────────────────────────────────────────────────────────────

/// Serial batch executor for Lead-status updates.
///
/// Batches are dispatched one at a time; the remote per-window rate limit
/// is the bottleneck, not local compute, so there is nothing to gain from
/// parallel dispatch.
pub struct BulkUpdateEngine {
    client: ZohoClient,
    batch_size: usize,
    backoff_base: Duration,
}

impl BulkUpdateEngine {
    pub fn new(client: ZohoClient) -> Self {
        Self {
            client,
            batch_size: UPDATE_BATCH_CEILING,
            backoff_base: BACKOFF_BASE,
        }
    }

    /// Overrides the batch ceiling (tests, or a lowered remote limit).
    ///
    /// # Panics
    ///
    /// Panics if `batch_size` is 0.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        assert!(batch_size > 0, "batch_size must be greater than 0");
        self.batch_size = batch_size;
        self
    }

    /// Overrides the initial backoff delay (tests).
    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    /// Executes the update run.
    ///
    /// Every pending record ends with exactly one [`UpdateResult`] in the
    /// returned report, in input order. Cancellation is checked before each
    /// batch is dispatched: the in-flight batch finishes, undispatched
    /// records are reported as Skipped.
    ///
    /// # Errors
    ///
    /// Only auth failures abort the run (they surface before any mutation
    /// when the token is fetched up front). Batch-level failures are
    /// recorded per record instead.
    pub async fn execute(
        &self,
        pending: &[PendingUpdate],
        cancel: &CancellationToken,
    ) -> Result<BatchReport, AppError> {
        if pending.is_empty() {
            return Ok(BatchReport::from_results(Vec::new()));
        }

        // Fail on bad credentials before any record is touched.
        self.client.ensure_authenticated().await?;

        let total_batches = pending.len().div_ceil(self.batch_size);
        info!(
            "[ZOHO] Updating {} records in {} batches of up to {}",
            pending.len(),
            total_batches,
            self.batch_size
        );

        let mut results: Vec<UpdateResult> = Vec::with_capacity(pending.len());

        for (index, batch) in pending.chunks(self.batch_size).enumerate() {
            if cancel.is_cancelled() {
                let remaining = pending.len() - results.len();
                warn!(
                    "[ZOHO] Cancellation requested, skipping {} undispatched records",
                    remaining
                );
                for record in &pending[results.len()..] {
                    results.push(UpdateResult::skipped(
                        &record.id,
                        &record.status,
                        "cancelled before dispatch",
                    ));
                }
                break;
            }

            info!(
                "[ZOHO] Dispatching batch {}/{} ({} records)",
                index + 1,
                total_batches,
                batch.len()
            );

            match self.update_batch(batch).await {
                Ok(items) => results.extend(map_item_results(batch, items)),
                Err(err) if err.is_fatal_auth() => return Err(err),
                Err(err) => {
                    let detail = sanitize_message(&err.to_string(), "request failed");
                    warn!(
                        "[ZOHO] Batch {}/{} failed permanently: {}",
                        index + 1,
                        total_batches,
                        detail
                    );
                    for record in batch {
                        results.push(UpdateResult::failed(
                            &record.id,
                            &record.status,
                            detail.clone(),
                        ));
                    }
                }
            }
        }

        Ok(BatchReport::from_results(results))
    }

    /// Issues one bulk update call with bounded retries.
    ///
    /// Retry state is explicit: separate attempt counters for transport
    /// failures and rate limiting, with a doubling delay shared between
    /// them. No recursion.
    async fn update_batch(
        &self,
        batch: &[PendingUpdate],
    ) -> Result<Vec<WireItemResult>, AppError> {
        let url = self.client.build_url(&leads_path())?;
        let payload = json!({
            "data": batch
                .iter()
                .map(|record| json!({ "id": record.id, FIELD_TO_UPDATE: record.status }))
                .collect::<Vec<_>>()
        });

        let mut transport_attempts: u32 = 0;
        let mut rate_limit_attempts: u32 = 0;
        let mut delay = self.backoff_base;

        loop {
            let response = match self.client.put_json(url.clone(), &payload).await {
                Ok(response) => response,
                Err(err) if err.is_fatal_auth() => return Err(err),
                Err(err) => {
                    transport_attempts += 1;
                    if transport_attempts >= MAX_TRANSPORT_ATTEMPTS {
                        return Err(err);
                    }
                    warn!(
                        "[ZOHO] Transport failure on attempt {}/{}, backing off {:?}",
                        transport_attempts, MAX_TRANSPORT_ATTEMPTS, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    continue;
                }
            };

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                rate_limit_attempts += 1;
                let retry_after = retry_after_secs(&response);
                if rate_limit_attempts >= MAX_RATE_LIMIT_ATTEMPTS {
                    return Err(AppError::RateLimited {
                        retry_after_secs: retry_after,
                    });
                }
                let wait = retry_after.map(Duration::from_secs).unwrap_or(delay);
                warn!(
                    "[ZOHO] Rate limited on attempt {}/{}, waiting {:?}",
                    rate_limit_attempts, MAX_RATE_LIMIT_ATTEMPTS, wait
                );
                tokio::time::sleep(wait).await;
                delay = delay.saturating_mul(2);
                continue;
            }

            if status.is_server_error() {
                transport_attempts += 1;
                if transport_attempts >= MAX_TRANSPORT_ATTEMPTS {
                    return Err(AppError::ConnectionFailed(format!(
                        "HTTP {} after {} attempts",
                        status.as_u16(),
                        transport_attempts
                    )));
                }
                warn!(
                    "[ZOHO] HTTP {} on attempt {}/{}, backing off {:?}",
                    status.as_u16(),
                    transport_attempts,
                    MAX_TRANSPORT_ATTEMPTS,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
                continue;
            }

            if !status.is_success() {
                return Err(parse_error_response(response, status).await);
            }

            let wire: WireUpdateResponse = response.json().await.map_err(|e| {
                AppError::Internal(format!("failed to parse update response: {}", e))
            })?;
            return Ok(wire.data);
        }
    }
}

/// Zips submitted records with their per-item responses, preserving
/// submission order. Per-item rejections are recorded verbatim and never
/// retried; a missing entry marks its record Failed rather than dropping it.
fn map_item_results(batch: &[PendingUpdate], items: Vec<WireItemResult>) -> Vec<UpdateResult> {
    if items.len() > batch.len() {
        warn!(
            "[ZOHO] Response carried {} items for {} submitted records",
            items.len(),
            batch.len()
        );
    }

    let mut items = items.into_iter();
    batch
        .iter()
        .map(|record| match items.next() {
            Some(item) if item.status == ITEM_STATUS_SUCCESS => {
                UpdateResult::success(&record.id, &record.status)
            }
            Some(item) => UpdateResult::failed(
                &record.id,
                &record.status,
                format!("[{}] {}", item.code, item.message),
            ),
            None => UpdateResult::failed(
                &record.id,
                &record.status,
                "no per-item response from Zoho".to_string(),
            ),
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
