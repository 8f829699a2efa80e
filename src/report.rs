//! Per-record update results and run-level reporting.
//!
//! Every record submitted for execution ends with exactly one
//! [`UpdateResult`] in the final [`BatchReport`], in input order. The
//! report also renders the operator-facing failure log CSV.

use chrono::Utc;
use serde::Serialize;

use crate::error::AppError;

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of a single record's update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateOutcome {
    /// Zoho accepted the update.
    Success,
    /// Zoho rejected the record, or its batch exhausted its retry budget.
    Failed,
    /// The record was never dispatched (run cancelled).
    Skipped,
}

/// Result of one record's update attempt.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateResult {
    /// The Zoho record id.
    pub id: String,
    /// The status value that was (or would have been) submitted.
    pub requested_status: String,
    /// What happened.
    pub outcome: UpdateOutcome,
    /// Error detail for Failed/Skipped records; None for Success.
    pub error_detail: Option<String>,
}

impl UpdateResult {
    pub(crate) fn success(id: &str, requested_status: &str) -> Self {
        Self {
            id: id.to_string(),
            requested_status: requested_status.to_string(),
            outcome: UpdateOutcome::Success,
            error_detail: None,
        }
    }

    pub(crate) fn failed(id: &str, requested_status: &str, detail: String) -> Self {
        Self {
            id: id.to_string(),
            requested_status: requested_status.to_string(),
            outcome: UpdateOutcome::Failed,
            error_detail: Some(detail),
        }
    }

    pub(crate) fn skipped(id: &str, requested_status: &str, reason: &str) -> Self {
        Self {
            id: id.to_string(),
            requested_status: requested_status.to_string(),
            outcome: UpdateOutcome::Skipped,
            error_detail: Some(reason.to_string()),
        }
    }
}

/// Aggregated result of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// One entry per submitted record, original input order.
    pub results: Vec<UpdateResult>,
    pub success_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
}

impl BatchReport {
    /// Builds a report from ordered results, computing the aggregate counts.
    pub fn from_results(results: Vec<UpdateResult>) -> Self {
        let mut success_count = 0;
        let mut failed_count = 0;
        let mut skipped_count = 0;
        for result in &results {
            match result.outcome {
                UpdateOutcome::Success => success_count += 1,
                UpdateOutcome::Failed => failed_count += 1,
                UpdateOutcome::Skipped => skipped_count += 1,
            }
        }
        Self {
            results,
            success_count,
            failed_count,
            skipped_count,
        }
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// True when no record failed or was skipped.
    pub fn fully_successful(&self) -> bool {
        self.failed_count == 0 && self.skipped_count == 0
    }

    /// One-line operator summary.
    pub fn summary_line(&self) -> String {
        format!(
            "{} succeeded | {} failed | {} skipped ({} total)",
            self.success_count,
            self.failed_count,
            self.skipped_count,
            self.total()
        )
    }

    /// Renders the failure log: one `id,requested_status,error_detail` row
    /// per Failed or Skipped record.
    pub fn failure_csv(&self) -> Result<String, AppError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(["id", "requested_status", "error_detail"])
            .map_err(|e| AppError::Internal(format!("failed to write failure log: {}", e)))?;

        for result in &self.results {
            if result.outcome == UpdateOutcome::Success {
                continue;
            }
            writer
                .write_record([
                    result.id.as_str(),
                    result.requested_status.as_str(),
                    result.error_detail.as_deref().unwrap_or(""),
                ])
                .map_err(|e| AppError::Internal(format!("failed to write failure log: {}", e)))?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| AppError::Internal(format!("failed to flush failure log: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| AppError::Internal(format!("failure log is not UTF-8: {}", e)))
    }

    /// Timestamped default filename for the failure log download.
    pub fn failure_log_filename(status: &str) -> String {
        format!(
            "failed_zoho_updates_{}_{}.csv",
            status.replace(' ', "_"),
            Utc::now().format("%Y%m%d_%H%M%S_UTC")
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
