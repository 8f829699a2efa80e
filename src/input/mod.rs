//! Identifier input resolution.
//!
//! Turns operator-supplied input (pasted text or a CSV upload) into an
//! ordered record list plus a rejects list. Rejects are data, not errors:
//! a stray non-numeric token never aborts the run, it is reported and the
//! remaining records proceed.

pub mod paste;
pub mod tabular;

pub use paste::parse_pasted;
pub use tabular::parse_tabular;

use std::collections::HashSet;

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// A record reference as resolved from input, before confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRef {
    /// Numeric Zoho record id.
    pub id: String,
    /// Per-row status from a mixed-status upload; `None` means the session
    /// default applies at confirmation time.
    pub target_status: Option<String>,
}

impl RecordRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            target_status: None,
        }
    }

    pub fn with_status(id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            target_status: Some(status.into()),
        }
    }
}

/// An input token or row that could not be resolved to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedToken {
    /// The offending token or cell value, verbatim.
    pub token: String,
    /// Short human-readable reason.
    pub reason: String,
}

/// Result of resolving one input source.
#[derive(Debug, Default)]
pub struct ParsedInput {
    /// Accepted records in input order. Duplicates are kept.
    pub records: Vec<RecordRef>,
    /// Tokens/rows that were not accepted, in input order.
    pub rejects: Vec<RejectedToken>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Zoho record ids are long decimal strings. Anything else is rejected.
pub(crate) fn is_numeric_id(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

/// Returns ids that appear more than once, in first-occurrence order.
/// Duplicates are reported to the operator but never removed from the list.
pub fn find_duplicate_ids(records: &[RecordRef]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut flagged: HashSet<&str> = HashSet::new();
    let mut duplicates = Vec::new();

    for record in records {
        if !seen.insert(record.id.as_str()) && flagged.insert(record.id.as_str()) {
            duplicates.push(record.id.clone());
        }
    }

    duplicates
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
