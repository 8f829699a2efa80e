//! Zoho CRM HTTP client and API interaction layer.
//!
//! This module provides the authenticated HTTP client and the API-facing
//! components built on top of it. Key features:
//!
//! - **Secure credential handling** via `secrecy::SecretString`
//! - **Safe logging** that never leaks tokens or sensitive URL parameters
//! - **Cached OAuth token refresh** serialized so only one exchange runs
//! - **Rate-limit-aware bulk updates** with bounded retry budgets

pub mod bulk;
pub mod client;
pub mod fields;
pub mod token;
pub mod views;

pub use bulk::{BulkUpdateEngine, PendingUpdate};
pub use client::{LoggingMode, ZohoClient};
pub use fields::FieldMetadataFetcher;
pub use token::TokenProvider;
pub use views::{ViewFetchOutcome, ViewFetcher};

// ─────────────────────────────────────────────────────────────────────────────
// API Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Zoho CRM API version used for all record endpoints.
pub const API_VERSION: &str = "v8";

/// The only module this tool touches.
pub const MODULE_API_NAME: &str = "Leads";

/// The only field this tool updates.
pub const FIELD_TO_UPDATE: &str = "Lead_Status";

/// Documented per-call ceiling for bulk record updates.
/// Treated as a configuration constant since Zoho may change it.
pub const UPDATE_BATCH_CEILING: usize = 100;

/// Documented page size for custom-view record listing.
pub const VIEW_PAGE_SIZE: usize = 200;

/// Known `Lead_Status` picklist values. Used for operator-facing
/// validation warnings only; orgs customize this list, so the engine
/// submits whatever status it is given.
pub const VALID_STATUSES: &[&str] = &[
    "Not Contacted",
    "Self Storage Questions Sent",
    "Move Questionnaire Sent",
    "Move Questionnaire Follow Up",
    "Move Questionnaire Completed",
    "Onsite Survey Booked",
    "On Hold",
    "Duplicate Lead",
    "Closed Lost",
    "Junk Lead",
    "Not Qualified",
];

/// Path of the Leads record endpoint (bulk update and view listing).
pub(crate) fn leads_path() -> String {
    format!("/crm/{}/{}", API_VERSION, MODULE_API_NAME)
}
