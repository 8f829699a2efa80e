//! Bulk `Lead_Status` updater for Zoho CRM.
//!
//! Resolves record identifiers from pasted text, CSV uploads or custom
//! views, and pushes status updates through the Zoho v8 API in batches,
//! authenticating via OAuth2 refresh-token exchange. Every submitted
//! record ends with exactly one result; failures are reported, never
//! silently dropped.

pub mod config;
pub mod error;
pub mod input;
pub mod report;
pub mod session;
pub mod zoho;

pub use config::{CredentialOverrides, Credentials};
pub use error::AppError;
pub use input::{parse_pasted, parse_tabular, ParsedInput, RecordRef, RejectedToken};
pub use report::{BatchReport, UpdateOutcome, UpdateResult};
pub use session::{InputSource, RunState, SessionContext};
pub use zoho::{
    BulkUpdateEngine, FieldMetadataFetcher, PendingUpdate, ViewFetchOutcome, ViewFetcher,
    ZohoClient,
};
