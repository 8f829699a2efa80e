//! Record id listing from Zoho CRM custom views.
//!
//! Pages through a custom view requesting only the `id` field, so a large
//! view costs one request per page rather than one per record.

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::AppError;
use crate::zoho::client::ZohoClient;
use crate::zoho::{leads_path, VIEW_PAGE_SIZE};

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WireViewRecord {
    id: String,
}

#[derive(Debug, Deserialize, Default)]
struct WirePageInfo {
    #[serde(default)]
    more_records: bool,
}

#[derive(Debug, Deserialize)]
struct WireViewPage {
    #[serde(default)]
    data: Vec<WireViewRecord>,
    #[serde(default)]
    info: Option<WirePageInfo>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// Result of a custom-view fetch.
///
/// Ids collected before a mid-pagination failure are retained, so the
/// operator can still work with a partial list; `error` carries what
/// stopped the fetch, if anything did.
#[derive(Debug)]
pub struct ViewFetchOutcome {
    /// Record ids in view order.
    pub ids: Vec<String>,
    /// Number of pages successfully fetched.
    pub pages_fetched: usize,
    /// The failure that ended pagination early, if any.
    pub error: Option<AppError>,
}

impl ViewFetchOutcome {
    /// True when pagination ran to completion.
    pub fn complete(&self) -> bool {
        self.error.is_none()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ViewFetcher
// ─────────────────────────────────────────────────────────────────────────────

/// Fetches all record ids of a Leads custom view.
pub struct ViewFetcher {
    client: ZohoClient,
    page_size: usize,
}

impl ViewFetcher {
    pub fn new(client: ZohoClient) -> Self {
        Self {
            client,
            page_size: VIEW_PAGE_SIZE,
        }
    }

    /// Overrides the page size (tests).
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Pages through the view and collects every record id.
    ///
    /// # Errors
    ///
    /// - `AppError::MalformedInput` - The view id is not numeric
    /// - Auth errors from the token exchange
    ///
    /// Non-auth failures mid-pagination do not return `Err`; they end the
    /// fetch and are reported through [`ViewFetchOutcome::error`] with the
    /// already-fetched ids retained.
    pub async fn fetch_ids(&self, view_id: &str) -> Result<ViewFetchOutcome, AppError> {
        if view_id.is_empty() || !view_id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AppError::MalformedInput(format!(
                "custom view id must be numeric, got '{}'",
                view_id
            )));
        }

        let mut ids: Vec<String> = Vec::new();
        let mut pages_fetched = 0usize;
        let mut page = 1usize;

        loop {
            let url = self.page_url(view_id, page)?;

            let response = match self.client.get(url).await {
                Ok(response) => response,
                Err(err) if err.is_fatal_auth() => return Err(err),
                Err(err) => {
                    warn!(
                        "[ZOHO] View fetch failed on page {}, keeping {} ids",
                        page,
                        ids.len()
                    );
                    return Ok(ViewFetchOutcome {
                        ids,
                        pages_fetched,
                        error: Some(err),
                    });
                }
            };

            let status = response.status();

            // 204: the view has no (more) records.
            if status == reqwest::StatusCode::NO_CONTENT {
                break;
            }

            if !status.is_success() {
                let err = super::client::parse_error_response(response, status).await;
                warn!(
                    "[ZOHO] View page {} returned an error, keeping {} ids",
                    page,
                    ids.len()
                );
                return Ok(ViewFetchOutcome {
                    ids,
                    pages_fetched,
                    error: Some(err),
                });
            }

            let wire: WireViewPage = match response.json().await {
                Ok(wire) => wire,
                Err(e) => {
                    return Ok(ViewFetchOutcome {
                        ids,
                        pages_fetched,
                        error: Some(AppError::Internal(format!(
                            "failed to parse view page: {}",
                            e
                        ))),
                    });
                }
            };

            pages_fetched += 1;
            ids.extend(wire.data.into_iter().map(|r| r.id));

            let more = wire.info.map(|i| i.more_records).unwrap_or(false);
            if !more {
                break;
            }
            page += 1;
        }

        info!(
            "[ZOHO] Fetched {} record ids from view {} ({} pages)",
            ids.len(),
            view_id,
            pages_fetched
        );

        Ok(ViewFetchOutcome {
            ids,
            pages_fetched,
            error: None,
        })
    }

    fn page_url(&self, view_id: &str, page: usize) -> Result<url::Url, AppError> {
        let mut url = self.client.build_url(&leads_path())?;
        url.query_pairs_mut()
            .append_pair("cvid", view_id)
            .append_pair("fields", "id")
            .append_pair("page", &page.to_string())
            .append_pair("per_page", &self.page_size.to_string());
        Ok(url)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
