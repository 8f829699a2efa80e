//! Authenticated Zoho HTTP client with safe logging.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use crate::config::Credentials;
use crate::error::AppError;
use crate::zoho::token::TokenProvider;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// User agent string for all Zoho API requests.
const CLIENT_USER_AGENT: &str = "zoho-bulk/0.1.0";

/// Bounded network timeout for every request.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Zoho's authorization header scheme.
const AUTH_SCHEME: &str = "Zoho-oauthtoken";

/// Query parameter keys (case-insensitive) whose values are redacted in logs.
const SENSITIVE_QUERY_PARAMS: &[&str] = &[
    "authtoken",
    "access_token",
    "refresh_token",
    "client_secret",
    "code",
    "token",
    "authorization",
];

// ─────────────────────────────────────────────────────────────────────────────
// LoggingMode
// ─────────────────────────────────────────────────────────────────────────────

/// Controls how URLs are sanitized for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoggingMode {
    /// Log only the path component. Strips scheme, host, query, and fragment.
    /// Example: `/crm/v8/Leads`
    #[default]
    PathOnly,

    /// Log path and query parameters, but redact sensitive values.
    /// Example: `/crm/v8/Leads?cvid=123&authtoken=***`
    PathAndQueryRedacted,
}

/// Determines if a query parameter key is sensitive and should be redacted.
fn is_sensitive_param(key: &str) -> bool {
    let key_lower = key.to_ascii_lowercase();
    SENSITIVE_QUERY_PARAMS
        .iter()
        .any(|&sensitive| key_lower == sensitive)
}

/// Sanitizes a URL for safe logging based on the specified mode.
///
/// Uses the `url` crate for proper parsing instead of string surgery, so
/// the result never contains the scheme, host, or fragment.
pub fn sanitize_url_for_logs(url: &Url, mode: LoggingMode) -> String {
    let path = url.path();

    match mode {
        LoggingMode::PathOnly => path.to_string(),
        LoggingMode::PathAndQueryRedacted => {
            let query_pairs: Vec<_> = url.query_pairs().collect();
            if query_pairs.is_empty() {
                return path.to_string();
            }

            let redacted: Vec<String> = query_pairs
                .into_iter()
                .map(|(key, value)| {
                    if is_sensitive_param(&key) {
                        format!("{}=***", key)
                    } else {
                        format!("{}={}", key, value)
                    }
                })
                .collect();

            format!("{}?{}", path, redacted.join("&"))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level Zoho error response shape.
#[derive(Debug, Deserialize)]
struct WireZohoError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// ZohoClient
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP client for Zoho CRM API interactions.
///
/// Attaches the `Zoho-oauthtoken` authorization header from the shared
/// [`TokenProvider`], logs one sanitized line per call, and transparently
/// re-exchanges the token once when the API answers 401 mid-run.
#[derive(Clone)]
pub struct ZohoClient {
    /// The underlying HTTP client.
    http: reqwest::Client,
    /// Shared token provider (also used by concurrent holders of clones).
    tokens: Arc<TokenProvider>,
    /// Regional API base URL.
    base_url: Url,
    /// Controls URL sanitization for logging.
    logging_mode: LoggingMode,
}

impl ZohoClient {
    /// Creates a new client from resolved credentials.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Internal` if the HTTP client fails to initialize
    /// or the configured API domain is not a valid URL.
    pub fn new(creds: Credentials) -> Result<Self, AppError> {
        let http = build_http_client()?;
        let base_url = Url::parse(&creds.api_domain)
            .map_err(|_| AppError::Internal(format!("invalid API domain: {}", creds.api_domain)))?;
        let tokens = Arc::new(TokenProvider::new(http.clone(), creds));

        Ok(Self {
            http,
            tokens,
            base_url,
            logging_mode: LoggingMode::default(),
        })
    }

    /// Updates the logging mode for URL sanitization.
    pub fn with_logging_mode(mut self, mode: LoggingMode) -> Self {
        self.logging_mode = mode;
        self
    }

    /// Fetches a token up front so auth failures surface before any
    /// mutation is attempted.
    pub async fn ensure_authenticated(&self) -> Result<(), AppError> {
        self.tokens.access_token().await.map(|_| ())
    }

    /// Builds a full URL by joining the path with the API domain.
    pub fn build_url(&self, path: &str) -> Result<Url, AppError> {
        self.base_url
            .join(path)
            .map_err(|_| AppError::Internal(format!("invalid path: {}", path)))
    }

    /// Executes an authenticated GET request.
    pub async fn get(&self, url: Url) -> Result<reqwest::Response, AppError> {
        self.request(Method::GET, url, None).await
    }

    /// Executes an authenticated PUT request with a JSON body.
    pub async fn put_json(
        &self,
        url: Url,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, AppError> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| AppError::Internal(format!("failed to encode request body: {}", e)))?;
        self.request(Method::PUT, url, Some(bytes)).await
    }

    /// Executes an authenticated request with one transparent token refresh.
    ///
    /// A 401 invalidates the cached token, refreshes, and retries the call
    /// once; a second 401 means the refresh credential itself is no longer
    /// accepted.
    ///
    /// # Errors
    ///
    /// - `AppError::AuthRejected` / `AppError::AuthUnreachable` from the
    ///   token exchange
    /// - `AppError::ConnectionFailed` for network errors
    pub async fn request(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
    ) -> Result<reqwest::Response, AppError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .execute_authed(method.clone(), url.clone(), body.clone(), &token)
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        info!("[ZOHO] Received 401, refreshing access token...");
        self.tokens.invalidate().await;
        let token = self.tokens.access_token().await?;

        let retry_response = self.execute_authed(method, url, body, &token).await?;

        if retry_response.status() == StatusCode::UNAUTHORIZED {
            warn!("[ZOHO] Still unauthorized after token refresh");
            return Err(AppError::AuthRejected);
        }

        Ok(retry_response)
    }

    /// Executes a single authenticated request with timing and logging.
    ///
    /// # Security
    ///
    /// - Never logs the Authorization header or request/response bodies
    /// - Sanitizes URLs before logging
    /// - Error messages never contain raw URLs or tokens
    async fn execute_authed(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
        access_token: &str,
    ) -> Result<reqwest::Response, AppError> {
        let start = Instant::now();
        let sanitized_url = sanitize_url_for_logs(&url, self.logging_mode);

        let mut request = self
            .http
            .request(method.clone(), url.as_str())
            .header("Authorization", format!("{} {}", AUTH_SCHEME, access_token));

        if let Some(body_bytes) = body {
            request = request
                .header("Content-Type", "application/json")
                .body(body_bytes);
        }

        let result = request.send().await;
        let duration_ms = start.elapsed().as_millis();

        match result {
            Ok(response) => {
                info!(
                    "[ZOHO] {} {} {} {}ms",
                    method,
                    sanitized_url,
                    response.status().as_u16(),
                    duration_ms
                );
                Ok(response)
            }
            Err(_) => {
                info!("[ZOHO] {} {} FAILED {}ms", method, sanitized_url, duration_ms);
                // Never expose the raw reqwest error, which can carry the URL.
                Err(AppError::ConnectionFailed(
                    "connection to Zoho failed".to_string(),
                ))
            }
        }
    }
}

/// Maps a non-success response to the appropriate `AppError`.
///
/// 429 becomes `RateLimited` with the parsed `Retry-After`; anything else
/// tries the structured Zoho error body before falling back to the HTTP
/// status line.
pub(crate) async fn parse_error_response(
    response: reqwest::Response,
    status: StatusCode,
) -> AppError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = retry_after_secs(&response);
        return AppError::RateLimited {
            retry_after_secs: retry_after,
        };
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("unable to read error body"));

    if let Ok(err) = serde_json::from_str::<WireZohoError>(&body) {
        if !err.code.is_empty() {
            return AppError::ZohoError(format!("[{}] {}", err.code, err.message));
        }
    }

    AppError::ZohoError(format!(
        "HTTP {} - {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("unknown error")
    ))
}

/// Parses the `Retry-After` header of a 429 response, if present and numeric.
pub(crate) fn retry_after_secs(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
}

/// Builds the configured HTTP client.
fn build_http_client() -> Result<reqwest::Client, AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .build()
        .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
