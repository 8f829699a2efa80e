use thiserror::Error;

/// Patterns (lowercase) that indicate sensitive data not safe for reports
/// or log output. Used by `contains_sensitive()` for case-insensitive matching.
pub(crate) const SENSITIVE_PATTERNS: &[&str] = &[
    "zoho-oauthtoken",
    "refresh_token",
    "access_token",
    "client_secret",
    "authorization:",
];

/// Returns true if the message contains any sensitive pattern (case-insensitive).
pub(crate) fn contains_sensitive(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Sanitizes a message before it is recorded in a result report or printed.
/// If sensitive content is detected, returns the fallback instead.
pub(crate) fn sanitize_message(msg: &str, fallback: &str) -> String {
    if contains_sensitive(msg) {
        fallback.into()
    } else {
        msg.to_string()
    }
}

/// Application-wide error type.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Auth ──────────────────────────────────────────────────────────────────
    #[error("Refresh token rejected by Zoho accounts server")]
    AuthRejected,

    #[error("Zoho accounts server unreachable: {0}")]
    AuthUnreachable(String),

    #[error("Missing credential: {0} is not set")]
    MissingCredentials(&'static str),

    // ── Input ─────────────────────────────────────────────────────────────────
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    // ── API ───────────────────────────────────────────────────────────────────
    #[error("Rate limited by Zoho")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Zoho error: {0}")]
    ZohoError(String),

    // ── Session ───────────────────────────────────────────────────────────────
    #[error("Invalid run-state transition: {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// True for errors that must abort the whole run rather than be recorded
    /// against the records of a single batch.
    pub fn is_fatal_auth(&self) -> bool {
        matches!(
            self,
            AppError::AuthRejected
                | AppError::AuthUnreachable(_)
                | AppError::MissingCredentials(_)
        )
    }
}
