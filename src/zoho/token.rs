//! OAuth token refresh for Zoho accounts.
//!
//! Exchanges the long-lived refresh token for a short-lived access token
//! without user interaction, caches it, and renews it after expiry.

use std::time::{Duration, Instant};

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info};

use crate::config::Credentials;
use crate::error::AppError;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Tokens are treated as expired this long before their reported expiry,
/// so a token never goes stale mid-batch.
const EXPIRY_SKEW_SECS: u64 = 60;

/// Fallback lifetime when the accounts server omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

// ─────────────────────────────────────────────────────────────────────────────
// Response Types
// ─────────────────────────────────────────────────────────────────────────────

/// Response from the token-exchange endpoint.
///
/// The accounts server sometimes reports a rejected refresh token as an
/// HTTP 200 with an `error` field and no `access_token`, so both shapes
/// are decoded from one struct.
#[derive(Debug, Deserialize)]
struct WireTokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

struct CachedToken {
    value: SecretString,
    expires_at: Instant,
}

// ─────────────────────────────────────────────────────────────────────────────
// TokenProvider
// ─────────────────────────────────────────────────────────────────────────────

/// Caching access-token provider.
///
/// # Thread Safety
///
/// - `cached`: `RwLock` so request paths can read concurrently.
/// - `refresh_lock`: `Mutex` serializing exchanges with double-checked
///   locking, so concurrent callers amortize one refresh instead of each
///   performing their own.
pub struct TokenProvider {
    http: reqwest::Client,
    creds: Credentials,
    cached: RwLock<Option<CachedToken>>,
    refresh_lock: Mutex<()>,
}

impl TokenProvider {
    /// Creates a provider sharing the given HTTP client.
    pub fn new(http: reqwest::Client, creds: Credentials) -> Self {
        Self {
            http,
            creds,
            cached: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Returns a valid access token, exchanging the refresh token if the
    /// cached one is absent or expired.
    ///
    /// # Errors
    ///
    /// - `AppError::AuthRejected` - The refresh token is invalid or revoked
    /// - `AppError::AuthUnreachable` - The accounts endpoint cannot be reached
    ///
    /// # Security
    ///
    /// Never logs the refresh token or the returned access token.
    pub async fn access_token(&self) -> Result<String, AppError> {
        if let Some(token) = self.cached_if_fresh().await {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;

        // Double-check: another caller may have refreshed while we waited.
        if let Some(token) = self.cached_if_fresh().await {
            info!("[ZOHO] Token already refreshed by a concurrent caller");
            return Ok(token);
        }

        self.exchange().await
    }

    /// Drops the cached token so the next call performs a fresh exchange.
    /// Used after the API reports the current token as unauthorized.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    async fn cached_if_fresh(&self) -> Option<String> {
        let guard = self.cached.read().await;
        guard
            .as_ref()
            .filter(|t| Instant::now() < t.expires_at)
            .map(|t| t.value.expose_secret().to_string())
    }

    /// Performs the refresh-token exchange and caches the result.
    async fn exchange(&self) -> Result<String, AppError> {
        let token_url = self.creds.token_url();

        info!("[ZOHO] Refreshing access token...");

        let params = [
            ("refresh_token", self.creds.refresh_token_value()),
            ("client_id", self.creds.client_id.as_str()),
            ("client_secret", self.creds.client_secret_value()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http
            .post(&token_url)
            .form(&params)
            .send()
            .await
            .map_err(|_| {
                error!("[ZOHO] Token exchange request failed");
                AppError::AuthUnreachable("failed to connect to accounts server".to_string())
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::BAD_REQUEST
            || status == reqwest::StatusCode::UNAUTHORIZED
        {
            error!("[ZOHO] Token exchange rejected: {}", status);
            return Err(AppError::AuthRejected);
        }

        if !status.is_success() {
            error!("[ZOHO] Token exchange failed with status: {}", status);
            return Err(AppError::AuthUnreachable(format!(
                "accounts server returned HTTP {}",
                status.as_u16()
            )));
        }

        let wire: WireTokenResponse = response.json().await.map_err(|_| {
            error!("[ZOHO] Failed to parse token exchange response");
            AppError::Internal("invalid token exchange response".to_string())
        })?;

        let access_token = match wire.access_token {
            Some(token) => token,
            None if wire.error.is_some() => {
                // HTTP 200 but the body says no: treat like any rejection.
                error!("[ZOHO] Token exchange returned error body");
                return Err(AppError::AuthRejected);
            }
            None => {
                return Err(AppError::Internal(
                    "token exchange response missing access_token".to_string(),
                ))
            }
        };

        let lifetime = wire
            .expires_in
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS)
            .saturating_sub(EXPIRY_SKEW_SECS);
        let expires_at = Instant::now() + Duration::from_secs(lifetime);

        {
            let mut guard = self.cached.write().await;
            *guard = Some(CachedToken {
                value: SecretString::from(access_token.clone()),
                expires_at,
            });
        }

        info!("[ZOHO] Token refresh successful");
        Ok(access_token)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod wiremock_tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_credentials(accounts_url: &str) -> Credentials {
        Credentials {
            client_id: "test_client_id".to_string(),
            client_secret: SecretString::from("test_secret".to_string()),
            refresh_token: SecretString::from("test_refresh_token".to_string()),
            api_domain: "https://www.zohoapis.com".to_string(),
            accounts_url: accounts_url.to_string(),
        }
    }

    fn provider_for(server: &MockServer) -> TokenProvider {
        TokenProvider::new(reqwest::Client::new(), test_credentials(&server.uri()))
    }

    #[tokio::test]
    async fn exchange_success_returns_token() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/v2/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("client_id=test_client_id"))
            .and(body_string_contains("refresh_token=test_refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh_token_abc",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let token = provider.access_token().await.unwrap();

        assert_eq!(token, "fresh_token_abc");
    }

    #[tokio::test]
    async fn cached_token_is_reused() {
        let server = MockServer::start().await;

        // expect(1): a second exchange would fail the mock verification.
        Mock::given(method("POST"))
            .and(path("/oauth/v2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "cached_token",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        assert_eq!(provider.access_token().await.unwrap(), "cached_token");
        assert_eq!(provider.access_token().await.unwrap(), "cached_token");
    }

    #[tokio::test]
    async fn expired_token_triggers_new_exchange() {
        let server = MockServer::start().await;

        // expires_in of 0 is below the expiry skew, so the cached token is
        // immediately stale and every call re-exchanges.
        Mock::given(method("POST"))
            .and(path("/oauth/v2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "short_lived",
                "expires_in": 0
            })))
            .expect(2)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        provider.access_token().await.unwrap();
        provider.access_token().await.unwrap();
    }

    #[tokio::test]
    async fn invalidate_forces_refresh() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/v2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok",
                "expires_in": 3600
            })))
            .expect(2)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        provider.access_token().await.unwrap();
        provider.invalidate().await;
        provider.access_token().await.unwrap();
    }

    #[tokio::test]
    async fn rejected_refresh_token_returns_auth_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/v2/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_client"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let result = provider.access_token().await;

        assert!(matches!(result, Err(AppError::AuthRejected)));
    }

    #[tokio::test]
    async fn error_body_with_http_200_returns_auth_rejected() {
        let server = MockServer::start().await;

        // Zoho accounts is known to answer 200 with an error body.
        Mock::given(method("POST"))
            .and(path("/oauth/v2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": "invalid_code"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let result = provider.access_token().await;

        assert!(matches!(result, Err(AppError::AuthRejected)));
    }

    #[tokio::test]
    async fn server_error_returns_auth_unreachable() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/v2/token"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let result = provider.access_token().await;

        assert!(matches!(result, Err(AppError::AuthUnreachable(_))));
    }

    #[tokio::test]
    async fn connection_failure_returns_auth_unreachable() {
        // Nothing listens on this address.
        let provider = TokenProvider::new(
            reqwest::Client::new(),
            test_credentials("http://127.0.0.1:1"),
        );

        let result = provider.access_token().await;

        assert!(matches!(result, Err(AppError::AuthUnreachable(_))));
    }
}
