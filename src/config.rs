//! Credential configuration with transient per-session overrides.
//!
//! Credentials are resolved once per run through an explicit precedence
//! chain: CLI override > environment variable > built-in regional default.
//! Overrides are never written back anywhere.

use secrecy::{ExposeSecret, SecretString};

use crate::error::AppError;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Default regional API base URL.
pub const DEFAULT_API_DOMAIN: &str = "https://www.zohoapis.com";

/// Default regional accounts (auth) base URL.
pub const DEFAULT_ACCOUNTS_URL: &str = "https://accounts.zoho.com";

const ENV_CLIENT_ID: &str = "ZOHO_CLIENT_ID";
const ENV_CLIENT_SECRET: &str = "ZOHO_CLIENT_SECRET";
const ENV_REFRESH_TOKEN: &str = "ZOHO_REFRESH_TOKEN";
const ENV_API_DOMAIN: &str = "ZOHO_API_DOMAIN";
const ENV_ACCOUNTS_URL: &str = "ZOHO_ACCOUNTS_URL";

// ─────────────────────────────────────────────────────────────────────────────
// Credentials
// ─────────────────────────────────────────────────────────────────────────────

/// Zoho OAuth credentials for API access.
///
/// Sensitive fields (`client_secret`, `refresh_token`) are wrapped in
/// `SecretString` to prevent accidental exposure through `Debug` or logging.
#[derive(Clone)]
pub struct Credentials {
    /// OAuth client ID of the registered Zoho client.
    pub client_id: String,
    /// OAuth client secret (wrapped for security).
    pub client_secret: SecretString,
    /// Long-lived refresh token (wrapped for security).
    pub refresh_token: SecretString,
    /// Regional API base URL (e.g., "https://www.zohoapis.com").
    pub api_domain: String,
    /// Regional accounts base URL (e.g., "https://accounts.zoho.com").
    pub accounts_url: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("api_domain", &self.api_domain)
            .field("accounts_url", &self.accounts_url)
            .finish()
    }
}

/// Transient credential overrides for a single session.
///
/// Layered above the environment; never persisted.
#[derive(Debug, Clone, Default)]
pub struct CredentialOverrides {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub api_domain: Option<String>,
    pub accounts_url: Option<String>,
}

impl Credentials {
    /// Resolves credentials from the environment alone.
    pub fn from_env() -> Result<Self, AppError> {
        Self::resolve(&CredentialOverrides::default())
    }

    /// Resolves credentials through the override > env > default chain.
    ///
    /// # Errors
    ///
    /// Returns `AppError::MissingCredentials` naming the first required
    /// value that is set neither as an override nor in the environment.
    pub fn resolve(overrides: &CredentialOverrides) -> Result<Self, AppError> {
        let client_id = required(overrides.client_id.clone(), ENV_CLIENT_ID)?;
        let client_secret = required(overrides.client_secret.clone(), ENV_CLIENT_SECRET)?;
        let refresh_token = required(overrides.refresh_token.clone(), ENV_REFRESH_TOKEN)?;

        let api_domain = overrides
            .api_domain
            .clone()
            .or_else(|| env_var(ENV_API_DOMAIN))
            .unwrap_or_else(|| DEFAULT_API_DOMAIN.to_string());

        let accounts_url = overrides
            .accounts_url
            .clone()
            .or_else(|| env_var(ENV_ACCOUNTS_URL))
            .unwrap_or_else(|| DEFAULT_ACCOUNTS_URL.to_string());

        Ok(Self {
            client_id,
            client_secret: SecretString::from(client_secret),
            refresh_token: SecretString::from(refresh_token),
            api_domain,
            accounts_url,
        })
    }

    /// URL of the token-exchange endpoint on the accounts server.
    pub fn token_url(&self) -> String {
        format!(
            "{}/oauth/v2/token",
            self.accounts_url.trim_end_matches('/')
        )
    }

    /// Exposes the client secret for form encoding. Call sites only.
    pub(crate) fn client_secret_value(&self) -> &str {
        self.client_secret.expose_secret()
    }

    /// Exposes the refresh token for form encoding. Call sites only.
    pub(crate) fn refresh_token_value(&self) -> &str {
        self.refresh_token.expose_secret()
    }
}

/// Reads an environment variable, treating empty values as unset.
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(override_value: Option<String>, env_name: &'static str) -> Result<String, AppError> {
    override_value
        .filter(|v| !v.trim().is_empty())
        .or_else(|| env_var(env_name))
        .ok_or(AppError::MissingCredentials(env_name))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn full_overrides() -> CredentialOverrides {
        CredentialOverrides {
            client_id: Some("1000.ABC".into()),
            client_secret: Some("shh".into()),
            refresh_token: Some("1000.refresh.value".into()),
            api_domain: Some("https://www.zohoapis.eu".into()),
            accounts_url: Some("https://accounts.zoho.eu".into()),
        }
    }

    #[test]
    fn resolve_uses_overrides_over_defaults() {
        let creds = Credentials::resolve(&full_overrides()).unwrap();

        assert_eq!(creds.client_id, "1000.ABC");
        assert_eq!(creds.api_domain, "https://www.zohoapis.eu");
        assert_eq!(creds.accounts_url, "https://accounts.zoho.eu");
    }

    #[test]
    fn resolve_fails_without_required_values() {
        // Required values neither overridden nor (reliably) in the test env:
        // use an override set that blanks them out.
        let overrides = CredentialOverrides {
            client_id: Some("   ".into()),
            ..Default::default()
        };

        // If the surrounding environment happens to define the Zoho vars this
        // test would be meaningless, so skip it in that case.
        if std::env::var(ENV_CLIENT_ID).is_ok() {
            return;
        }

        let result = Credentials::resolve(&overrides);
        assert!(matches!(
            result,
            Err(AppError::MissingCredentials(ENV_CLIENT_ID))
        ));
    }

    #[test]
    fn token_url_handles_trailing_slash() {
        let mut overrides = full_overrides();
        overrides.accounts_url = Some("https://accounts.zoho.com/".into());
        let creds = Credentials::resolve(&overrides).unwrap();

        assert_eq!(
            creds.token_url(),
            "https://accounts.zoho.com/oauth/v2/token"
        );
    }

    #[test]
    fn debug_redacts_secrets() {
        let creds = Credentials::resolve(&full_overrides()).unwrap();
        let debug_output = format!("{:?}", creds);

        assert!(debug_output.contains("1000.ABC"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("shh"));
        assert!(!debug_output.contains("1000.refresh.value"));
    }
}
