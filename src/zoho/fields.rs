//! Field metadata lookup for the Leads module.
//!
//! Used for the operator-facing field listing, so someone can confirm the
//! org actually calls its status field `Lead_Status` before running updates.

use serde::Deserialize;
use tracing::info;

use crate::error::AppError;
use crate::zoho::client::ZohoClient;
use crate::zoho::{API_VERSION, MODULE_API_NAME};

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// One field of the Leads module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// API name used in request payloads, e.g. `Lead_Status`.
    pub api_name: String,
    /// Human-readable label shown in the Zoho UI.
    pub display_label: String,
}

#[derive(Debug, Deserialize)]
struct WireField {
    #[serde(default)]
    api_name: String,
    #[serde(default)]
    field_label: String,
}

#[derive(Debug, Deserialize)]
struct WireFieldsResponse {
    #[serde(default)]
    fields: Vec<WireField>,
}

// ─────────────────────────────────────────────────────────────────────────────
// FieldMetadataFetcher
// ─────────────────────────────────────────────────────────────────────────────

/// Fetches the field metadata of the Leads module.
pub struct FieldMetadataFetcher {
    client: ZohoClient,
}

impl FieldMetadataFetcher {
    pub fn new(client: ZohoClient) -> Self {
        Self { client }
    }

    /// Lists all fields of the Leads module in API order.
    ///
    /// # Errors
    ///
    /// Auth errors from the token exchange, `AppError::ZohoError` for an
    /// API-level rejection, `AppError::ConnectionFailed` for network errors.
    pub async fn list_fields(&self) -> Result<Vec<FieldDescriptor>, AppError> {
        let mut url = self
            .client
            .build_url(&format!("/crm/{}/settings/fields", API_VERSION))?;
        url.query_pairs_mut().append_pair("module", MODULE_API_NAME);

        let response = self.client.get(url).await?;
        let status = response.status();

        if !status.is_success() {
            return Err(super::client::parse_error_response(response, status).await);
        }

        let wire: WireFieldsResponse = response.json().await.map_err(|e| {
            AppError::Internal(format!("failed to parse field metadata: {}", e))
        })?;

        let fields: Vec<FieldDescriptor> = wire
            .fields
            .into_iter()
            .map(|f| FieldDescriptor {
                api_name: f.api_name,
                display_label: f.field_label,
            })
            .collect();

        info!("[ZOHO] Fetched {} fields for {}", fields.len(), MODULE_API_NAME);

        Ok(fields)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod wiremock_tests {
    use super::*;
    use crate::config::Credentials;
    use secrecy::SecretString;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher_for(server: &MockServer) -> FieldMetadataFetcher {
        let creds = Credentials {
            client_id: "cid".to_string(),
            client_secret: SecretString::from("secret".to_string()),
            refresh_token: SecretString::from("refresh".to_string()),
            api_domain: server.uri(),
            accounts_url: server.uri(),
        };
        FieldMetadataFetcher::new(ZohoClient::new(creds).unwrap())
    }

    async fn mount_token(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/oauth/v2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok",
                "expires_in": 3600
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn lists_fields_with_labels() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        Mock::given(method("GET"))
            .and(path("/crm/v8/settings/fields"))
            .and(query_param("module", "Leads"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "fields": [
                    { "api_name": "Last_Name", "field_label": "Last Name" },
                    { "api_name": "Lead_Status", "field_label": "Lead Status" }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server);
        let fields = fetcher.list_fields().await.unwrap();

        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1].api_name, "Lead_Status");
        assert_eq!(fields[1].display_label, "Lead Status");
    }

    #[tokio::test]
    async fn api_rejection_maps_to_zoho_error() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        Mock::given(method("GET"))
            .and(path("/crm/v8/settings/fields"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "code": "INVALID_MODULE",
                "details": {},
                "message": "the module name given seems to be invalid",
                "status": "error"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server);
        let result = fetcher.list_fields().await;

        match result {
            Err(AppError::ZohoError(msg)) => assert!(msg.contains("INVALID_MODULE")),
            other => panic!("expected ZohoError, got {:?}", other),
        }
    }
}
