//! Provider shell
//!
//! Validates the provider block, builds the REST client exactly once and
//! hands the shared client to every controller.

use crate::client::{CephClient, ClientConfig, Credentials, DEFAULT_TIMEOUT};
use crate::controllers::{
    AuthController, ClusterConfigController, CrushRuleController, ErasureCodeProfileController,
    MgrModuleConfigController, MgrModuleController, PoolController, RgwBucketController,
    RgwS3KeyController, RgwUserController,
};
use crate::error::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

// =============================================================================
// Provider Configuration
// =============================================================================

/// Provider block of a manifest
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Single Manager endpoint, e.g. `https://mgr-0:8443`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Candidate endpoints probed in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub insecure_skip_verify: bool,
    /// Per-request timeout; defaults to 10 seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let masked = |v: &Option<String>| v.as_ref().map(|_| "(sensitive)");
        f.debug_struct("ProviderConfig")
            .field("endpoint", &self.endpoint)
            .field("endpoints", &self.endpoints)
            .field("token", &masked(&self.token))
            .field("username", &self.username)
            .field("password", &masked(&self.password))
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ProviderConfig {
    /// Check the provider block and turn it into a client configuration
    pub fn validate(&self) -> Result<ClientConfig> {
        let endpoints = match (&self.endpoint, self.endpoints.is_empty()) {
            (Some(endpoint), true) => vec![endpoint.clone()],
            (None, false) => self.endpoints.clone(),
            (Some(_), false) => {
                return Err(Error::Configuration(
                    "only one of endpoint or endpoints may be set".into(),
                ))
            }
            (None, true) => {
                return Err(Error::Configuration(
                    "one of endpoint or endpoints must be set".into(),
                ))
            }
        };

        for endpoint in &endpoints {
            let trimmed = endpoint.trim_end_matches('/');
            if trimmed.is_empty() {
                return Err(Error::Configuration("endpoint must not be empty".into()));
            }
            if trimmed.ends_with("/api") {
                return Err(Error::Configuration(format!(
                    "endpoint {} must not end with /api; the client adds the API prefix itself",
                    endpoint
                )));
            }
        }

        let credentials = match (&self.token, &self.username, &self.password) {
            (Some(token), None, None) => Credentials::Token(token.clone()),
            (None, Some(username), Some(password)) => Credentials::Password {
                username: username.clone(),
                password: password.clone(),
            },
            (Some(_), _, _) => {
                return Err(Error::Configuration(
                    "token cannot be combined with username and password".into(),
                ))
            }
            (None, Some(_), None) | (None, None, Some(_)) => {
                return Err(Error::Configuration(
                    "username and password must be set together".into(),
                ))
            }
            (None, None, None) => {
                return Err(Error::Configuration(
                    "one of token or username and password must be set".into(),
                ))
            }
        };

        let mut config = ClientConfig::new(endpoints, credentials);
        config.timeout = self
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);
        config.insecure_skip_verify = self.insecure_skip_verify;
        Ok(config)
    }
}

// =============================================================================
// Provider
// =============================================================================

/// Configured provider: one authenticated client shared by all controllers
#[derive(Debug, Clone)]
pub struct Provider {
    client: Arc<CephClient>,
}

impl Provider {
    /// Validate the configuration, probe endpoints and authenticate
    pub async fn configure(config: &ProviderConfig, cancel: &CancellationToken) -> Result<Self> {
        let client_config = config.validate()?;
        info!(
            "Configuring provider with {} candidate endpoint(s)",
            client_config.endpoints.len()
        );
        let client = CephClient::connect(&client_config, cancel).await?;
        Ok(Self::from_client(Arc::new(client)))
    }

    /// Wrap an already established client
    pub fn from_client(client: Arc<CephClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<CephClient> {
        &self.client
    }

    pub fn auth(&self) -> AuthController {
        AuthController::new(self.client.clone())
    }

    pub fn cluster_config(&self) -> ClusterConfigController {
        ClusterConfigController::new(self.client.clone())
    }

    pub fn mgr_module(&self) -> MgrModuleController {
        MgrModuleController::new(self.client.clone())
    }

    pub fn mgr_module_config(&self) -> MgrModuleConfigController {
        MgrModuleConfigController::new(self.client.clone())
    }

    pub fn rgw_user(&self) -> RgwUserController {
        RgwUserController::new(self.client.clone())
    }

    pub fn rgw_s3_key(&self) -> RgwS3KeyController {
        RgwS3KeyController::new(self.client.clone())
    }

    pub fn pool(&self) -> PoolController {
        PoolController::new(self.client.clone())
    }

    pub fn crush_rule(&self) -> CrushRuleController {
        CrushRuleController::new(self.client.clone())
    }

    pub fn erasure_code_profile(&self) -> ErasureCodeProfileController {
        ErasureCodeProfileController::new(self.client.clone())
    }

    pub fn rgw_bucket(&self) -> RgwBucketController {
        RgwBucketController::new(self.client.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use httptest::matchers::request;
    use httptest::responders::{json_encoded, status_code};
    use httptest::{Expectation, Server};
    use serde_json::json;

    fn token_config(endpoint: &str) -> ProviderConfig {
        ProviderConfig {
            endpoint: Some(endpoint.into()),
            token: Some("secret-token".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_endpoint_rules() {
        let both = ProviderConfig {
            endpoints: vec!["https://b:8443".into()],
            ..token_config("https://a:8443")
        };
        assert_matches!(both.validate(), Err(Error::Configuration(_)));

        let neither = ProviderConfig {
            endpoint: None,
            ..token_config("")
        };
        assert_matches!(neither.validate(), Err(Error::Configuration(_)));

        let err = token_config("https://mgr:8443/api/").validate().unwrap_err();
        assert!(err.to_string().contains("must not end with /api"));

        let config = ProviderConfig {
            endpoint: None,
            endpoints: vec!["https://a:8443".into(), "https://b:8443".into()],
            ..token_config("")
        }
        .validate()
        .unwrap();
        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_credential_rules() {
        let mixed = ProviderConfig {
            username: Some("admin".into()),
            password: Some("pw".into()),
            ..token_config("https://a:8443")
        };
        assert_matches!(mixed.validate(), Err(Error::Configuration(_)));

        let half = ProviderConfig {
            endpoint: Some("https://a:8443".into()),
            username: Some("admin".into()),
            ..Default::default()
        };
        assert_matches!(half.validate(), Err(Error::Configuration(_)));

        let none = ProviderConfig {
            endpoint: Some("https://a:8443".into()),
            ..Default::default()
        };
        assert_matches!(none.validate(), Err(Error::Configuration(_)));

        let password = ProviderConfig {
            endpoint: Some("https://a:8443".into()),
            username: Some("admin".into()),
            password: Some("pw".into()),
            timeout_secs: Some(3),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_matches!(password.credentials, Credentials::Password { .. });
        assert_eq!(password.timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_debug_masks_secrets() {
        let rendered = format!("{:?}", token_config("https://a:8443"));
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("(sensitive)"));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result: std::result::Result<ProviderConfig, _> =
            serde_yaml::from_str("endpoint: https://a:8443\ntoken: t\nretries: 3\n");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_configure_shares_one_client() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/")).respond_with(status_code(200)),
        );
        server.expect(
            Expectation::matching(request::method_path("POST", "/api/auth/check"))
                .respond_with(json_encoded(json!({"username": "admin"}))),
        );

        let provider = Provider::configure(&token_config(&server.url_str("/")), &CancellationToken::new())
            .await
            .unwrap();
        let clone = provider.clone();
        assert!(Arc::ptr_eq(provider.client(), clone.client()));
    }
}
