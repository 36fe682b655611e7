//! Client configuration: endpoint probing and session establishment
//!
//! Runs once per process. Candidates are probed in order with a plain GET;
//! the first one that answers with anything other than 503 is selected.
//! A supplied token is validated through `auth/check`; otherwise a token is
//! obtained by logging in with username and password. The session is never
//! refreshed.

use super::{build_http, status, ApiRequest, CephClient};
use crate::error::{Error, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Documented per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Configuration
// =============================================================================

/// How the client authenticates
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Pre-issued bearer token, validated before use
    Token(String),
    /// Dashboard user; a token is obtained at configure time
    Password { username: String, password: String },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Token(_) => f.write_str("Token(..)"),
            Credentials::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .finish_non_exhaustive(),
        }
    }
}

/// Validated client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Candidate endpoints in preference order, without the `/api` suffix
    pub endpoints: Vec<String>,
    pub credentials: Credentials,
    /// Per-request timeout
    pub timeout: Duration,
    /// Skip TLS certificate verification
    pub insecure_skip_verify: bool,
}

impl ClientConfig {
    pub fn new(endpoints: Vec<String>, credentials: Credentials) -> Self {
        Self {
            endpoints,
            credentials,
            timeout: DEFAULT_TIMEOUT,
            insecure_skip_verify: false,
        }
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

// =============================================================================
// Connect
// =============================================================================

impl CephClient {
    /// Probe endpoints and establish an authenticated session
    pub async fn connect(config: &ClientConfig, cancel: &CancellationToken) -> Result<Self> {
        let http = build_http(config.timeout, config.insecure_skip_verify)?;

        let endpoint = probe_endpoints(&http, &config.endpoints, cancel).await?;
        info!("Selected Ceph Manager endpoint: {}", endpoint);

        let bootstrap = CephClient::with_http(http.clone(), &endpoint, String::new());
        let token = match &config.credentials {
            Credentials::Token(token) => {
                validate_token(&bootstrap, token, cancel).await?;
                token.clone()
            }
            Credentials::Password { username, password } => {
                login(&bootstrap, username, password, cancel).await?
            }
        };

        Ok(CephClient::with_http(http, &endpoint, token))
    }
}

async fn probe_endpoints(
    http: &reqwest::Client,
    candidates: &[String],
    cancel: &CancellationToken,
) -> Result<String> {
    for candidate in candidates {
        debug!("Probing endpoint: {}", candidate);
        let probe = http.get(candidate.as_str()).send();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(Error::Cancelled { operation: "unable to probe endpoints".into() });
            }
            result = probe => result,
        };

        match result {
            Ok(response) if response.status() == StatusCode::SERVICE_UNAVAILABLE => {
                warn!("Endpoint {} is unavailable (503), trying next", candidate);
            }
            Ok(_) => return Ok(candidate.clone()),
            Err(e) => {
                warn!("Endpoint {} could not be reached: {}", candidate, e);
            }
        }
    }

    Err(Error::Configuration("no available endpoints".into()))
}

async fn validate_token(client: &CephClient, token: &str, cancel: &CancellationToken) -> Result<()> {
    let req = ApiRequest::post("auth/check", "unable to validate token")
        .query("token", token)
        .json(&serde_json::json!({}))?
        .accept(status::AUTH_CHECK);

    let response = client.bind(cancel).send(req).await?;
    if response.status == StatusCode::UNAUTHORIZED {
        return Err(Error::Authentication("token is invalid or expired".into()));
    }
    debug!("Token accepted by {}", client.endpoint());
    Ok(())
}

async fn login(
    client: &CephClient,
    username: &str,
    password: &str,
    cancel: &CancellationToken,
) -> Result<String> {
    let req = ApiRequest::post("auth", "unable to authenticate")
        .json(&LoginRequest { username, password })?
        .accept(status::OK_CREATED);

    let response: LoginResponse = match client.bind(cancel).fetch(req).await {
        Ok(response) => response,
        Err(Error::Api { status, body, .. }) => {
            return Err(Error::Authentication(format!(
                "login as {} rejected with status {}: {}",
                username, status, body
            )))
        }
        Err(e) => return Err(e),
    };
    info!("Authenticated to Ceph Manager as {}", username);
    Ok(response.token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use httptest::matchers::{all_of, contains, eq, json_decoded, request, url_decoded};
    use httptest::responders::{json_encoded, status_code};
    use httptest::{Expectation, Server};
    use serde_json::json;

    fn password(username: &str, password: &str) -> Credentials {
        Credentials::Password {
            username: username.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn test_skips_unavailable_endpoint_and_logs_in() {
        let down = Server::run();
        down.expect(
            Expectation::matching(request::method_path("GET", "/")).respond_with(status_code(503)),
        );

        let up = Server::run();
        up.expect(
            Expectation::matching(request::method_path("GET", "/")).respond_with(status_code(200)),
        );
        up.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/api/auth"),
                request::headers(contains(("accept", "application/vnd.ceph.api.v1.0+json"))),
                request::body(json_decoded(eq(json!({"username": "admin", "password": "secret"})))),
            ])
            .respond_with(json_encoded(json!({"token": "abc", "username": "admin"}))),
        );

        let config = ClientConfig::new(
            vec![down.url_str("/"), up.url_str("/")],
            password("admin", "secret"),
        );
        let client = CephClient::connect(&config, &CancellationToken::new()).await.unwrap();

        assert_eq!(client.endpoint(), up.url_str(""));
        assert_eq!(client.token, "abc");
    }

    #[tokio::test]
    async fn test_no_available_endpoints() {
        let down = Server::run();
        down.expect(
            Expectation::matching(request::method_path("GET", "/")).respond_with(status_code(503)),
        );

        // nothing listens on port 9 of the loopback address
        let config = ClientConfig::new(
            vec!["http://127.0.0.1:9".into(), down.url_str("/")],
            Credentials::Token("t".into()),
        );
        let err = CephClient::connect(&config, &CancellationToken::new()).await.unwrap_err();
        assert_matches!(&err, Error::Configuration(msg) if msg == "no available endpoints");
    }

    #[tokio::test]
    async fn test_token_is_validated() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/")).respond_with(status_code(404)),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/api/auth/check"),
                request::query(url_decoded(contains(("token", "good")))),
                request::body(json_decoded(eq(json!({})))),
            ])
            .respond_with(json_encoded(json!({"username": "admin"}))),
        );

        let config = ClientConfig::new(vec![server.url_str("")], Credentials::Token("good".into()));
        let client = CephClient::connect(&config, &CancellationToken::new()).await.unwrap();
        assert_eq!(client.token, "good");
    }

    #[tokio::test]
    async fn test_expired_token_is_authentication_error() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/")).respond_with(status_code(200)),
        );
        server.expect(
            Expectation::matching(request::method_path("POST", "/api/auth/check"))
                .respond_with(status_code(401)),
        );

        let config = ClientConfig::new(vec![server.url_str("")], Credentials::Token("old".into()));
        let err = CephClient::connect(&config, &CancellationToken::new()).await.unwrap_err();
        assert_matches!(err, Error::Authentication(_));
    }

    #[tokio::test]
    async fn test_rejected_login() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/")).respond_with(status_code(200)),
        );
        server.expect(
            Expectation::matching(request::method_path("POST", "/api/auth"))
                .respond_with(status_code(400).body("invalid credentials")),
        );

        let config = ClientConfig::new(vec![server.url_str("")], password("admin", "wrong"));
        let err = CephClient::connect(&config, &CancellationToken::new()).await.unwrap_err();
        assert_matches!(&err, Error::Authentication(msg) if msg.contains("invalid credentials"));
    }

    #[test]
    fn test_credentials_debug_hides_secrets() {
        let rendered = format!("{:?}", password("admin", "hunter2"));
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
        assert_eq!(format!("{:?}", Credentials::Token("abc".into())), "Token(..)");
    }
}
