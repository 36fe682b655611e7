//! Ceph Manager REST client
//!
//! One [`CephClient`] is configured per process (see [`config`]) and shared
//! read-only by every controller. Operations are issued through an [`Api`]
//! view that binds the client to the caller's cancellation token; each
//! operation carries its own accept version and accepted status set.

pub mod api;
pub mod config;

pub use api::*;
pub use config::{ClientConfig, Credentials, DEFAULT_TIMEOUT};

use crate::error::{Error, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

// =============================================================================
// API Versions
// =============================================================================

/// Versioned media type negotiated through the `Accept` header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApiVersion {
    #[default]
    V1_0,
    V2_0,
}

impl ApiVersion {
    pub fn accept_header(&self) -> &'static str {
        match self {
            ApiVersion::V1_0 => "application/vnd.ceph.api.v1.0+json",
            ApiVersion::V2_0 => "application/vnd.ceph.api.v2.0+json",
        }
    }
}

// =============================================================================
// Accepted Status Sets
// =============================================================================

pub(crate) mod status {
    use reqwest::StatusCode;

    pub const OK: &[StatusCode] = &[StatusCode::OK];
    pub const OK_CREATED: &[StatusCode] = &[StatusCode::OK, StatusCode::CREATED];
    pub const OK_ACCEPTED: &[StatusCode] = &[StatusCode::OK, StatusCode::ACCEPTED];
    pub const OK_OR_NO_CONTENT: &[StatusCode] = &[StatusCode::OK, StatusCode::NO_CONTENT];
    pub const CREATED_ACCEPTED: &[StatusCode] = &[StatusCode::CREATED, StatusCode::ACCEPTED];
    pub const ACCEPTED_NO_CONTENT: &[StatusCode] = &[StatusCode::ACCEPTED, StatusCode::NO_CONTENT];
    pub const ANY_SUCCESS: &[StatusCode] = &[StatusCode::OK, StatusCode::CREATED, StatusCode::ACCEPTED];
    pub const AUTH_CHECK: &[StatusCode] = &[
        StatusCode::OK,
        StatusCode::CREATED,
        StatusCode::ACCEPTED,
        StatusCode::UNAUTHORIZED,
    ];
    pub const OK_ACCEPTED_NO_CONTENT: &[StatusCode] =
        &[StatusCode::OK, StatusCode::ACCEPTED, StatusCode::NO_CONTENT];
}

// =============================================================================
// Requests
// =============================================================================

/// A single Manager API call
#[derive(Debug, Clone)]
pub(crate) struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(&'static str, String)>,
    body: Option<serde_json::Value>,
    version: ApiVersion,
    accepted: &'static [StatusCode],
    operation: String,
}

impl ApiRequest {
    /// `path` is relative to `/api/`; `operation` is the "unable to …"
    /// message every error from this call is prefixed with
    pub(crate) fn new(method: Method, path: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            version: ApiVersion::V1_0,
            accepted: status::OK,
            operation: operation.into(),
        }
    }

    pub(crate) fn get(path: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::new(Method::GET, path, operation)
    }

    pub(crate) fn post(path: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::new(Method::POST, path, operation)
    }

    pub(crate) fn put(path: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::new(Method::PUT, path, operation)
    }

    pub(crate) fn delete(path: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path, operation)
    }

    pub(crate) fn query(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.query.push((key, value.into()));
        self
    }

    pub(crate) fn query_opt(self, key: &'static str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.query(key, v),
            None => self,
        }
    }

    pub(crate) fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub(crate) fn version(mut self, version: ApiVersion) -> Self {
        self.version = version;
        self
    }

    pub(crate) fn accept(mut self, accepted: &'static [StatusCode]) -> Self {
        self.accepted = accepted;
        self
    }
}

/// Path segment escaping for identifiers such as `client.foo` or `tenant$user`
pub(crate) fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Raw response of an accepted call
#[derive(Debug, Clone)]
pub(crate) struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

// =============================================================================
// Client
// =============================================================================

/// Authenticated client for the Ceph Manager REST API
///
/// Immutable after construction; clone it or share it behind an `Arc`.
#[derive(Clone)]
pub struct CephClient {
    http: reqwest::Client,
    endpoint: String,
    token: String,
}

impl fmt::Debug for CephClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CephClient")
            .field("endpoint", &self.endpoint)
            .field("token", &"(sensitive)")
            .finish()
    }
}

impl CephClient {
    /// Build a client for an already selected endpoint and token
    ///
    /// No probing or token validation happens here; use
    /// [`CephClient::connect`] for the full configure sequence.
    pub fn from_parts(endpoint: &str, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = build_http(timeout, false)?;
        Ok(Self::with_http(http, endpoint, token.into()))
    }

    pub(crate) fn with_http(http: reqwest::Client, endpoint: &str, token: String) -> Self {
        Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Selected endpoint, without the `/api` suffix
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Bind the client to an operation's cancellation token
    pub fn bind<'a>(&'a self, cancel: &'a CancellationToken) -> Api<'a> {
        Api {
            client: self,
            cancel,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.endpoint, path.trim_start_matches('/'))
    }
}

pub(crate) fn build_http(timeout: Duration, insecure_skip_verify: bool) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(insecure_skip_verify)
        .build()
        .map_err(|e| Error::Configuration(format!("unable to build HTTP client: {}", e)))
}

// =============================================================================
// Bound API View
// =============================================================================

/// The client bound to one operation's cancellation token
#[derive(Clone, Copy)]
pub struct Api<'a> {
    client: &'a CephClient,
    cancel: &'a CancellationToken,
}

impl<'a> Api<'a> {
    pub fn client(&self) -> &'a CephClient {
        self.client
    }

    /// Issue a request and check its status against the accepted set
    pub(crate) async fn send(&self, req: ApiRequest) -> Result<ApiResponse> {
        let url = self.client.url(&req.path);
        debug!("{} {} ({})", req.method, url, req.version.accept_header());

        let mut builder = self
            .client
            .http
            .request(req.method.clone(), &url)
            .header(ACCEPT, req.version.accept_header())
            .header(CONTENT_TYPE, "application/json");
        if !self.client.token.is_empty() {
            builder = builder.bearer_auth(&self.client.token);
        }
        if !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let exchange = async {
            let response = builder.send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let (status, body) = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return Err(Error::Cancelled { operation: req.operation });
            }
            result = exchange => result.map_err(|source| Error::Transport {
                operation: req.operation.clone(),
                source,
            })?,
        };

        if !req.accepted.contains(&status) {
            debug!("{} {} rejected with status {}", req.method, url, status);
            return Err(Error::Api {
                operation: req.operation,
                status: status.as_u16(),
                body,
            });
        }
        Ok(ApiResponse { status, body })
    }

    /// Issue a request and decode its JSON body
    pub(crate) async fn fetch<T: DeserializeOwned>(&self, req: ApiRequest) -> Result<T> {
        let operation = req.operation.clone();
        let response = self.send(req).await?;
        decode(&operation, &response.body)
    }

    /// Issue a request whose body is not needed
    pub(crate) async fn execute(&self, req: ApiRequest) -> Result<StatusCode> {
        Ok(self.send(req).await?.status)
    }
}

pub(crate) fn decode<T: DeserializeOwned>(operation: &str, body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|source| Error::Decode {
        operation: operation.to_string(),
        source,
    })
}
