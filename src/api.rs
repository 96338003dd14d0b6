// Cluster API module: a small blocking HTTP client for the search
// cluster's administrative endpoints, plus the pure helpers that decide
// which resource a file maps to and how a response status is treated.

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Read-only listing used to check that the cluster answers.
pub const HEALTH_PATH: &str = "/_cat/indices?v&pretty";

/// Errors raised before a status code is available.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        })
    }
}

/// Basic-auth credentials. `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Connection parameters collected once per run. Port is kept as entered;
/// an out-of-range value surfaces as a request failure on the health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterEndpoint {
    pub scheme: Scheme,
    pub host: String,
    pub port: i64,
    pub verify_tls: bool,
    pub credentials: Option<Credentials>,
}

impl ClusterEndpoint {
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Server-side resource a local file is written to or removed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    IndexTemplate,
    IngestPipeline,
    EnrichPolicy,
}

impl ResourceKind {
    /// Any name containing "template" is an index template, everything
    /// else an ingest pipeline.
    pub fn for_upload(name: &str) -> Self {
        if name.contains("template") {
            ResourceKind::IndexTemplate
        } else {
            ResourceKind::IngestPipeline
        }
    }

    /// Names ending in "-policy" are enrich policies.
    pub fn for_delete(name: &str) -> Self {
        if name.ends_with("-policy") {
            ResourceKind::EnrichPolicy
        } else {
            ResourceKind::IngestPipeline
        }
    }

    /// Path below the base URL. The name is used verbatim.
    pub fn path(self, name: &str) -> String {
        match self {
            ResourceKind::IndexTemplate => format!("/_template/{name}"),
            ResourceKind::IngestPipeline => format!("/_ingest/pipeline/{name}"),
            ResourceKind::EnrichPolicy => format!("/_enrich/policy/{name}"),
        }
    }
}

/// How a single response status is handled by the uploader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Retryable,
    Fatal,
}

impl StatusClass {
    pub fn of(status: u16) -> Self {
        match status {
            200 => StatusClass::Success,
            400..=500 => StatusClass::Retryable,
            _ => StatusClass::Fatal,
        }
    }
}

/// One request against the cluster, relative to the base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Vec<u8>>,
    pub timeout: Duration,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>, timeout: Duration) -> Self {
        ApiRequest {
            method,
            path: path.into(),
            body: None,
            timeout,
        }
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

/// Error document returned by the cluster on 4xx/5xx.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Structured {
        #[serde(rename = "type")]
        kind: String,
        reason: String,
    },
    Message(String),
}

impl ApiResponse {
    /// One-line reason extracted from a cluster error document, if the
    /// body is one.
    pub fn error_reason(&self) -> Option<String> {
        let parsed: ErrorBody = serde_json::from_str(&self.body).ok()?;
        Some(match parsed.error {
            ErrorDetail::Structured { kind, reason } => format!("{kind}: {reason}"),
            ErrorDetail::Message(message) => message,
        })
    }

    /// Body formatted for the terminal: pretty JSON when it parses,
    /// otherwise the raw text.
    pub fn display_body(&self) -> String {
        match serde_json::from_str::<serde_json::Value>(&self.body) {
            Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| self.body.clone()),
            Err(_) => self.body.clone(),
        }
    }
}

/// Anything that can carry an [`ApiRequest`] to the cluster.
pub trait ClusterTransport {
    /// `scheme://host:port` the request paths are relative to.
    fn base_url(&self) -> &str;
    fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError>;
}

impl<T: ClusterTransport + ?Sized> ClusterTransport for &T {
    fn base_url(&self) -> &str {
        (**self).base_url()
    }

    fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        (**self).send(request)
    }
}

/// Blocking reqwest client bound to one cluster endpoint.
#[derive(Clone)]
pub struct ClusterClient {
    client: Client,
    base_url: String,
    credentials: Option<Credentials>,
}

impl ClusterClient {
    /// Every request carries `Content-Type: application/json`; certificate
    /// checks are skipped only when the endpoint says so.
    pub fn new(endpoint: &ClusterEndpoint) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(!endpoint.verify_tls)
            .build()
            .map_err(ApiError::Build)?;
        Ok(ClusterClient {
            client,
            base_url: endpoint.base_url(),
            credentials: endpoint.credentials.clone(),
        })
    }
}

impl ClusterTransport for ClusterClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = format!("{}{}", self.base_url, request.path);
        tracing::debug!(method = %request.method, %url, "sending request");

        let mut builder = self
            .client
            .request(request.method, &url)
            .timeout(request.timeout);
        if let Some(creds) = &self.credentials {
            builder = builder.basic_auth(&creds.username, Some(creds.password()));
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let res = builder.send().map_err(|e| ApiError::Transport {
            url: url.clone(),
            source: Box::new(e),
        })?;
        let status = res.status().as_u16();
        let body = res.text().map_err(|e| ApiError::Transport {
            url: url.clone(),
            source: Box::new(e),
        })?;
        tracing::debug!(%url, status, "received response");
        Ok(ApiResponse { status, body })
    }
}
