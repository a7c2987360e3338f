//! Node agent HTTP client
//!
//! One [`AgentClient`] is bound to one node. Every call performs a single
//! request and reports a [`CallOutcome`]; transport errors never escape as
//! `Err` so callers can always reconcile a status from the result.

use std::time::Duration;

use ::http::{header, HeaderValue};
use agent_api::{paths, ComposeRequest, CreateContainerRequest, RunnerRequest, API_KEY_HEADER};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::errors::ControlError;
use crate::http::node_api::{ContainerAction, NodeApi};
use crate::models::deployment::NodeDeployment;
use crate::models::node::Node;

/// Result of one call against a node agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CallOutcome {
    /// The agent answered, with any status code
    Success { status_code: u16, body: String },

    /// The request never produced a response
    TransportFailure { cause: String },
}

impl CallOutcome {
    /// Only an exact 200 counts as success
    pub fn is_ok(&self) -> bool {
        matches!(self, CallOutcome::Success { status_code: 200, .. })
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            CallOutcome::Success { status_code, .. } => Some(*status_code),
            CallOutcome::TransportFailure { .. } => None,
        }
    }

    pub fn body(&self) -> Option<&str> {
        match self {
            CallOutcome::Success { body, .. } => Some(body),
            CallOutcome::TransportFailure { .. } => None,
        }
    }

    /// One-line summary for logs
    pub fn describe(&self) -> String {
        match self {
            CallOutcome::Success { status_code, body } => format!("{}: {}", status_code, body),
            CallOutcome::TransportFailure { cause } => format!("transport failure: {}", cause),
        }
    }
}

/// Agent client options
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Per-request timeout
    pub timeout: Duration,

    /// Skip TLS verification. Honoured only in debug builds with the
    /// `insecure-tls` feature.
    pub accept_invalid_certs: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            accept_invalid_certs: false,
        }
    }
}

/// Build the pooled reqwest client shared by all agent clients
pub fn build_http_client(options: &ClientOptions) -> Result<Client, ControlError> {
    let builder = Client::builder()
        .timeout(options.timeout)
        .connect_timeout(options.timeout);

    let client = tls_verification(builder, options.accept_invalid_certs).build()?;
    Ok(client)
}

#[cfg(feature = "insecure-tls")]
fn tls_verification(builder: ClientBuilder, accept_invalid_certs: bool) -> ClientBuilder {
    if accept_invalid_certs && cfg!(debug_assertions) {
        warn!("TLS certificate verification is DISABLED for node agents");
        builder.danger_accept_invalid_certs(true)
    } else {
        if accept_invalid_certs {
            warn!("accept_invalid_certs ignored in release builds");
        }
        builder
    }
}

#[cfg(not(feature = "insecure-tls"))]
fn tls_verification(builder: ClientBuilder, accept_invalid_certs: bool) -> ClientBuilder {
    if accept_invalid_certs {
        warn!("accept_invalid_certs ignored: built without the insecure-tls feature");
    }
    builder
}

/// HTTP client bound to one node agent
pub struct AgentClient {
    http: Client,
    api_url: String,
    port: u16,
    key: SecretString,
}

impl AgentClient {
    /// Bind a client to `node`. Never fails; a bad URL surfaces on each call.
    pub fn new(http: Client, node: &Node) -> Self {
        Self {
            http,
            api_url: node.api_url.clone(),
            port: node.port,
            key: node.key.clone(),
        }
    }

    /// Get the base URL
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Resolve `{api_url}/{path}/{segments..}`; each segment is appended
    /// percent-encoded. The node port applies when the URL has none.
    pub fn endpoint(
        &self,
        path: &str,
        segments: &[&str],
        query: Option<(&str, &str)>,
    ) -> Result<Url, String> {
        let mut url = Url::parse(self.api_url.trim())
            .map_err(|e| format!("invalid api_url {}: {}", self.api_url, e))?;

        url.path_segments_mut()
            .map_err(|_| format!("api_url {} cannot be a base", self.api_url))?
            .pop_if_empty()
            .extend(path.split('/'))
            .extend(segments);

        if url.port().is_none() {
            url.set_port(Some(self.port))
                .map_err(|_| format!("api_url {} cannot carry a port", self.api_url))?;
        }

        if let Some((name, value)) = query {
            url.query_pairs_mut().append_pair(name, value);
        }

        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, String> {
        let mut key = HeaderValue::from_str(self.key.expose_secret())
            .map_err(|_| "node key is not a valid header value".to_string())?;
        key.set_sensitive(true);

        Ok(request
            .header(header::CONTENT_TYPE, "application/json")
            .header(API_KEY_HEADER, key))
    }

    /// Make a GET request
    pub async fn get(&self, path: &str, query: Option<(&str, &str)>) -> CallOutcome {
        self.get_segments(path, &[], query).await
    }

    async fn get_segments(
        &self,
        path: &str,
        segments: &[&str],
        query: Option<(&str, &str)>,
    ) -> CallOutcome {
        let url = match self.endpoint(path, segments, query) {
            Ok(url) => url,
            Err(cause) => return CallOutcome::TransportFailure { cause },
        };
        debug!("GET {}", url);

        match self.authorize(self.http.get(url)) {
            Ok(request) => send(request).await,
            Err(cause) => CallOutcome::TransportFailure { cause },
        }
    }

    /// Make a POST request with a JSON body
    pub async fn post<B: Serialize>(&self, path: &str, body: &B) -> CallOutcome {
        let url = match self.endpoint(path, &[], None) {
            Ok(url) => url,
            Err(cause) => return CallOutcome::TransportFailure { cause },
        };
        debug!("POST {}", url);

        let payload = match serde_json::to_vec(body) {
            Ok(payload) => payload,
            Err(e) => {
                return CallOutcome::TransportFailure {
                    cause: format!("cannot encode request body: {}", e),
                }
            }
        };

        match self.authorize(self.http.post(url).body(payload)) {
            Ok(request) => send(request).await,
            Err(cause) => CallOutcome::TransportFailure { cause },
        }
    }
}

async fn send(request: RequestBuilder) -> CallOutcome {
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            warn!("Node agent request failed: {}", e);
            return CallOutcome::TransportFailure {
                cause: e.to_string(),
            };
        }
    };

    let status_code = response.status().as_u16();
    match response.text().await {
        Ok(body) => {
            if status_code != 200 {
                warn!("Node agent answered {}: {}", status_code, body);
            }
            CallOutcome::Success { status_code, body }
        }
        Err(e) => {
            warn!("Failed to read node agent response: {}", e);
            CallOutcome::TransportFailure {
                cause: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl NodeApi for AgentClient {
    async fn health(&self) -> CallOutcome {
        self.get(paths::HEALTH, None).await
    }

    async fn list_containers(&self) -> CallOutcome {
        self.get(paths::CONTAINERS_LIST, None).await
    }

    async fn container_detail(&self, id: &str, action: ContainerAction) -> CallOutcome {
        self.get_segments(paths::CONTAINER, &[id, action.as_str()], None)
            .await
    }

    async fn create_container(&self, deployment: &NodeDeployment) -> CallOutcome {
        let body = CreateContainerRequest {
            name: deployment.name.clone(),
            path: deployment.path.clone(),
            git_url: deployment.git_url.clone(),
        };
        self.post(paths::CONTAINERS_CREATE, &body).await
    }

    async fn setup_compose(&self, deployment: &NodeDeployment) -> CallOutcome {
        let body = ComposeRequest {
            path: deployment.path.clone(),
            compose: deployment.compose.clone().unwrap_or_default(),
        };
        self.post(paths::COMPOSE, &body).await
    }

    async fn compose_logs(&self, deployment: &NodeDeployment) -> CallOutcome {
        self.get(paths::COMPOSE_STATUS, Some(("path", deployment.path.as_str())))
            .await
    }

    async fn setup_runner(&self, deployment: &NodeDeployment, token: &SecretString) -> CallOutcome {
        let body = RunnerRequest {
            token: token.expose_secret().to_string(),
            path: deployment.path.clone(),
            git_url: deployment.git_url.clone(),
        };
        self.post(paths::RUNNER, &body).await
    }

    async fn runner_status(&self, deployment: &NodeDeployment) -> CallOutcome {
        self.get(paths::RUNNER_STATUS, Some(("path", deployment.path.as_str())))
            .await
    }
}
