//! Node models

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::deploy::fsm::NodeStatus;
use crate::errors::ControlError;
use crate::utils::fingerprint;

/// Port used for an `https` agent that does not specify one
pub const DEFAULT_PORT: u16 = 443;

/// Port used for a plain `http` agent that does not specify one
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Default port for the scheme of `api_url`
pub fn scheme_default_port(api_url: &str) -> u16 {
    match url::Url::parse(api_url) {
        Ok(url) if url.scheme() == "http" => DEFAULT_HTTP_PORT,
        _ => DEFAULT_PORT,
    }
}

/// Minimum length of a node's shared secret
pub const MIN_KEY_LEN: usize = 16;

/// Opaque node identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for NodeId {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(NodeId)
            .map_err(|e| ControlError::ValidationError(format!("invalid node id {}: {}", s, e)))
    }
}

/// A managed remote host running the node agent
#[derive(Clone, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub hostname: String,
    pub ip: IpAddr,

    /// Base URL of the node agent API
    pub api_url: String,
    pub port: u16,

    /// Shared secret sent to the agent, never serialized
    #[serde(skip_serializing)]
    pub key: SecretString,

    pub status: NodeStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Re-check the registration rules against a node loaded from elsewhere
    pub fn validate(&self) -> Result<(), ControlError> {
        validate_node_fields(
            &self.hostname,
            &self.ip.to_string(),
            &self.api_url,
            self.port,
            &self.key,
        )
        .map(|_| ())
    }

    /// Short fingerprint of the key, safe to log
    pub fn key_fingerprint(&self) -> String {
        fingerprint(self.key.expose_secret().as_bytes())
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("hostname", &self.hostname)
            .field("ip", &self.ip)
            .field("api_url", &self.api_url)
            .field("port", &self.port)
            .field("key", &format_args!("sha256:{}", self.key_fingerprint()))
            .field("status", &self.status)
            .finish()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.hostname, self.ip)
    }
}

/// Fields for registering a node
#[derive(Debug, Clone, Deserialize)]
pub struct NewNode {
    pub hostname: String,
    pub ip: String,
    pub api_url: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub key: SecretString,
}

impl NewNode {
    /// Validate and build a node in `pending_init`
    pub fn into_node(self) -> Result<Node, ControlError> {
        let port = self.port.unwrap_or_else(|| scheme_default_port(&self.api_url));
        let ip = validate_node_fields(&self.hostname, &self.ip, &self.api_url, port, &self.key)?;

        let now = Utc::now();
        Ok(Node {
            id: NodeId::new(),
            hostname: self.hostname,
            ip,
            api_url: self.api_url,
            port,
            key: self.key,
            status: NodeStatus::PendingInit,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial node update; status is changed only through transitions
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodePatch {
    pub hostname: Option<String>,
    pub ip: Option<String>,
    pub api_url: Option<String>,
    pub port: Option<u16>,
    pub key: Option<SecretString>,
}

impl NodePatch {
    /// Apply to a copy of `node`, validating the result
    pub fn apply_to(self, node: &Node) -> Result<Node, ControlError> {
        let hostname = self.hostname.unwrap_or_else(|| node.hostname.clone());
        let ip = self.ip.unwrap_or_else(|| node.ip.to_string());
        let api_url = self.api_url.unwrap_or_else(|| node.api_url.clone());

        // A defaulted port follows the scheme when only the URL changes
        let port = match self.port {
            Some(port) => port,
            None if node.port == scheme_default_port(&node.api_url) => {
                scheme_default_port(&api_url)
            }
            None => node.port,
        };
        let key = self.key.unwrap_or_else(|| node.key.clone());

        let ip = validate_node_fields(&hostname, &ip, &api_url, port, &key)?;

        Ok(Node {
            hostname,
            ip,
            api_url,
            port,
            key,
            updated_at: Utc::now(),
            ..node.clone()
        })
    }
}

fn validate_node_fields(
    hostname: &str,
    ip: &str,
    api_url: &str,
    port: u16,
    key: &SecretString,
) -> Result<IpAddr, ControlError> {
    let mut problems = Vec::new();

    if hostname.trim().is_empty() {
        problems.push("hostname must not be empty".to_string());
    }

    let parsed_ip = ip.trim().parse::<IpAddr>();
    if parsed_ip.is_err() {
        problems.push(format!("ip {:?} is not an IPv4 or IPv6 address", ip));
    }

    if api_url.trim().is_empty() {
        problems.push("api_url must not be empty".to_string());
    } else {
        match url::Url::parse(api_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => problems.push(format!("api_url scheme {} is not http(s)", url.scheme())),
            Err(e) => problems.push(format!("api_url is not a valid URL: {}", e)),
        }
    }

    if port == 0 {
        problems.push("port must be positive".to_string());
    }

    if key.expose_secret().chars().count() < MIN_KEY_LEN {
        problems.push(format!("key must be at least {} characters", MIN_KEY_LEN));
    }

    match parsed_ip {
        Ok(ip) if problems.is_empty() => Ok(ip),
        _ => Err(ControlError::ValidationError(problems.join("; "))),
    }
}
