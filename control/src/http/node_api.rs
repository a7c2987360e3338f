//! Node agent operations
//!
//! [`NodeApi`] is the seam between the engine and the network: the engine
//! only ever talks to a node through it, and [`AgentConnector`] decides how a
//! node record becomes a live client.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::SecretString;

use crate::http::client::{AgentClient, CallOutcome};
use crate::models::deployment::NodeDeployment;
use crate::models::node::Node;

/// Container detail views exposed by the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerAction {
    Inspect,
    Logs,
}

impl ContainerAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ContainerAction::Inspect => "inspect",
            ContainerAction::Logs => "logs",
        }
    }
}

/// Operations a node agent supports
#[async_trait]
pub trait NodeApi: Send + Sync {
    /// Liveness and resource metrics
    async fn health(&self) -> CallOutcome;

    /// All containers on the node
    async fn list_containers(&self) -> CallOutcome;

    async fn container_detail(&self, id: &str, action: ContainerAction) -> CallOutcome;

    async fn create_container(&self, deployment: &NodeDeployment) -> CallOutcome;

    /// Write and apply the deployment's compose file
    async fn setup_compose(&self, deployment: &NodeDeployment) -> CallOutcome;

    async fn compose_logs(&self, deployment: &NodeDeployment) -> CallOutcome;

    /// Register a CI runner with a one-time token
    async fn setup_runner(&self, deployment: &NodeDeployment, token: &SecretString) -> CallOutcome;

    async fn runner_status(&self, deployment: &NodeDeployment) -> CallOutcome;
}

/// Produces a [`NodeApi`] for a node record
pub trait AgentConnector: Send + Sync {
    fn connect(&self, node: &Node) -> Arc<dyn NodeApi>;
}

/// Connector backed by [`AgentClient`], sharing one connection pool
#[derive(Clone)]
pub struct HttpConnector {
    http: Client,
}

impl HttpConnector {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

impl AgentConnector for HttpConnector {
    fn connect(&self, node: &Node) -> Arc<dyn NodeApi> {
        Arc::new(AgentClient::new(self.http.clone(), node))
    }
}
