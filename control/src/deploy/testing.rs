//! Scripted node agent for unit tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use secrecy::SecretString;

use crate::http::client::CallOutcome;
use crate::http::node_api::{AgentConnector, ContainerAction, NodeApi};
use crate::models::deployment::{DeploymentType, NewDeployment, NodeDeployment};
use crate::models::node::{NewNode, Node, NodeId};
use crate::storage::records::RecordStore;

pub fn ok(body: &str) -> CallOutcome {
    CallOutcome::Success {
        status_code: 200,
        body: body.to_string(),
    }
}

pub fn unreachable() -> CallOutcome {
    CallOutcome::TransportFailure {
        cause: "connection refused".to_string(),
    }
}

/// Answers every call with `reply`, except health which follows a script
pub struct ScriptedAgent {
    calls: Mutex<Vec<String>>,
    health: Mutex<VecDeque<CallOutcome>>,
    health_fallback: CallOutcome,
    reply: CallOutcome,
}

impl ScriptedAgent {
    pub fn new(reply: CallOutcome) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            health: Mutex::new(VecDeque::new()),
            health_fallback: ok("{}"),
            reply,
        }
    }

    /// Health answers in order, then `fallback` forever
    pub fn with_health(mut self, script: Vec<CallOutcome>, fallback: CallOutcome) -> Self {
        self.health = Mutex::new(script.into());
        self.health_fallback = fallback;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == op).count()
    }

    fn record(&self, op: &str) -> CallOutcome {
        self.calls.lock().unwrap().push(op.to_string());
        self.reply.clone()
    }
}

#[async_trait]
impl NodeApi for ScriptedAgent {
    async fn health(&self) -> CallOutcome {
        self.calls.lock().unwrap().push("health".to_string());
        self.health
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.health_fallback.clone())
    }

    async fn list_containers(&self) -> CallOutcome {
        self.record("list_containers")
    }

    async fn container_detail(&self, id: &str, action: ContainerAction) -> CallOutcome {
        self.record(&format!("container_{}:{}", action.as_str(), id))
    }

    async fn create_container(&self, _deployment: &NodeDeployment) -> CallOutcome {
        self.record("create_container")
    }

    async fn setup_compose(&self, _deployment: &NodeDeployment) -> CallOutcome {
        self.record("setup_compose")
    }

    async fn compose_logs(&self, _deployment: &NodeDeployment) -> CallOutcome {
        self.record("compose_logs")
    }

    async fn setup_runner(&self, _deployment: &NodeDeployment, _token: &SecretString) -> CallOutcome {
        self.record("setup_runner")
    }

    async fn runner_status(&self, _deployment: &NodeDeployment) -> CallOutcome {
        self.record("runner_status")
    }
}

/// A valid deployment of `kind` on a fresh node id
pub fn deployment(kind: DeploymentType) -> NodeDeployment {
    NewDeployment {
        node_id: NodeId::new(),
        name: "web".to_string(),
        path: None,
        git_url: match kind {
            DeploymentType::GithubActionRunner => Some("https://github.com/acme/web".to_string()),
            _ => None,
        },
        deployment_type: kind,
        compose: match kind {
            DeploymentType::SimpleDockerCompose => {
                Some("services:\n  web:\n    image: nginx\n".to_string())
            }
            _ => None,
        },
    }
    .into_deployment()
    .unwrap()
}

/// Connector that hands out the same scripted agent for every node
pub struct FixedConnector(pub Arc<ScriptedAgent>);

impl AgentConnector for FixedConnector {
    fn connect(&self, _node: &Node) -> Arc<dyn NodeApi> {
        self.0.clone()
    }
}

/// Store a node and one deployment of `kind` on it
pub async fn seed(store: &dyn RecordStore, kind: DeploymentType) -> (Node, NodeDeployment) {
    let node = store
        .create_node(NewNode {
            hostname: "edge-01".to_string(),
            ip: "10.0.0.12".to_string(),
            api_url: "https://10.0.0.12".to_string(),
            port: None,
            key: SecretString::from("0123456789abcdef".to_string()),
        })
        .await
        .unwrap();

    let template = deployment(kind);
    let deployment = store
        .create_deployment(NewDeployment {
            node_id: node.id,
            name: template.name,
            path: Some(template.path),
            git_url: template.git_url,
            deployment_type: kind,
            compose: template.compose,
        })
        .await
        .unwrap();

    (node, deployment)
}
