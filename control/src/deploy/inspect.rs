//! Read paths against a node
//!
//! Each view makes one call in-line, records the outcome as the node (or
//! deployment) status and degrades to a fixed empty value when the node does
//! not answer 200 or answers something unreadable.

use std::sync::Arc;

use agent_api::{paths, HealthStats};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::deploy::dispatch::{self, StatusOutput};
use crate::deploy::fsm::{reconcile, Phase, Reconciled, Status, StatusEvent};
use crate::errors::ControlError;
use crate::http::node_api::{AgentConnector, ContainerAction, NodeApi};
use crate::models::deployment::DeploymentId;
use crate::models::node::{Node, NodeId};
use crate::storage::records::RecordStore;

#[derive(Debug, Clone, Serialize)]
pub struct HealthView {
    pub node_id: NodeId,
    pub status: Status,

    /// Agent metrics, or the all `-1` sentinel
    pub stats: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainersView {
    pub node_id: NodeId,
    pub status: Status,

    /// Agent entries, each tagged with `node_id`
    pub containers: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainerInspectView {
    pub node_id: NodeId,
    pub container_id: String,
    pub status: Status,

    /// Pretty-printed inspect JSON, empty when unavailable
    pub inspect: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainerLogsView {
    pub node_id: NodeId,
    pub container_id: String,
    pub status: Status,
    pub logs: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeploymentStatusView {
    pub deployment_id: DeploymentId,
    pub status: Status,
    pub output: StatusOutput,
}

/// The health sentinel as JSON
pub fn health_sentinel() -> Value {
    serde_json::to_value(HealthStats::sentinel()).unwrap_or(Value::Null)
}

/// Whether viewing a node in `status` should queue a background re-check
pub fn needs_refresh(status: Status) -> bool {
    matches!(status, Status::InitFailed | Status::ConnectionLost)
}

/// Synchronous node and deployment views
#[derive(Clone)]
pub struct Inspector {
    store: Arc<dyn RecordStore>,
    connector: Arc<dyn AgentConnector>,
}

impl Inspector {
    pub fn new(store: Arc<dyn RecordStore>, connector: Arc<dyn AgentConnector>) -> Self {
        Self { store, connector }
    }

    pub async fn node_health(&self, node_id: &NodeId) -> Result<HealthView, ControlError> {
        let (node, api) = self.connect(node_id).await?;
        let result = reconcile(&api.health().await, Phase::Established);
        let status = self.record_node(&node, &result).await?;

        let stats = result
            .body
            .filter(|_| result.status == Status::Healthy)
            .and_then(|body| serde_json::from_str::<Value>(&body).ok())
            .filter(Value::is_object)
            .unwrap_or_else(health_sentinel);

        Ok(HealthView {
            node_id: node.id,
            status,
            stats,
        })
    }

    pub async fn containers(&self, node_id: &NodeId) -> Result<ContainersView, ControlError> {
        let (node, api) = self.connect(node_id).await?;
        let result = reconcile(&api.list_containers().await, Phase::Established);
        let status = self.record_node(&node, &result).await?;

        let containers = healthy_json(&result)
            .and_then(|value| match value {
                Value::Array(entries) => Some(entries),
                _ => None,
            })
            .unwrap_or_default()
            .into_iter()
            .map(|mut entry| {
                if let Value::Object(fields) = &mut entry {
                    fields.insert("node_id".to_string(), Value::String(node.id.to_string()));
                }
                entry
            })
            .collect();

        Ok(ContainersView {
            node_id: node.id,
            status,
            containers,
        })
    }

    pub async fn container_inspect(
        &self,
        node_id: &NodeId,
        container_id: &str,
    ) -> Result<ContainerInspectView, ControlError> {
        check_container_ref(container_id)?;
        let (node, api) = self.connect(node_id).await?;
        let outcome = api
            .container_detail(container_id, ContainerAction::Inspect)
            .await;
        let result = reconcile(&outcome, Phase::Established);
        let status = self.record_node(&node, &result).await?;

        let inspect = healthy_json(&result)
            .and_then(|value| serde_json::to_string_pretty(&value).ok())
            .unwrap_or_default();

        Ok(ContainerInspectView {
            node_id: node.id,
            container_id: container_id.to_string(),
            status,
            inspect,
        })
    }

    pub async fn container_logs(
        &self,
        node_id: &NodeId,
        container_id: &str,
    ) -> Result<ContainerLogsView, ControlError> {
        check_container_ref(container_id)?;
        let (node, api) = self.connect(node_id).await?;
        let outcome = api.container_detail(container_id, ContainerAction::Logs).await;
        let result = reconcile(&outcome, Phase::Established);
        let status = self.record_node(&node, &result).await?;

        Ok(ContainerLogsView {
            node_id: node.id,
            container_id: container_id.to_string(),
            status,
            logs: healthy_json(&result).unwrap_or_else(|| Value::Array(Vec::new())),
        })
    }

    pub async fn deployment_status(
        &self,
        deployment_id: &DeploymentId,
    ) -> Result<DeploymentStatusView, ControlError> {
        let deployment = self.store.get_deployment(deployment_id).await?;
        let (_, api) = self.connect(&deployment.node_id).await?;

        let result = reconcile(&dispatch::status(api.as_ref(), &deployment).await, Phase::Established);
        let status = match self
            .store
            .transition_deployment_status(deployment_id, result.event(Phase::Established))
            .await
        {
            Ok(status) => status,
            Err(ControlError::TransitionError(reason)) => {
                debug!(deployment_id = %deployment_id, "Status kept: {}", reason);
                deployment.status
            }
            Err(e) => return Err(e),
        };

        let output = match (&result.body, result.is_healthy()) {
            (Some(body), true) => dispatch::interpret_status(deployment.deployment_type, body),
            _ => StatusOutput::Empty,
        };

        Ok(DeploymentStatusView {
            deployment_id: *deployment_id,
            status,
            output,
        })
    }

    /// Re-check a node; only a success is written
    pub async fn refresh_node(&self, node_id: &NodeId) -> Result<Status, ControlError> {
        let (node, api) = self.connect(node_id).await?;
        let outcome = api.health().await;

        if !reconcile(&outcome, Phase::Established).is_healthy() {
            debug!(node_id = %node_id, "Refresh failed, status kept: {}", outcome.describe());
            return Ok(node.status);
        }

        let status = self
            .store
            .transition_node_status(node_id, StatusEvent::RemoteSucceeded)
            .await?;
        info!(node_id = %node_id, "Node is reachable again");
        Ok(status)
    }

    async fn connect(&self, node_id: &NodeId) -> Result<(Node, Arc<dyn NodeApi>), ControlError> {
        let node = self.store.get_node(node_id).await?;
        let api = self.connector.connect(&node);
        Ok((node, api))
    }

    /// Write the read outcome; a decommissioned node keeps its status
    async fn record_node(&self, node: &Node, result: &Reconciled) -> Result<Status, ControlError> {
        match self
            .store
            .transition_node_status(&node.id, result.event(Phase::Established))
            .await
        {
            Ok(status) => Ok(status),
            Err(ControlError::TransitionError(reason)) => {
                debug!(node_id = %node.id, "Status kept: {}", reason);
                Ok(node.status)
            }
            Err(e) => Err(e),
        }
    }
}

fn check_container_ref(container_id: &str) -> Result<(), ControlError> {
    if paths::is_container_ref(container_id) {
        Ok(())
    } else {
        Err(ControlError::ValidationError(format!(
            "container id {:?} must match [A-Za-z0-9][A-Za-z0-9_.-]*",
            container_id
        )))
    }
}

fn healthy_json(result: &Reconciled) -> Option<Value> {
    if !result.is_healthy() {
        return None;
    }
    result
        .body
        .as_deref()
        .and_then(|body| serde_json::from_str(body).ok())
}
