//! Control plane operations
//!
//! Record changes are applied synchronously; remote work they trigger is
//! queued on the entity's lane and the call returns right away.

use tracing::{error, info, warn};

use crate::app::state::AppState;
use crate::deploy::adoption;
use crate::deploy::fsm::{Status, StatusEvent};
use crate::deploy::inspect::needs_refresh;
use crate::deploy::orchestrator::ProvisionRequest;
use crate::errors::ControlError;
use crate::models::deployment::{DeploymentId, DeploymentPatch, NewDeployment, NodeDeployment};
use crate::models::node::{NewNode, Node, NodeId, NodePatch};
use crate::workers::tasks::EntityKey;

impl AppState {
    /// Register a node and queue its adoption
    pub async fn register_node(&self, fields: NewNode) -> Result<Node, ControlError> {
        let node = self.store.create_node(fields).await?;
        info!(node_id = %node.id, "Registered node {}", node);
        self.queue_adoption(&node)?;
        Ok(node)
    }

    /// Fetch a node, queueing a re-check when it is in a failed state
    pub async fn show_node(&self, id: &NodeId) -> Result<Node, ControlError> {
        let node = self.store.get_node(id).await?;
        if needs_refresh(node.status) {
            self.queue_refresh(id);
        }
        Ok(node)
    }

    pub async fn list_nodes(&self) -> Result<Vec<Node>, ControlError> {
        self.store.list_nodes().await
    }

    pub async fn update_node(&self, id: &NodeId, patch: NodePatch) -> Result<Node, ControlError> {
        self.store.update_node(id, patch).await
    }

    /// Delete a node with all of its deployments
    pub async fn delete_node(&self, id: &NodeId) -> Result<(), ControlError> {
        self.store.delete_node(id).await?;
        info!(node_id = %id, "Deleted node");
        Ok(())
    }

    pub async fn decommission_node(&self, id: &NodeId) -> Result<Node, ControlError> {
        self.store
            .transition_node_status(id, StatusEvent::Administrative(Status::Decommissioned))
            .await?;
        info!(node_id = %id, "Node decommissioned");
        self.store.get_node(id).await
    }

    /// Create a deployment and queue its first provision
    pub async fn create_deployment(
        &self,
        fields: NewDeployment,
        request: ProvisionRequest,
    ) -> Result<NodeDeployment, ControlError> {
        let deployment = self.store.create_deployment(fields).await?;
        info!(
            deployment_id = %deployment.id,
            node_id = %deployment.node_id,
            "Created {} deployment {}",
            deployment.deployment_type,
            deployment.name
        );

        let orchestrator = self.orchestrator.clone();
        let id = deployment.id;
        self.tasks
            .submit(EntityKey::Deployment(id), "provision", async move {
                if let Err(e) = orchestrator.provision(&id, request).await {
                    error!(deployment_id = %id, "Provision failed: {}", e);
                }
            })?;

        Ok(deployment)
    }

    pub async fn get_deployment(&self, id: &DeploymentId) -> Result<NodeDeployment, ControlError> {
        self.store.get_deployment(id).await
    }

    pub async fn list_deployments(
        &self,
        node_id: Option<NodeId>,
    ) -> Result<Vec<NodeDeployment>, ControlError> {
        self.store.list_deployments(node_id).await
    }

    /// Update a deployment and queue a re-provision
    pub async fn update_deployment(
        &self,
        id: &DeploymentId,
        patch: DeploymentPatch,
    ) -> Result<NodeDeployment, ControlError> {
        let deployment = self.store.update_deployment(id, patch).await?;

        let orchestrator = self.orchestrator.clone();
        let id = deployment.id;
        self.tasks
            .submit(EntityKey::Deployment(id), "reprovision", async move {
                if let Err(e) = orchestrator.reprovision(&id).await {
                    error!(deployment_id = %id, "Re-provision failed: {}", e);
                }
            })?;

        Ok(deployment)
    }

    pub async fn delete_deployment(&self, id: &DeploymentId) -> Result<(), ControlError> {
        self.store.delete_deployment(id).await?;
        info!(deployment_id = %id, "Deleted deployment");
        Ok(())
    }

    pub async fn decommission_deployment(
        &self,
        id: &DeploymentId,
    ) -> Result<NodeDeployment, ControlError> {
        self.store
            .transition_deployment_status(id, StatusEvent::Administrative(Status::Decommissioned))
            .await?;
        info!(deployment_id = %id, "Deployment decommissioned");
        self.store.get_deployment(id).await
    }

    fn queue_adoption(&self, node: &Node) -> Result<(), ControlError> {
        let store = self.store.clone();
        let api = self.connector.connect(node);
        let options = self.adoption.clone();
        let id = node.id;

        self.tasks.submit(EntityKey::Node(id), "adopt", async move {
            let result = adoption::adopt(
                store.as_ref(),
                api.as_ref(),
                &id,
                &options,
                tokio::time::sleep,
            )
            .await;
            if let Err(e) = result {
                error!(node_id = %id, "Adoption failed: {}", e);
            }
        })
    }

    fn queue_refresh(&self, id: &NodeId) {
        let inspector = self.inspector.clone();
        let id = *id;

        let queued = self.tasks.submit(EntityKey::Node(id), "refresh", async move {
            if let Err(e) = inspector.refresh_node(&id).await {
                error!(node_id = %id, "Refresh failed: {}", e);
            }
        });
        if let Err(e) = queued {
            warn!(node_id = %id, "Refresh not queued: {}", e);
        }
    }
}
