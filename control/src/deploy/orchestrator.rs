//! Deployment provisioning workflow
//!
//! Provisioning checks the node first, then runs the setup strategy for the
//! deployment type and records the outcome as the deployment status. Every
//! path that reaches the node writes a status, success or not.

use std::sync::Arc;

use secrecy::SecretString;
use tracing::{info, warn};

use crate::deploy::dispatch::{self, SetupCredentials, UpdateOutcome};
use crate::deploy::fsm::{reconcile, Phase, Status, StatusEvent};
use crate::errors::ControlError;
use crate::http::client::CallOutcome;
use crate::http::node_api::{AgentConnector, NodeApi};
use crate::models::deployment::{DeploymentId, NodeDeployment};
use crate::storage::records::RecordStore;

/// Inputs to a first-time provision that are not part of the record
#[derive(Debug, Clone, Default)]
pub struct ProvisionRequest {
    /// Needed by runner deployments, never stored
    pub github_token: Option<SecretString>,

    /// The deployment already runs on the node; only check health
    pub adopt: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// The status written to the deployment
    Completed(Status),

    /// Nothing was sent and the status was left alone
    Skipped,
}

/// Drives provision and re-provision of deployments
#[derive(Clone)]
pub struct DeploymentOrchestrator {
    store: Arc<dyn RecordStore>,
    connector: Arc<dyn AgentConnector>,
}

impl DeploymentOrchestrator {
    pub fn new(store: Arc<dyn RecordStore>, connector: Arc<dyn AgentConnector>) -> Self {
        Self { store, connector }
    }

    /// First-time setup after a deployment is created
    pub async fn provision(
        &self,
        id: &DeploymentId,
        request: ProvisionRequest,
    ) -> Result<ProvisionOutcome, ControlError> {
        let (deployment, api) = self.prepare(id).await?;
        info!(
            deployment_id = %id,
            deployment_type = %deployment.deployment_type,
            adopt = request.adopt,
            "Provisioning deployment"
        );

        if !self.node_is_healthy(&deployment, api.as_ref()).await {
            return self.mark_failed(id).await;
        }

        if request.adopt {
            info!(deployment_id = %id, "Adopting running deployment, skipping setup");
            let status = self
                .store
                .transition_deployment_status(id, StatusEvent::RemoteSucceeded)
                .await?;
            return Ok(ProvisionOutcome::Completed(status));
        }

        let credentials = SetupCredentials {
            github_token: request.github_token,
        };
        let outcome = match dispatch::setup(api.as_ref(), &deployment, &credentials).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(deployment_id = %id, "Setup not attempted: {}", e);
                self.store
                    .transition_deployment_status(id, StatusEvent::RemoteFailed(Phase::FirstSetup))
                    .await?;
                return Err(e);
            }
        };

        self.settle(&deployment, &outcome).await
    }

    /// Re-apply a deployment after its record changed
    pub async fn reprovision(&self, id: &DeploymentId) -> Result<ProvisionOutcome, ControlError> {
        let (deployment, api) = self.prepare(id).await?;

        if !dispatch::is_reappliable(deployment.deployment_type) {
            info!(
                deployment_id = %id,
                deployment_type = %deployment.deployment_type,
                "Update does not apply to this deployment type, skipping"
            );
            return Ok(ProvisionOutcome::Skipped);
        }

        info!(deployment_id = %id, "Re-provisioning deployment");
        if !self.node_is_healthy(&deployment, api.as_ref()).await {
            return self.mark_failed(id).await;
        }

        match dispatch::update(api.as_ref(), &deployment).await {
            UpdateOutcome::Applied(outcome) => self.settle(&deployment, &outcome).await,
            UpdateOutcome::Skipped => Ok(ProvisionOutcome::Skipped),
        }
    }

    async fn prepare(
        &self,
        id: &DeploymentId,
    ) -> Result<(NodeDeployment, Arc<dyn NodeApi>), ControlError> {
        let deployment = self.store.get_deployment(id).await?;
        if deployment.status.is_terminal() {
            return Err(ControlError::TransitionError(format!(
                "deployment {} is decommissioned",
                id
            )));
        }

        let node = self.store.get_node(&deployment.node_id).await?;
        Ok((deployment, self.connector.connect(&node)))
    }

    async fn node_is_healthy(&self, deployment: &NodeDeployment, api: &dyn NodeApi) -> bool {
        let outcome = api.health().await;
        let healthy = reconcile(&outcome, Phase::FirstSetup).is_healthy();
        if !healthy {
            warn!(
                deployment_id = %deployment.id,
                node_id = %deployment.node_id,
                "Node is not healthy, skipping setup: {}",
                outcome.describe()
            );
        }
        healthy
    }

    async fn mark_failed(&self, id: &DeploymentId) -> Result<ProvisionOutcome, ControlError> {
        let status = self
            .store
            .transition_deployment_status(id, StatusEvent::RemoteFailed(Phase::FirstSetup))
            .await?;
        Ok(ProvisionOutcome::Completed(status))
    }

    /// Record a setup outcome; a re-provision is still a setup
    async fn settle(
        &self,
        deployment: &NodeDeployment,
        outcome: &CallOutcome,
    ) -> Result<ProvisionOutcome, ControlError> {
        let result = reconcile(outcome, Phase::FirstSetup);
        if result.is_healthy() {
            info!(
                deployment_id = %deployment.id,
                "Setup succeeded: {}",
                result.body.as_deref().unwrap_or_default()
            );
        } else {
            warn!(
                deployment_id = %deployment.id,
                "Setup failed: {}",
                outcome.describe()
            );
        }

        let status = self
            .store
            .transition_deployment_status(&deployment.id, result.event(Phase::FirstSetup))
            .await?;
        Ok(ProvisionOutcome::Completed(status))
    }
}
