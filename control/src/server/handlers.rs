//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::deploy::orchestrator::ProvisionRequest;
use crate::errors::ControlError;
use crate::models::deployment::{DeploymentId, DeploymentPatch, NewDeployment};
use crate::models::node::{NewNode, NodeId, NodePatch};
use crate::server::state::ServerState;
use crate::utils::version_info;

type Shared = State<Arc<ServerState>>;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "fleetctl".to_string(),
        version: version_info().version,
    })
}

pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

// ================================== NODES ======================================= //

pub async fn list_nodes_handler(State(state): Shared) -> Result<impl IntoResponse, ControlError> {
    Ok(Json(state.app.list_nodes().await?))
}

/// Register a node; adoption runs in the background
pub async fn create_node_handler(
    State(state): Shared,
    Json(fields): Json<NewNode>,
) -> Result<impl IntoResponse, ControlError> {
    let node = state.app.register_node(fields).await?;
    Ok((StatusCode::CREATED, Json(node)))
}

pub async fn show_node_handler(
    State(state): Shared,
    Path(id): Path<NodeId>,
) -> Result<impl IntoResponse, ControlError> {
    Ok(Json(state.app.show_node(&id).await?))
}

pub async fn update_node_handler(
    State(state): Shared,
    Path(id): Path<NodeId>,
    Json(patch): Json<NodePatch>,
) -> Result<impl IntoResponse, ControlError> {
    Ok(Json(state.app.update_node(&id, patch).await?))
}

pub async fn delete_node_handler(
    State(state): Shared,
    Path(id): Path<NodeId>,
) -> Result<impl IntoResponse, ControlError> {
    state.app.delete_node(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn decommission_node_handler(
    State(state): Shared,
    Path(id): Path<NodeId>,
) -> Result<impl IntoResponse, ControlError> {
    Ok(Json(state.app.decommission_node(&id).await?))
}

pub async fn node_health_handler(
    State(state): Shared,
    Path(id): Path<NodeId>,
) -> Result<impl IntoResponse, ControlError> {
    Ok(Json(state.app.inspector.node_health(&id).await?))
}

pub async fn containers_handler(
    State(state): Shared,
    Path(id): Path<NodeId>,
) -> Result<impl IntoResponse, ControlError> {
    Ok(Json(state.app.inspector.containers(&id).await?))
}

pub async fn container_inspect_handler(
    State(state): Shared,
    Path((id, container_id)): Path<(NodeId, String)>,
) -> Result<impl IntoResponse, ControlError> {
    Ok(Json(
        state.app.inspector.container_inspect(&id, &container_id).await?,
    ))
}

pub async fn container_logs_handler(
    State(state): Shared,
    Path((id, container_id)): Path<(NodeId, String)>,
) -> Result<impl IntoResponse, ControlError> {
    Ok(Json(
        state.app.inspector.container_logs(&id, &container_id).await?,
    ))
}

// =============================== DEPLOYMENTS ==================================== //

#[derive(Debug, Default, Deserialize)]
pub struct DeploymentFilter {
    pub node_id: Option<NodeId>,
}

pub async fn list_deployments_handler(
    State(state): Shared,
    Query(filter): Query<DeploymentFilter>,
) -> Result<impl IntoResponse, ControlError> {
    Ok(Json(state.app.list_deployments(filter.node_id).await?))
}

/// Record fields plus provisioning inputs that are never stored
#[derive(Debug, Deserialize)]
pub struct CreateDeploymentRequest {
    #[serde(flatten)]
    pub deployment: NewDeployment,

    #[serde(default)]
    pub github_token: Option<SecretString>,

    /// Skip setup for a deployment that already runs on the node
    #[serde(default)]
    pub adopt: bool,
}

pub async fn create_deployment_handler(
    State(state): Shared,
    Json(request): Json<CreateDeploymentRequest>,
) -> Result<impl IntoResponse, ControlError> {
    let provision = ProvisionRequest {
        github_token: request.github_token,
        adopt: request.adopt,
    };
    let deployment = state
        .app
        .create_deployment(request.deployment, provision)
        .await?;
    Ok((StatusCode::CREATED, Json(deployment)))
}

pub async fn show_deployment_handler(
    State(state): Shared,
    Path(id): Path<DeploymentId>,
) -> Result<impl IntoResponse, ControlError> {
    Ok(Json(state.app.get_deployment(&id).await?))
}

pub async fn update_deployment_handler(
    State(state): Shared,
    Path(id): Path<DeploymentId>,
    Json(patch): Json<DeploymentPatch>,
) -> Result<impl IntoResponse, ControlError> {
    Ok(Json(state.app.update_deployment(&id, patch).await?))
}

pub async fn delete_deployment_handler(
    State(state): Shared,
    Path(id): Path<DeploymentId>,
) -> Result<impl IntoResponse, ControlError> {
    state.app.delete_deployment(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn deployment_status_handler(
    State(state): Shared,
    Path(id): Path<DeploymentId>,
) -> Result<impl IntoResponse, ControlError> {
    Ok(Json(state.app.inspector.deployment_status(&id).await?))
}

pub async fn decommission_deployment_handler(
    State(state): Shared,
    Path(id): Path<DeploymentId>,
) -> Result<impl IntoResponse, ControlError> {
    Ok(Json(state.app.decommission_deployment(&id).await?))
}
