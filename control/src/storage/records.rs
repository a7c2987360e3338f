//! Node and deployment records
//!
//! [`RecordStore`] is the only way the engine reads or writes records.
//! Status changes go through `transition_*_status`, which applies a
//! [`StatusEvent`] under the store's write lock so concurrent jobs cannot
//! interleave a read-modify-write.

use std::collections::HashMap;
use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::deploy::fsm::{Status, StatusEvent};
use crate::errors::ControlError;
use crate::filesys::file::File;
use crate::models::deployment::{
    DeploymentId, DeploymentPatch, DeploymentType, NewDeployment, NodeDeployment,
};
use crate::models::node::{NewNode, Node, NodeId, NodePatch};
use crate::storage::crypto::KeyCipher;

/// Persistence for nodes and their deployments
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create_node(&self, fields: NewNode) -> Result<Node, ControlError>;

    async fn get_node(&self, id: &NodeId) -> Result<Node, ControlError>;

    /// All nodes, oldest first
    async fn list_nodes(&self) -> Result<Vec<Node>, ControlError>;

    async fn update_node(&self, id: &NodeId, patch: NodePatch) -> Result<Node, ControlError>;

    /// Delete a node and every deployment on it
    async fn delete_node(&self, id: &NodeId) -> Result<(), ControlError>;

    async fn transition_node_status(
        &self,
        id: &NodeId,
        event: StatusEvent,
    ) -> Result<Status, ControlError>;

    /// Fails with a validation error when the node does not exist
    async fn create_deployment(&self, fields: NewDeployment) -> Result<NodeDeployment, ControlError>;

    async fn get_deployment(&self, id: &DeploymentId) -> Result<NodeDeployment, ControlError>;

    /// Deployments, oldest first, optionally only those on one node
    async fn list_deployments(
        &self,
        node_id: Option<NodeId>,
    ) -> Result<Vec<NodeDeployment>, ControlError>;

    async fn update_deployment(
        &self,
        id: &DeploymentId,
        patch: DeploymentPatch,
    ) -> Result<NodeDeployment, ControlError>;

    async fn delete_deployment(&self, id: &DeploymentId) -> Result<(), ControlError>;

    async fn transition_deployment_status(
        &self,
        id: &DeploymentId,
        event: StatusEvent,
    ) -> Result<Status, ControlError>;
}

#[derive(Clone, Default)]
struct Tables {
    nodes: HashMap<NodeId, Node>,
    deployments: HashMap<DeploymentId, NodeDeployment>,
}

impl Tables {
    fn node(&self, id: &NodeId) -> Result<&Node, ControlError> {
        self.nodes
            .get(id)
            .ok_or_else(|| ControlError::NotFound(format!("node {}", id)))
    }

    fn deployment(&self, id: &DeploymentId) -> Result<&NodeDeployment, ControlError> {
        self.deployments
            .get(id)
            .ok_or_else(|| ControlError::NotFound(format!("deployment {}", id)))
    }

    fn require_node(&self, id: &NodeId) -> Result<(), ControlError> {
        if self.nodes.contains_key(id) {
            Ok(())
        } else {
            Err(ControlError::ValidationError(format!("unknown node {}", id)))
        }
    }

    fn list_nodes(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.nodes.values().cloned().collect();
        nodes.sort_by_key(|n| (n.created_at, n.id));
        nodes
    }

    fn list_deployments(&self, node_id: Option<NodeId>) -> Vec<NodeDeployment> {
        let mut deployments: Vec<NodeDeployment> = self
            .deployments
            .values()
            .filter(|d| node_id.map_or(true, |id| d.node_id == id))
            .cloned()
            .collect();
        deployments.sort_by_key(|d| (d.created_at, d.id));
        deployments
    }

    fn create_node(&mut self, fields: NewNode) -> Result<Node, ControlError> {
        let node = fields.into_node()?;
        self.nodes.insert(node.id, node.clone());
        Ok(node)
    }

    fn update_node(&mut self, id: &NodeId, patch: NodePatch) -> Result<Node, ControlError> {
        let updated = patch.apply_to(self.node(id)?)?;
        self.nodes.insert(*id, updated.clone());
        Ok(updated)
    }

    fn delete_node(&mut self, id: &NodeId) -> Result<(), ControlError> {
        self.nodes
            .remove(id)
            .ok_or_else(|| ControlError::NotFound(format!("node {}", id)))?;

        let before = self.deployments.len();
        self.deployments.retain(|_, d| d.node_id != *id);
        debug!(
            node_id = %id,
            "Removed {} deployments with their node",
            before - self.deployments.len()
        );
        Ok(())
    }

    fn transition_node(&mut self, id: &NodeId, event: StatusEvent) -> Result<Status, ControlError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| ControlError::NotFound(format!("node {}", id)))?;
        let next = node.status.apply(event)?;
        node.status = next;
        node.updated_at = Utc::now();
        Ok(next)
    }

    fn create_deployment(&mut self, fields: NewDeployment) -> Result<NodeDeployment, ControlError> {
        self.require_node(&fields.node_id)?;
        let deployment = fields.into_deployment()?;
        self.deployments.insert(deployment.id, deployment.clone());
        Ok(deployment)
    }

    fn update_deployment(
        &mut self,
        id: &DeploymentId,
        patch: DeploymentPatch,
    ) -> Result<NodeDeployment, ControlError> {
        let updated = patch.apply_to(self.deployment(id)?)?;
        self.require_node(&updated.node_id)?;
        self.deployments.insert(*id, updated.clone());
        Ok(updated)
    }

    fn delete_deployment(&mut self, id: &DeploymentId) -> Result<(), ControlError> {
        self.deployments
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ControlError::NotFound(format!("deployment {}", id)))
    }

    fn transition_deployment(
        &mut self,
        id: &DeploymentId,
        event: StatusEvent,
    ) -> Result<Status, ControlError> {
        let deployment = self
            .deployments
            .get_mut(id)
            .ok_or_else(|| ControlError::NotFound(format!("deployment {}", id)))?;
        let next = deployment.status.apply(event)?;
        deployment.status = next;
        deployment.updated_at = Utc::now();
        Ok(next)
    }
}

/// Records held in memory only
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<T, ControlError>,
    ) -> Result<T, ControlError> {
        let mut tables = self.tables.write().await;
        f(&mut tables)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create_node(&self, fields: NewNode) -> Result<Node, ControlError> {
        self.mutate(|t| t.create_node(fields)).await
    }

    async fn get_node(&self, id: &NodeId) -> Result<Node, ControlError> {
        self.tables.read().await.node(id).cloned()
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, ControlError> {
        Ok(self.tables.read().await.list_nodes())
    }

    async fn update_node(&self, id: &NodeId, patch: NodePatch) -> Result<Node, ControlError> {
        self.mutate(|t| t.update_node(id, patch)).await
    }

    async fn delete_node(&self, id: &NodeId) -> Result<(), ControlError> {
        self.mutate(|t| t.delete_node(id)).await
    }

    async fn transition_node_status(
        &self,
        id: &NodeId,
        event: StatusEvent,
    ) -> Result<Status, ControlError> {
        self.mutate(|t| t.transition_node(id, event)).await
    }

    async fn create_deployment(&self, fields: NewDeployment) -> Result<NodeDeployment, ControlError> {
        self.mutate(|t| t.create_deployment(fields)).await
    }

    async fn get_deployment(&self, id: &DeploymentId) -> Result<NodeDeployment, ControlError> {
        self.tables.read().await.deployment(id).cloned()
    }

    async fn list_deployments(
        &self,
        node_id: Option<NodeId>,
    ) -> Result<Vec<NodeDeployment>, ControlError> {
        Ok(self.tables.read().await.list_deployments(node_id))
    }

    async fn update_deployment(
        &self,
        id: &DeploymentId,
        patch: DeploymentPatch,
    ) -> Result<NodeDeployment, ControlError> {
        self.mutate(|t| t.update_deployment(id, patch)).await
    }

    async fn delete_deployment(&self, id: &DeploymentId) -> Result<(), ControlError> {
        self.mutate(|t| t.delete_deployment(id)).await
    }

    async fn transition_deployment_status(
        &self,
        id: &DeploymentId,
        event: StatusEvent,
    ) -> Result<Status, ControlError> {
        self.mutate(|t| t.transition_deployment(id, event)).await
    }
}

const SNAPSHOT_VERSION: u32 = 1;

/// On-disk form; enums are stored as their integer codes
#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    nodes: Vec<StoredNode>,
    deployments: Vec<StoredDeployment>,
}

#[derive(Serialize, Deserialize)]
struct StoredNode {
    id: NodeId,
    hostname: String,
    ip: String,
    api_url: String,
    port: u16,

    /// `base64(nonce || ciphertext)`
    key: String,
    node_status: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct StoredDeployment {
    id: DeploymentId,
    node_id: NodeId,
    name: String,
    path: String,
    git_url: Option<String>,
    deployment_type: i32,
    compose: Option<String>,
    deployment_status: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Snapshot {
    fn capture(tables: &Tables, cipher: &KeyCipher) -> Result<Self, ControlError> {
        let nodes = tables
            .list_nodes()
            .into_iter()
            .map(|node| {
                Ok(StoredNode {
                    key: cipher.encrypt(&node.key)?,
                    id: node.id,
                    hostname: node.hostname,
                    ip: node.ip.to_string(),
                    api_url: node.api_url,
                    port: node.port,
                    node_status: node.status.code(),
                    created_at: node.created_at,
                    updated_at: node.updated_at,
                })
            })
            .collect::<Result<Vec<_>, ControlError>>()?;

        let deployments = tables
            .list_deployments(None)
            .into_iter()
            .map(|d| StoredDeployment {
                id: d.id,
                node_id: d.node_id,
                name: d.name,
                path: d.path,
                git_url: d.git_url,
                deployment_type: d.deployment_type.code(),
                compose: d.compose,
                deployment_status: d.status.code(),
                created_at: d.created_at,
                updated_at: d.updated_at,
            })
            .collect();

        Ok(Self {
            version: SNAPSHOT_VERSION,
            nodes,
            deployments,
        })
    }

    fn restore(self, cipher: &KeyCipher) -> Result<Tables, ControlError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(ControlError::InvalidRecord(format!(
                "unsupported snapshot version {}",
                self.version
            )));
        }

        let mut tables = Tables::default();
        for stored in self.nodes {
            let ip = stored.ip.parse::<IpAddr>().map_err(|_| {
                ControlError::InvalidRecord(format!("node {} has invalid ip {}", stored.id, stored.ip))
            })?;
            let node = Node {
                id: stored.id,
                hostname: stored.hostname,
                ip,
                api_url: stored.api_url,
                port: stored.port,
                key: cipher.decrypt(&stored.key)?,
                status: Status::from_code(stored.node_status)?,
                created_at: stored.created_at,
                updated_at: stored.updated_at,
            };
            node.validate().map_err(|e| {
                ControlError::InvalidRecord(format!("node {}: {}", node.id, e))
            })?;
            tables.nodes.insert(node.id, node);
        }

        for stored in self.deployments {
            if !tables.nodes.contains_key(&stored.node_id) {
                return Err(ControlError::InvalidRecord(format!(
                    "deployment {} references missing node {}",
                    stored.id, stored.node_id
                )));
            }
            let deployment = NodeDeployment {
                id: stored.id,
                node_id: stored.node_id,
                name: stored.name,
                path: stored.path,
                git_url: stored.git_url,
                deployment_type: DeploymentType::from_code(stored.deployment_type)?,
                compose: stored.compose,
                status: Status::from_code(stored.deployment_status)?,
                created_at: stored.created_at,
                updated_at: stored.updated_at,
            };
            deployment.validate().map_err(|e| {
                ControlError::InvalidRecord(format!("deployment {}: {}", deployment.id, e))
            })?;
            tables.deployments.insert(deployment.id, deployment);
        }

        Ok(tables)
    }
}

/// Records kept in memory and mirrored to a JSON snapshot on every write
pub struct FileStore {
    tables: RwLock<Tables>,
    file: File,
    cipher: KeyCipher,
}

impl FileStore {
    /// Load `file`, or start empty when it does not exist yet.
    ///
    /// Any record that fails validation aborts the load.
    pub async fn open(file: File, cipher: KeyCipher) -> Result<Self, ControlError> {
        let tables = if file.exists().await {
            let snapshot: Snapshot = file.read_json().await.map_err(|e| {
                ControlError::StorageError(format!("{}: {}", file.path().display(), e))
            })?;
            let tables = snapshot.restore(&cipher)?;
            info!(
                "Loaded {} nodes and {} deployments from {}",
                tables.nodes.len(),
                tables.deployments.len(),
                file.path().display()
            );
            tables
        } else {
            info!("Starting with an empty record store at {}", file.path().display());
            Tables::default()
        };

        Ok(Self {
            tables: RwLock::new(tables),
            file,
            cipher,
        })
    }

    /// Apply `f` to a copy and swap it in only once the snapshot is on disk
    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<T, ControlError>,
    ) -> Result<T, ControlError> {
        let mut tables = self.tables.write().await;
        let mut next = tables.clone();
        let result = f(&mut next)?;

        let snapshot = Snapshot::capture(&next, &self.cipher)?;
        self.file.write_json(&snapshot).await.map_err(|e| {
            ControlError::StorageError(format!("{}: {}", self.file.path().display(), e))
        })?;

        *tables = next;
        Ok(result)
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn create_node(&self, fields: NewNode) -> Result<Node, ControlError> {
        self.mutate(|t| t.create_node(fields)).await
    }

    async fn get_node(&self, id: &NodeId) -> Result<Node, ControlError> {
        self.tables.read().await.node(id).cloned()
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, ControlError> {
        Ok(self.tables.read().await.list_nodes())
    }

    async fn update_node(&self, id: &NodeId, patch: NodePatch) -> Result<Node, ControlError> {
        self.mutate(|t| t.update_node(id, patch)).await
    }

    async fn delete_node(&self, id: &NodeId) -> Result<(), ControlError> {
        self.mutate(|t| t.delete_node(id)).await
    }

    async fn transition_node_status(
        &self,
        id: &NodeId,
        event: StatusEvent,
    ) -> Result<Status, ControlError> {
        self.mutate(|t| t.transition_node(id, event)).await
    }

    async fn create_deployment(&self, fields: NewDeployment) -> Result<NodeDeployment, ControlError> {
        self.mutate(|t| t.create_deployment(fields)).await
    }

    async fn get_deployment(&self, id: &DeploymentId) -> Result<NodeDeployment, ControlError> {
        self.tables.read().await.deployment(id).cloned()
    }

    async fn list_deployments(
        &self,
        node_id: Option<NodeId>,
    ) -> Result<Vec<NodeDeployment>, ControlError> {
        Ok(self.tables.read().await.list_deployments(node_id))
    }

    async fn update_deployment(
        &self,
        id: &DeploymentId,
        patch: DeploymentPatch,
    ) -> Result<NodeDeployment, ControlError> {
        self.mutate(|t| t.update_deployment(id, patch)).await
    }

    async fn delete_deployment(&self, id: &DeploymentId) -> Result<(), ControlError> {
        self.mutate(|t| t.delete_deployment(id)).await
    }

    async fn transition_deployment_status(
        &self,
        id: &DeploymentId,
        event: StatusEvent,
    ) -> Result<Status, ControlError> {
        self.mutate(|t| t.transition_deployment(id, event)).await
    }
}
