//! Deployment models

use std::fmt;
use std::str::FromStr;

use agent_api::paths;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::deploy::fsm::DeploymentStatus;
use crate::errors::ControlError;
use crate::models::node::NodeId;

/// Remote directory used when a deployment does not name one
pub fn default_path(name: &str) -> String {
    format!("/home/node_agent/{}", name)
}

/// Opaque deployment identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentId(pub Uuid);

impl DeploymentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DeploymentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for DeploymentId {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(DeploymentId)
            .map_err(|e| {
                ControlError::ValidationError(format!("invalid deployment id {}: {}", s, e))
            })
    }
}

/// How a deployment is provisioned on its node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentType {
    /// A single container started with `docker run`
    #[default]
    SimpleDockerRun,

    /// A compose stack written to `path`
    SimpleDockerCompose,

    /// A self-hosted GitHub Actions runner registered in `path`
    GithubActionRunner,
}

const TYPE_TABLE: [(i32, &str, DeploymentType); 3] = [
    (0, "simple_docker_run", DeploymentType::SimpleDockerRun),
    (1, "simple_docker_compose", DeploymentType::SimpleDockerCompose),
    (2, "github_action_runner", DeploymentType::GithubActionRunner),
];

impl DeploymentType {
    /// Integer stored for this type
    pub fn code(self) -> i32 {
        TYPE_TABLE
            .iter()
            .find(|(_, _, t)| *t == self)
            .map(|(code, _, _)| *code)
            .unwrap_or_default()
    }

    pub fn name(self) -> &'static str {
        TYPE_TABLE
            .iter()
            .find(|(_, _, t)| *t == self)
            .map(|(_, name, _)| *name)
            .unwrap_or_default()
    }

    /// Resolve a stored integer
    pub fn from_code(code: i32) -> Result<Self, ControlError> {
        TYPE_TABLE
            .iter()
            .find(|(c, _, _)| *c == code)
            .map(|(_, _, t)| *t)
            .ok_or_else(|| {
                ControlError::InvalidRecord(format!("unknown deployment type code {}", code))
            })
    }
}

impl fmt::Display for DeploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A unit of work provisioned on a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDeployment {
    pub id: DeploymentId,
    pub node_id: NodeId,
    pub name: String,

    /// Working directory on the remote node
    pub path: String,
    pub git_url: Option<String>,
    pub deployment_type: DeploymentType,

    /// Raw compose file, only for `simple_docker_compose`
    pub compose: Option<String>,
    pub status: DeploymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating a deployment
#[derive(Debug, Clone, Deserialize)]
pub struct NewDeployment {
    pub node_id: NodeId,
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub git_url: Option<String>,
    #[serde(default)]
    pub deployment_type: DeploymentType,
    #[serde(default)]
    pub compose: Option<String>,
}

impl NewDeployment {
    /// Validate and build a deployment in `pending_init`
    pub fn into_deployment(self) -> Result<NodeDeployment, ControlError> {
        let path = match self.path {
            Some(path) if !path.trim().is_empty() => path,
            _ => default_path(self.name.trim()),
        };

        let now = Utc::now();
        let deployment = NodeDeployment {
            id: DeploymentId::new(),
            node_id: self.node_id,
            name: self.name,
            path,
            git_url: non_empty(self.git_url),
            deployment_type: self.deployment_type,
            compose: non_empty(self.compose),
            status: DeploymentStatus::PendingInit,
            created_at: now,
            updated_at: now,
        };
        deployment.validate()?;
        Ok(deployment)
    }
}

/// Partial deployment update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeploymentPatch {
    pub node_id: Option<NodeId>,
    pub name: Option<String>,
    pub path: Option<String>,
    pub git_url: Option<String>,
    pub deployment_type: Option<DeploymentType>,
    pub compose: Option<String>,
}

impl DeploymentPatch {
    /// Apply to a copy of `deployment`, validating the result
    pub fn apply_to(self, deployment: &NodeDeployment) -> Result<NodeDeployment, ControlError> {
        let updated = NodeDeployment {
            node_id: self.node_id.unwrap_or(deployment.node_id),
            name: self.name.unwrap_or_else(|| deployment.name.clone()),
            path: self.path.unwrap_or_else(|| deployment.path.clone()),
            git_url: match self.git_url {
                Some(git_url) => non_empty(Some(git_url)),
                None => deployment.git_url.clone(),
            },
            deployment_type: self.deployment_type.unwrap_or(deployment.deployment_type),
            compose: match self.compose {
                Some(compose) => non_empty(Some(compose)),
                None => deployment.compose.clone(),
            },
            updated_at: Utc::now(),
            ..deployment.clone()
        };
        updated.validate()?;
        Ok(updated)
    }
}

impl NodeDeployment {
    /// Check field invariants for the declared type
    pub fn validate(&self) -> Result<(), ControlError> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("name must not be empty");
        }
        if self.path.trim().is_empty() {
            problems.push("path must not be empty");
        }

        match self.deployment_type {
            DeploymentType::SimpleDockerRun => {
                // The name doubles as the container id on the agent
                if !self.name.trim().is_empty() && !paths::is_container_ref(&self.name) {
                    problems.push("container names must match [A-Za-z0-9][A-Za-z0-9_.-]*");
                }
            }
            DeploymentType::SimpleDockerCompose => {
                if self.compose.is_none() {
                    problems.push("compose deployments need a compose file");
                }
            }
            DeploymentType::GithubActionRunner => {
                if self.git_url.is_none() {
                    problems.push("runner deployments need a git_url");
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ControlError::ValidationError(problems.join("; ")))
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
