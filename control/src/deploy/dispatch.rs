//! Deployment strategies
//!
//! Routes setup, status and update for a deployment to the node agent calls
//! of its [`DeploymentType`].

use secrecy::SecretString;
use serde::Serialize;
use tracing::info;

use crate::errors::ControlError;
use crate::http::client::CallOutcome;
use crate::http::node_api::{ContainerAction, NodeApi};
use crate::models::deployment::{DeploymentType, NodeDeployment};

/// Credentials that are handed to setup but never stored
#[derive(Debug, Clone, Default)]
pub struct SetupCredentials {
    pub github_token: Option<SecretString>,
}

/// Result of an update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Setup was re-run
    Applied(CallOutcome),

    /// The type cannot be re-applied, nothing was sent
    Skipped,
}

/// A status body, interpreted for its deployment type
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "format", content = "output", rename_all = "snake_case")]
pub enum StatusOutput {
    Text(String),
    Json(serde_json::Value),
    Unreadable { error: String, raw: String },
    Empty,
}

/// Whether an update re-runs setup for this type
pub fn is_reappliable(deployment_type: DeploymentType) -> bool {
    match deployment_type {
        DeploymentType::SimpleDockerRun | DeploymentType::SimpleDockerCompose => true,
        DeploymentType::GithubActionRunner => false,
    }
}

/// Run the first-time setup call for `deployment`
pub async fn setup(
    api: &dyn NodeApi,
    deployment: &NodeDeployment,
    credentials: &SetupCredentials,
) -> Result<CallOutcome, ControlError> {
    let outcome = match deployment.deployment_type {
        DeploymentType::SimpleDockerRun => api.create_container(deployment).await,
        DeploymentType::SimpleDockerCompose => api.setup_compose(deployment).await,
        DeploymentType::GithubActionRunner => {
            let token = credentials.github_token.as_ref().ok_or_else(|| {
                ControlError::MissingCredential(format!(
                    "runner deployment {} needs a github token",
                    deployment.name
                ))
            })?;
            api.setup_runner(deployment, token).await
        }
    };
    Ok(outcome)
}

/// Fetch the current status of `deployment` from its node
pub async fn status(api: &dyn NodeApi, deployment: &NodeDeployment) -> CallOutcome {
    match deployment.deployment_type {
        // Containers are named after their deployment
        DeploymentType::SimpleDockerRun => {
            api.container_detail(&deployment.name, ContainerAction::Logs)
                .await
        }
        DeploymentType::SimpleDockerCompose => api.compose_logs(deployment).await,
        DeploymentType::GithubActionRunner => api.runner_status(deployment).await,
    }
}

/// Re-apply `deployment` after its record changed
pub async fn update(api: &dyn NodeApi, deployment: &NodeDeployment) -> UpdateOutcome {
    match deployment.deployment_type {
        DeploymentType::SimpleDockerRun => {
            UpdateOutcome::Applied(api.create_container(deployment).await)
        }
        DeploymentType::SimpleDockerCompose => {
            UpdateOutcome::Applied(api.setup_compose(deployment).await)
        }
        DeploymentType::GithubActionRunner => {
            info!(
                deployment_id = %deployment.id,
                "Runner deployments cannot be re-applied, skipping update"
            );
            UpdateOutcome::Skipped
        }
    }
}

/// Interpret a status body for display
pub fn interpret_status(deployment_type: DeploymentType, body: &str) -> StatusOutput {
    if body.trim().is_empty() {
        return StatusOutput::Empty;
    }

    match deployment_type {
        DeploymentType::GithubActionRunner => StatusOutput::Text(body.to_string()),
        DeploymentType::SimpleDockerRun | DeploymentType::SimpleDockerCompose => {
            match serde_json::from_str(body) {
                Ok(value) => StatusOutput::Json(value),
                Err(e) => StatusOutput::Unreadable {
                    error: e.to_string(),
                    raw: body.to_string(),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::testing::{deployment, ok, ScriptedAgent};

    #[tokio::test]
    async fn test_setup_routes_by_type() {
        let token = SetupCredentials {
            github_token: Some(SecretString::from("ghs_token".to_string())),
        };
        let cases = [
            (DeploymentType::SimpleDockerRun, "create_container"),
            (DeploymentType::SimpleDockerCompose, "setup_compose"),
            (DeploymentType::GithubActionRunner, "setup_runner"),
        ];

        for (kind, op) in cases {
            let agent = ScriptedAgent::new(ok("{}"));
            let outcome = setup(&agent, &deployment(kind), &token).await.unwrap();
            assert!(outcome.is_ok());
            assert_eq!(agent.calls(), vec![op.to_string()]);
        }
    }

    #[tokio::test]
    async fn test_runner_setup_without_token() {
        let agent = ScriptedAgent::new(ok("{}"));
        let result = setup(
            &agent,
            &deployment(DeploymentType::GithubActionRunner),
            &SetupCredentials::default(),
        )
        .await;

        assert!(matches!(result, Err(ControlError::MissingCredential(_))));
        assert!(agent.calls().is_empty());
    }

    #[tokio::test]
    async fn test_status_routes_by_type() {
        let agent = ScriptedAgent::new(ok("[]"));
        status(&agent, &deployment(DeploymentType::SimpleDockerRun)).await;
        status(&agent, &deployment(DeploymentType::SimpleDockerCompose)).await;
        status(&agent, &deployment(DeploymentType::GithubActionRunner)).await;

        assert_eq!(
            agent.calls(),
            vec!["container_logs:web", "compose_logs", "runner_status"]
        );
    }

    #[tokio::test]
    async fn test_runner_update_is_skipped_without_calls() {
        let agent = ScriptedAgent::new(ok("{}"));
        let outcome = update(&agent, &deployment(DeploymentType::GithubActionRunner)).await;

        assert_eq!(outcome, UpdateOutcome::Skipped);
        assert!(agent.calls().is_empty());
        assert!(!is_reappliable(DeploymentType::GithubActionRunner));
    }

    #[tokio::test]
    async fn test_update_reruns_setup() {
        let agent = ScriptedAgent::new(ok("{}"));
        let outcome = update(&agent, &deployment(DeploymentType::SimpleDockerCompose)).await;

        assert_eq!(outcome, UpdateOutcome::Applied(ok("{}")));
        assert_eq!(agent.calls(), vec!["setup_compose"]);
    }

    #[test]
    fn test_interpret_status() {
        let body = r#"{"services":[{"name":"web","state":"running"}],"count":1}"#;
        match interpret_status(DeploymentType::SimpleDockerCompose, body) {
            StatusOutput::Json(value) => assert_eq!(value.to_string(), body),
            other => panic!("unexpected {:?}", other),
        }

        let text = "Runner web: idle\nlast job 3m ago";
        assert_eq!(
            interpret_status(DeploymentType::GithubActionRunner, text),
            StatusOutput::Text(text.to_string())
        );

        assert!(matches!(
            interpret_status(DeploymentType::SimpleDockerRun, "not json"),
            StatusOutput::Unreadable { raw, .. } if raw == "not json"
        ));
        assert_eq!(
            interpret_status(DeploymentType::SimpleDockerRun, ""),
            StatusOutput::Empty
        );
    }
}
