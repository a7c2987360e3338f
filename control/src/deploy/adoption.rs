//! Adoption of newly registered nodes
//!
//! A new node is polled on its health endpoint at a fixed interval until it
//! answers 200 or the attempts run out. There is no backoff and no jitter,
//! and no sleep after the last attempt.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::deploy::fsm::{reconcile, Phase, Status, StatusEvent};
use crate::errors::ControlError;
use crate::http::node_api::NodeApi;
use crate::models::node::NodeId;
use crate::storage::records::RecordStore;

/// Adoption options
#[derive(Debug, Clone)]
pub struct AdoptionOptions {
    /// Health checks before giving up
    pub max_attempts: u32,

    /// Pause between two checks
    pub interval: Duration,
}

impl Default for AdoptionOptions {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            interval: Duration::from_secs(10),
        }
    }
}

/// How adoption ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdoptionReport {
    /// `healthy` or `init_failed`
    pub status: Status,
    pub attempts: u32,
}

/// Check health until the first 200 or until `max_attempts` checks failed
pub async fn poll_until_healthy<S, F>(
    api: &dyn NodeApi,
    options: &AdoptionOptions,
    sleep_fn: S,
) -> AdoptionReport
where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    let max_attempts = options.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        let outcome = api.health().await;
        if reconcile(&outcome, Phase::FirstSetup).is_healthy() {
            return AdoptionReport {
                status: Status::Healthy,
                attempts: attempt,
            };
        }

        debug!(attempt, "Health check failed: {}", outcome.describe());
        if attempt < max_attempts {
            sleep_fn(options.interval).await;
        }
    }

    AdoptionReport {
        status: Status::InitFailed,
        attempts: max_attempts,
    }
}

/// Adopt `node_id` and persist the result
pub async fn adopt<S, F>(
    store: &dyn RecordStore,
    api: &dyn NodeApi,
    node_id: &NodeId,
    options: &AdoptionOptions,
    sleep_fn: S,
) -> Result<AdoptionReport, ControlError>
where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!(node_id = %node_id, max_attempts = options.max_attempts, "Adopting node");

    let report = poll_until_healthy(api, options, sleep_fn).await;
    let event = match report.status {
        Status::Healthy => StatusEvent::RemoteSucceeded,
        _ => StatusEvent::RemoteFailed(Phase::FirstSetup),
    };
    let status = store.transition_node_status(node_id, event).await?;

    if status == Status::Healthy {
        info!(node_id = %node_id, attempts = report.attempts, "Node adopted");
    } else {
        warn!(
            node_id = %node_id,
            attempts = report.attempts,
            "Node never became healthy, marking {}",
            status
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::deploy::testing::{ok, unreachable, ScriptedAgent};
    use crate::models::node::NewNode;
    use crate::storage::records::MemoryStore;
    use secrecy::SecretString;

    fn counting_sleep(count: Arc<AtomicUsize>) -> impl Fn(Duration) -> futures::future::Ready<()> {
        move |_| {
            count.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(())
        }
    }

    #[tokio::test]
    async fn test_success_on_last_attempt() {
        let agent = ScriptedAgent::new(ok("{}")).with_health(vec![unreachable(); 19], ok("{}"));
        let sleeps = Arc::new(AtomicUsize::new(0));

        let report = poll_until_healthy(
            &agent,
            &AdoptionOptions::default(),
            counting_sleep(sleeps.clone()),
        )
        .await;

        assert_eq!(report.status, Status::Healthy);
        assert_eq!(report.attempts, 20);
        assert_eq!(agent.count("health"), 20);
        assert_eq!(sleeps.load(Ordering::SeqCst), 19);
    }

    #[tokio::test]
    async fn test_gives_up_without_extra_call() {
        let agent = ScriptedAgent::new(ok("{}")).with_health(vec![], unreachable());
        let sleeps = Arc::new(AtomicUsize::new(0));

        let report = poll_until_healthy(
            &agent,
            &AdoptionOptions::default(),
            counting_sleep(sleeps.clone()),
        )
        .await;

        assert_eq!(report.status, Status::InitFailed);
        assert_eq!(agent.count("health"), 20);
        assert_eq!(sleeps.load(Ordering::SeqCst), 19);
    }

    #[tokio::test]
    async fn test_non_200_counts_as_failure() {
        let refused = crate::http::client::CallOutcome::Success {
            status_code: 401,
            body: "unauthorized".to_string(),
        };
        let agent = ScriptedAgent::new(ok("{}")).with_health(vec![refused], ok("{}"));
        let options = AdoptionOptions {
            max_attempts: 3,
            interval: Duration::from_secs(10),
        };

        let report = poll_until_healthy(&agent, &options, |_| async {}).await;
        assert_eq!(report.attempts, 2);
        assert_eq!(report.status, Status::Healthy);
    }

    #[tokio::test]
    async fn test_adopt_persists_status() {
        let store = MemoryStore::new();
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
        let agent = ScriptedAgent::new(ok("{}")).with_health(vec![], unreachable());
        let options = AdoptionOptions {
            max_attempts: 2,
            interval: Duration::ZERO,
        };

        adopt(&store, &agent, &node.id, &options, |_| async {})
            .await
            .unwrap();

        assert_eq!(
            store.get_node(&node.id).await.unwrap().status,
            Status::InitFailed
        );
    }
}
