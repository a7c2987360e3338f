mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tokio_test::assert_ok;
use tower::ServiceExt;

use fleetctl::app::state::AppState;
use fleetctl::deploy::adoption::AdoptionOptions;
use fleetctl::http::client::{build_http_client, ClientOptions};
use fleetctl::http::node_api::HttpConnector;
use fleetctl::server::serve::router;
use fleetctl::server::state::ServerState;
use fleetctl::storage::records::MemoryStore;

use common::{dead_url, spawn_mock_agent, MockAgent, AGENT_KEY};

struct TestApp {
    app: Arc<AppState>,
    router: Router,
}

impl TestApp {
    fn new() -> Self {
        let http = build_http_client(&ClientOptions {
            timeout: Duration::from_secs(2),
            accept_invalid_certs: false,
        })
        .unwrap();
        let app = Arc::new(AppState::new(
            Arc::new(MemoryStore::new()),
            Arc::new(HttpConnector::new(http)),
            AdoptionOptions {
                max_attempts: 2,
                interval: Duration::from_millis(5),
            },
        ));
        let router = router(Arc::new(ServerState::new(app.clone())));
        Self { app, router }
    }

    async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn register(&self, api_url: &str) -> String {
        let (status, node) = self
            .call(
                Method::POST,
                "/nodes",
                Some(json!({
                    "hostname": "edge-01",
                    "ip": "127.0.0.1",
                    "api_url": api_url,
                    "key": AGENT_KEY,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        node["id"].as_str().unwrap().to_string()
    }

    /// Let every queued job finish
    async fn drain(&self) {
        assert_ok!(self.app.shutdown().await);
    }
}

/// Request bodies the agent received on `path`
fn bodies_sent(agent: &MockAgent, path: &str) -> Vec<String> {
    agent
        .requests_to(path)
        .into_iter()
        .map(|r| r.body)
        .collect()
}

#[tokio::test]
async fn test_service_health() {
    let test = TestApp::new();
    let (status, body) = test.call(Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "fleetctl");
}

#[tokio::test]
async fn test_register_node_adopts_in_background() {
    let agent = spawn_mock_agent().await;
    let test = TestApp::new();

    let (status, node) = test
        .call(
            Method::POST,
            "/nodes",
            Some(json!({
                "hostname": "edge-01",
                "ip": "127.0.0.1",
                "api_url": agent.base_url,
                "key": AGENT_KEY,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(node["status"], "pending_init");
    assert!(node.get("key").is_none());

    let id = node["id"].as_str().unwrap().to_string();
    test.drain().await;

    let (status, node) = test.call(Method::GET, &format!("/nodes/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(node["status"], "healthy");
    assert_eq!(agent.requests_to("/health").len(), 1);
}

#[tokio::test]
async fn test_unreachable_node_ends_init_failed() {
    let test = TestApp::new();
    let id = test.register(&dead_url().await).await;
    test.drain().await;

    let (_, node) = test.call(Method::GET, &format!("/nodes/{}", id), None).await;
    assert_eq!(node["status"], "init_failed");
}

#[tokio::test]
async fn test_invalid_node_is_422() {
    let test = TestApp::new();
    let (status, body) = test
        .call(
            Method::POST,
            "/nodes",
            Some(json!({
                "hostname": "edge-01",
                "ip": "not-an-ip",
                "api_url": "https://edge-01.example.net",
                "key": "short",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("ip"));
    assert!(message.contains("key"));
}

#[tokio::test]
async fn test_unknown_ids_are_404() {
    let test = TestApp::new();
    let missing = uuid::Uuid::new_v4();

    let (status, body) = test.call(Method::GET, &format!("/nodes/{}", missing), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (status, _) = test
        .call(Method::DELETE, &format!("/deployments/{}", missing), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_compose_deployment_is_provisioned() {
    let agent = spawn_mock_agent().await;
    let test = TestApp::new();
    let node_id = test.register(&agent.base_url).await;

    let (status, deployment) = test
        .call(
            Method::POST,
            "/deployments",
            Some(json!({
                "node_id": node_id,
                "name": "web",
                "deployment_type": "simple_docker_compose",
                "compose": "services:\n  web:\n    image: nginx\n",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(deployment["status"], "pending_init");
    let id = deployment["id"].as_str().unwrap().to_string();

    test.drain().await;

    let (_, deployment) = test
        .call(Method::GET, &format!("/deployments/{}", id), None)
        .await;
    assert_eq!(deployment["status"], "healthy");

    let bodies = bodies_sent(&agent, "/docker/compose");
    assert_eq!(bodies.len(), 1);
    let sent: Value = serde_json::from_str(&bodies[0]).unwrap();
    assert_eq!(sent["compose"], "services:\n  web:\n    image: nginx\n");
}

#[tokio::test]
async fn test_runner_token_is_forwarded_not_stored() {
    let agent = spawn_mock_agent().await;
    let test = TestApp::new();
    let node_id = test.register(&agent.base_url).await;

    let (status, deployment) = test
        .call(
            Method::POST,
            "/deployments",
            Some(json!({
                "node_id": node_id,
                "name": "ci",
                "deployment_type": "github_action_runner",
                "git_url": "https://github.com/acme/web",
                "github_token": "ghr_secret_token",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(!deployment.to_string().contains("ghr_secret_token"));
    let id = deployment["id"].as_str().unwrap().to_string();

    test.drain().await;

    let (_, deployment) = test
        .call(Method::GET, &format!("/deployments/{}", id), None)
        .await;
    assert_eq!(deployment["status"], "healthy");
    assert!(!deployment.to_string().contains("ghr_secret_token"));

    let bodies = bodies_sent(&agent, "/runner");
    let sent: Value = serde_json::from_str(&bodies[0]).unwrap();
    assert_eq!(sent["token"], "ghr_secret_token");
}

#[tokio::test]
async fn test_runner_without_token_fails_setup() {
    let agent = spawn_mock_agent().await;
    let test = TestApp::new();
    let node_id = test.register(&agent.base_url).await;

    let (_, deployment) = test
        .call(
            Method::POST,
            "/deployments",
            Some(json!({
                "node_id": node_id,
                "name": "ci",
                "deployment_type": "github_action_runner",
                "git_url": "https://github.com/acme/web",
            })),
        )
        .await;
    let id = deployment["id"].as_str().unwrap().to_string();

    test.drain().await;

    let (_, deployment) = test
        .call(Method::GET, &format!("/deployments/{}", id), None)
        .await;
    assert_eq!(deployment["status"], "init_failed");
    assert!(agent.requests_to("/runner").is_empty());
}

#[tokio::test]
async fn test_deployment_for_unknown_node_is_422() {
    let test = TestApp::new();
    let (status, _) = test
        .call(
            Method::POST,
            "/deployments",
            Some(json!({
                "node_id": uuid::Uuid::new_v4(),
                "name": "web",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_list_filter_and_cascade_delete() {
    let agent = spawn_mock_agent().await;
    let test = TestApp::new();
    let first = test.register(&agent.base_url).await;
    let second = test.register(&agent.base_url).await;

    for (node_id, name) in [(&first, "web"), (&first, "db"), (&second, "cache")] {
        let (status, _) = test
            .call(
                Method::POST,
                "/deployments",
                Some(json!({ "node_id": node_id, "name": name })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, all) = test.call(Method::GET, "/deployments", None).await;
    assert_eq!(all.as_array().unwrap().len(), 3);

    let (_, filtered) = test
        .call(Method::GET, &format!("/deployments?node_id={}", first), None)
        .await;
    let mut names: Vec<&str> = filtered
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();
    names.sort();
    assert_eq!(names, vec!["db", "web"]);

    let (status, body) = test
        .call(Method::DELETE, &format!("/nodes/{}", first), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (_, remaining) = test.call(Method::GET, "/deployments", None).await;
    let remaining = remaining.as_array().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0]["name"], "cache");
}

#[tokio::test]
async fn test_read_paths_reconcile_node_status() {
    let agent = spawn_mock_agent().await;
    let test = TestApp::new();
    let id = test.register(&agent.base_url).await;
    test.drain().await;

    let (status, health) = test
        .call(Method::GET, &format!("/nodes/{}/health", id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["stats"]["memory_total"], 8192);

    let (_, containers) = test
        .call(Method::GET, &format!("/nodes/{}/containers", id), None)
        .await;
    let entries = containers["containers"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["node_id"], id.as_str());

    let (_, logs) = test
        .call(Method::GET, &format!("/nodes/{}/containers/a1/logs", id), None)
        .await;
    assert_eq!(logs["logs"], json!(["booting", "ready"]));

    // Decoded ids with separators never reach the agent
    let (status, _) = test
        .call(
            Method::GET,
            &format!("/nodes/{}/containers/..%2F..%2Frunner", id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(agent.requests_to("/runner").is_empty());

    agent.set_healthy(false);
    let (_, health) = test
        .call(Method::GET, &format!("/nodes/{}/health", id), None)
        .await;
    assert_eq!(health["status"], "connection_lost");
    assert_eq!(health["stats"]["memory_total"], -1);

    let (_, node) = test.call(Method::GET, &format!("/nodes/{}", id), None).await;
    assert_eq!(node["status"], "connection_lost");
}

#[tokio::test]
async fn test_decommissioned_node_keeps_status() {
    let agent = spawn_mock_agent().await;
    let test = TestApp::new();
    let id = test.register(&agent.base_url).await;
    test.drain().await;

    let (status, node) = test
        .call(Method::POST, &format!("/nodes/{}/decommission", id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(node["status"], "decommissioned");

    agent.set_healthy(false);
    let (_, health) = test
        .call(Method::GET, &format!("/nodes/{}/health", id), None)
        .await;
    assert_eq!(health["status"], "decommissioned");
}

#[tokio::test]
async fn test_compose_status_output() {
    let agent = spawn_mock_agent().await;
    let test = TestApp::new();
    let node_id = test.register(&agent.base_url).await;

    let (_, deployment) = test
        .call(
            Method::POST,
            "/deployments",
            Some(json!({
                "node_id": node_id,
                "name": "web",
                "deployment_type": "simple_docker_compose",
                "compose": "services: {}",
            })),
        )
        .await;
    let id = deployment["id"].as_str().unwrap().to_string();
    test.drain().await;

    let (status, view) = test
        .call(Method::GET, &format!("/deployments/{}/status", id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "healthy");
    assert_eq!(view["output"]["format"], "json");
    assert_eq!(view["output"]["output"], json!(["web  running", "db  running"]));
}
