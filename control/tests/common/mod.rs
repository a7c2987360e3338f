//! In-process node agent for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::Router;
use secrecy::SecretString;
use tokio::net::TcpListener;

use fleetctl::models::node::{NewNode, Node};

pub const AGENT_KEY: &str = "0123456789abcdef";

pub const HEALTH_BODY: &str = r#"{"memory_total":8192,"memory_swapped":0,"memory_free":4096,"memory_buffer":128,"memory_cache":512,"io_bytes_in":10,"io_bytes_out":20,"cpu_usage":3}"#;

/// One request as the agent saw it
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub api_key: Option<String>,
    pub content_type: Option<String>,
    pub body: String,
}

#[derive(Default)]
struct AgentState {
    healthy: AtomicBool,
    requests: Mutex<Vec<Recorded>>,
}

#[derive(Clone)]
pub struct MockAgent {
    pub base_url: String,
    state: Arc<AgentState>,
}

impl MockAgent {
    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.state.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Fields to register this agent as a node
    pub fn new_node(&self) -> NewNode {
        NewNode {
            hostname: "edge-01".to_string(),
            ip: "127.0.0.1".to_string(),
            api_url: self.base_url.clone(),
            port: None,
            key: SecretString::from(AGENT_KEY.to_string()),
        }
    }

    pub fn node(&self) -> Node {
        self.new_node().into_node().unwrap()
    }
}

pub async fn spawn_mock_agent() -> MockAgent {
    let state = Arc::new(AgentState {
        healthy: AtomicBool::new(true),
        requests: Mutex::new(Vec::new()),
    });

    let app = Router::new().fallback(handle).with_state(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockAgent {
        base_url: format!("http://{}", addr),
        state,
    }
}

/// A base URL nothing listens on
pub async fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

async fn handle(
    State(state): State<Arc<AgentState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let recorded = Recorded {
        method: method.clone(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        api_key: header("x-api-key"),
        content_type: header("content-type"),
        body,
    };
    state.requests.lock().unwrap().push(recorded.clone());

    if recorded.api_key.as_deref() != Some(AGENT_KEY) {
        return (StatusCode::UNAUTHORIZED, "unauthorized".to_string());
    }

    let path = recorded.path.as_str();
    match (method, path) {
        (Method::GET, "/health") => {
            if state.healthy.load(Ordering::SeqCst) {
                (StatusCode::OK, HEALTH_BODY.to_string())
            } else {
                (StatusCode::SERVICE_UNAVAILABLE, "starting".to_string())
            }
        }
        (Method::GET, "/docker/containers/list") => (
            StatusCode::OK,
            r#"[{"id":"a1","name":"web"},{"id":"b2","name":"db"}]"#.to_string(),
        ),
        (Method::GET, "/docker/compose/status") => {
            (StatusCode::OK, r#"["web  running","db  running"]"#.to_string())
        }
        (Method::GET, "/runner/status") => (StatusCode::OK, "runner idle".to_string()),
        (Method::GET, p) if p.starts_with("/docker/container/") && p.ends_with("/inspect") => {
            (StatusCode::OK, r#"{"Id":"a1","State":{"Running":true}}"#.to_string())
        }
        (Method::GET, p) if p.starts_with("/docker/container/") && p.ends_with("/logs") => {
            (StatusCode::OK, r#"["booting","ready"]"#.to_string())
        }
        (Method::POST, "/docker/containers/create" | "/docker/compose" | "/runner") => {
            (StatusCode::OK, r#"{"ok":true}"#.to_string())
        }
        _ => (StatusCode::NOT_FOUND, "NOT FOUND".to_string()),
    }
}
