//! API models

use serde::{Deserialize, Serialize};

/// Header carrying the node's shared secret
pub const API_KEY_HEADER: &str = "X-Api-Key";

/// Endpoint paths, relative to the agent base URL
pub mod paths {
    pub const HEALTH: &str = "health";
    pub const CONTAINERS_LIST: &str = "docker/containers/list";
    pub const CONTAINERS_CREATE: &str = "docker/containers/create";
    pub const COMPOSE: &str = "docker/compose";
    pub const COMPOSE_STATUS: &str = "docker/compose/status";
    pub const RUNNER: &str = "runner";
    pub const RUNNER_STATUS: &str = "runner/status";

    /// Prefix of `docker/container/{id}/{action}`; id and action are
    /// appended as encoded path segments
    pub const CONTAINER: &str = "docker/container";

    /// Docker container id or name: `[A-Za-z0-9][A-Za-z0-9_.-]*`
    pub fn is_container_ref(id: &str) -> bool {
        let mut chars = id.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphanumeric() => chars
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')),
            _ => false,
        }
    }
}

/// Resource metrics reported by `GET /health`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStats {
    pub memory_total: i64,
    pub memory_swapped: i64,
    pub memory_free: i64,
    pub memory_buffer: i64,
    pub memory_cache: i64,
    pub io_bytes_in: i64,
    pub io_bytes_out: i64,
    pub cpu_usage: i64,
}

impl HealthStats {
    /// Placeholder shown when the node could not be reached.
    ///
    /// Every field is `-1`; consumers key off that exact shape.
    pub const fn sentinel() -> Self {
        Self {
            memory_total: -1,
            memory_swapped: -1,
            memory_free: -1,
            memory_buffer: -1,
            memory_cache: -1,
            io_bytes_in: -1,
            io_bytes_out: -1,
            cpu_usage: -1,
        }
    }
}

/// `POST /docker/containers/create`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateContainerRequest {
    pub name: String,
    pub path: String,
    pub git_url: Option<String>,
}

/// `POST /docker/compose`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeRequest {
    pub path: String,
    pub compose: String,
}

/// `POST /runner`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerRequest {
    pub token: String,
    pub path: String,
    pub git_url: Option<String>,
}
