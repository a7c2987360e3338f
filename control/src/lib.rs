//! fleetctl
//!
//! Control plane for a fleet of node agents. Tracks nodes and their
//! deployments, adopts newly registered nodes, and drives deployment setup
//! against each node's HTTP API.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod models;
pub mod server;
pub mod storage;
pub mod utils;
pub mod workers;
