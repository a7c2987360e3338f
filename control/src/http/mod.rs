//! Node agent client

pub mod client;
pub mod node_api;
