//! Node agent API models
//!
//! Request and response shapes shared between the control plane and the
//! node agent HTTP service.

pub mod models;

pub use models::*;
