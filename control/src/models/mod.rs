//! Record models

pub mod deployment;
pub mod node;
