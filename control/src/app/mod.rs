//! Application wiring and lifecycle

pub mod control;
pub mod options;
pub mod run;
pub mod state;
