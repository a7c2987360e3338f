//! Node and deployment lifecycle

pub mod adoption;
pub mod dispatch;
pub mod fsm;
pub mod inspect;
pub mod orchestrator;

#[cfg(test)]
pub(crate) mod testing;
