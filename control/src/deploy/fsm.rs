//! Status state machine for nodes and deployments
//!
//! Nodes and deployments share one lifecycle. Transitions are event driven:
//! any remote-call outcome may move an entity between the four live states,
//! while `decommissioned` is entered and left only by an administrator.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ControlError;
use crate::http::client::CallOutcome;

/// Lifecycle status of a node or deployment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Registered, first remote check not finished yet
    #[default]
    PendingInit,

    /// First setup or adoption never succeeded
    InitFailed,

    /// Last remote call succeeded
    Healthy,

    /// Was reachable before, last remote call failed
    ConnectionLost,

    /// Retired by an administrator
    Decommissioned,
}

/// Node status
pub type NodeStatus = Status;

/// Deployment status
pub type DeploymentStatus = Status;

/// Persisted code and name of every status
const STATUS_TABLE: [(i32, &str, Status); 5] = [
    (0, "pending_init", Status::PendingInit),
    (1, "init_failed", Status::InitFailed),
    (2, "healthy", Status::Healthy),
    (3, "connection_lost", Status::ConnectionLost),
    (4, "decommissioned", Status::Decommissioned),
];

impl Status {
    /// Integer stored for this status
    pub fn code(self) -> i32 {
        STATUS_TABLE
            .iter()
            .find(|(_, _, s)| *s == self)
            .map(|(code, _, _)| *code)
            .unwrap_or_default()
    }

    /// Snake-case name of this status
    pub fn name(self) -> &'static str {
        STATUS_TABLE
            .iter()
            .find(|(_, _, s)| *s == self)
            .map(|(_, name, _)| *name)
            .unwrap_or_default()
    }

    /// Resolve a stored integer
    pub fn from_code(code: i32) -> Result<Self, ControlError> {
        STATUS_TABLE
            .iter()
            .find(|(c, _, _)| *c == code)
            .map(|(_, _, s)| *s)
            .ok_or_else(|| ControlError::InvalidRecord(format!("unknown status code {}", code)))
    }

    /// Whether only an administrator may move the entity out of this status
    pub fn is_terminal(self) -> bool {
        self == Status::Decommissioned
    }

    /// Apply an event and return the resulting status
    pub fn apply(self, event: StatusEvent) -> Result<Status, ControlError> {
        let next = match (self, event) {
            (_, StatusEvent::Administrative(target)) => target,

            (Status::Decommissioned, event) => {
                return Err(ControlError::TransitionError(format!(
                    "decommissioned entity ignores {:?}",
                    event
                )));
            }

            (_, StatusEvent::RemoteSucceeded) => Status::Healthy,
            (_, StatusEvent::RemoteFailed(Phase::FirstSetup)) => Status::InitFailed,
            (_, StatusEvent::RemoteFailed(Phase::Established)) => Status::ConnectionLost,
        };
        Ok(next)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Status {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        STATUS_TABLE
            .iter()
            .find(|(_, name, _)| *name == s)
            .map(|(_, _, status)| *status)
            .ok_or_else(|| ControlError::ValidationError(format!("unknown status: {}", s)))
    }
}

/// Where in an entity's life a remote call happens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Adoption, provisioning and re-provisioning
    FirstSetup,

    /// Liveness and read checks on an entity that was already set up
    Established,
}

/// Status event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    /// Remote call answered 200
    RemoteSucceeded,

    /// Remote call failed or answered non-200
    RemoteFailed(Phase),

    /// Explicit operator action
    Administrative(Status),
}

/// Outcome of reconciling a remote call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub status: Status,

    /// Response body, kept for display even on failure
    pub body: Option<String>,
}

impl Reconciled {
    pub fn is_healthy(&self) -> bool {
        self.status == Status::Healthy
    }

    /// The event that writes this result
    pub fn event(&self, phase: Phase) -> StatusEvent {
        if self.is_healthy() {
            StatusEvent::RemoteSucceeded
        } else {
            StatusEvent::RemoteFailed(phase)
        }
    }
}

/// Turn a remote call outcome into a status
pub fn reconcile(outcome: &CallOutcome, phase: Phase) -> Reconciled {
    let event = if outcome.is_ok() {
        StatusEvent::RemoteSucceeded
    } else {
        StatusEvent::RemoteFailed(phase)
    };

    // Neither event is rejected from a live status
    let status = Status::PendingInit.apply(event).unwrap_or(Status::InitFailed);

    Reconciled {
        status,
        body: outcome.body().map(str::to_string),
    }
}
