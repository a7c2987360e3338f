//! Supervised background jobs
//!
//! Jobs are grouped in lanes keyed by the entity they act on. A lane runs its
//! jobs one at a time in submission order; different lanes run concurrently.
//! A lane exists only while it has work. Each job runs in its own task, so a
//! panicking job is logged and the lane moves on.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::errors::ControlError;
use crate::models::deployment::DeploymentId;
use crate::models::node::NodeId;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Entity a job acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Node(NodeId),
    Deployment(DeploymentId),
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Node(id) => write!(f, "node:{}", id),
            EntityKey::Deployment(id) => write!(f, "deployment:{}", id),
        }
    }
}

struct Task {
    label: &'static str,
    job: Job,
}

#[derive(Default)]
struct Lanes {
    closed: bool,

    /// Present while the lane's worker is alive
    waiting: HashMap<EntityKey, VecDeque<Task>>,
}

#[derive(Default)]
struct Inner {
    lanes: Mutex<Lanes>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Per-entity serialized job queue
#[derive(Clone, Default)]
pub struct TaskQueue {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `job` on the lane for `key`; fails once shutdown has begun
    pub fn submit<F>(&self, key: EntityKey, label: &'static str, job: F) -> Result<(), ControlError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = Task {
            label,
            job: Box::pin(job),
        };

        let mut lanes = lock(&self.inner.lanes);
        if lanes.closed {
            return Err(ControlError::ShuttingDown);
        }

        if let Some(waiting) = lanes.waiting.get_mut(&key) {
            debug!(%key, task = label, "Queued behind {} job(s)", waiting.len() + 1);
            waiting.push_back(task);
            return Ok(());
        }
        lanes.waiting.insert(key, VecDeque::new());

        // Registered before the lanes lock drops so shutdown cannot miss it
        let handle = tokio::spawn(run_lane(self.inner.clone(), key, task));
        let mut workers = lock(&self.inner.workers);
        workers.retain(|h| !h.is_finished());
        workers.push(handle);
        Ok(())
    }

    /// Number of lanes with a job running
    pub fn active_lanes(&self) -> usize {
        lock(&self.inner.lanes).waiting.len()
    }

    /// Refuse new jobs and wait for every lane to drain
    pub async fn shutdown(&self) {
        lock(&self.inner.lanes).closed = true;

        let workers: Vec<JoinHandle<()>> = lock(&self.inner.workers).drain(..).collect();
        info!("Waiting for {} job lane(s) to drain...", workers.len());

        for result in futures::future::join_all(workers).await {
            if let Err(e) = result {
                error!("Job lane ended abnormally: {}", e);
            }
        }
    }
}

async fn run_lane(inner: Arc<Inner>, key: EntityKey, first: Task) {
    let mut task = first;
    loop {
        debug!(%key, task = task.label, "Running job");
        if let Err(e) = tokio::spawn(task.job).await {
            error!(%key, task = task.label, "Job failed: {}", e);
        }

        let next = {
            let mut lanes = lock(&inner.lanes);
            let next = lanes.waiting.get_mut(&key).and_then(|w| w.pop_front());
            if next.is_none() {
                lanes.waiting.remove(&key);
            }
            next
        };

        match next {
            Some(next) => task = next,
            None => return,
        }
    }
}
