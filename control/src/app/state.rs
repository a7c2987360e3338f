//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::app::options::{AppOptions, StorageOptions};
use crate::deploy::adoption::AdoptionOptions;
use crate::deploy::inspect::Inspector;
use crate::deploy::orchestrator::DeploymentOrchestrator;
use crate::errors::ControlError;
use crate::http::client::build_http_client;
use crate::http::node_api::{AgentConnector, HttpConnector};
use crate::storage::crypto::KeyCipher;
use crate::storage::records::{FileStore, MemoryStore, RecordStore};
use crate::workers::tasks::TaskQueue;

/// Main application state
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub connector: Arc<dyn AgentConnector>,

    /// Background jobs, one lane per entity
    pub tasks: TaskQueue,

    pub orchestrator: DeploymentOrchestrator,
    pub inspector: Inspector,
    pub adoption: AdoptionOptions,
}

impl AppState {
    pub fn new(
        store: Arc<dyn RecordStore>,
        connector: Arc<dyn AgentConnector>,
        adoption: AdoptionOptions,
    ) -> Self {
        Self {
            orchestrator: DeploymentOrchestrator::new(store.clone(), connector.clone()),
            inspector: Inspector::new(store.clone(), connector.clone()),
            tasks: TaskQueue::new(),
            store,
            connector,
            adoption,
        }
    }

    /// Open the record store and build the shared agent client
    pub async fn init(options: &AppOptions) -> Result<Self, ControlError> {
        info!("Initializing application state...");

        let store = open_store(&options.storage).await?;
        let http = build_http_client(&options.client)?;
        let connector: Arc<dyn AgentConnector> = Arc::new(HttpConnector::new(http));

        Ok(Self::new(store, connector, options.adoption.clone()))
    }

    /// Stop taking jobs and let queued ones finish
    pub async fn shutdown(&self) -> Result<(), ControlError> {
        info!("Shutting down application state...");
        self.tasks.shutdown().await;
        Ok(())
    }
}

async fn open_store(options: &StorageOptions) -> Result<Arc<dyn RecordStore>, ControlError> {
    if options.in_memory {
        info!("Using the in-memory record store");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let key = options.encryption_key.as_ref().ok_or_else(|| {
        ControlError::ConfigError("the file store needs an encryption key".to_string())
    })?;
    let cipher = KeyCipher::from_base64(key)?;

    options.layout.setup().await?;
    let store = FileStore::open(options.layout.records_file(), cipher).await?;
    Ok(Arc::new(store))
}
