//! Application configuration options

use std::time::Duration;

use secrecy::SecretString;

use crate::deploy::adoption::AdoptionOptions;
use crate::http::client::ClientOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;

/// Main application options
#[derive(Debug, Clone, Default)]
pub struct AppOptions {
    pub lifecycle: LifecycleOptions,
    pub storage: StorageOptions,
    pub server: ServerOptions,

    /// Node agent client
    pub client: ClientOptions,

    /// New node adoption
    pub adoption: AdoptionOptions,
}

impl AppOptions {
    pub fn from_settings(settings: &Settings, layout: StorageLayout) -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            storage: StorageOptions {
                layout,
                in_memory: settings.storage.in_memory,
                encryption_key: settings.encryption_key.clone(),
            },
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            client: settings.client_options(),
            adoption: settings.adoption_options(),
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Upper bound for draining jobs and stopping the server
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Record storage options
#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    pub layout: StorageLayout,

    /// Skip the file store
    pub in_memory: bool,

    /// Seals node keys in the file store
    pub encryption_key: Option<SecretString>,
}

/// HTTP API server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub host: String,
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}
