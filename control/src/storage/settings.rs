//! Settings file management

use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::deploy::adoption::AdoptionOptions;
use crate::errors::ControlError;
use crate::filesys::file::File;
use crate::http::client::ClientOptions;
use crate::logs::LogLevel;

/// Environment variable that overrides `encryption_key`
pub const ENCRYPTION_KEY_ENV: &str = "FLEETCTL_ENCRYPTION_KEY";

/// Control plane settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_level: LogLevel,

    /// JSON lines on stdout
    #[serde(default)]
    pub log_json: bool,

    /// Also write rotated log files under the data directory
    #[serde(default)]
    pub log_to_file: bool,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub agent_client: AgentClientSettings,

    #[serde(default)]
    pub adoption: AdoptionSettings,

    #[serde(default)]
    pub storage: StoreSettings,

    /// Base64 AES-256 key sealing node keys at rest
    #[serde(default, skip_serializing)]
    pub encryption_key: Option<SecretString>,
}

impl Settings {
    /// Load from `file`, falling back to defaults when it does not exist
    pub async fn load(file: &File) -> Result<Self, ControlError> {
        let settings = if file.exists().await {
            debug!("Loading settings from {}", file.path().display());
            file.read_json::<Settings>().await.map_err(|e| {
                ControlError::ConfigError(format!("{}: {}", file.path().display(), e))
            })?
        } else {
            info!(
                "No settings at {}, using defaults",
                file.path().display()
            );
            Settings::default()
        };

        let settings = settings.with_env_key(std::env::var(ENCRYPTION_KEY_ENV).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// Prefer a key from the environment over the file
    pub fn with_env_key(mut self, key: Option<String>) -> Self {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.encryption_key = Some(SecretString::from(key));
        }
        self
    }

    pub fn validate(&self) -> Result<(), ControlError> {
        if self.server.port == 0 {
            return Err(ControlError::ConfigError("server.port must be positive".to_string()));
        }
        if self.agent_client.timeout_secs == 0 {
            return Err(ControlError::ConfigError(
                "agent_client.timeout_secs must be positive".to_string(),
            ));
        }
        if self.adoption.max_attempts == 0 {
            return Err(ControlError::ConfigError(
                "adoption.max_attempts must be positive".to_string(),
            ));
        }
        if !self.storage.in_memory && self.encryption_key.is_none() {
            return Err(ControlError::ConfigError(format!(
                "encryption_key (or {}) is required for the file store; generate one with --gen-key",
                ENCRYPTION_KEY_ENV
            )));
        }
        Ok(())
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout: Duration::from_secs(self.agent_client.timeout_secs),
            accept_invalid_certs: self.agent_client.accept_invalid_certs,
        }
    }

    pub fn adoption_options(&self) -> AdoptionOptions {
        AdoptionOptions {
            max_attempts: self.adoption.max_attempts,
            interval: Duration::from_secs(self.adoption.interval_secs),
        }
    }
}

/// HTTP API listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Node agent client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentClientSettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Development only, see the `insecure-tls` feature
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn default_timeout_secs() -> u64 {
    15
}

impl Default for AgentClientSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            accept_invalid_certs: false,
        }
    }
}

/// New node adoption
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdoptionSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_max_attempts() -> u32 {
    20
}

fn default_interval_secs() -> u64 {
    10
}

impl Default for AdoptionSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_secs: default_interval_secs(),
        }
    }
}

/// Record store backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Keep records in memory only; nothing survives a restart
    #[serde(default)]
    pub in_memory: bool,
}
