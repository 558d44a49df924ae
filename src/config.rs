use crate::{EmsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Smallest frame that still fits a connect handshake with short paths.
pub const MIN_MESSAGE_SIZE: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub server_pipe: PathBuf,
    pub access_delay_us: u64,
    pub max_sessions: usize,
    pub message_size: usize,
    pub shutdown_timeout_secs: u64,
    #[serde(default)]
    pub additional_properties: HashMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_pipe: PathBuf::from("/tmp/ems_server"),
            access_delay_us: 0,
            max_sessions: 10,
            message_size: 4096,
            shutdown_timeout_secs: 5,
            additional_properties: HashMap::new(),
        }
    }
}

impl ServerConfig {
    pub fn access_delay(&self) -> Duration {
        Duration::from_micros(self.access_delay_us)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Layers `EMS_*` environment variables over this config.
    pub fn with_env_overrides(self) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&self)?)
            .add_source(config::Environment::with_prefix("EMS").try_parsing(true))
            .build()?;

        let config: ServerConfig = settings.try_deserialize()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_sessions == 0 {
            return Err(EmsError::InvalidArgument(
                "max_sessions must be at least 1".to_string(),
            ));
        }
        if self.message_size < MIN_MESSAGE_SIZE {
            return Err(EmsError::InvalidArgument(format!(
                "message_size must be at least {} bytes, got {}",
                MIN_MESSAGE_SIZE, self.message_size
            )));
        }
        Ok(())
    }
}
