//! Server configuration.
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//!
//! ```toml
//! endpoint = 1
//! service_id = 7
//! queue_depth = 128
//! log_filter = "ramdiskfs_core=debug,info"
//!
//! [ramdisk]
//! max_files = 64
//! default_alloc_size = 4096
//! memory_limit = 16777216
//! ```

use std::path::{Path, PathBuf};

use ramdiskfs_core::{RamDiskConfig, ServiceIdentity};
use ramdiskfs_types::{Endpoint, Epoch, ServiceId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DEFAULT_EPOCH, DEFAULT_LOG_FILTER, DEFAULT_QUEUE_DEPTH, DEFAULT_SERVER_ENDPOINT,
    DEFAULT_SERVICE_ID,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Table and memory limits.
    pub ramdisk: RamDiskConfig,
    pub service_id: ServiceId,
    /// Epoch of a fresh start; a restart keeps the saved one.
    pub epoch: Epoch,
    /// Endpoint the server receives on.
    pub endpoint: Endpoint,
    pub queue_depth: usize,
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ramdisk: RamDiskConfig::default(),
            service_id: ServiceId::new(DEFAULT_SERVICE_ID),
            epoch: Epoch::new(DEFAULT_EPOCH),
            endpoint: Endpoint::new(DEFAULT_SERVER_ENDPOINT),
            queue_depth: DEFAULT_QUEUE_DEPTH,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl ServerConfig {
    /// Read and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text)?;
        tracing::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let limits = &self.ramdisk;
        if limits.max_files == 0 {
            return Err(ConfigError::Invalid("ramdisk.max_files must be at least 1".into()));
        }
        if limits.max_filename_len == 0 {
            return Err(ConfigError::Invalid(
                "ramdisk.max_filename_len must be at least 1".into(),
            ));
        }
        if u32::try_from(limits.max_files).is_err() {
            return Err(ConfigError::Invalid(format!(
                "ramdisk.max_files {} does not fit a slot index",
                limits.max_files
            )));
        }
        if self.queue_depth == 0 {
            return Err(ConfigError::Invalid("queue_depth must be at least 1".into()));
        }
        if self.endpoint == Endpoint::NONE {
            return Err(ConfigError::Invalid("endpoint -1 is reserved".into()));
        }
        Ok(())
    }

    pub fn identity(&self) -> ServiceIdentity {
        ServiceIdentity {
            service: self.service_id,
            epoch: self.epoch,
        }
    }
}
