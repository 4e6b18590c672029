//! # Resources Configuration
//!
//! One TOML document describing both subsystems:
//!
//! ```toml
//! worker_stack_size = "64KiB"
//!
//! [memory]
//! general_purpose = "1MB"
//! stack = "1MB"
//! thread_private = true
//!
//! [[memory.pools]]
//! element_size = 32
//! num_elements = 1000
//!
//! [thread_pool]
//! initial_threads = 4
//! idle_sleep_us = 100
//! ```

use std::path::Path;

use gdl_cpu::ThreadPoolConfig;
use gdl_memory::{MemoryConfig, MemorySize};
use serde::{Deserialize, Serialize};

use crate::error::{ResourcesError, ResourcesResult};

/// Configuration of the memory manager and the thread pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResourcesConfig {
    /// Stores of the memory manager.
    pub memory: MemoryConfig,
    /// Thread pool startup parameters.
    pub thread_pool: ThreadPoolConfig,
    /// Private memory stack created by every worker thread; requires
    /// `memory.thread_private`.
    pub worker_stack_size: Option<MemorySize>,
}

impl ResourcesConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ResourcesError::Parse`] for malformed input and
    /// [`ResourcesError::InvalidConfig`] for contradicting settings.
    pub fn from_toml_str(source: &str) -> ResourcesResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ResourcesError::Io`] if the file cannot be read, otherwise
    /// see [`ResourcesConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> ResourcesResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|source| ResourcesError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&source)
    }

    /// Checks settings that depend on each other.
    ///
    /// # Errors
    ///
    /// Returns [`ResourcesError::InvalidConfig`] describing the conflict.
    pub fn validate(&self) -> ResourcesResult<()> {
        match self.worker_stack_size {
            Some(_) if !self.memory.thread_private => Err(ResourcesError::InvalidConfig(
                "worker_stack_size requires memory.thread_private = true".into(),
            )),
            Some(size) if size.num_bytes() == 0 => {
                Err(ResourcesError::InvalidConfig("worker_stack_size must not be zero".into()))
            }
            _ => Ok(()),
        }
    }
}
