//! # Resources Error Types

use std::path::PathBuf;

use gdl_cpu::ThreadPoolError;
use gdl_memory::MemoryError;
use thiserror::Error;

/// Errors raised while bringing the resources up or down.
#[derive(Error, Debug)]
pub enum ResourcesError {
    /// The memory manager rejected a request.
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// The thread pool rejected a request or reported worker exceptions.
    #[error(transparent)]
    ThreadPool(#[from] ThreadPoolError),

    /// The configuration is not valid TOML or does not match the schema.
    #[error("invalid resources configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that was read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The configuration is well-formed but contradicts itself.
    #[error("invalid resources configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for resource operations.
pub type ResourcesResult<T> = Result<T, ResourcesError>;
