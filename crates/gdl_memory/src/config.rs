//! # Memory Configuration
//!
//! Serializable description of the stores a [`MemoryManager`] should own.
//!
//! ```toml
//! general_purpose = "1MB"
//! stack = "1MB"
//! thread_private = true
//!
//! [[pools]]
//! element_size = "32B"
//! num_elements = 1000
//!
//! [[pools]]
//! element_size = 64
//! num_elements = 1000
//! alignment = 16
//! ```

use serde::{Deserialize, Serialize};

use crate::error::MemoryResult;
use crate::manager::MemoryManager;
use crate::size::MemorySize;

/// One memory pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// Size of one element.
    pub element_size: MemorySize,
    /// Number of elements.
    pub num_elements: usize,
    /// Alignment of every element; 0 selects the default.
    #[serde(default)]
    pub alignment: usize,
}

/// Stores to create before initialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryConfig {
    /// Size of the general-purpose memory, if any.
    pub general_purpose: Option<MemorySize>,
    /// Size of the shared memory stack, if any.
    pub stack: Option<MemorySize>,
    /// Memory pools.
    pub pools: Vec<PoolConfig>,
    /// Whether threads may create private memory stacks.
    pub thread_private: bool,
}

impl MemoryConfig {
    /// Performs the `create_*` calls this configuration describes.
    ///
    /// # Errors
    ///
    /// Returns the first error reported by the manager, typically because its
    /// setup phase is already over.
    pub fn apply(&self, manager: &MemoryManager) -> MemoryResult<()> {
        if let Some(size) = self.general_purpose {
            manager.create_general_purpose_memory(size)?;
        }
        if let Some(size) = self.stack {
            manager.create_memory_stack(size)?;
        }
        for pool in &self.pools {
            manager.create_memory_pool(pool.element_size.num_bytes(), pool.num_elements, pool.alignment)?;
        }
        if self.thread_private {
            manager.enable_thread_private_memory()?;
        }
        Ok(())
    }
}
