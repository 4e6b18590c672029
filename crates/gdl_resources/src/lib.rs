//! # GDL Resources
//!
//! One entry point for the memory and CPU resources of an application.
//!
//! ## Example
//!
//! ```rust,ignore
//! use gdl_resources::{Resources, ResourcesConfig};
//!
//! let config = ResourcesConfig::load("resources.toml")?;
//! let resources = Resources::bootstrap(config)?;
//! resources.thread_pool().submit(|| {
//!     let mut scratch = gdl_memory::thread_private_stack_vec::<u32>()?;
//!     scratch.extend(0..64);
//!     Ok::<(), gdl_memory::MemoryError>(())
//! })?;
//! resources.shutdown()?;
//! ```

#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod resources;

pub use config::ResourcesConfig;
pub use error::{ResourcesError, ResourcesResult};
pub use resources::Resources;

pub use gdl_cpu;
pub use gdl_memory;
