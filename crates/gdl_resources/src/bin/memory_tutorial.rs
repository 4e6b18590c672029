//! # Memory Tutorial
//!
//! Walks through the memory strategies end to end:
//!
//! 1. Describe the stores (general-purpose memory, stack, pools, worker stacks)
//! 2. Initialize them together with the thread pool
//! 3. Use containers and boxes on each store, and on the workers' private stacks
//! 4. Release everything and shut down
//!
//! Run with: cargo run --bin memory_tutorial [-- path/to/resources.toml]
//! Set `RUST_LOG=debug` to see the manager's decisions.

use std::process::ExitCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gdl_resources::gdl_memory::{
    general_purpose_vec, make_pool_box, make_stack_box, stack_vec, thread_private_stack_vec, MemoryError,
    PoolAllocator,
};
use gdl_resources::{Resources, ResourcesConfig, ResourcesResult};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = r#"
worker_stack_size = "64KiB"

[memory]
general_purpose = "1MB"
stack = "1MB"
thread_private = true

[[memory.pools]]
element_size = 32
num_elements = 1000

[[memory.pools]]
element_size = 64
num_elements = 1000

[thread_pool]
initial_threads = 4
"#;

/// 32 bytes, served by the 32-byte pool.
#[derive(Debug, Clone, Copy)]
struct Particle {
    position: [f32; 3],
    velocity: [f32; 3],
    age: f32,
    id: u32,
}

/// 64 bytes, served by the 64-byte pool.
#[derive(Debug, Clone, Copy)]
struct Transform {
    matrix: [[f32; 4]; 4],
}

fn load_config() -> ResourcesResult<ResourcesConfig> {
    match std::env::args().nth(1) {
        Some(path) => ResourcesConfig::load(path),
        None => ResourcesConfig::from_toml_str(DEFAULT_CONFIG),
    }
}

fn use_general_purpose_memory() {
    let mut values = general_purpose_vec::<u32>();
    values.extend(0..100);
    tracing::info!(len = values.len(), sum = values.iter().sum::<u32>(), "general-purpose vector");
}

fn use_memory_stack() -> Result<(), MemoryError> {
    // Stack blocks must be released in reverse order: inner scopes first
    let mut frame = stack_vec::<f64>();
    frame.extend((0..256).map(f64::from));
    {
        let scratch = make_stack_box([0u8; 512])?;
        tracing::info!(bytes = scratch.len(), "stack scratch block");
    }
    tracing::info!(len = frame.len(), "stack vector");
    Ok(())
}

fn use_memory_pools() -> Result<(), MemoryError> {
    let particles = (0..100u16)
        .map(|i| {
            let t = f32::from(i);
            make_pool_box(Particle { position: [t; 3], velocity: [0.0, 1.0, 0.0], age: 0.0, id: u32::from(i) })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let transform = make_pool_box(Transform { matrix: [[0.0; 4]; 4] })?;

    let energy: f32 = particles.iter().map(|p| p.position[0] + p.velocity[1] + p.age).sum();
    tracing::info!(
        particles = particles.len(),
        last_id = particles.last().map_or(0, |p| p.id),
        energy,
        transform_rows = transform.matrix.len(),
        "pool boxes"
    );
    tracing::info!(
        particle_store = %PoolAllocator::for_type::<Particle>().backing_store(),
        unmatched_store = %PoolAllocator::for_type::<[u8; 48]>().backing_store(),
        "pool resolution"
    );
    Ok(())
}

fn use_worker_stacks(resources: &Resources) -> ResourcesResult<u64> {
    let pool = resources.thread_pool();
    let total = Arc::new(AtomicU64::new(0));
    for chunk in 0..16u64 {
        let total = Arc::clone(&total);
        pool.submit(move || -> Result<(), MemoryError> {
            let mut scratch = thread_private_stack_vec::<u64>()?;
            scratch.extend(chunk * 100..(chunk + 1) * 100);
            total.fetch_add(scratch.iter().sum::<u64>(), Ordering::SeqCst);
            Ok(())
        })?;
    }

    // Only workers own private stacks, so the main thread waits instead of helping
    while pool.has_tasks() {
        std::thread::sleep(Duration::from_millis(1));
    }
    pool.close_all_threads();
    pool.propagate_exceptions()?;
    Ok(total.load(Ordering::SeqCst))
}

fn run() -> ResourcesResult<()> {
    let resources = Resources::bootstrap(load_config()?)?;
    tracing::info!(threads = resources.thread_pool().num_threads(), "tutorial started");

    use_general_purpose_memory();
    use_memory_stack()?;
    use_memory_pools()?;
    let sum = use_worker_stacks(&resources)?;
    tracing::info!(sum, "worker private stacks");

    resources.shutdown()
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "tutorial failed");
            ExitCode::FAILURE
        }
    }
}
