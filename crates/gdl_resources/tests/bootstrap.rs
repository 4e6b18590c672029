//! # Resources Bootstrap Tests
//!
//! Verifies that both subsystems come up and go down together:
//!
//! 1. **Worker stacks**: every worker owns a private memory stack for its lifetime
//! 2. **Shutdown**: workers close before the memory manager is released
//! 3. **Errors**: worker exceptions and misuse surface from `shutdown`/`bootstrap`
//!
//! Tests use their own leaked memory manager, except the single test that
//! exercises the process-wide one.
//!
//! Run with: cargo test --package gdl_resources --test bootstrap -- --nocapture

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use allocator_api2::vec::Vec as AllocVec;
use gdl_cpu::{DeadlockTerminationTimer, ThreadPoolError};
use gdl_memory::{
    thread_private_stack_vec, GeneralPurposeAllocator, MemoryError, MemoryManager, ThreadPrivateStackAllocator,
};
use gdl_resources::{Resources, ResourcesConfig, ResourcesError};

const WORKER_STACKS: &str = r#"
    worker_stack_size = "16KiB"

    [memory]
    general_purpose = "256KiB"
    thread_private = true

    [thread_pool]
    initial_threads = 3
    idle_sleep_us = 50
"#;

fn timer() -> DeadlockTerminationTimer {
    DeadlockTerminationTimer::new(Duration::from_secs(30)).unwrap()
}

fn private_manager() -> &'static MemoryManager {
    Box::leak(Box::new(MemoryManager::new()))
}

fn wait_until(condition: impl Fn() -> bool) {
    while !condition() {
        thread::sleep(Duration::from_millis(1));
    }
}

fn wait_for_tasks(resources: &Resources) {
    wait_until(|| !resources.thread_pool().has_tasks());
    resources.thread_pool().close_all_threads();
}

// ============================================================================
// WORKER STACKS
// ============================================================================

#[test]
fn workers_own_private_stacks() {
    let _timer = timer();
    let memory = private_manager();
    let resources = Resources::bootstrap_in(ResourcesConfig::from_toml_str(WORKER_STACKS).unwrap(), memory).unwrap();
    wait_until(|| memory.num_private_memory_stacks() == 3);

    let total = Arc::new(AtomicU64::new(0));
    for chunk in 0..30u64 {
        let total = Arc::clone(&total);
        resources
            .thread_pool()
            .submit(move || -> Result<(), MemoryError> {
                let mut scratch = AllocVec::new_in(ThreadPrivateStackAllocator::from_manager(memory)?);
                scratch.extend(chunk * 10..(chunk + 1) * 10);
                total.fetch_add(scratch.iter().sum::<u64>(), Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
    }
    wait_for_tasks(&resources);

    assert_eq!(total.load(Ordering::SeqCst), (0..300).sum::<u64>());
    assert_eq!(memory.num_private_memory_stacks(), 0, "deinit hooks released the stacks");
    assert_eq!(resources.thread_pool().exception_log(), "");

    resources.shutdown().unwrap();
    assert!(!memory.is_initialized());
}

#[test]
fn started_threads_also_get_stacks() {
    let _timer = timer();
    let memory = private_manager();
    let resources = Resources::bootstrap_in(ResourcesConfig::from_toml_str(WORKER_STACKS).unwrap(), memory).unwrap();

    resources.start_threads(2).unwrap();
    assert_eq!(resources.thread_pool().num_threads(), 5);
    wait_until(|| memory.num_private_memory_stacks() == 5);

    resources.thread_pool().close_threads(4);
    assert_eq!(memory.num_private_memory_stacks(), 1);
    resources.shutdown().unwrap();
    assert_eq!(memory.num_private_memory_stacks(), 0);
}

#[test]
fn pool_without_worker_stacks() {
    let _timer = timer();
    let memory = private_manager();
    let config = ResourcesConfig::from_toml_str(
        "[memory]\ngeneral_purpose = \"64KiB\"\n\n[thread_pool]\ninitial_threads = 2\n",
    )
    .unwrap();
    let resources = Resources::bootstrap_in(config, memory).unwrap();

    let sum = Arc::new(AtomicU64::new(0));
    let result = Arc::clone(&sum);
    resources
        .thread_pool()
        .submit(move || {
            let mut values = AllocVec::new_in(GeneralPurposeAllocator::from_manager(memory));
            values.extend(1..=10u64);
            result.store(values.iter().sum(), Ordering::SeqCst);
        })
        .unwrap();
    wait_for_tasks(&resources);

    assert_eq!(sum.load(Ordering::SeqCst), 55);
    assert_eq!(memory.num_private_memory_stacks(), 0);
    resources.shutdown().unwrap();
}

// ============================================================================
// ERRORS
// ============================================================================

#[test]
fn shutdown_surfaces_worker_exceptions() {
    let _timer = timer();
    let memory = private_manager();
    let resources = Resources::bootstrap_in(ResourcesConfig::from_toml_str(WORKER_STACKS).unwrap(), memory).unwrap();

    resources.thread_pool().submit(|| Err::<(), _>("mesh upload failed")).unwrap();
    wait_until(|| resources.thread_pool().exception_log_size() > 0);

    match resources.shutdown() {
        Err(ResourcesError::ThreadPool(ThreadPoolError::WorkerExceptions(text))) => {
            assert!(text.contains("mesh upload failed"));
        }
        other => panic!("expected worker exceptions, got {other:?}"),
    }
    // Memory is released even though the pool reported errors
    assert!(!memory.is_initialized());
}

#[test]
fn second_bootstrap_on_same_manager_fails() {
    let _timer = timer();
    let memory = private_manager();
    let config = ResourcesConfig::from_toml_str(WORKER_STACKS).unwrap();
    let resources = Resources::bootstrap_in(config.clone(), memory).unwrap();

    assert!(matches!(
        Resources::bootstrap_in(config, memory),
        Err(ResourcesError::Memory(MemoryError::ConfigurationLocked { .. }))
    ));
    resources.shutdown().unwrap();
}

#[test]
fn invalid_config_is_rejected_before_setup() {
    let memory = private_manager();
    let config = ResourcesConfig { worker_stack_size: Some(gdl_memory::MemorySize::kibibytes(4)), ..Default::default() };

    assert!(matches!(Resources::bootstrap_in(config, memory), Err(ResourcesError::InvalidConfig(_))));
    assert!(!memory.is_initialized());
}

// ============================================================================
// PROCESS-WIDE MANAGER
// ============================================================================

#[test]
fn bootstrap_uses_process_wide_manager() {
    let _timer = timer();
    let resources = Resources::bootstrap(ResourcesConfig::from_toml_str(WORKER_STACKS).unwrap()).unwrap();
    assert!(std::ptr::eq(resources.memory(), MemoryManager::instance()));
    wait_until(|| MemoryManager::instance().num_private_memory_stacks() == 3);

    let total = Arc::new(AtomicU64::new(0));
    for _ in 0..10 {
        let total = Arc::clone(&total);
        resources
            .thread_pool()
            .submit(move || -> Result<(), MemoryError> {
                let mut scratch = thread_private_stack_vec::<u64>()?;
                scratch.push(7);
                total.fetch_add(scratch[0], Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
    }
    wait_for_tasks(&resources);

    assert_eq!(total.load(Ordering::SeqCst), 70);
    resources.shutdown().unwrap();
    assert!(!MemoryManager::instance().is_initialized());
}
