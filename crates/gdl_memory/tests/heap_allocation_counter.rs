//! # Heap Allocation Counter Tests
//!
//! Installs the counting global allocator and verifies that containers and
//! boxes over the custom stores never reach the platform heap once the
//! stores exist, including when vectors shrink back into them.
//!
//! One test function only: the counters are process-wide, so concurrent
//! tests in this binary would disturb them.
//!
//! Run with: cargo test --package gdl_memory --test heap_allocation_counter -- --nocapture

use allocator_api2::vec::Vec as AllocVec;
use gdl_memory::{
    make_general_purpose_box_in, make_pool_box_in, make_stack_box_in, CountingAllocator, GeneralPurposeAllocator,
    HeapAllocationCounter, MemoryManager, MemorySize, StackAllocator,
};

#[global_allocator]
static ALLOCATOR: CountingAllocator = CountingAllocator;

fn configure(manager: &MemoryManager) {
    manager.create_general_purpose_memory(MemorySize::megabytes(1)).unwrap();
    manager.create_memory_stack(MemorySize::kibibytes(64)).unwrap();
    manager.create_memory_pool(16, 100, 0).unwrap();
    manager.initialize().unwrap();
}

/// Uses every store; returns a checksum so nothing is optimized away.
fn exercise(manager: &MemoryManager) -> u64 {
    let mut values = AllocVec::new_in(GeneralPurposeAllocator::from_manager(manager));
    for i in 0..100u32 {
        values.push(i);
    }
    for (i, &value) in values.iter().enumerate() {
        assert_eq!(value as usize, i);
    }

    let mut scratch = AllocVec::new_in(StackAllocator::from_manager(manager));
    scratch.extend(values.iter().map(|&v| u64::from(v)));

    values.clear();
    values.shrink_to_fit();
    assert_eq!(values.capacity(), 0);
    values.push(7);
    values.shrink_to_fit();
    assert_eq!((values.len(), values[0]), (1, 7));

    let pooled = make_pool_box_in([3u64, 4u64], manager).unwrap();
    let boxed = make_general_purpose_box_in(5u64, manager).unwrap();
    let stacked = make_stack_box_in(6u64, manager).unwrap();

    scratch.iter().sum::<u64>() + pooled[0] + pooled[1] + *boxed + *stacked
}

#[test]
fn custom_stores_stay_off_the_heap() {
    // Warm-up cycle, so one-time lazy statics do not count below
    {
        let manager = MemoryManager::new();
        configure(&manager);
        assert_eq!(exercise(&manager), 4968);
        manager.deinitialize().unwrap();
    }

    let lifecycle = HeapAllocationCounter::new();
    let manager = MemoryManager::new();
    configure(&manager);
    assert!(lifecycle.num_allocations() > 0, "stores are carved from the heap");

    let window = HeapAllocationCounter::new();
    let checksum = exercise(&manager);
    let (allocations, deallocations) = (window.num_allocations(), window.num_deallocations());

    manager.deinitialize().unwrap();
    drop(manager);
    let (lifecycle_allocations, lifecycle_deallocations) = (lifecycle.num_allocations(), lifecycle.num_deallocations());

    println!("\n╔══════════════════════════════════════════════════════════╗");
    println!("║              HEAP ALLOCATION COUNTER                      ║");
    println!("╠══════════════════════════════════════════════════════════╣");
    println!("║ Checksum:                {:>10}                      ║", checksum);
    println!("║ Heap calls while in use: {:>4} allocs / {:>4} frees       ║", allocations, deallocations);
    println!(
        "║ Heap calls in lifecycle: {:>4} allocs / {:>4} frees       ║",
        lifecycle_allocations, lifecycle_deallocations
    );
    println!("╚══════════════════════════════════════════════════════════╝");

    assert_eq!(checksum, 4968);
    assert_eq!((allocations, deallocations), (0, 0));
    assert_eq!(lifecycle_allocations, lifecycle_deallocations);
}
