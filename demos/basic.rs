//! Walks a heap through a handful of allocations and releases over a
//! region mapped straight from the operating system.

use region_heap::{Heap, MappedRegion};

fn log_alloc(ptr: *mut u8, size: usize) {
    println!("Requested {size} bytes of memory");
    println!("Received this address: {ptr:?}");
}

fn main() {
    let region = MappedRegion::new(4096).expect("the platform refused a 4 KiB mapping");

    let mut heap = Heap::new();

    unsafe {
        assert!(heap.initialize(region.as_ptr(), region.len()));
        println!("Heap manages {} bytes\n", heap.size());

        let first = heap.alloc(64);
        log_alloc(first, 64);

        let second = heap.aligned_alloc(256, 64);
        log_alloc(second, 256);

        let third = heap.alloc_array(1024);
        log_alloc(third, 1024);

        println!(
            "\nlive = {}, total = {}, failed = {}",
            heap.allocations(),
            heap.total_allocations(),
            heap.failed_allocations()
        );

        println!("Releasing everything...");
        heap.deallocate(first, false);
        heap.deallocate(second, false);
        heap.deallocate(third, true);
    }

    println!(
        "live = {}, total = {}, failed = {}",
        heap.allocations(),
        heap.total_allocations(),
        heap.failed_allocations()
    );
}
