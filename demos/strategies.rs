//! Shows how the two selection strategies choose differently from the same
//! fragmented heap.
//!
//! Both heaps are punched into the same shape: a large hole near the start
//! of the region, a smaller hole after it, and a big free tail. A first-fit
//! heap serves the next request from the large hole because it scans from
//! the bottom; a best-fit heap walks every hole and picks the small one.

use region_heap::{AllocationStrategy, Heap, MappedRegion};

/// Carves two differently-sized holes into the heap and returns their
/// payload addresses.
unsafe fn fragment(heap: &mut Heap) -> (*mut u8, *mut u8) {
    unsafe {
        let big_hole = heap.alloc(512);
        let keep_a = heap.alloc(64);
        let small_hole = heap.alloc(256);
        let keep_b = heap.alloc(64);
        assert!(!keep_a.is_null() && !keep_b.is_null());

        assert!(heap.deallocate(big_hole, false));
        assert!(heap.deallocate(small_hole, false));

        (big_hole, small_hole)
    }
}

fn main() {
    let region_first = MappedRegion::new(4096).expect("mapping failed");
    let region_smallest = MappedRegion::new(4096).expect("mapping failed");

    let mut first_fit = Heap::new();
    let mut best_fit = Heap::new();

    unsafe {
        assert!(first_fit.initialize_with_strategy(
            region_first.as_ptr(),
            region_first.len(),
            AllocationStrategy::First
        ));
        assert!(best_fit.initialize_with_strategy(
            region_smallest.as_ptr(),
            region_smallest.len(),
            AllocationStrategy::Smallest
        ));

        let (big_a, small_a) = fragment(&mut first_fit);
        let (big_b, small_b) = fragment(&mut best_fit);

        let from_first = first_fit.alloc(100);
        let from_best = best_fit.alloc(100);

        println!("Request: 100 bytes from a heap with a 512-byte and a 256-byte hole\n");
        println!(
            "First-fit    chose offset {:>4} (the 512-byte hole at {:>4})",
            from_first as usize - region_first.as_ptr() as usize,
            big_a as usize - region_first.as_ptr() as usize,
        );
        println!(
            "Best-fit     chose offset {:>4} (the 256-byte hole at {:>4})",
            from_best as usize - region_smallest.as_ptr() as usize,
            small_b as usize - region_smallest.as_ptr() as usize,
        );

        let _ = (small_a, big_b);
    }
}
