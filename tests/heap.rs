//! End-to-end scenarios against small fixed regions.

use std::mem;
use std::ptr;

use region_heap::{AllocationStrategy, Heap, MappedRegion, ALLOCATION_HEADER_SIZE, FOOTER_SENTINEL};

const REGION_BYTES: usize = 1024;

/// An 8-byte-aligned backing buffer on the host allocator.
fn region() -> Box<[u64]> {
    vec![0u64; REGION_BYTES / mem::size_of::<u64>()].into_boxed_slice()
}

fn ready_heap(buffer: &mut Box<[u64]>) -> Heap {
    let mut heap = Heap::new();
    unsafe {
        assert!(heap.initialize(buffer.as_mut_ptr().cast(), REGION_BYTES));
    }
    heap
}

#[test]
fn construction_is_observable() {
    let heap = Heap::new();

    assert_eq!(heap.allocations(), 0);
    assert_eq!(heap.total_allocations(), 0);
    assert_eq!(heap.failed_allocations(), 0);
    assert_eq!(heap.size(), 0);
    assert_eq!(heap.allocation_strategy(), AllocationStrategy::Invalid);
}

#[test]
fn initialization_rejects_bad_configuration() {
    let mut buffer = region();
    let buffer_ptr: *mut u8 = buffer.as_mut_ptr().cast();

    for strategy in [AllocationStrategy::First, AllocationStrategy::Smallest] {
        let mut heap = Heap::new();

        unsafe {
            assert!(!heap.initialize_with_strategy(ptr::null_mut(), 0, strategy));
            assert!(!heap.initialize_with_strategy(ptr::null_mut(), REGION_BYTES, strategy));
            assert!(!heap.initialize_with_strategy(buffer_ptr, 0, strategy));
        }

        // Nothing may have changed during the rejected calls.
        assert_eq!(heap.allocations(), 0);
        assert_eq!(heap.total_allocations(), 0);
        assert_eq!(heap.size(), 0);
        assert_eq!(heap.allocation_strategy(), AllocationStrategy::Invalid);
    }

    let mut heap = Heap::new();
    unsafe {
        assert!(!heap.initialize_with_strategy(
            buffer_ptr,
            REGION_BYTES,
            AllocationStrategy::Invalid
        ));
    }
    assert_eq!(heap.allocation_strategy(), AllocationStrategy::Invalid);

    // A well-formed configuration still works afterwards.
    unsafe {
        assert!(heap.initialize_with_strategy(
            buffer_ptr,
            REGION_BYTES,
            AllocationStrategy::Smallest
        ));
    }
    assert_eq!(heap.size(), REGION_BYTES);
    assert_eq!(heap.allocation_strategy(), AllocationStrategy::Smallest);
}

#[test]
fn single_allocation_succeeds() {
    let mut buffer = region();
    let mut heap = ready_heap(&mut buffer);

    let ptr = unsafe { heap.alloc(64) };

    assert!(!ptr.is_null());
    assert_eq!(heap.allocations(), 1);
    assert_eq!(heap.total_allocations(), 1);
    assert_eq!(heap.failed_allocations(), 0);
}

#[test]
fn oversized_allocation_fails() {
    let mut buffer = region();
    let mut heap = ready_heap(&mut buffer);

    // The header alone makes a full-region payload impossible.
    let ptr = unsafe { heap.alloc(REGION_BYTES) };

    assert!(ptr.is_null());
    assert_eq!(heap.failed_allocations(), 1);
    assert_eq!(heap.allocations(), 0);
    assert_eq!(heap.total_allocations(), 0);
}

#[test]
fn interleaved_failures_do_not_disturb_successes() {
    let mut buffer = region();
    let mut heap = ready_heap(&mut buffer);

    unsafe {
        let first = heap.alloc(64);
        let too_big = heap.alloc(REGION_BYTES);
        let second = heap.alloc(64);
        let also_too_big = heap.alloc(REGION_BYTES);

        assert!(!first.is_null());
        assert!(too_big.is_null());
        assert!(!second.is_null());
        assert!(also_too_big.is_null());
        assert_ne!(first, second);
    }

    assert_eq!(heap.allocations(), 2);
    assert_eq!(heap.total_allocations(), 2);
    assert_eq!(heap.failed_allocations(), 2);
}

#[test]
fn release_flood_does_not_fragment() {
    let mut buffer = region();
    let mut heap = ready_heap(&mut buffer);

    for _ in 0..1024 {
        unsafe {
            let ptr = heap.alloc(64);
            assert!(!ptr.is_null());
            assert!(heap.deallocate(ptr, false));
        }
    }

    assert_eq!(heap.allocations(), 0);
    assert_eq!(heap.total_allocations(), 1024);
    assert_eq!(heap.failed_allocations(), 0);

    // Coalescing must have restored the full region every time: the
    // largest possible payload still fits.
    let whole = unsafe { heap.alloc(REGION_BYTES - ALLOCATION_HEADER_SIZE) };
    assert!(!whole.is_null());
}

#[test]
fn array_flag_must_match() {
    let mut buffer = region();
    let mut heap = ready_heap(&mut buffer);

    unsafe {
        let plain = heap.alloc(64);
        assert!(!plain.is_null());

        assert!(!heap.deallocate(plain, true));
        assert_eq!(heap.allocations(), 1);
        assert_eq!(heap.failed_releases(), 1);

        assert!(heap.deallocate(plain, false));
        assert_eq!(heap.allocations(), 0);

        // Mirror case through the array entry point.
        let array = heap.alloc_array(64);
        assert!(!array.is_null());

        assert!(!heap.deallocate(array, false));
        assert_eq!(heap.allocations(), 1);

        assert!(heap.deallocate(array, true));
        assert_eq!(heap.allocations(), 0);
    }

    assert_eq!(heap.failed_releases(), 2);
}

#[test]
fn cross_heap_release_is_rejected() {
    let mut buffer_a = region();
    let mut buffer_b = region();
    let mut heap_a = ready_heap(&mut buffer_a);
    let mut heap_b = ready_heap(&mut buffer_b);

    unsafe {
        let from_a = heap_a.alloc(64);
        let from_b = heap_b.alloc(64);
        assert!(!from_a.is_null());
        assert!(!from_b.is_null());

        assert!(!heap_a.deallocate(from_b, false));
        assert!(!heap_b.deallocate(from_a, false));
        assert_eq!(heap_a.allocations(), 1);
        assert_eq!(heap_b.allocations(), 1);

        assert!(heap_a.deallocate(from_a, false));
        assert!(heap_b.deallocate(from_b, false));
    }

    assert_eq!(heap_a.allocations(), 0);
    assert_eq!(heap_b.allocations(), 0);
}

#[test]
fn full_heap_round_trip() {
    let mut buffer = region();
    let mut heap = ready_heap(&mut buffer);

    unsafe {
        let whole = heap.alloc(REGION_BYTES - ALLOCATION_HEADER_SIZE);
        assert!(!whole.is_null());

        let refused = heap.alloc(64);
        assert!(refused.is_null());
        assert_eq!(heap.failed_allocations(), 1);

        assert!(heap.deallocate(whole, false));

        let again = heap.alloc(64);
        assert!(!again.is_null());
    }

    assert_eq!(heap.allocations(), 1);
    assert_eq!(heap.total_allocations(), 2);
}

#[test]
fn null_release_always_succeeds() {
    let mut uninitialized = Heap::new();
    assert!(unsafe { uninitialized.deallocate(ptr::null_mut(), false) });
    assert!(unsafe { uninitialized.deallocate(ptr::null_mut(), true) });

    let mut buffer = region();
    let mut heap = ready_heap(&mut buffer);
    assert!(unsafe { heap.deallocate(ptr::null_mut(), false) });
    assert_eq!(heap.failed_releases(), 0);
}

#[test]
fn double_release_fails_the_second_time() {
    let mut buffer = region();
    let mut heap = ready_heap(&mut buffer);

    unsafe {
        let ptr = heap.alloc(64);
        assert!(!ptr.is_null());

        assert!(heap.deallocate(ptr, false));
        assert!(!heap.deallocate(ptr, false));
    }

    assert_eq!(heap.allocations(), 0);
    assert_eq!(heap.failed_releases(), 1);
}

#[test]
fn payloads_honour_requested_alignment() {
    let mut buffer = region();
    let mut heap = ready_heap(&mut buffer);

    for alignment in [1usize, 2, 4, 8, 16, 32, 64, 128] {
        let ptr = unsafe { heap.aligned_alloc(16, alignment) };
        assert!(!ptr.is_null(), "alignment {alignment} failed");
        assert_eq!(
            ptr as usize % alignment.max(4),
            0,
            "alignment {alignment} not honoured"
        );
    }

    assert_eq!(heap.failed_allocations(), 0);
}

#[test]
fn bad_alignments_are_rejected() {
    let mut buffer = region();
    let mut heap = ready_heap(&mut buffer);

    unsafe {
        // Below the floor is raised, not rejected.
        assert!(!heap.aligned_alloc(16, 3).is_null());
        assert_eq!(heap.failed_allocations(), 0);

        assert!(heap.aligned_alloc(16, 6).is_null());
        assert_eq!(heap.failed_allocations(), 1);

        assert!(heap.aligned_alloc(16, 256).is_null());
        assert_eq!(heap.failed_allocations(), 2);
    }

    assert_eq!(heap.allocations(), 1);
}

#[test]
fn heap_runs_over_an_os_mapped_region() {
    let region = MappedRegion::new(REGION_BYTES).expect("the platform refused the mapping");
    assert!(!region.is_empty());
    assert!(region.len() >= REGION_BYTES);

    let mut heap = Heap::new();

    unsafe {
        assert!(heap.initialize(region.as_ptr(), region.len()));

        let ptr = heap.alloc(64);
        assert!(!ptr.is_null());
        ptr.write_bytes(0x5A, 64);

        assert!(heap.deallocate(ptr, false));

        // The region coalesced back whole, so the maximal payload fits.
        let whole = heap.alloc(region.len() - ALLOCATION_HEADER_SIZE);
        assert!(!whole.is_null());
        assert!(heap.deallocate(whole, false));
    }

    assert_eq!(heap.allocations(), 0);
    assert_eq!(heap.total_allocations(), 2);
}

#[test]
fn footer_sentinel_guards_the_payload_tail() {
    let mut buffer = region();
    let mut heap = ready_heap(&mut buffer);

    unsafe {
        // 10 bytes pad up to 16, leaving slack for the footer bytes.
        let ptr = heap.alloc(10);
        assert!(!ptr.is_null());

        let mut footer = [0u8; 4];
        ptr::copy_nonoverlapping(ptr.add(10), footer.as_mut_ptr(), footer.len());
        assert_eq!(footer, FOOTER_SENTINEL);

        // An overrun is reported through the log facade but does not make
        // the release fail.
        ptr.add(10).write_bytes(0xFF, 4);
        assert!(heap.deallocate(ptr, false));
    }

    assert_eq!(heap.allocations(), 0);
}
