//! The heap facade.
//!
//! A [`Heap`] manages one caller-supplied byte region: it owns the free
//! list, the counters and the selection strategy, and drives the two block
//! transformations: carving an allocation out of a free block, and turning
//! a released allocation back into a free block merged with its physical
//! neighbours.
//!
//! Allocation walks request -> strategy -> [`Heap::consume`] -> header
//! install -> caller. Release walks pointer -> header validation ->
//! address-ordered insertion -> coalesce -> counters.

use std::mem;
use std::panic::Location;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::block::{self, Allocation, ALLOCATION_HEADER_SIZE, HEADER_SENTINEL};
use crate::error::{report, HeapError, LOG_TARGET};
use crate::freelist::{FreeBlock, FreeList, FREE_BLOCK_SIZE};
use crate::strategy::{find_free_block, AllocationStrategy};
use crate::utils::{align_up, is_pow2};

/// Alignment applied when an allocation does not request one, and the floor
/// any smaller request is raised to.
pub const DEFAULT_ALIGNMENT: usize = 4;

/// Largest alignment an allocation may request.
pub const MAXIMUM_ALIGNMENT: usize = 128;

const DEFAULT_ALLOCATION_STRATEGY: AllocationStrategy = AllocationStrategy::First;

/// Process-wide allocation number. Shared by every heap in the process so
/// two heaps on different threads still hand out unique ids.
static ALLOCATION_ID: AtomicUsize = AtomicUsize::new(0);

/// Source of heap identities. Starts above zero so a cleared header can
/// never claim ownership.
static HEAP_ID: AtomicUsize = AtomicUsize::new(1);

/// A fixed-region heap allocator.
///
/// The heap is created empty, bound to a region exactly once with
/// [`initialize`](Heap::initialize), and from then on satisfies every
/// allocation and release inside that region without ever calling the
/// operating system.
///
/// A heap is single-threaded: it holds raw pointers into the region and is
/// neither `Send` nor `Sync`. Callers that share one heap across threads
/// must wrap it in their own lock.
pub struct Heap {
    free_list: FreeList,
    region: *mut u8,
    length: usize,
    strategy: AllocationStrategy,
    heap_id: usize,
    allocations: usize,
    total_allocations: usize,
    failed_allocations: usize,
    failed_releases: usize,
}

impl Heap {
    /// Creates an uninitialized heap. Every operation other than
    /// `initialize` fails quietly until a region is attached.
    pub const fn new() -> Self {
        Self {
            free_list: FreeList::new(),
            region: ptr::null_mut(),
            length: 0,
            strategy: AllocationStrategy::Invalid,
            heap_id: 0,
            allocations: 0,
            total_allocations: 0,
            failed_allocations: 0,
            failed_releases: 0,
        }
    }

    /// Binds the heap to `region` using the default first-fit strategy.
    ///
    /// See [`initialize_with_strategy`](Heap::initialize_with_strategy).
    #[track_caller]
    pub unsafe fn initialize(&mut self, region: *mut u8, length: usize) -> bool {
        unsafe { self.initialize_with_strategy(region, length, DEFAULT_ALLOCATION_STRATEGY) }
    }

    /// Binds the heap to the `length` bytes starting at `region`.
    ///
    /// Succeeds exactly once per heap. Returns `false`, leaving the heap
    /// untouched, when the heap is already initialized, `region` is null
    /// or not aligned for a free-block descriptor, `length` is zero, or
    /// `strategy` is [`AllocationStrategy::Invalid`].
    ///
    /// **SAFETY**: `region` must be valid for reads and writes of `length`
    /// bytes and must not be touched by anyone else for as long as this
    /// heap is in use.
    #[track_caller]
    pub unsafe fn initialize_with_strategy(
        &mut self,
        region: *mut u8,
        length: usize,
        strategy: AllocationStrategy,
    ) -> bool {
        if !self.region.is_null() {
            report(HeapError::AlreadyInitialized, Location::caller());
            return false;
        }

        if region.is_null()
            || length == 0
            || strategy == AllocationStrategy::Invalid
            || region as usize % mem::align_of::<FreeBlock>() != 0
        {
            report(HeapError::BadConfig, Location::caller());
            return false;
        }

        // The whole region starts life as a single free block.
        debug_assert!(self.free_list.is_empty());

        let root = region as *mut FreeBlock;
        unsafe {
            ptr::write(
                root,
                FreeBlock {
                    size: length,
                    previous: ptr::null_mut(),
                    next: ptr::null_mut(),
                },
            );
            self.free_list.insert(root);
        }

        self.region = region;
        self.length = length;
        self.strategy = strategy;
        self.heap_id = HEAP_ID.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Allocates `data_length` bytes at the default alignment.
    ///
    /// Returns the payload address, or null if the request cannot be
    /// satisfied.
    ///
    /// **SAFETY**: the heap's region must still be live (see
    /// [`initialize_with_strategy`](Heap::initialize_with_strategy)).
    #[track_caller]
    pub unsafe fn alloc(&mut self, data_length: usize) -> *mut u8 {
        unsafe { self.allocate(data_length, DEFAULT_ALIGNMENT, false) }
    }

    /// Allocates `data_length` bytes aligned to `alignment`, which must be
    /// a power of two no larger than [`MAXIMUM_ALIGNMENT`].
    ///
    /// **SAFETY**: as [`alloc`](Heap::alloc).
    #[track_caller]
    pub unsafe fn aligned_alloc(&mut self, data_length: usize, alignment: usize) -> *mut u8 {
        unsafe { self.allocate(data_length, alignment, false) }
    }

    /// Allocates `data_length` bytes for an array at the default alignment.
    /// The matching release must pass `is_array = true`.
    ///
    /// **SAFETY**: as [`alloc`](Heap::alloc).
    #[track_caller]
    pub unsafe fn alloc_array(&mut self, data_length: usize) -> *mut u8 {
        unsafe { self.allocate(data_length, DEFAULT_ALIGNMENT, true) }
    }

    /// Allocates `data_length` bytes for an array aligned to `alignment`.
    /// The matching release must pass `is_array = true`.
    ///
    /// **SAFETY**: as [`alloc`](Heap::alloc).
    #[track_caller]
    pub unsafe fn aligned_alloc_array(&mut self, data_length: usize, alignment: usize) -> *mut u8 {
        unsafe { self.allocate(data_length, alignment, true) }
    }

    #[track_caller]
    unsafe fn allocate(&mut self, data_length: usize, mut alignment: usize, is_array: bool) -> *mut u8 {
        let locus = Location::caller();

        if self.region.is_null() {
            log::warn!(target: LOG_TARGET, "allocation attempted on an uninitialized heap ({locus})");
            self.failed_allocations += 1;
            return ptr::null_mut();
        }

        if alignment < DEFAULT_ALIGNMENT {
            alignment = DEFAULT_ALIGNMENT;
        }

        if !is_pow2(alignment) {
            report(HeapError::AlignmentNotPow2(alignment), locus);
            self.failed_allocations += 1;
            return ptr::null_mut();
        }

        if alignment > MAXIMUM_ALIGNMENT {
            report(HeapError::AlignmentTooLarge(alignment), locus);
            self.failed_allocations += 1;
            return ptr::null_mut();
        }

        // Pad the length so the end of the payload is a valid address for
        // the next free-block descriptor. The header keeps the unpadded
        // length for diagnostics.
        let descriptor_align = mem::align_of::<FreeBlock>();
        let padded_length = match data_length.checked_add(descriptor_align - 1) {
            Some(value) => value & !(descriptor_align - 1),
            None => {
                report(HeapError::OutOfMemory(data_length), locus);
                self.failed_allocations += 1;
                return ptr::null_mut();
            }
        };

        let free_block =
            unsafe { find_free_block(&self.free_list, self.strategy, padded_length, alignment) };
        if free_block.is_null() {
            report(HeapError::OutOfMemory(data_length), locus);
            self.failed_allocations += 1;
            return ptr::null_mut();
        }

        let alloc = unsafe { self.consume(free_block, padded_length, alignment) };
        unsafe {
            (*alloc).id = ALLOCATION_ID.fetch_add(1, Ordering::Relaxed);
            (*alloc).size = data_length;
            (*alloc).is_array = is_array;
            (*alloc).locus = Some(locus);
            block::write_footer(alloc);
        }

        self.allocations += 1;
        self.total_allocations += 1;

        unsafe { block::payload(alloc) }
    }

    /// Carves an allocation out of `free_block` and re-links the free list.
    ///
    /// The header is installed with the block geometry filled in; the
    /// caller stamps the request-specific fields afterwards. Must be called
    /// with a block for which the strategy scan succeeded, so the aligned
    /// payload is known to fit.
    unsafe fn consume(
        &mut self,
        free_block: *mut FreeBlock,
        padded_length: usize,
        alignment: usize,
    ) -> *mut Allocation {
        unsafe {
            let raw = free_block as usize;
            let end = raw + (*free_block).size;

            let aligned = align_up(raw + ALLOCATION_HEADER_SIZE, alignment);
            let header_zone = aligned - raw;

            let mut block_size = header_zone + padded_length;
            let mut remaining = end - (aligned + padded_length);

            // A tail too small to host a future descriptor would be an
            // unusable fragment; fold it into the allocation instead.
            if remaining <= ALLOCATION_HEADER_SIZE {
                block_size += remaining;
                remaining = 0;
            }

            if remaining > 0 {
                debug_assert!(remaining >= FREE_BLOCK_SIZE);

                // The rest of the block stays free, in the consumed block's
                // list position.
                let rest = (aligned + padded_length) as *mut FreeBlock;
                ptr::write(
                    rest,
                    FreeBlock {
                        size: remaining,
                        previous: ptr::null_mut(),
                        next: ptr::null_mut(),
                    },
                );
                self.free_list.replace(free_block, rest);
            } else {
                self.free_list.remove(free_block);
            }

            // Only now may the header go in: it can overlap the descriptor
            // whose links were read above.
            let alloc = (aligned - ALLOCATION_HEADER_SIZE) as *mut Allocation;
            ptr::write(
                alloc,
                Allocation {
                    heap_id: self.heap_id,
                    size: 0,
                    block_size,
                    addr: raw,
                    id: 0,
                    locus: None,
                    is_array: false,
                    sentinel: HEADER_SENTINEL,
                },
            );

            alloc
        }
    }

    /// Releases a pointer previously returned by this heap's allocation
    /// methods. `is_array` must match the flag of the original request.
    ///
    /// Releasing a null pointer is a successful no-op. Returns `false`,
    /// changing no heap state, when the pointer's header fails validation.
    ///
    /// **SAFETY**: `ptr` must be null or a payload address obtained from
    /// this heap's own allocation methods and not released since.
    #[track_caller]
    pub unsafe fn deallocate(&mut self, ptr: *mut u8, is_array: bool) -> bool {
        let locus = Location::caller();

        if ptr.is_null() {
            return true;
        }

        if self.region.is_null() {
            log::warn!(target: LOG_TARGET, "release attempted on an uninitialized heap ({locus})");
            self.failed_releases += 1;
            return false;
        }

        let lower = self.region as usize;
        let upper = lower + self.length;

        unsafe {
            let alloc = block::from_payload(ptr);

            let block_start = (*alloc).addr;
            let block_size = (*alloc).block_size;
            let block_end = block_start.wrapping_add(block_size);

            if block_start < lower || block_start > upper || block_end < lower || block_end > upper
            {
                report(HeapError::OutOfBounds, locus);
                self.failed_releases += 1;
                return false;
            }

            if (*alloc).heap_id != self.heap_id {
                report(HeapError::WrongHeap, locus);
                self.failed_releases += 1;
                return false;
            }

            // Sentinel damage is reported but does not block the release.
            if !(*alloc).sentinel_ok() {
                report(HeapError::CorruptHeader, locus);
            }
            if !block::footer_ok(alloc) {
                report(HeapError::CorruptFooter, locus);
            }

            if (*alloc).is_array != is_array {
                report(HeapError::ArrayMismatch, locus);
                if let Some(origin) = (*alloc).locus {
                    log::debug!(
                        target: LOG_TARGET,
                        "allocation {} was requested at {origin}",
                        (*alloc).id
                    );
                }
                self.failed_releases += 1;
                return false;
            }

            // Clear the header so a second release of the same pointer
            // finds a broken record.
            ptr::write_bytes(alloc as *mut u8, 0, ALLOCATION_HEADER_SIZE);

            let free_block = block_start as *mut FreeBlock;
            ptr::write(
                free_block,
                FreeBlock {
                    size: block_size,
                    previous: ptr::null_mut(),
                    next: ptr::null_mut(),
                },
            );

            self.free_list.insert(free_block);
            self.free_list.coalesce(free_block);
        }

        self.allocations -= 1;
        true
    }

    /// The size in bytes of the managed region; zero before initialization.
    pub fn size(&self) -> usize {
        self.length
    }

    /// The number of allocations currently live within the heap.
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    /// The number of allocations made over the heap's lifetime.
    pub fn total_allocations(&self) -> usize {
        self.total_allocations
    }

    /// The number of allocation requests this heap has failed.
    pub fn failed_allocations(&self) -> usize {
        self.failed_allocations
    }

    /// The number of release requests this heap has rejected.
    pub fn failed_releases(&self) -> usize {
        self.failed_releases
    }

    /// The free-block selection strategy in effect;
    /// [`AllocationStrategy::Invalid`] before initialization.
    pub fn allocation_strategy(&self) -> AllocationStrategy {
        self.strategy
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}
