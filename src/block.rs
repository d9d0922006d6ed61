//! The in-band allocation header.
//!
//! Every payload handed out by the heap is preceded by an [`Allocation`]
//! record living inside the managed region itself:
//!
//! ```text
//! blockStart                                               blockStart + blockSize
//! |                                                        |
//! +--------------+------------+---------------+------+-----+
//! |  alignment   | Allocation |    payload    | COLA | pad |
//! |  padding     |   header   |  (size bytes) |      |     |
//! +--------------+------------+---------------+------+-----+
//!                             |
//!                             pointer returned to the caller
//! ```
//!
//! The padding before the header exists only when the requested alignment
//! pushes the payload forward; the footer sentinel and trailing pad exist
//! only when the block has slack after the payload.

use std::mem;
use std::panic::Location;
use std::ptr;

/// Bytes stamped into every live header, checked again on release.
pub const HEADER_SENTINEL: [u8; 4] = *b"ALOC";

/// Bytes written directly after the payload when the block has room for
/// them, checked on release to detect buffer over-runs.
pub const FOOTER_SENTINEL: [u8; 4] = *b"COLA";

/// Size in bytes of the allocation header; the per-allocation overhead of
/// the heap.
pub const ALLOCATION_HEADER_SIZE: usize = mem::size_of::<Allocation>();

/// Record placed immediately before each payload handed to the caller.
///
/// Only its owning heap ever touches it: written when the block is carved
/// out of free memory, zeroed on release so a second release of the same
/// pointer finds a broken record.
#[repr(C)]
pub(crate) struct Allocation {
    /// Identity of the owning heap; releases through any other heap are
    /// rejected.
    pub heap_id: usize,
    /// Payload size in bytes, exactly as the caller requested it.
    pub size: usize,
    /// Total block size in bytes measured from `addr`, including the header
    /// zone and any absorbed tail.
    pub block_size: usize,
    /// Address at which the block (not the header) begins; a free block is
    /// rebuilt here on release.
    pub addr: usize,
    /// Process-wide allocation number.
    pub id: usize,
    /// Call site that requested the allocation.
    pub locus: Option<&'static Location<'static>>,
    /// True when the allocation was made through the array entry points.
    pub is_array: bool,
    /// Corruption marker, [`HEADER_SENTINEL`] while the allocation is live.
    pub sentinel: [u8; 4],
}

impl Allocation {
    pub(crate) fn sentinel_ok(&self) -> bool {
        self.sentinel == HEADER_SENTINEL
    }
}

/// Returns the payload address of `alloc`.
///
/// **SAFETY**: `alloc` must point at a live allocation header.
pub(crate) unsafe fn payload(alloc: *mut Allocation) -> *mut u8 {
    unsafe { (alloc as *mut u8).add(ALLOCATION_HEADER_SIZE) }
}

/// Recovers the header address from a payload pointer previously returned
/// by [`payload`].
///
/// **SAFETY**: `payload` must have been produced by this heap's allocation
/// path; anything else makes the returned header garbage.
pub(crate) unsafe fn from_payload(payload: *mut u8) -> *mut Allocation {
    unsafe { payload.sub(ALLOCATION_HEADER_SIZE) as *mut Allocation }
}

/// Writes the footer sentinel after the payload.
///
/// Exact-fit blocks have no slack between payload end and block end; those
/// carry no footer and [`footer_ok`] skips them symmetrically.
///
/// **SAFETY**: the header must be fully initialized, `size` included.
pub(crate) unsafe fn write_footer(alloc: *mut Allocation) {
    unsafe {
        let payload_end = (alloc as *mut u8).add(ALLOCATION_HEADER_SIZE + (*alloc).size);
        let block_end = (*alloc).addr + (*alloc).block_size;

        if payload_end as usize + FOOTER_SENTINEL.len() <= block_end {
            ptr::copy_nonoverlapping(FOOTER_SENTINEL.as_ptr(), payload_end, FOOTER_SENTINEL.len());
        }
    }
}

/// Checks the footer sentinel written by [`write_footer`]. Blocks without
/// room for a footer always pass.
///
/// **SAFETY**: `alloc` must point at a live allocation header.
pub(crate) unsafe fn footer_ok(alloc: *const Allocation) -> bool {
    unsafe {
        let block_end = (*alloc).addr + (*alloc).block_size;

        // The size field has not been vouched for at this point; a value
        // that cannot even be added up marks the header as damaged.
        let payload_end = match (alloc as usize)
            .checked_add(ALLOCATION_HEADER_SIZE)
            .and_then(|end| end.checked_add((*alloc).size))
        {
            Some(end) => end,
            None => return false,
        };

        if block_end.saturating_sub(payload_end) < FOOTER_SENTINEL.len() {
            return true;
        }

        let mut footer = [0u8; 4];
        ptr::copy_nonoverlapping(
            payload_end as *const u8,
            footer.as_mut_ptr(),
            FOOTER_SENTINEL.len(),
        );
        footer == FOOTER_SENTINEL
    }
}
