//! Free-block selection policies.
//!
//! When an allocation request arrives, the heap scans its free list for a
//! block able to host the aligned payload plus its header. This module
//! holds the selection rules that decide which of the suitable blocks is
//! taken:
//!
//! ```text
//!   Free list: [A: 160] -> [B: 120] -> [C: 200]       request: 60 bytes
//!
//!   First:    A   (the first block that fits, scan stops there)
//!   Smallest: B   (every block is inspected, the tightest fit wins)
//! ```
//!
//! First-fit favours speed, best-fit favours low internal fragmentation at
//! the price of a full scan on every request.

use std::ptr;

use crate::block::ALLOCATION_HEADER_SIZE;
use crate::error::LOG_TARGET;
use crate::freelist::{FreeBlock, FreeList};
use crate::utils::align_up;

/// The free-block selection rule a heap applies when searching for space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationStrategy {
    /// Sentinel for a heap that has not been initialized yet; rejected by
    /// `initialize`.
    Invalid,

    /// Chooses the first free block encountered that has the requested
    /// number of bytes available.
    First,

    /// Scans all free blocks and selects the smallest one that has the
    /// requested number of bytes available; ties go to the lower address.
    Smallest,
}

/// Tells whether `block` can host a payload of `data_length` bytes at
/// `alignment`, with the allocation header in front of it.
///
/// The aligned payload must start strictly above the descriptor's own
/// address (the header would overwrite the descriptor otherwise) and leave
/// `data_length` bytes before the block ends.
unsafe fn fits(block: *mut FreeBlock, data_length: usize, alignment: usize) -> bool {
    unsafe {
        let raw = block as usize;
        let end = raw + (*block).size;

        let aligned = align_up(raw + ALLOCATION_HEADER_SIZE, alignment);
        aligned > raw && aligned < end && end - aligned >= data_length
    }
}

/// Searches `list` for a block able to hold the described allocation, using
/// the given strategy. Returns null when no block qualifies.
///
/// **SAFETY**: every node in `list` must be a valid in-region descriptor.
pub(crate) unsafe fn find_free_block(
    list: &FreeList,
    strategy: AllocationStrategy,
    data_length: usize,
    alignment: usize,
) -> *mut FreeBlock {
    match strategy {
        AllocationStrategy::First => unsafe { find_first(list, data_length, alignment) },
        AllocationStrategy::Smallest => unsafe { find_smallest(list, data_length, alignment) },
        AllocationStrategy::Invalid => {
            log::warn!(target: LOG_TARGET, "free-block search with an invalid strategy");
            ptr::null_mut()
        }
    }
}

unsafe fn find_first(list: &FreeList, data_length: usize, alignment: usize) -> *mut FreeBlock {
    for block in list.iter() {
        unsafe {
            if data_length <= (*block).size && fits(block, data_length, alignment) {
                return block;
            }
        }
    }

    ptr::null_mut()
}

unsafe fn find_smallest(list: &FreeList, data_length: usize, alignment: usize) -> *mut FreeBlock {
    let mut selected: *mut FreeBlock = ptr::null_mut();

    for block in list.iter() {
        unsafe {
            if data_length <= (*block).size
                && fits(block, data_length, alignment)
                && (selected.is_null() || (*block).size < (*selected).size)
            {
                selected = block;
            }
        }
    }

    selected
}
