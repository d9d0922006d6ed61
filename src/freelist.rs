//! The free-block list.
//!
//! Free spans of the region are tracked by a doubly linked list whose nodes
//! live inside the free memory itself. A [`FreeBlock`] descriptor sits at
//! the start of each span; the descriptor's own address IS the span's start
//! address, and its `size` covers the descriptor too:
//!
//! ```text
//!  root
//!   |
//!   v
//! +-----------+--------+      +-----------+-----+      +-----------+---+
//! | FreeBlock | unused | .... | FreeBlock | ... | .... | FreeBlock |   |
//! +-----------+--------+      +-----------+-----+      +-----------+---+
//!   ^  | next                   ^  |  next               ^
//!   |  +------------------------+  +--------------------+|
//!   +--- previous ---              (ascending addresses)
//! ```
//!
//! The list is kept sorted by ascending node address. That ordering is the
//! single source of physical-adjacency information: two list neighbours
//! whose spans touch in memory are merged on the spot, so no two adjacent
//! nodes are ever physically contiguous.

use std::mem;
use std::ptr;

/// Size in bytes of a [`FreeBlock`] descriptor; the smallest span a free
/// block can describe.
pub(crate) const FREE_BLOCK_SIZE: usize = mem::size_of::<FreeBlock>();

/// Descriptor written at the start of every free span.
#[repr(C)]
pub(crate) struct FreeBlock {
    /// Total size of the span, including this descriptor.
    pub size: usize,
    /// Lower-addressed neighbour in the list, or null at the head.
    pub previous: *mut FreeBlock,
    /// Higher-addressed neighbour in the list, or null at the tail.
    pub next: *mut FreeBlock,
}

/// Address-ordered list of the [`FreeBlock`] descriptors in a region.
///
/// The list owns no memory; every node it links lives inside the region the
/// heap manages. All link surgery therefore happens through raw pointers,
/// and the callers of the unsafe methods guarantee the nodes are valid,
/// in-region descriptors.
pub(crate) struct FreeList {
    root: *mut FreeBlock,
}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self {
            root: ptr::null_mut(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.root.is_null()
    }

    /// Walks the list from the lowest-addressed block upwards.
    pub(crate) fn iter(&self) -> Iter {
        Iter { current: self.root }
    }

    /// Splices a detached block into the list at its address-ordered
    /// position.
    ///
    /// **SAFETY**: `block` must point at a valid descriptor inside the
    /// region, detached from any list (both links null).
    pub(crate) unsafe fn insert(&mut self, block: *mut FreeBlock) {
        unsafe {
            debug_assert!(!block.is_null());
            debug_assert!((*block).previous.is_null());
            debug_assert!((*block).next.is_null());

            let mut search = self.root;
            while !search.is_null() {
                if (block as usize) < (search as usize) {
                    (*block).next = search;
                    (*block).previous = (*search).previous;

                    if !(*search).previous.is_null() {
                        (*(*search).previous).next = block;
                    } else {
                        self.root = block;
                    }

                    (*search).previous = block;
                    return;
                }

                if (*search).next.is_null() {
                    // Highest-addressed block so far, append at the tail.
                    (*block).previous = search;
                    (*search).next = block;
                    return;
                }

                search = (*search).next;
            }

            self.root = block;
        }
    }

    /// Unlinks `block`, joining its neighbours, and detaches its links.
    ///
    /// **SAFETY**: `block` must be a member of this list.
    pub(crate) unsafe fn remove(&mut self, block: *mut FreeBlock) {
        unsafe {
            let previous = (*block).previous;
            let next = (*block).next;

            if !previous.is_null() {
                (*previous).next = next;
            } else {
                self.root = next;
            }

            if !next.is_null() {
                (*next).previous = previous;
            }

            (*block).previous = ptr::null_mut();
            (*block).next = ptr::null_mut();
        }
    }

    /// Puts `new` into the exact list position of `old`. Used when a carve
    /// leaves a remainder: the remainder starts above the consumed block
    /// and below the old successor, so the address ordering is preserved.
    ///
    /// **SAFETY**: `old` must be a member of this list and `new` a valid
    /// detached descriptor with `old < new < old.next`.
    pub(crate) unsafe fn replace(&mut self, old: *mut FreeBlock, new: *mut FreeBlock) {
        unsafe {
            let previous = (*old).previous;
            let next = (*old).next;

            (*new).previous = previous;
            (*new).next = next;

            if !previous.is_null() {
                (*previous).next = new;
            } else {
                self.root = new;
            }

            if !next.is_null() {
                (*next).previous = new;
            }
        }
    }

    /// Merges `block` with its list neighbours where the spans touch in
    /// memory, and returns the surviving block.
    ///
    /// The successor is folded in first; a backward merge then compares the
    /// predecessor's end against `block` with its final size.
    ///
    /// **SAFETY**: `block` must be a member of this list.
    pub(crate) unsafe fn coalesce(&mut self, mut block: *mut FreeBlock) -> *mut FreeBlock {
        unsafe {
            let block_start = block as usize;
            let block_end = block_start + (*block).size;

            let next = (*block).next;
            if !next.is_null() && block_end == next as usize {
                (*block).size += (*next).size;
                (*block).next = (*next).next;

                if !(*block).next.is_null() {
                    (*(*block).next).previous = block;
                }
            }

            let previous = (*block).previous;
            if !previous.is_null() {
                let previous_end = previous as usize + (*previous).size;

                if previous_end == block_start {
                    (*previous).size += (*block).size;
                    (*previous).next = (*block).next;

                    if !(*block).next.is_null() {
                        (*(*block).next).previous = previous;
                    }

                    block = previous;
                }
            }

            block
        }
    }
}

/// Iterator over the raw descriptor pointers of a [`FreeList`].
pub(crate) struct Iter {
    current: *mut FreeBlock,
}

impl Iterator for Iter {
    type Item = *mut FreeBlock;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_null() {
            return None;
        }

        let block = self.current;
        self.current = unsafe { (*block).next };
        Some(block)
    }
}
