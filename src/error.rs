//! Failure events reported by the heap.
//!
//! Callers see failure as a null pointer (allocation) or `false`
//! (initialization and release). The enum below is the vocabulary of the
//! events that accompany those results through the [`log`] facade, so a host
//! application can name them in its log sink. The crate installs no sink of
//! its own; without one the events are discarded.

use std::panic::Location;

use thiserror::Error;

/// Log target carried by every event this crate emits.
pub const LOG_TARGET: &str = "region_heap";

/// The failure conditions a heap can report.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    /// `initialize` was called on a heap that already owns a region.
    #[error("heap has already been initialized")]
    AlreadyInitialized,

    /// Null region, zero length, misaligned base or invalid strategy at
    /// initialization.
    #[error("invalid heap configuration")]
    BadConfig,

    /// The requested alignment is not a power of two.
    #[error("alignment {0} is not a power of two")]
    AlignmentNotPow2(usize),

    /// The requested alignment exceeds [`MAXIMUM_ALIGNMENT`].
    ///
    /// [`MAXIMUM_ALIGNMENT`]: crate::MAXIMUM_ALIGNMENT
    #[error("alignment {0} exceeds the supported maximum")]
    AlignmentTooLarge(usize),

    /// No free block can satisfy the request.
    #[error("no free block can hold {0} bytes")]
    OutOfMemory(usize),

    /// A released pointer describes a block outside the heap region.
    #[error("pointer lies outside the heap region")]
    OutOfBounds,

    /// A released pointer was allocated by a different heap.
    #[error("allocation belongs to a different heap")]
    WrongHeap,

    /// The header sentinel was overwritten while the allocation was live.
    #[error("allocation header sentinel is corrupt")]
    CorruptHeader,

    /// The footer sentinel after the payload was overwritten.
    #[error("allocation footer sentinel is corrupt")]
    CorruptFooter,

    /// The release's array flag does not match the allocation's.
    #[error("array flag does not match the allocation")]
    ArrayMismatch,
}

/// Emits `error` through the log facade, tagged with the call site of the
/// operation that failed.
pub(crate) fn report(error: HeapError, locus: &Location<'_>) {
    log::error!(target: LOG_TARGET, "{error} ({locus})");
}
