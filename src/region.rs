//! OS-backed byte regions.
//!
//! The heap itself never talks to the operating system: callers hand it a
//! region and keep ownership of it. For hosts that do not already have one,
//! this module maps a fresh region with the platform's raw memory call and
//! unmaps it on drop.
//!
//! Everything platform-specific lives in the tiny `sys` shim at the bottom;
//! [`MappedRegion`] itself only deals in lengths and nullable pointers.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::utils::align_up;

/// Cached page size; zero until first queried.
static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// A read-write byte region obtained from the operating system, unmapped
/// when dropped.
///
/// The mapping is page-aligned, which comfortably satisfies the alignment a
/// heap requires of its region base.
pub struct MappedRegion {
    addr: NonNull<u8>,
    len: usize,
}

impl MappedRegion {
    /// Maps a region of at least `len` bytes, rounded up to the page size.
    /// Returns None when the platform refuses the mapping.
    pub fn new(len: usize) -> Option<Self> {
        let len = align_up(len.max(1), page_size());
        let addr = NonNull::new(sys::map(len))?;

        Some(Self { addr, len })
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.addr.as_ptr()
    }

    /// The mapped length in bytes; at least what `new` was asked for.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        sys::unmap(self.addr.as_ptr(), self.len);
    }
}

/// The platform page size, queried once and cached.
fn page_size() -> usize {
    let cached = PAGE_SIZE.load(Ordering::Relaxed);
    if cached != 0 {
        return cached;
    }

    let size = sys::page_size();
    PAGE_SIZE.store(size, Ordering::Relaxed);
    size
}

/// Raw mapping calls. Each shim hides its platform's failure convention and
/// hands back a plain nullable pointer instead.
#[cfg(unix)]
mod sys {
    pub(super) fn map(len: usize) -> *mut u8 {
        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        // mmap reports failure with a sentinel value, not null.
        if addr == libc::MAP_FAILED {
            std::ptr::null_mut()
        } else {
            addr.cast()
        }
    }

    pub(super) fn unmap(addr: *mut u8, len: usize) {
        unsafe {
            libc::munmap(addr.cast(), len);
        }
    }

    pub(super) fn page_size() -> usize {
        unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
    }
}

#[cfg(windows)]
mod sys {
    use windows::Win32::System::Memory::{
        VirtualAlloc, VirtualFree, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE,
    };
    use windows::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};

    pub(super) fn map(len: usize) -> *mut u8 {
        unsafe { VirtualAlloc(None, len, MEM_RESERVE | MEM_COMMIT, PAGE_READWRITE).cast() }
    }

    pub(super) fn unmap(addr: *mut u8, _len: usize) {
        // A released mapping must be freed in full, hence length zero.
        unsafe {
            let _ = VirtualFree(addr.cast(), 0, MEM_RELEASE);
        }
    }

    pub(super) fn page_size() -> usize {
        let mut info = SYSTEM_INFO::default();
        unsafe { GetSystemInfo(&mut info) };

        info.dwPageSize as usize
    }
}
