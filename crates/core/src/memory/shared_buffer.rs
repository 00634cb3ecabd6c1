//! Shared-memory-object-backed physical storage.
//!
//! Backed by a POSIX shared-memory file descriptor rather than an anonymous `mmap`:
//! the same physical bytes must appear at every guest mirror simultaneously, which an
//! anonymous mapping can't do (it has exactly one mapping). A `memfd`-backed
//! `MAP_SHARED` region can be `mmap`'d at as many host addresses as there are
//! mirrors, all coherent with each other.

use std::ffi::CString;
use std::ptr;

/// A block of physical memory (RAM, VRAM, or ARAM) backed by a shared-memory file
/// descriptor, so [`crate::memory::fastmem::FastmemRegion`] can map it at every guest
/// mirror address.
pub struct SharedBuffer {
    fd: libc::c_int,
    size: usize,
    /// A private mapping kept around purely so non-fastmem (slowmem) code has a plain
    /// host pointer to read/write without going through the fastmem region at all.
    ptr: *mut u8,
}

// SAFETY: the buffer's only mutable state is the memory it describes, which callers
// serialize themselves; the single execution thread owns the core's memory ops.
unsafe impl Send for SharedBuffer {}
unsafe impl Sync for SharedBuffer {}

impl SharedBuffer {
    /// Creates a new shared buffer of `size` bytes (must be a multiple of the host page
    /// size), named `name` for debugging (`/proc/<pid>/maps` on Linux).
    ///
    /// # Panics
    ///
    /// Panics if the host fails to create or map the shared-memory object; this is a
    /// host setup failure, not a guest condition.
    #[must_use]
    pub fn new(name: &str, size: usize) -> Self {
        // SAFETY: `memfd_create` and `mmap` are called with valid arguments; the
        // returned fd/ptr are checked before use below.
        unsafe {
            let cname = CString::new(name).unwrap_or_else(|_| CString::new("shared_buffer").unwrap());
            let fd = libc::memfd_create(cname.as_ptr(), 0);
            assert!(fd >= 0, "memfd_create failed for {name}");
            let rc = libc::ftruncate(fd, size as libc::off_t);
            assert_eq!(rc, 0, "ftruncate failed for {name}");

            let ptr = libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            );
            assert!(ptr != libc::MAP_FAILED, "mmap failed for {name}");

            Self {
                fd,
                size,
                ptr: ptr.cast::<u8>(),
            }
        }
    }

    /// The file descriptor backing this buffer, for mapping additional mirrors.
    #[must_use]
    pub const fn fd(&self) -> libc::c_int {
        self.fd
    }

    /// Size in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.size
    }

    /// Whether the buffer is empty (always false for a constructed buffer; kept for
    /// the standard `len`/`is_empty` pair clippy expects).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The private-mapping host pointer for slowmem / host-side access.
    #[must_use]
    pub const fn as_mut_ptr(&self) -> *mut u8 {
        self.ptr
    }
}

impl Drop for SharedBuffer {
    fn drop(&mut self) {
        // SAFETY: `self.ptr`/`self.size` describe the mapping created in `new`, and
        // `self.fd` is a valid fd owned by this struct until this point.
        unsafe {
            libc::munmap(self.ptr.cast(), self.size);
            libc::close(self.fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_through_private_mapping_is_visible() {
        let buf = SharedBuffer::new("test-ram", 4096);
        // SAFETY: offset 0 is within the 4096-byte buffer.
        unsafe {
            buf.as_mut_ptr().write(0x42);
            assert_eq!(buf.as_mut_ptr().read(), 0x42);
        }
    }
}
