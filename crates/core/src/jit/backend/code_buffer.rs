//! The JIT's executable memory arena: a fixed-size mmap'd RWX region.
//!
//! One buffer backs every compiled block at once; the block cache resets it wholesale
//! on overflow rather than freeing individual blocks.

use std::ptr;

/// A fixed-size RWX mapping that the backend writes machine code into sequentially.
pub struct CodeBuffer {
    base: *mut u8,
    capacity: usize,
    cursor: usize,
}

// SAFETY: all mutation goes through `&mut self`, serialized by the single execution
// thread that owns the block cache.
unsafe impl Send for CodeBuffer {}

impl CodeBuffer {
    /// Reserves a `capacity`-byte RWX region.
    ///
    /// # Panics
    ///
    /// Panics if the host refuses the mapping — a setup failure, not a guest
    /// condition.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        // SAFETY: a fixed-size anonymous mapping is requested and checked for
        // failure before being stored. `PROT_EXEC` is required: this region holds
        // freshly emitted machine code that the execution loop calls into directly.
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                capacity,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        assert!(base != libc::MAP_FAILED, "failed to reserve {capacity} byte code buffer");
        Self { base: base.cast::<u8>(), capacity, cursor: 0 }
    }

    /// Host pointer one past the last written byte.
    #[must_use]
    pub const fn cursor_ptr(&self) -> *const u8 {
        self.base.wrapping_add(self.cursor)
    }

    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.capacity - self.cursor
    }

    #[must_use]
    pub const fn base(&self) -> *const u8 {
        self.base
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends `bytes`, returning the host pointer they were written at, or `None` if
    /// the buffer doesn't have room. The backend surfaces that as a null compiled
    /// function and lets the block cache reset the buffer before retrying.
    pub fn write(&mut self, bytes: &[u8]) -> Option<*const u8> {
        if bytes.len() > self.remaining() {
            return None;
        }
        let at = self.cursor_ptr();
        // SAFETY: `at` points `bytes.len()` bytes within `base..base+capacity`, which
        // is writable for the lifetime of this mapping.
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), at.cast_mut(), bytes.len());
        }
        self.cursor += bytes.len();
        Some(at)
    }

    /// Resets the cursor to the start, discarding every block written so far. The
    /// mapping itself is reused, not re-created.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }
}

impl Drop for CodeBuffer {
    fn drop(&mut self) {
        // SAFETY: `base`/`capacity` are exactly the arguments this mapping was
        // created with.
        unsafe {
            libc::munmap(self.base.cast(), self.capacity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_advances_the_cursor_and_returns_the_start_pointer() {
        let mut buf = CodeBuffer::new(4096);
        let p1 = buf.write(&[0xc3]).unwrap();
        let p2 = buf.write(&[0x90, 0x90]).unwrap();
        assert_eq!(p2 as usize, p1 as usize + 1);
        assert_eq!(buf.remaining(), 4096 - 3);
    }

    #[test]
    fn write_past_capacity_returns_none() {
        let mut buf = CodeBuffer::new(16);
        assert!(buf.write(&[0u8; 16]).is_some());
        assert!(buf.write(&[0u8; 1]).is_none());
    }

    #[test]
    fn reset_reclaims_the_whole_buffer() {
        let mut buf = CodeBuffer::new(16);
        let _ = buf.write(&[0u8; 16]).unwrap();
        buf.reset();
        assert_eq!(buf.remaining(), 16);
    }
}
