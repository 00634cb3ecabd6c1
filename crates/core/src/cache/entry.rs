//! Block cache entry and flags.

use crate::jit::backend::{CompiledFn, FaultSite};

/// Bits carried alongside a compiled block. Mirrors [`crate::jit::ir::InstrFlags`]'s
/// hand-rolled newtype rather than pulling in a bitflags crate for one bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockFlags(u8);

impl BlockFlags {
    pub const NONE: Self = Self(0);
    /// Compiled with every guest access routed through [`crate::jit::backend::runtime`]'s
    /// checked accessors instead of direct `membase` arithmetic: set after a fastmem
    /// fault recovers, so the next compile at that address never touches the
    /// faulting page directly again.
    pub const SLOWMEM: Self = Self(1 << 0);

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for BlockFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One compiled block, as tracked by both of [`super::block_cache::BlockCache`]'s
/// sorted maps.
#[derive(Debug, Clone, Copy)]
pub struct BlockEntry {
    pub host_addr: usize,
    pub host_size: u32,
    pub guest_addr: u32,
    pub guest_size: u32,
    pub flags: BlockFlags,
    /// SH4 cycles this block accounts for when the execution loop subtracts from its
    /// budget.
    pub guest_cycles: u32,
}

impl BlockEntry {
    #[must_use]
    pub fn contains_guest(&self, addr: u32) -> bool {
        addr.wrapping_sub(self.guest_addr) < self.guest_size
    }

    #[must_use]
    pub fn contains_host(&self, host_pc: usize) -> bool {
        host_pc.wrapping_sub(self.host_addr) < self.host_size as usize
    }

    /// Reconstitutes the callable entry point. Valid only while the owning
    /// `CodeBuffer` hasn't been reset since this block was compiled.
    #[must_use]
    pub fn as_fn(&self) -> CompiledFn {
        // SAFETY: `host_addr` was produced by `CodeBuffer::write` for bytes encoding a
        // valid `CompiledFn` body (backend::compile's contract), and `BlockCache`
        // never hands out an entry after resetting its buffer.
        unsafe { std::mem::transmute::<usize, CompiledFn>(self.host_addr) }
    }
}

/// A fastmem access site, fixed up to an absolute host address once its block lands
/// in the code buffer.
#[derive(Debug, Clone, Copy)]
pub struct AbsoluteFaultSite {
    pub host_pc: usize,
    pub len: u8,
    pub width: u8,
    pub is_store: bool,
}

impl AbsoluteFaultSite {
    #[must_use]
    pub fn from_relative(host_addr: usize, site: FaultSite) -> Self {
        Self { host_pc: host_addr + site.offset as usize, len: site.len, width: site.width, is_store: site.is_store }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_flags_or_combines_bits() {
        let flags = BlockFlags::NONE | BlockFlags::SLOWMEM;
        assert!(flags.contains(BlockFlags::SLOWMEM));
    }

    #[test]
    fn contains_guest_is_half_open() {
        let entry =
            BlockEntry { host_addr: 0, host_size: 0, guest_addr: 0x8c01_0000, guest_size: 16, flags: BlockFlags::NONE, guest_cycles: 4 };
        assert!(entry.contains_guest(0x8c01_0000));
        assert!(entry.contains_guest(0x8c01_000f));
        assert!(!entry.contains_guest(0x8c01_0010));
    }
}
