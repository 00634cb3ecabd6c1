//! The 2048-entry, 2 MiB-granularity page table.
//!
//! Indexed by the *full* 32-bit guest address (not the masked physical address): the
//! SH4's P0-P4 mirrors are distinct entries here, each independently populated by
//! [`super::sh4_map`] so every mirror resolves without a runtime mask-and-branch.

use crate::common::addr::GuestAddr;

/// 2 MiB page granularity (`2^21` bytes).
pub const PAGE_BITS: u32 = 21;

/// Page size in bytes.
pub const PAGE_SIZE: u32 = 1 << PAGE_BITS;

/// `4 GiB / 2 MiB`.
pub const MAX_PAGES: usize = 1 << (32 - PAGE_BITS);

/// One page-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSlot {
    /// No mapping installed; any access here is a host bug (the SH4 mapping table
    /// covers the entire 32-bit space), kept only as the pre-init default.
    Unmapped,
    /// Backed by a direct host pointer. The stored value is the host address that
    /// corresponds to guest address 0 within this page's region — i.e. it has already
    /// had the page's guest base address subtracted out, so a direct access computes
    /// `(base.wrapping_add(addr as usize)) as *mut u8` for any `addr` in the page,
    /// not just the page-aligned start.
    Direct(usize),
    /// Backed by a registered [`super::mmio::MmioHandler`], identified by its index in
    /// the address space's handler table.
    Mmio(u32),
}

/// The per-address-space page table.
pub struct PageTable {
    slots: Box<[PageSlot; MAX_PAGES]>,
}

impl PageTable {
    /// Creates an all-[`PageSlot::Unmapped`] table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Box::new([PageSlot::Unmapped; MAX_PAGES]),
        }
    }

    /// Page index for a guest address (full 32-bit, mirror-sensitive).
    #[inline(always)]
    #[must_use]
    pub const fn page_index(addr: GuestAddr) -> usize {
        (addr.val() >> PAGE_BITS) as usize
    }

    /// Rounds `addr` down to its containing page's first guest address.
    #[inline(always)]
    #[must_use]
    pub const fn page_base(addr: GuestAddr) -> GuestAddr {
        GuestAddr::new(addr.val() & !(PAGE_SIZE - 1))
    }

    /// Installs `slot` at every page covering `[begin, begin+len)`.
    ///
    /// # Panics
    ///
    /// Panics if `begin`/`len` are not page-aligned — a host setup bug, not a guest
    /// condition.
    pub fn install(&mut self, begin: GuestAddr, len: u32, slot: PageSlot) {
        assert_eq!(begin.val() % PAGE_SIZE, 0, "page table range must be page-aligned");
        assert_eq!(len % PAGE_SIZE, 0, "page table range length must be page-aligned");
        let first = Self::page_index(begin);
        let count = (len / PAGE_SIZE) as usize;
        for (i, s) in self.slots[first..first + count].iter_mut().enumerate() {
            *s = match slot {
                // Direct slots are pre-biased per-page: each page needs its own bias so
                // that `base + addr` is correct regardless of which page within the
                // range `addr` falls in.
                PageSlot::Direct(base) => PageSlot::Direct(base.wrapping_add(i * PAGE_SIZE as usize)),
                other => other,
            };
        }
    }

    /// Looks up the slot covering `addr`.
    #[inline(always)]
    #[must_use]
    pub fn slot(&self, addr: GuestAddr) -> PageSlot {
        self.slots[Self::page_index(addr)]
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_slot_bias_is_per_page() {
        let mut pt = PageTable::new();
        let base_host = 0x1000_0000usize;
        pt.install(GuestAddr::new(0), PAGE_SIZE * 2, PageSlot::Direct(base_host));
        match pt.slot(GuestAddr::new(0)) {
            PageSlot::Direct(b) => assert_eq!(b, base_host),
            _ => panic!("expected direct slot"),
        }
        match pt.slot(GuestAddr::new(PAGE_SIZE)) {
            PageSlot::Direct(b) => assert_eq!(b, base_host + PAGE_SIZE as usize),
            _ => panic!("expected direct slot"),
        }
    }

    #[test]
    fn mmio_slot_roundtrip() {
        let mut pt = PageTable::new();
        pt.install(GuestAddr::new(PAGE_SIZE), PAGE_SIZE, PageSlot::Mmio(7));
        assert_eq!(pt.slot(GuestAddr::new(PAGE_SIZE + 4)), PageSlot::Mmio(7));
        assert_eq!(pt.slot(GuestAddr::new(0)), PageSlot::Unmapped);
    }
}
