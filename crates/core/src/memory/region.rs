//! Page-table region kinds.

/// What a mapped page's storage is backed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// Main system RAM (area 3 and its mirrors).
    Ram,
    /// Video RAM (area 1, handled by the tile accelerator externally, mapped as RAM
    /// from the CPU's point of view for fastmem purposes).
    Vram,
    /// AICA sound RAM (area 0, `0x00800000-0x009fffff`).
    Aram,
    /// Memory-mapped I/O: no direct pointer, always dispatched through a handler.
    Mmio,
}

impl RegionKind {
    /// Whether this kind is backed by a direct host pointer (fastmem-eligible).
    #[must_use]
    pub const fn is_direct(self) -> bool {
        !matches!(self, Self::Mmio)
    }
}
