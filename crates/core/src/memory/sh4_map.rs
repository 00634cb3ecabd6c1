//! Wires the SH4's fixed physical memory map onto a generic [`AddressSpace`].
//!
//! Area 3 RAM is one 16 MiB shared buffer aliased at its four internal mirrors, each of
//! those in turn aliased at every outer `+0x20000000` mirror. Area 0/1/4/7 are MMIO;
//! Area 1 reuses the Area 0 handler
//! ("dispatched via area 0 handler"), and the on-chip register window additionally
//! gets its store-queue sub-region, which is **not** mirrored outside P4.

use crate::common::addr::GuestAddr;
use crate::common::error::CoreError;
use crate::memory::addr_space::AddressSpace;
use crate::memory::mmio::MmioHandler;
use crate::memory::region::RegionKind;

/// One of Area 3's four 16 MiB internal RAM mirrors.
pub const RAM_MIRROR_SIZE: u32 = 0x0100_0000;
/// The AICA sound RAM window size.
pub const ARAM_SIZE: u32 = 0x0020_0000;
/// The store-queue MMIO window size.
pub const STORE_QUEUE_SIZE: u32 = 0x0400_0000;
/// Guest base of the store-queue window; only present in P4, never mirrored.
pub const STORE_QUEUE_BASE: u32 = 0xe000_0000;

/// The six outer `+0x20000000` mirror offsets (`P0`..`P4`-and-one-more; the true
/// highest P4 sub-window containing the store queue sits above these and is mapped
/// separately, see [`STORE_QUEUE_BASE`]).
pub const MIRRORS: [u32; 6] = [0x0000_0000, 0x2000_0000, 0x4000_0000, 0x6000_0000, 0x8000_0000, 0xa000_0000];

/// Handlers for the four MMIO-backed SH4 areas. Area 1 (VRAM) is deliberately absent:
/// it dispatches through the Area 0 handler.
pub struct Sh4Handlers {
    /// Area 0: BIOS/flash/holly registers, `0x00000000-0x01ffffff` minus the AICA
    /// window.
    pub area0: Box<dyn MmioHandler>,
    /// Area 4: TA polygon FIFO, write-string only.
    pub area4: Box<dyn MmioHandler>,
    /// Area 7: SH4 on-chip registers (TMU, INTC, CCR, DMAC, PCTRA/PDTRA, ...).
    pub area7: Box<dyn MmioHandler>,
    /// The P4 store-queue write-combining buffer.
    pub store_queue: Box<dyn MmioHandler>,
}

/// Installs the fixed SH4 memory map into `space`, across every outer mirror.
///
/// # Errors
///
/// Returns [`CoreError::UnalignedRange`] if any of this module's constants are
/// inconsistent with `space`'s page size — a build-time invariant, not expected to ever
/// trigger in practice.
pub fn install(space: &mut AddressSpace, handlers: Sh4Handlers) -> Result<(), CoreError> {
    let area0_low_idx = space.map_mmio(GuestAddr::new(MIRRORS[0]), 0x0080_0000, handlers.area0)?;
    let area4_idx = space.map_mmio(GuestAddr::new(MIRRORS[0] + 0x1000_0000), 0x0400_0000, handlers.area4)?;
    let area7_idx = space.map_mmio(GuestAddr::new(MIRRORS[0] + 0x1c00_0000), 0x0400_0000, handlers.area7)?;

    for (i, &mirror) in MIRRORS.iter().enumerate() {
        // Area 0, low half: 0x00000000-0x007fffff (already registered for mirror 0).
        if i != 0 {
            space.map_mmio_mirror(GuestAddr::new(mirror), 0x0080_0000, area0_low_idx)?;
        }
        // AICA sound RAM: 0x00800000-0x009fffff, direct.
        space.map_direct(GuestAddr::new(mirror + 0x0080_0000), ARAM_SIZE, RegionKind::Aram, 0)?;
        // Area 0, high half: 0x00a00000-0x01ffffff.
        space.map_mmio_mirror(GuestAddr::new(mirror + 0x00a0_0000), 0x0160_0000, area0_low_idx)?;
        // Area 1 (VRAM): 0x04000000-0x07ffffff, dispatched via the Area 0 handler.
        space.map_mmio_mirror(GuestAddr::new(mirror + 0x0400_0000), 0x0400_0000, area0_low_idx)?;
        // Area 2 (0x08000000-0x0bffffff) is unused/reserved; leave unmapped.
        // Area 3 RAM: 0x0c000000-0x0fffffff, four internal mirrors of one buffer.
        for internal in 0..4u32 {
            let begin = GuestAddr::new(mirror + 0x0c00_0000 + internal * RAM_MIRROR_SIZE);
            space.map_direct(begin, RAM_MIRROR_SIZE, RegionKind::Ram, 0)?;
        }
        // Area 4 (TA FIFO): 0x10000000-0x13ffffff (already registered for mirror 0).
        if i != 0 {
            space.map_mmio_mirror(GuestAddr::new(mirror + 0x1000_0000), 0x0400_0000, area4_idx)?;
        }
        // Area 7 (on-chip registers): 0x1c000000-0x1fffffff.
        if i != 0 {
            space.map_mmio_mirror(GuestAddr::new(mirror + 0x1c00_0000), 0x0400_0000, area7_idx)?;
        }
    }

    // Store queue: only within true P4, never mirrored at the outer +0x20000000 stride.
    space.map_mmio(GuestAddr::new(STORE_QUEUE_BASE), STORE_QUEUE_SIZE, handlers.store_queue)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::mmio::UnhandledMmio;

    fn handlers() -> Sh4Handlers {
        Sh4Handlers {
            area0: Box::new(UnhandledMmio),
            area4: Box::new(UnhandledMmio),
            area7: Box::new(UnhandledMmio),
            store_queue: Box::new(UnhandledMmio),
        }
    }

    #[test]
    fn ram_is_coherent_across_every_outer_mirror() {
        let mut space = AddressSpace::new(RAM_MIRROR_SIZE as usize, 0x1000, ARAM_SIZE as usize);
        install(&mut space, handlers()).unwrap();

        let phys = GuestAddr::new(0x0c01_0000);
        space.write32(phys, 0xcafe_babe);
        for mirror in MIRRORS {
            let mirrored = GuestAddr::new(phys.val() | mirror);
            assert_eq!(space.read32(mirrored), 0xcafe_babe, "mirror {mirror:#010x} diverged");
        }
    }

    #[test]
    fn area3_internal_mirrors_alias_within_one_outer_mirror() {
        let mut space = AddressSpace::new(RAM_MIRROR_SIZE as usize, 0x1000, ARAM_SIZE as usize);
        install(&mut space, handlers()).unwrap();

        space.write32(GuestAddr::new(0x0c00_1000), 0x1234_5678);
        assert_eq!(space.read32(GuestAddr::new(0x0d00_1000)), 0x1234_5678);
        assert_eq!(space.read32(GuestAddr::new(0x0e00_1000)), 0x1234_5678);
        assert_eq!(space.read32(GuestAddr::new(0x0f00_1000)), 0x1234_5678);
    }

    #[test]
    fn aram_window_is_direct_and_independent_of_ram() {
        let mut space = AddressSpace::new(RAM_MIRROR_SIZE as usize, 0x1000, ARAM_SIZE as usize);
        install(&mut space, handlers()).unwrap();

        space.write32(GuestAddr::new(0x0080_0100), 0x0bad_f00d);
        assert_eq!(space.read32(GuestAddr::new(0x0080_0100)), 0x0bad_f00d);
        assert_eq!(space.read32(GuestAddr::new(0x0c00_0000)), 0);
    }

    #[test]
    fn store_queue_window_is_mmio_only_in_p4() {
        let mut space = AddressSpace::new(RAM_MIRROR_SIZE as usize, 0x1000, ARAM_SIZE as usize);
        install(&mut space, handlers()).unwrap();
        // Unhandled MMIO reads return 0 rather than faulting; this just exercises that
        // the window dispatches through a handler instead of a direct pointer.
        assert_eq!(space.read32(GuestAddr::new(STORE_QUEUE_BASE)), 0);
    }
}
