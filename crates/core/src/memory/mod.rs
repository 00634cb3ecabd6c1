//! Guest address space, page table, and fastmem.
//!
//! Dependency order: page table -> address space. Everything above this
//! module (frontend, backend, block cache) treats [`AddressSpace`] as the sole
//! interface to guest memory.

/// Region kinds a page can be mapped as.
pub mod region;

/// The pluggable MMIO handler contract external peripherals implement.
pub mod mmio;

/// The 2048-entry, 2 MiB-granularity page table.
pub mod page_table;

/// Shared-memory-object-backed physical storage (RAM/VRAM/ARAM), mappable at several
/// host virtual addresses at once so guest mirrors stay coherent.
pub mod shared_buffer;

/// Reservation and protection of the host 4 GiB fastmem region.
pub mod fastmem;

/// The guest address space: page table + fastmem region + MMIO dispatch.
pub mod addr_space;

/// The SH4-specific region layout and mirror table.
pub mod sh4_map;

pub use addr_space::AddressSpace;
pub use mmio::MmioHandler;
pub use region::RegionKind;
