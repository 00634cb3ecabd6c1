//! SH4 dynamic recompilation core for a Sega Dreamcast emulator.
//!
//! This crate implements a just-in-time recompiler targeting x86-64 with the
//! following pipeline:
//! 1. **Memory:** a paged guest address space with an mmap-backed fastmem region,
//!    backing RAM/VRAM/ARAM buffers, and pluggable MMIO handlers.
//! 2. **JIT:** a frontend that decodes one guest basic block into IR, optimizer
//!    passes over that IR, and an x86-64 backend that lowers it to machine code.
//! 3. **Cache:** compile-on-demand block storage keyed by guest PC, with a reverse
//!    host-PC map for fault recovery and self-modifying-code invalidation.
//! 4. **Fault:** process-wide `SIGSEGV` recovery for fastmem accesses that miss.
//! 5. **Peripherals:** the SH4 interrupt controller, DMAC channel-2 DDT path, and
//!    on-chip register window (TMU, store queue, cache control, GPIO).
//! 6. **Simulation:** `Simulator` ties all of the above into an `execute(cycles)`
//!    loop, plus configuration and statistics.

/// Common types and constants (guest addresses, errors, fault verdicts).
pub mod common;
/// Simulator configuration (memory sizes, code buffer size, block limits).
pub mod config;
/// Guest CPU context (`SH4Context`, `SR`, `FPSCR`).
pub mod context;
/// The block cache: compile-on-demand storage, fault-site tracking.
pub mod cache;
/// DMAC channel-2 DDT transfer path.
pub mod dma;
/// Process-wide fastmem fault recovery.
pub mod fault;
/// The SH4 interrupt controller.
pub mod interrupt;
/// The recompiler pipeline: frontend, optimizer, backend.
pub mod jit;
/// Guest address space, page table, and fastmem.
pub mod memory;
/// On-chip peripherals: TMU, store queue, and the compressed register window.
pub mod onchip;
/// Top-level `Simulator` and its execution loop.
pub mod sim;
/// Simulation statistics collection and reporting.
pub mod stats;

/// Root configuration type; use `Config::default()` or override individual fields.
pub use crate::config::Config;
/// Top-level simulator; owns the guest context, address space, and block cache.
pub use crate::sim::Simulator;
