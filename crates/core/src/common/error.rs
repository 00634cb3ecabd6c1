//! Error and fault outcome types.
//!
//! Guest-triggered error conditions never unwind across the core's ABI: decode
//! errors become a guest halt, codegen overflow retries once then aborts the
//! process (a single block bigger than the code buffer is a host bug, not a guest
//! condition), and host access faults are resolved by the fault handler registry.
//! `CoreError` covers the handful of conditions that *do* propagate as `Result`s to the
//! caller of `map_range`/backend setup, where the caller is host code, not guest code.

use thiserror::Error;

use crate::common::addr::GuestAddr;

/// Failures that can be returned from core setup APIs (address-space construction,
/// backend initialization). None of these originate from guest behavior.
#[derive(Debug, Error)]
pub enum CoreError {
    /// `map_range` was called with a `begin`/`size` that isn't page-aligned.
    #[error("map_range: begin {begin:#010x} / size {size:#x} must be page-aligned")]
    UnalignedRange {
        /// Guest address passed as `begin`.
        begin: GuestAddr,
        /// Size in bytes passed as `size`.
        size: u32,
    },

    /// The host failed to reserve/mmap the fastmem virtual region.
    #[error("fastmem region setup failed: {0}")]
    FastmemSetup(String),

    /// The JIT code buffer could not hold a single block even when empty — a host
    /// bug (the block is larger than `Config::code_buffer_size`), not recoverable.
    #[error("code buffer overflow with an empty cache: block at {pc} is larger than the code buffer")]
    CodeBufferTooSmall {
        /// Guest PC of the block that didn't fit.
        pc: GuestAddr,
    },

    /// A guest write attempted to enable the MMU via MMUCR; unsupported.
    #[error("guest enabled the MMU via MMUCR at PC {pc}; unsupported")]
    MmuEnableUnsupported {
        /// PC of the instruction that wrote MMUCR.
        pc: GuestAddr,
    },
}

/// Outcome of a single registered fault handler's attempt to resolve a host access
/// fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultVerdict {
    /// This handler resolved the fault; the faulting host thread should resume.
    Handled,
    /// This handler doesn't recognize the fault; try the next registered handler.
    PropagateToNext,
    /// No handler claimed the fault; chain to whatever handler was previously
    /// installed (the OS default, typically a coredump).
    Abort,
}
