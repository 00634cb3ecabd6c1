//! Process-wide SIGSEGV recovery for fastmem faults.
//!
//! Fastmem blocks never check a guest access's legality themselves: a read/write to
//! an unmapped or MMIO-only page simply segfaults. Recovery happens here, on the
//! faulting thread, synchronously: [`on_fault`] looks up which block's fastmem
//! access site produced the fault (recorded at lowering time), performs the
//! equivalent access through [`AddressSpace`]'s checked accessors, and tells the
//! platform trampoline where to resume.
//!
//! Recovery emulates the single faulting access (using the fixed register
//! convention `crate::jit::backend::x86_64::lower` always lowers fastmem accesses
//! to: host address in `r8`, a load's result in `rax`, a store's value in `rcx`) and
//! resumes past it — no disassembler needed to find operand registers from the raw
//! bytes. The cache entry is still unlinked and condemned to slowmem form afterward,
//! so only the one faulting execution pays this slower recovery path; every
//! subsequent dispatch recompiles through the checked accessors from the start.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::cache::BlockCache;
use crate::common::addr::GuestAddr;
use crate::memory::AddressSpace;

use super::platform;

/// Register values the platform trampoline reads out of the `ucontext_t` before
/// calling [`on_fault`], per the fixed fastmem lowering convention in
/// `crate::jit::backend::x86_64::lower`.
#[derive(Debug, Clone, Copy)]
pub struct FaultRegs {
    /// `r8`: the already-computed `membase + guest_addr` host pointer.
    pub host_addr_reg: u64,
    /// `rcx`: a store's value operand (unused for loads).
    pub store_value_reg: u64,
}

/// What the platform trampoline should do with the faulting thread.
#[derive(Debug, Clone, Copy)]
pub enum FaultAction {
    /// This was a recognized fastmem access; resume at `resume_pc`, first writing
    /// `result` into `rax` if this was a load.
    Handled { resume_pc: usize, result: Option<u64> },
    /// Not a fault this registry recognizes; the platform layer chains to whatever
    /// handler was previously installed (ordinarily the OS default, a coredump).
    PropagateToNext,
}

struct Live {
    cache: NonNull<BlockCache>,
    space: NonNull<AddressSpace>,
}

// SAFETY: the registry is only ever populated/read/cleared from the single thread
// that calls `execute`, including the signal handler that thread re-enters
// synchronously on its own fastmem fault.
unsafe impl Send for Live {}

static ACTIVE: AtomicPtr<Live> = AtomicPtr::new(std::ptr::null_mut());

/// Unregisters the live execution context when dropped.
pub struct Guard {
    _private: (),
}

impl Drop for Guard {
    fn drop(&mut self) {
        let prev = ACTIVE.swap(std::ptr::null_mut(), Ordering::SeqCst);
        if !prev.is_null() {
            // SAFETY: every non-null value ever stored in `ACTIVE` was produced by
            // `Box::into_raw` in `install`, and each is swapped out at most once.
            drop(unsafe { Box::from_raw(prev) });
        }
    }
}

/// Installs the process-wide `SIGSEGV` handler (idempotent) and registers `cache`/
/// `space` as the live execution context for as long as the returned guard lives.
/// `Simulator::execute` calls this once per invocation.
#[must_use]
pub fn install(cache: &mut BlockCache, space: &mut AddressSpace) -> Guard {
    platform::install();
    let live = Box::new(Live { cache: NonNull::from(cache), space: NonNull::from(space) });
    let prev = ACTIVE.swap(Box::into_raw(live), Ordering::SeqCst);
    if !prev.is_null() {
        // SAFETY: see `Guard::drop`.
        drop(unsafe { Box::from_raw(prev) });
    }
    Guard { _private: () }
}

/// Called by the platform trampoline on every `SIGSEGV`. Platform-agnostic: takes
/// and returns plain register values, never touches `ucontext_t` itself.
pub fn on_fault(host_pc: usize, regs: FaultRegs) -> FaultAction {
    let Some(live) = NonNull::new(ACTIVE.load(Ordering::SeqCst)) else {
        return FaultAction::PropagateToNext;
    };
    // SAFETY: `live` was registered by `install`, which outlives every fault this
    // thread can raise until its `Guard` is dropped after `execute` returns.
    let live = unsafe { live.as_ref() };
    let cache = unsafe { &mut *live.cache.as_ptr() };
    let space = unsafe { &mut *live.space.as_ptr() };

    let Some(site) = cache.lookup_fault_site(host_pc) else {
        return FaultAction::PropagateToNext;
    };

    let guest_addr = (regs.host_addr_reg.wrapping_sub(space.base() as u64)) as u32;
    let result = if site.is_store {
        let value = regs.store_value_reg;
        match site.width {
            1 => space.write8(GuestAddr::new(guest_addr), value as u8),
            2 => space.write16(GuestAddr::new(guest_addr), value as u16),
            4 => space.write32(GuestAddr::new(guest_addr), value as u32),
            8 => space.write64(GuestAddr::new(guest_addr), value),
            _ => unreachable!("fault sites only ever cover 1/2/4/8-byte accesses"),
        }
        None
    } else {
        Some(match site.width {
            1 => u64::from(space.read8(GuestAddr::new(guest_addr))),
            2 => u64::from(space.read16(GuestAddr::new(guest_addr))),
            4 => u64::from(space.read32(GuestAddr::new(guest_addr))),
            8 => space.read64(GuestAddr::new(guest_addr)),
            _ => unreachable!("fault sites only ever cover 1/2/4/8-byte accesses"),
        })
    };

    if let Some(entry) = cache.lookup_host(host_pc) {
        let guest_pc = entry.guest_addr;
        tracing::info!(pc = format_args!("{guest_pc:#010x}"), addr = format_args!("{guest_addr:#010x}"), "recovered fastmem fault");
        cache.mark_slowmem(guest_pc);
    }

    FaultAction::Handled { resume_pc: host_pc + site.len as usize, result }
}
