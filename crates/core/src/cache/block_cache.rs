//! The block cache: compile-on-demand, keyed by guest PC, with a reverse host-PC map
//! for fault recovery.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::common::addr::GuestAddr;
use crate::jit::backend::{self, code_buffer::CodeBuffer, CompiledFn};
use crate::jit::frontend;
use crate::jit::ir::BlockId;
use crate::memory::AddressSpace;

use super::entry::{AbsoluteFaultSite, BlockEntry, BlockFlags};

/// One dispatch-array slot: either the "not yet compiled" trampoline sentinel, or
/// the last block known to live at this slot's guest address. Slots are
/// direct-mapped by `(guest_pc >> 1) % len`, so two addresses can collide; a mismatch
/// just falls back to the sorted map instead of misdispatching.
#[derive(Clone, Copy)]
enum Slot {
    Trampoline,
    Cached { guest_addr: u32, func: CompiledFn },
}

/// Owns the executable arena and both sorted maps. One instance serves the whole
/// address space; callers never construct a `BlockCache` per region.
pub struct BlockCache {
    code: CodeBuffer,
    dispatch: Vec<Slot>,
    by_guest: BTreeMap<u32, BlockEntry>,
    by_host: BTreeMap<usize, BlockEntry>,
    fault_sites: Vec<AbsoluteFaultSite>,
    /// Guest addresses the fault handler has condemned to `BF_SLOWMEM`. Consulted by
    /// [`Self::get_or_compile`] so a recompile after `mark_slowmem` sticks even though
    /// the execution loop never passes flags of its own.
    slowmem_addrs: BTreeSet<u32>,
    /// Total `BF_SLOWMEM` recoveries, counting repeats at an already-condemned
    /// address (unlike `slowmem_addrs.len()`, which only tracks distinct ones).
    slowmem_faults: u64,
    /// Dispatch-array slot matches that avoided a tree lookup or compile entirely.
    dispatch_hits: u64,
    /// Dispatch-array misses that fell through to the sorted map or a fresh compile.
    dispatch_misses: u64,
    /// Blocks compiled from scratch, including recompiles after `mark_slowmem`/
    /// `remove_blocks`/`clear_blocks`.
    blocks_compiled: u64,
    max_instrs: u32,
}

impl BlockCache {
    /// `dispatch_entries` should track `code_region_size >> 1`; `BlockCache`
    /// itself stays agnostic of what "the code region" means physically and just
    /// takes the entry count as configured, wrapping any address that falls outside
    /// it via modulo rather than indexing out of bounds.
    #[must_use]
    pub fn new(code_buffer_size: usize, dispatch_entries: usize, max_instrs: u32) -> Self {
        Self {
            code: CodeBuffer::new(code_buffer_size),
            dispatch: vec![Slot::Trampoline; dispatch_entries.max(1)],
            by_guest: BTreeMap::new(),
            by_host: BTreeMap::new(),
            fault_sites: Vec::new(),
            slowmem_addrs: BTreeSet::new(),
            slowmem_faults: 0,
            dispatch_hits: 0,
            dispatch_misses: 0,
            blocks_compiled: 0,
            max_instrs,
        }
    }

    fn dispatch_index(&self, phys: u32) -> usize {
        (phys as usize >> 1) % self.dispatch.len()
    }

    /// Returns the compiled entry point for `pc`, compiling it first if necessary.
    pub fn get_or_compile(&mut self, pc: GuestAddr, mem: &mut AddressSpace) -> CompiledFn {
        let phys = pc.physical().val();
        let idx = self.dispatch_index(phys);
        if let Slot::Cached { guest_addr, func } = self.dispatch[idx] {
            if guest_addr == phys {
                self.dispatch_hits += 1;
                return func;
            }
        }
        self.dispatch_misses += 1;
        if let Some(entry) = self.by_guest.get(&phys) {
            let func = entry.as_fn();
            self.dispatch[idx] = Slot::Cached { guest_addr: phys, func };
            return func;
        }
        let flags = if self.slowmem_addrs.contains(&phys) { BlockFlags::SLOWMEM } else { BlockFlags::NONE };
        self.compile_code(phys, mem, flags)
    }

    /// Compiles the block at `guest_pc`, retrying once against an emptied cache if
    /// the code buffer is full.
    pub fn compile_code(&mut self, guest_pc: u32, mem: &mut AddressSpace, flags: BlockFlags) -> CompiledFn {
        let span = tracing::info_span!("compile_block", pc = format_args!("{guest_pc:#010x}"), slowmem = flags.contains(BlockFlags::SLOWMEM));
        let _enter = span.enter();
        match self.try_compile(guest_pc, mem, flags) {
            Some(func) => func,
            None => {
                warn!("code buffer full, clearing and retrying");
                self.clear_blocks();
                self.try_compile(guest_pc, mem, flags).expect("one block cannot exceed an emptied code buffer")
            }
        }
    }

    fn try_compile(&mut self, guest_pc: u32, mem: &mut AddressSpace, flags: BlockFlags) -> Option<CompiledFn> {
        let builder = frontend::build_block(mem, guest_pc, self.max_instrs);
        let guest_cycles = builder.guest_cycles;
        let slowmem = flags.contains(BlockFlags::SLOWMEM);
        let before = self.code.remaining();
        let (func, sites) = backend::compile(builder, BlockId(0), &mut self.code, slowmem)?;
        let host_addr = func as usize;
        let host_size = u32::try_from(before - self.code.remaining()).expect("one block cannot exceed u32::MAX bytes");
        let guest_size = guest_cycles.saturating_mul(2);
        let entry = BlockEntry { host_addr, host_size, guest_addr: guest_pc, guest_size, flags, guest_cycles };

        self.by_guest.insert(guest_pc, entry);
        self.by_host.insert(host_addr, entry);
        self.fault_sites.extend(sites.into_iter().map(|s| AbsoluteFaultSite::from_relative(host_addr, s)));
        let idx = self.dispatch_index(guest_pc);
        self.dispatch[idx] = Slot::Cached { guest_addr: guest_pc, func };
        self.blocks_compiled += 1;
        debug!(pc = format_args!("{guest_pc:#010x}"), bytes = host_size, "compiled block");
        Some(func)
    }

    /// Removes every block whose guest range contains `guest_pc`, re-scanning until
    /// none overlap. Overlap is resolved broadly on purpose: a store that clobbers
    /// even one byte of a compiled block invalidates the whole block, never a
    /// byte-precise sub-range.
    pub fn remove_blocks(&mut self, guest_pc: u32) {
        loop {
            let Some(&addr) = self.by_guest.iter().find(|(_, e)| e.contains_guest(guest_pc)).map(|(a, _)| a) else {
                break;
            };
            let Some(entry) = self.by_guest.remove(&addr) else { break };
            self.by_host.remove(&entry.host_addr);
            self.fault_sites.retain(|s| !entry.contains_host(s.host_pc));
            let idx = self.dispatch_index(addr);
            if let Slot::Cached { guest_addr, .. } = self.dispatch[idx] {
                if guest_addr == addr {
                    self.dispatch[idx] = Slot::Trampoline;
                }
            }
        }
    }

    /// Resets every dispatch slot without forgetting compiled blocks. A block already
    /// executing when this runs finishes normally through its own epilog; only
    /// future dispatches recompile.
    pub fn unlink_blocks(&mut self) {
        for slot in &mut self.dispatch {
            *slot = Slot::Trampoline;
        }
    }

    /// Condemns `guest_pc` to `BF_SLOWMEM` and unlinks its current entry so the next
    /// `get_or_compile` recompiles it in slow mode. This is what the fault handler
    /// calls once it has emulated a single faulting access, so that address never
    /// faults again; the block that just faulted keeps running off its
    /// already-patched copy, only future dispatches are affected.
    pub fn mark_slowmem(&mut self, guest_pc: u32) {
        self.slowmem_faults += 1;
        self.slowmem_addrs.insert(guest_pc);
        if let Some(entry) = self.by_guest.remove(&guest_pc) {
            self.by_host.remove(&entry.host_addr);
            self.fault_sites.retain(|s| !entry.contains_host(s.host_pc));
        }
        let idx = self.dispatch_index(guest_pc);
        if let Slot::Cached { guest_addr, .. } = self.dispatch[idx] {
            if guest_addr == guest_pc {
                self.dispatch[idx] = Slot::Trampoline;
            }
        }
    }

    /// Drops every compiled block and rewinds the code buffer. Only safe when
    /// nothing is currently executing.
    pub fn clear_blocks(&mut self) {
        self.unlink_blocks();
        self.by_guest.clear();
        self.by_host.clear();
        self.fault_sites.clear();
        self.code.reset();
    }

    /// Looks up the block entry whose compiled range contains `host_pc`: the fault
    /// handler's host-PC-to-block-entry reverse lookup.
    #[must_use]
    pub fn lookup_host(&self, host_pc: usize) -> Option<&BlockEntry> {
        self.by_host.range(..=host_pc).next_back().map(|(_, e)| e).filter(|e| e.contains_host(host_pc))
    }

    /// Looks up the recorded fastmem access site at exactly `host_pc`.
    #[must_use]
    pub fn lookup_fault_site(&self, host_pc: usize) -> Option<AbsoluteFaultSite> {
        self.fault_sites.iter().copied().find(|s| s.host_pc == host_pc)
    }

    /// Cycle cost the execution loop should subtract from its budget for the block at
    /// `guest_pc`, which must already be compiled (i.e. have just been returned by
    /// `get_or_compile`).
    #[must_use]
    pub fn guest_cycles(&self, guest_pc: u32) -> u32 {
        self.by_guest.get(&guest_pc).map_or(1, |e| e.guest_cycles.max(1))
    }

    /// Total `BF_SLOWMEM` recoveries handled so far.
    #[must_use]
    pub fn slowmem_fault_count(&self) -> u64 {
        self.slowmem_faults
    }

    /// Distinct guest addresses currently condemned to `BF_SLOWMEM`.
    #[must_use]
    pub fn slowmem_addr_count(&self) -> u64 {
        self.slowmem_addrs.len() as u64
    }

    /// Blocks compiled from scratch since this cache was created.
    #[must_use]
    pub fn blocks_compiled_count(&self) -> u64 {
        self.blocks_compiled
    }

    /// Dispatch-array slot matches that returned a compiled block without a tree
    /// lookup or recompile.
    #[must_use]
    pub fn dispatch_hit_count(&self) -> u64 {
        self.dispatch_hits
    }

    /// Dispatch-array misses that fell through to the sorted map or a fresh compile.
    #[must_use]
    pub fn dispatch_miss_count(&self) -> u64 {
        self.dispatch_misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::RegionKind;

    const RAM_BASE: u32 = 0x0c00_0000;
    const RAM_SIZE: u32 = 0x0020_0000; // one page: PAGE_SIZE is 2 MiB.
    const CODE_PC: u32 = RAM_BASE + 0x1_0000;

    fn boot_image(entry: &[u16]) -> AddressSpace {
        let mut space = AddressSpace::new(RAM_SIZE as usize, RAM_SIZE as usize, 0x0020_0000);
        space
            .map_direct(GuestAddr::new(RAM_BASE), RAM_SIZE, RegionKind::Ram, 0)
            .expect("ram map");
        for (i, &word) in entry.iter().enumerate() {
            space.write16(GuestAddr::new(CODE_PC + i as u32 * 2), word);
        }
        space
    }

    #[test]
    fn compiling_twice_at_the_same_pc_hits_the_dispatch_cache() {
        // BRA -2 (branch to self): 1010 dddddddddddd, disp=-2 encoded as 0xffe -> 0xaffe; NOP delay slot.
        let mut mem = boot_image(&[0xaffe, 0x0009]);
        let mut cache = BlockCache::new(1 << 16, 1024, 64);
        let f1 = cache.get_or_compile(GuestAddr::new(CODE_PC), &mut mem);
        let f2 = cache.get_or_compile(GuestAddr::new(CODE_PC), &mut mem);
        assert_eq!(f1 as usize, f2 as usize);
    }

    #[test]
    fn remove_blocks_forces_a_recompile_at_a_new_host_address() {
        let mut mem = boot_image(&[0xaffe, 0x0009]);
        let mut cache = BlockCache::new(1 << 16, 1024, 64);
        let f1 = cache.get_or_compile(GuestAddr::new(CODE_PC), &mut mem);
        cache.remove_blocks(CODE_PC);
        assert!(cache.by_guest.is_empty());
        let f2 = cache.get_or_compile(GuestAddr::new(CODE_PC), &mut mem);
        assert_ne!(f1 as usize, f2 as usize, "a fresh compile lands at a new code buffer offset");
    }

    #[test]
    fn clear_blocks_resets_the_code_buffer() {
        let mut mem = boot_image(&[0xaffe, 0x0009]);
        let mut cache = BlockCache::new(1 << 16, 1024, 64);
        let _ = cache.get_or_compile(GuestAddr::new(CODE_PC), &mut mem);
        cache.clear_blocks();
        assert!(cache.by_host.is_empty());
        assert!(cache.lookup_host(0).is_none());
    }
}
