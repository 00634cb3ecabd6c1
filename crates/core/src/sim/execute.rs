//! The execution loop: the one place that ties the block cache, the fault handler
//! registry, and the shared on-chip device state together.

use crate::common::addr::GuestAddr;
use crate::fault;

use super::cpu::Simulator;

impl Simulator {
    /// Runs guest code until at least `cycles` have elapsed, returning the number of
    /// cycles actually executed (at least `cycles`, since a block's cost is only known
    /// whole).
    ///
    /// Every block boundary: updates `ctx.pc` from the block's return value, lets the
    /// timer unit and interrupt controller observe the cycles just spent, and flushes
    /// the whole block cache if the last block's on-chip register write asked for one.
    pub fn execute(&mut self, cycles: u32) -> u32 {
        let _guard = fault::install(&mut self.cache, &mut self.space);
        let membase = self.space.base();

        let mut spent = 0u32;
        while spent < cycles {
            let pc = GuestAddr::new(self.ctx.pc);
            let func = self.cache.get_or_compile(pc, &mut self.space);
            let block_cycles = self.cache.guest_cycles(pc.physical().val());

            let space_ptr: *mut crate::memory::AddressSpace = &mut self.space;
            // SAFETY: `func` was compiled by `backend::compile` for exactly this
            // signature; `membase` and `space_ptr` stay valid for the call's duration
            // since both outlive it on this stack frame.
            let next_pc = unsafe { func(&mut self.ctx, membase, space_ptr) };
            self.ctx.pc = next_pc;

            self.stats.cycles += u64::from(block_cycles);
            spent += block_cycles;

            self.stats.slowmem_faults = self.cache.slowmem_fault_count();
            self.stats.slowmem_addrs_condemned = self.cache.slowmem_addr_count();
            self.stats.blocks_compiled = self.cache.blocks_compiled_count();
            self.stats.dispatch_hits = self.cache.dispatch_hit_count();
            self.stats.dispatch_misses = self.cache.dispatch_miss_count();

            self.tmu.borrow_mut().run_timers(block_cycles, &mut self.intc.borrow_mut());

            if self.ici_requested.replace(false) {
                self.cache.clear_blocks();
                self.stats.cache_flushes += 1;
            }

            if let Some(intevt) = self.intc.borrow_mut().accept(&mut self.ctx) {
                self.intevt.set(u32::from(intevt));
                self.stats.interrupts_accepted += 1;
            }
        }
        spent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::memory::RegionKind;

    fn booted(entry: &[u16]) -> Simulator {
        let config = Config { ram_size: 0x0020_0000, vram_size: 0x1000, aram_size: 0x1000, ..Config::default() };
        let mut sim = Simulator::new(&config);
        sim.address_space().map_direct(GuestAddr::new(0x0c00_0000), 0x0020_0000, RegionKind::Ram, 0).expect("ram map");
        sim.set_pc(0x0c00_0000);
        for (i, &word) in entry.iter().enumerate() {
            sim.address_space().write16(GuestAddr::new(0x0c00_0000 + i as u32 * 2), word);
        }
        sim
    }

    #[test]
    fn a_self_branch_runs_for_the_requested_budget_without_panicking() {
        // BRA -2 (branch to self), NOP delay slot: an infinite loop in one block.
        let mut sim = booted(&[0xaffe, 0x0009]);
        let spent = sim.execute(1000);
        assert!(spent >= 1000);
        assert_eq!(sim.context().pc, 0x0c00_0000);
    }

    #[test]
    fn ici_write_through_onchip_regs_flushes_the_block_cache_mid_run() {
        let mut sim = booted(&[0xaffe, 0x0009]);
        let _ = sim.execute(10);
        let flushes_before = sim.stats.cache_flushes;
        sim.address_space().write32(GuestAddr::new(0x1f00_001c), 1 << 11);
        let _ = sim.execute(10);
        assert!(sim.stats.cache_flushes > flushes_before);
    }
}
