//! Simulation statistics collection and reporting.
//!
//! Tracks recompiler and execution-loop counters useful for diagnosing
//! performance and correctness issues in a running simulator:
//! 1. **Cycles and blocks:** total guest cycles executed, blocks compiled/looked up.
//! 2. **Block cache:** dispatch hits vs. cold compiles, invalidations, full flushes.
//! 3. **Fault recovery:** `BF_SLOWMEM` faults handled and distinct addresses condemned.
//! 4. **Interrupts and DMA:** interrupts accepted, DDT bytes transferred.

use std::time::Instant;

/// Simulation statistics tracking recompiler and execution behavior.
#[derive(Clone)]
pub struct SimStats {
    start_time: Instant,
    /// Total guest cycles executed.
    pub cycles: u64,
    /// Blocks compiled from scratch (cold, or after invalidation).
    pub blocks_compiled: u64,
    /// Dispatch lookups that hit an already-compiled block.
    pub dispatch_hits: u64,
    /// Dispatch lookups that missed and required a `get_or_compile` call.
    pub dispatch_misses: u64,
    /// `invalidate_code`/self-modifying-code calls that removed at least one block.
    pub blocks_invalidated: u64,
    /// Full `clear_blocks` flushes (e.g. from a `CCR` ICI write).
    pub cache_flushes: u64,
    /// `BF_SLOWMEM` page faults recovered by the fault handler.
    pub slowmem_faults: u64,
    /// Distinct guest addresses condemned to `BF_SLOWMEM`.
    pub slowmem_addrs_condemned: u64,
    /// Interrupts accepted by the interrupt controller.
    pub interrupts_accepted: u64,
    /// Bytes moved through the DMAC channel-2 DDT path.
    pub ddt_bytes_transferred: u64,
}

impl Default for SimStats {
    fn default() -> Self {
        Self {
            start_time: Instant::now(),
            cycles: 0,
            blocks_compiled: 0,
            dispatch_hits: 0,
            dispatch_misses: 0,
            blocks_invalidated: 0,
            cache_flushes: 0,
            slowmem_faults: 0,
            slowmem_addrs_condemned: 0,
            interrupts_accepted: 0,
            ddt_bytes_transferred: 0,
        }
    }
}

/// Section names for selective stats output.
///
/// Valid section identifiers: `"summary"`, `"cache"`, `"faults"`, `"interrupts"`.
/// Pass an empty slice to `print_sections` to print all sections.
pub const STATS_SECTIONS: &[&str] = &["summary", "cache", "faults", "interrupts"];

impl SimStats {
    /// Prints only the requested statistics sections to stdout.
    ///
    /// Each element of `sections` should be one of [`STATS_SECTIONS`]. Pass an
    /// empty slice to print all sections (same as [`SimStats::print`]).
    pub fn print_sections(&self, sections: &[String]) {
        let want = |s: &str| sections.is_empty() || sections.iter().any(|x| x == s);
        let duration = self.start_time.elapsed();
        let seconds = duration.as_secs_f64();
        let cyc = if self.cycles == 0 { 1 } else { self.cycles };

        if want("summary") {
            let mhz = (self.cycles as f64 / seconds) / 1_000_000.0;
            println!("\n==========================================================");
            println!("SH4 RECOMPILER STATISTICS");
            println!("==========================================================");
            println!("host_seconds             {seconds:.4} s");
            println!("sim_cycles               {}", self.cycles);
            println!("sim_freq                 {mhz:.2} MHz");
            println!("----------------------------------------------------------");
        }
        if want("cache") {
            let dispatch_total = self.dispatch_hits + self.dispatch_misses;
            let hit_rate = if dispatch_total > 0 {
                100.0 * (self.dispatch_hits as f64 / dispatch_total as f64)
            } else {
                0.0
            };
            println!("BLOCK CACHE");
            println!("  blocks.compiled        {}", self.blocks_compiled);
            println!("  dispatch.hit_rate      {hit_rate:.2}%");
            println!("  blocks.invalidated     {}", self.blocks_invalidated);
            println!("  cache.flushes          {}", self.cache_flushes);
            println!("----------------------------------------------------------");
        }
        if want("faults") {
            println!("FAULT RECOVERY");
            println!("  slowmem.faults         {}", self.slowmem_faults);
            println!("  slowmem.addrs          {}", self.slowmem_addrs_condemned);
            println!("----------------------------------------------------------");
        }
        if want("interrupts") {
            println!("INTERRUPTS AND DMA");
            println!(
                "  interrupts.accepted    {} ({:.2} per 1M cycles)",
                self.interrupts_accepted,
                self.interrupts_accepted as f64 / (cyc as f64 / 1_000_000.0)
            );
            println!("  ddt.bytes              {}", self.ddt_bytes_transferred);
        }
        println!("==========================================================");
    }

    /// Prints all statistics sections to stdout.
    ///
    /// Equivalent to `print_sections(&[])`.
    pub fn print(&self) {
        self.print_sections(&[]);
    }
}
