//! Builds a [`Simulator`] pre-loaded with a raw instruction stream and runs it for a
//! bounded cycle budget. Mirrors the unit-test `booted()` helper in `sim::execute`
//! (`crates/core/src/sim/execute.rs`), but loads code at the default boot PC through
//! the public API instead of mapping a scratch RAM region directly, since these tests
//! live outside the crate.

use sh4_core::common::GuestAddr;
use sh4_core::config::Config;
use sh4_core::context::Sh4Context;
use sh4_core::Simulator;

/// A booted simulator plus the address its guest code was loaded at.
pub struct TestContext {
    pub sim: Simulator,
    base: u32,
}

impl TestContext {
    /// Builds a simulator with the default Dreamcast memory map and no guest code
    /// loaded yet.
    #[must_use]
    pub fn new() -> Self {
        let config = Config::default();
        let base = config.start_pc;
        Self { sim: Simulator::new(&config), base }
    }

    /// Writes `words` as raw SH4 instructions starting at the default start PC and
    /// points the guest PC at them.
    pub fn load_program(&mut self, words: &[u16]) {
        for (i, &word) in words.iter().enumerate() {
            let addr = GuestAddr::new(self.base + i as u32 * 2);
            self.sim.address_space().write16(addr, word);
        }
        self.sim.set_pc(self.base);
    }

    /// The address `load_program` loads code at.
    #[must_use]
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Presets a general register before running.
    pub fn set_reg(&mut self, reg: usize, value: u32) {
        self.sim.context_mut().r[reg] = value;
    }

    /// Reads back a general register after running.
    #[must_use]
    pub fn get_reg(&self, reg: usize) -> u32 {
        self.sim.context().r[reg]
    }

    /// Mutable access to the full guest context, for scenarios presetting more than a
    /// general register (FPU registers, `FPSCR`, `SR`).
    pub fn context_mut(&mut self) -> &mut Sh4Context {
        self.sim.context_mut()
    }

    /// Runs for at least `cycles` guest cycles.
    pub fn run(&mut self, cycles: u32) -> u32 {
        self.sim.execute(cycles)
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
