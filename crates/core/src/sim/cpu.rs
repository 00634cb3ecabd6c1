//! Owns every piece of a running guest: architectural context, address space, block
//! cache, and the on-chip peripherals wired into that address space.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::cache::BlockCache;
use crate::config::Config;
use crate::context::Sh4Context;
use crate::dma::Dmac;
use crate::interrupt::InterruptController;
use crate::memory::mmio::UnhandledMmio;
use crate::memory::sh4_map::{self, Sh4Handlers};
use crate::memory::AddressSpace;
use crate::onchip::{OnchipRegs, Qacr, StoreQueue, Tmu};
use crate::stats::SimStats;

/// Top-level simulator: guest context, address space, block cache, and the shared
/// device state peripherals the on-chip register handler fronts.
pub struct Simulator {
    pub(super) ctx: Sh4Context,
    pub(super) space: AddressSpace,
    pub(super) cache: BlockCache,
    pub(super) intc: Rc<RefCell<InterruptController>>,
    pub(super) dmac: Rc<RefCell<Dmac>>,
    pub(super) tmu: Rc<RefCell<Tmu>>,
    pub(super) ici_requested: Rc<Cell<bool>>,
    pub(super) intevt: Rc<Cell<u32>>,
    pub stats: SimStats,
}

unsafe impl Send for Simulator {}

impl Simulator {
    /// Builds a fresh simulator: a reset SH4 context at `config.start_pc`, a guest
    /// address space with the fixed SH4 memory map installed, and an empty block
    /// cache sized per `config`.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let mut space = AddressSpace::new(config.ram_size, config.vram_size, config.aram_size);

        let intc = Rc::new(RefCell::new(InterruptController::new()));
        let dmac = Rc::new(RefCell::new(Dmac::new()));
        let tmu = Rc::new(RefCell::new(Tmu::new()));
        let qacr: Qacr = Rc::new(RefCell::new([0u32; 2]));

        let onchip = OnchipRegs::new(Rc::clone(&intc), Rc::clone(&dmac), Rc::clone(&tmu), qacr);
        let ici_requested = Rc::clone(&onchip.ici_requested);
        let intevt = Rc::clone(&onchip.intevt);
        let store_queue = StoreQueue::new();

        let handlers = Sh4Handlers {
            area0: Box::new(UnhandledMmio),
            area4: Box::new(UnhandledMmio),
            area7: Box::new(onchip),
            store_queue: Box::new(store_queue),
        };
        sh4_map::install(&mut space, handlers).expect("the fixed SH4 memory map is always page-aligned");

        let cache = BlockCache::new(config.code_buffer_size, config.dispatch_entries, config.max_block_instrs);

        let mut ctx = Sh4Context::default();
        ctx.pc = config.start_pc;

        Self { ctx, space, cache, intc, dmac, tmu, ici_requested, intevt, stats: SimStats::default() }
    }

    /// Read-only access to the guest context, e.g. for inspecting registers after a
    /// run.
    #[must_use]
    pub fn context(&self) -> &Sh4Context {
        &self.ctx
    }

    /// Mutable access to the guest context, e.g. for presetting registers before a
    /// test or tool-driven run.
    #[must_use]
    pub fn context_mut(&mut self) -> &mut Sh4Context {
        &mut self.ctx
    }

    /// Read-only access to the guest address space, e.g. for loading an image before
    /// the first `execute`.
    #[must_use]
    pub fn address_space(&mut self) -> &mut AddressSpace {
        &mut self.space
    }

    /// Overrides the next instruction to execute.
    pub fn set_pc(&mut self, pc: u32) {
        self.ctx.pc = pc;
    }

    /// Raises interrupt source `id` (see `crate::interrupt::sources`).
    pub fn request_interrupt(&mut self, id: usize) {
        self.intc.borrow_mut().request_interrupt(id);
    }

    /// Clears a previously raised interrupt source.
    pub fn unrequest_interrupt(&mut self, id: usize) {
        self.intc.borrow_mut().unrequest_interrupt(id);
    }

    /// Services one unit of a DMAC channel-2 DDT transfer at the external device
    /// address `addr` (see `crate::dma`).
    pub fn ddt(&mut self, rw: crate::dma::DdtDirection, addr: u32) {
        self.dmac.borrow_mut().ddt(rw, addr, &mut self.space, &mut self.intc.borrow_mut());
        self.stats.ddt_bytes_transferred += 1;
    }

    /// Forces recompilation of whatever block(s) currently cover `guest_pc`, for
    /// self-modifying code the caller has detected outside of a guest store (e.g. a
    /// DMA write into code).
    pub fn invalidate_code(&mut self, guest_pc: u32) {
        self.cache.remove_blocks(guest_pc);
        self.stats.blocks_invalidated += 1;
    }
}
