//! The SH4 on-chip register window (area 7, `0x1c000000-0x1fffffff`): compressed
//! addressing over `TMU`, `INTC`, `DMAC` channel 2, `CCN` (cache control,
//! `QACR0/1`), and `PCTRA`/`PDTRA`. One `MmioHandler` fronts all of these logical
//! sub-devices, dispatching by compressed offset rather than exposing one handler
//! per device.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::dma::Dmac;
use crate::interrupt::{InterruptController, IprReg};
use crate::memory::mmio::MmioHandler;

use super::store_queue::Qacr;
use super::tmu::Tmu;

/// Compresses a guest address in the on-chip register area into a dense index for
/// the register table below: `((addr & 0x01fe0000) >> 11) | ((addr & 0xfc) >> 2)`,
/// the same compression the SH7750 hardware manual's register map implies.
const fn compress(addr: u32) -> u32 {
    ((addr & 0x01fe_0000) >> 11) | ((addr & 0xfc) >> 2)
}

macro_rules! offsets {
    ($($name:ident = $addr:expr;)*) => {
        $(const $name: u32 = compress($addr);)*
    };
}

// Real SH7750-series physical addresses (area 7, `0x1Fxxxxxx`), compressed at
// compile time so the dispatch table below reads as register names, not magic
// numbers.
offsets! {
    CCR      = 0x1f00_001c;
    QACR0    = 0x1f00_0038;
    QACR1    = 0x1f00_003c;
    MMUCR    = 0x1f00_0010;
    INTEVT   = 0x1f00_0028;
    IPRA     = 0x1fd0_0004;
    IPRB     = 0x1fd0_0008;
    IPRC     = 0x1fd0_000c;
    TOCR     = 0x1fd8_0000;
    TSTR     = 0x1fd8_0004;
    TCOR0    = 0x1fd8_0008;
    TCNT0    = 0x1fd8_000c;
    TCR0     = 0x1fd8_0010;
    TCOR1    = 0x1fd8_0014;
    TCNT1    = 0x1fd8_0018;
    TCR1     = 0x1fd8_001c;
    TCOR2    = 0x1fd8_0020;
    TCNT2    = 0x1fd8_0024;
    TCR2     = 0x1fd8_0028;
    SAR2     = 0x1fa0_0020;
    DAR2     = 0x1fa0_0024;
    DMATCR2  = 0x1fa0_0028;
    CHCR2    = 0x1fa0_002c;
    PCTRA    = 0x1ff8_0000;
    PDTRA    = 0x1ff8_0004;
}

/// `CCR`'s ICI (instruction cache invalidate) bit: writing it with this bit set flushes
/// the whole block cache.
const CCR_ICI: u32 = 1 << 11;

/// Returns the BIOS cable-detect pattern the hardware derives from `PCTRA`'s low two
/// bits: a fixed 4-entry lookup rather than a modeled video detection circuit.
const fn cable_detect(pctra: u32) -> u32 {
    match pctra & 0x3 {
        0 => 0x3,
        1 => 0x0,
        2 => 0x2,
        _ => 0x1,
    }
}

/// The on-chip register handler: owns `PCTRA`/`PDTRA`/`CCR`/`MMUCR` directly and
/// shares `TMU`/`INTC`/`DMAC` state with whatever else in the simulator needs to drive
/// them outside of a guest register access (the execution loop's `run_timers`,
/// `accept`, and `ddt`).
pub struct OnchipRegs {
    intc: Rc<RefCell<InterruptController>>,
    dmac: Rc<RefCell<Dmac>>,
    tmu: Rc<RefCell<Tmu>>,
    qacr: Qacr,
    pctra: u32,
    pdtra: u32,
    ccr: u32,
    /// Set when a guest `CCR` write requests a full block-cache flush; the execution
    /// loop polls and clears this every block boundary, since this handler has no
    /// direct path back to [`crate::cache::BlockCache`].
    pub ici_requested: Rc<Cell<bool>>,
    /// The exception code of the last interrupt accepted, guest-readable at `INTEVT`.
    /// Written by the execution loop right after `InterruptController::accept`
    /// succeeds, since that call only has a `Sh4Context` to update, not this handler.
    pub intevt: Rc<Cell<u32>>,
}

impl OnchipRegs {
    #[must_use]
    pub fn new(intc: Rc<RefCell<InterruptController>>, dmac: Rc<RefCell<Dmac>>, tmu: Rc<RefCell<Tmu>>, qacr: Qacr) -> Self {
        Self {
            intc,
            dmac,
            tmu,
            qacr,
            pctra: 0,
            pdtra: 0,
            ccr: 0,
            ici_requested: Rc::new(Cell::new(false)),
            intevt: Rc::new(Cell::new(0)),
        }
    }
}

impl MmioHandler for OnchipRegs {
    fn read(&mut self, addr: u32, _mask: u32) -> u32 {
        let off = compress(addr);
        match off {
            CCR => self.ccr,
            QACR0 => self.qacr.borrow()[0],
            QACR1 => self.qacr.borrow()[1],
            MMUCR => 0,
            INTEVT => self.intevt.get(),
            IPRA => u32::from(self.intc.borrow().read_ipr(IprReg::A)),
            IPRB => u32::from(self.intc.borrow().read_ipr(IprReg::B)),
            IPRC => u32::from(self.intc.borrow().read_ipr(IprReg::C)),
            TOCR => u32::from(self.tmu.borrow().tocr),
            TSTR => u32::from(self.tmu.borrow().tstr),
            TCOR0 => self.tmu.borrow().tcor[0],
            TCNT0 => self.tmu.borrow().tcnt[0],
            TCR0 => u32::from(self.tmu.borrow().tcr[0]),
            TCOR1 => self.tmu.borrow().tcor[1],
            TCNT1 => self.tmu.borrow().tcnt[1],
            TCR1 => u32::from(self.tmu.borrow().tcr[1]),
            TCOR2 => self.tmu.borrow().tcor[2],
            TCNT2 => self.tmu.borrow().tcnt[2],
            TCR2 => u32::from(self.tmu.borrow().tcr[2]),
            SAR2 => self.dmac.borrow().sar2,
            DAR2 => self.dmac.borrow().dar2,
            DMATCR2 => self.dmac.borrow().dmatcr2,
            CHCR2 => self.dmac.borrow().chcr2,
            PCTRA => self.pctra,
            PDTRA => (cable_detect(self.pctra) << 8) | (self.pdtra & 0xff),
            _ => {
                tracing::debug!(addr = format_args!("{addr:#010x}"), "unhandled on-chip register read");
                0
            }
        }
    }

    fn write(&mut self, addr: u32, data: u32, _mask: u32) {
        let off = compress(addr);
        match off {
            CCR => {
                self.ccr = data;
                if data & CCR_ICI != 0 {
                    self.ici_requested.set(true);
                }
            }
            QACR0 => self.qacr.borrow_mut()[0] = data & 0x1f,
            QACR1 => self.qacr.borrow_mut()[1] = data & 0x1f,
            MMUCR => {
                if data != 0 {
                    // MMU enable is a host bug to surface, not a guest condition to
                    // recover from (see `CoreError::MmuEnableUnsupported`).
                    tracing::error!(value = format_args!("{data:#010x}"), "guest enabled the MMU via MMUCR; unsupported, aborting");
                    std::process::exit(1);
                }
            }
            IPRA => self.intc.borrow_mut().write_ipr(IprReg::A, data as u16),
            IPRB => self.intc.borrow_mut().write_ipr(IprReg::B, data as u16),
            IPRC => self.intc.borrow_mut().write_ipr(IprReg::C, data as u16),
            TOCR => self.tmu.borrow_mut().tocr = data as u8,
            TSTR => self.tmu.borrow_mut().tstr = data as u8,
            TCOR0 => self.tmu.borrow_mut().tcor[0] = data,
            TCNT0 => self.tmu.borrow_mut().tcnt[0] = data,
            TCR0 => self.tmu.borrow_mut().tcr[0] = data as u16,
            TCOR1 => self.tmu.borrow_mut().tcor[1] = data,
            TCNT1 => self.tmu.borrow_mut().tcnt[1] = data,
            TCR1 => self.tmu.borrow_mut().tcr[1] = data as u16,
            TCOR2 => self.tmu.borrow_mut().tcor[2] = data,
            TCNT2 => self.tmu.borrow_mut().tcnt[2] = data,
            TCR2 => self.tmu.borrow_mut().tcr[2] = data as u16,
            SAR2 => self.dmac.borrow_mut().sar2 = data,
            DAR2 => self.dmac.borrow_mut().dar2 = data,
            DMATCR2 => self.dmac.borrow_mut().dmatcr2 = data,
            CHCR2 => self.dmac.borrow_mut().chcr2 = data,
            PCTRA => self.pctra = data,
            PDTRA => self.pdtra = data,
            _ => {
                tracing::debug!(addr = format_args!("{addr:#010x}"), data = format_args!("{data:#010x}"), "unhandled on-chip register write");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regs() -> OnchipRegs {
        let qacr: Qacr = Rc::new(RefCell::new([0; 2]));
        OnchipRegs::new(
            Rc::new(RefCell::new(InterruptController::new())),
            Rc::new(RefCell::new(Dmac::new())),
            Rc::new(RefCell::new(Tmu::new())),
            qacr,
        )
    }

    #[test]
    fn ipra_write_reaches_the_shared_interrupt_controller() {
        let mut r = regs();
        r.write(0x1fd0_0004, 0x8800, 0xffff_ffff);
        assert_eq!(r.read(0x1fd0_0004, 0xffff_ffff), 0x8800);
        assert_eq!(r.intc.borrow().read_ipr(IprReg::A), 0x8800);
    }

    #[test]
    fn ccr_ici_bit_sets_the_flush_flag_the_execution_loop_polls() {
        let mut r = regs();
        assert!(!r.ici_requested.get());
        r.write(0x1f00_001c, CCR_ICI, 0xffff_ffff);
        assert!(r.ici_requested.get());
    }

    #[test]
    fn tcnt0_write_and_read_go_through_the_shared_tmu() {
        let mut r = regs();
        r.write(0x1fd8_000c, 12345, 0xffff_ffff);
        assert_eq!(r.tmu.borrow().tcnt[0], 12345);
        assert_eq!(r.read(0x1fd8_000c, 0xffff_ffff), 12345);
    }

    #[test]
    fn qacr_write_is_masked_to_five_bits_and_visible_to_the_store_queue() {
        let mut r = regs();
        r.write(0x1f00_0038, 0xff, 0xffff_ffff);
        assert_eq!(r.qacr.borrow()[0], 0x1f);
    }

    #[test]
    fn pdtra_read_mixes_in_the_cable_detect_pattern() {
        let mut r = regs();
        r.write(0x1ff8_0000, 0x2, 0xffff_ffff); // PCTRA low bits select the RGB pattern.
        let value = r.read(0x1ff8_0004, 0xffff_ffff);
        assert_eq!((value >> 8) & 0xff, cable_detect(0x2));
    }
}
