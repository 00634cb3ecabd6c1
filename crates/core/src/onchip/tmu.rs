//! The three-channel Timer Unit: `TCNT0/1/2`, `TCR0/1/2`, `TCOR0/1/2`, `TSTR`. Ticked
//! from the execution loop's `run_timers`, a plain function call at block boundaries,
//! not from any independent clock of its own.

use crate::interrupt::{sources, InterruptController};

/// `TCR` underflow flag, set on every channel underflow and cleared only by a guest
/// write that doesn't set it.
const TCR_UNF: u16 = 1 << 8;
/// `TCR` underflow-interrupt-enable bit.
const TCR_UNIE: u16 = 1 << 5;
/// `TSTR` channel-start bit for channel `n`.
const fn tstr_bit(n: usize) -> u8 {
    1 << n
}

const TUNI_SOURCES: [usize; 3] = [sources::TMU0_TUNI0, sources::TMU1_TUNI1, sources::TMU2_TUNI2];

/// The three free-running down-counters. Real hardware applies a `TCR`-selected
/// prescaler (P/4 .. P/1024) to the CPU clock before decrementing; this model
/// decrements directly by the guest cycle count the execution loop reports, a
/// documented simplification (see `DESIGN.md`) since no test here depends on exact
/// wall-clock timer periods.
#[derive(Debug, Default, Clone, Copy)]
pub struct Tmu {
    pub tstr: u8,
    pub tcor: [u32; 3],
    pub tcnt: [u32; 3],
    pub tcr: [u16; 3],
    /// `TOCR`: output-control, guest-writable but otherwise inert in this model.
    pub tocr: u8,
}

impl Tmu {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances every running channel by `cycles`, reloading from `TCOR` and raising
    /// `TUNIn` on each underflow when that channel's `UNIE` bit is set.
    pub fn run_timers(&mut self, cycles: u32, intc: &mut InterruptController) {
        for ch in 0..3 {
            if self.tstr & tstr_bit(ch) == 0 {
                continue;
            }
            let mut remaining = cycles;
            while remaining > 0 {
                if self.tcnt[ch] > remaining {
                    self.tcnt[ch] -= remaining;
                    remaining = 0;
                } else {
                    remaining -= self.tcnt[ch];
                    self.tcnt[ch] = self.tcor[ch];
                    self.tcr[ch] |= TCR_UNF;
                    if self.tcr[ch] & TCR_UNIE != 0 {
                        intc.request_interrupt(TUNI_SOURCES[ch]);
                    }
                    if self.tcor[ch] == 0 {
                        break; // a zero reload period can't make further progress.
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::IprReg;

    #[test]
    fn stopped_channel_does_not_count_down() {
        let mut tmu = Tmu { tstr: 0, tcnt: [100, 0, 0], ..Tmu::default() };
        let mut intc = InterruptController::new();
        tmu.run_timers(50, &mut intc);
        assert_eq!(tmu.tcnt[0], 100);
    }

    #[test]
    fn underflow_reloads_from_tcor_and_sets_unf() {
        let mut tmu = Tmu { tstr: tstr_bit(0), tcnt: [10, 0, 0], tcor: [10, 0, 0], ..Tmu::default() };
        let mut intc = InterruptController::new();
        tmu.run_timers(15, &mut intc);
        assert_eq!(tmu.tcnt[0], 5, "10 to reach zero, then 5 more into the reloaded period");
        assert_ne!(tmu.tcr[0] & TCR_UNF, 0);
    }

    #[test]
    fn underflow_with_unie_requests_tuni0() {
        let mut tmu = Tmu { tstr: tstr_bit(0), tcnt: [1, 0, 0], tcor: [1, 0, 0], tcr: [TCR_UNIE, 0, 0], ..Tmu::default() };
        let mut intc = InterruptController::new();
        intc.write_ipr(IprReg::A, 0x8000); // give TMU0 a real priority so it can be observed as pending.
        tmu.run_timers(1, &mut intc);

        let mut ctx = crate::context::Sh4Context::default();
        let mut sr = ctx.sr();
        sr.set_bl(false);
        sr.set_imask(0);
        ctx.sr = sr.full();
        assert!(intc.accept(&mut ctx).is_some());
    }
}
