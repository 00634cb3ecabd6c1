//! `FPSCR` (floating-point status/control register) bitfield view.
//!
//! Grounded the same way as [`super::sr`]: a `bitfield!` newtype over `u32`, matching
//! the field layout used by the `emudev-org-nullDC` Rust port's `FpscrReg`.

use bitfield::bitfield;

bitfield! {
    /// `FPSCR`: rounding mode, exception flags/enables/cause, and the mode bits
    /// (`DN`, `PR`, `SZ`, `FR`) the frontend consults to pick scalar vs. paired-single
    /// and single- vs. double-precision FPU semantics.
    #[repr(transparent)]
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct FpscrReg(u32);
    impl Debug;
    /// Raw 32-bit value.
    pub u32, full, set_full: 31, 0;
    /// Rounding mode (0 = round-to-nearest, 1 = round-to-zero).
    pub rm, set_rm: 1, 0;
    /// Denormal-as-zero bit.
    pub dn, set_dn: 18;
    /// Precision: 0 = single, 1 = double.
    pub pr, set_pr: 19;
    /// Transfer size: 0 = single FMOV, 1 = paired-single (double) FMOV.
    pub sz, set_sz: 20;
    /// FPU register bank select (swaps FR/XF banks, like SR.RB swaps R/Ralt).
    pub fr, set_fr: 21;
}

impl FpscrReg {
    /// Reset value per `examples/original_source/src/emu/dreamcast.cc`-equivalent cold boot:
    /// round-to-nearest, single precision, single transfers, bank 0.
    pub const RESET: u32 = 0x0004_0001;
}

impl Default for FpscrReg {
    fn default() -> Self {
        Self(Self::RESET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_is_single_precision_bank_zero() {
        let f = FpscrReg::default();
        assert!(!f.pr());
        assert!(!f.sz());
        assert!(!f.fr());
    }
}
