//! `Sh4Context`: the guest register file, laid out at the stable offsets compiled code
//! embeds as immediates.

use super::{FpscrReg, SrStatus};

/// `Sh4Context` field byte offsets, embedded as immediates by the backend's
/// `load_context`/`store_context` emitters. Computed with `core::mem::offset_of!` so they
/// can never drift from the struct definition below.
pub mod offsets {
    use super::Sh4Context;

    /// Offset of `r[0]` (general registers, 16 x 4 bytes).
    pub const R: usize = std::mem::offset_of!(Sh4Context, r);
    /// Offset of `ralt[0]` (banked R0-R7, 8 x 4 bytes).
    pub const RALT: usize = std::mem::offset_of!(Sh4Context, ralt);
    /// Offset of `fr[0]` (floating registers, front bank, 16 x 4 bytes).
    pub const FR: usize = std::mem::offset_of!(Sh4Context, fr);
    /// Offset of `xf[0]` (floating registers, back bank, 16 x 4 bytes).
    pub const XF: usize = std::mem::offset_of!(Sh4Context, xf);
    /// Offset of `pc`.
    pub const PC: usize = std::mem::offset_of!(Sh4Context, pc);
    /// Offset of `pr`.
    pub const PR: usize = std::mem::offset_of!(Sh4Context, pr);
    /// Offset of `gbr`.
    pub const GBR: usize = std::mem::offset_of!(Sh4Context, gbr);
    /// Offset of `vbr`.
    pub const VBR: usize = std::mem::offset_of!(Sh4Context, vbr);
    /// Offset of `ssr`.
    pub const SSR: usize = std::mem::offset_of!(Sh4Context, ssr);
    /// Offset of `spc`.
    pub const SPC: usize = std::mem::offset_of!(Sh4Context, spc);
    /// Offset of `sgr`.
    pub const SGR: usize = std::mem::offset_of!(Sh4Context, sgr);
    /// Offset of `dbr`.
    pub const DBR: usize = std::mem::offset_of!(Sh4Context, dbr);
    /// Offset of `mach`.
    pub const MACH: usize = std::mem::offset_of!(Sh4Context, mach);
    /// Offset of `macl`.
    pub const MACL: usize = std::mem::offset_of!(Sh4Context, macl);
    /// Offset of `sr` (raw `u32`, use [`Sh4Context::sr`] for the bitfield view).
    pub const SR: usize = std::mem::offset_of!(Sh4Context, sr);
    /// Offset of `fpscr` (raw `u32`, use [`Sh4Context::fpscr`] for the bitfield view).
    pub const FPSCR: usize = std::mem::offset_of!(Sh4Context, fpscr);
    /// Offset of `fpul`.
    pub const FPUL: usize = std::mem::offset_of!(Sh4Context, fpul);
}

/// The SH4 guest register file, pinned in memory for the lifetime of one guest CPU.
///
/// Field order is stable; compiled code and the fault handler both address fields by
/// the numeric offsets in [`offsets`], not by name.
#[repr(C)]
#[derive(Debug, Clone)]
pub struct Sh4Context {
    /// R0-R15. R0-R7 are banked by `sr_updated` when `SR.MD=1, SR.RB=1`.
    pub r: [u32; 16],
    /// Banked R0-R7, live when `SR.MD=1, SR.RB=1`.
    pub ralt: [u32; 8],
    /// FR0-FR15, the "front" floating bank.
    pub fr: [f32; 16],
    /// XF0-XF15, the "back" floating bank, swapped in by `fpscr_updated` on `FPSCR.FR`.
    pub xf: [f32; 16],
    /// Program counter: the instruction about to execute.
    pub pc: u32,
    /// Procedure register (subroutine return address).
    pub pr: u32,
    /// Global base register.
    pub gbr: u32,
    /// Vector base register.
    pub vbr: u32,
    /// Saved status register (on exception entry).
    pub ssr: u32,
    /// Saved program counter (on exception entry).
    pub spc: u32,
    /// Saved global register (R15, on exception entry).
    pub sgr: u32,
    /// Debug base register.
    pub dbr: u32,
    /// High 32 bits of the MAC accumulator.
    pub mach: u32,
    /// Low 32 bits of the MAC accumulator.
    pub macl: u32,
    /// Status register, raw.
    pub sr: u32,
    /// FPU status/control register, raw.
    pub fpscr: u32,
    /// FPU communication register (single-precision load/store via `FMOV`/`FLDS`/`FSTS`).
    pub fpul: u32,
}

impl Default for Sh4Context {
    fn default() -> Self {
        Self {
            r: [0; 16],
            ralt: [0; 8],
            fr: [0.0; 16],
            xf: [0.0; 16],
            pc: 0,
            pr: 0,
            gbr: 0,
            vbr: 0,
            ssr: 0,
            spc: 0,
            sgr: 0,
            dbr: 0,
            mach: 0,
            macl: 0,
            sr: SrStatus::RESET,
            fpscr: FpscrReg::RESET,
            fpul: 0,
        }
    }
}

impl Sh4Context {
    /// Reads `SR` through its bitfield view.
    #[must_use]
    pub fn sr(&self) -> SrStatus {
        SrStatus(self.sr)
    }

    /// Reads `FPSCR` through its bitfield view.
    #[must_use]
    pub fn fpscr(&self) -> FpscrReg {
        FpscrReg(self.fpscr)
    }

    /// Whether the banked register set (R0-R7 vs `ralt`) is currently selected: only
    /// when both `MD` and `RB` are set.
    fn bank_selected(sr: SrStatus) -> bool {
        sr.md() && sr.rb()
    }

    /// Invoked whenever guest code writes `SR` (directly, via `LDC`, or on exception
    /// entry/return). Swaps R0-R7 with the banked `ralt` set if the effective bank
    /// selection flipped between `old_sr` and the context's current `sr`.
    pub fn sr_updated(&mut self, old_sr: u32) {
        let before = Self::bank_selected(SrStatus(old_sr));
        let after = Self::bank_selected(self.sr());
        if before != after {
            for i in 0..8 {
                std::mem::swap(&mut self.r[i], &mut self.ralt[i]);
            }
        }
    }

    /// Invoked whenever guest code writes `FPSCR`. Swaps the `fr`/`xf` banks wholesale
    /// if `FPSCR.FR` flipped between `old_fpscr` and the context's current `fpscr`.
    pub fn fpscr_updated(&mut self, old_fpscr: u32) {
        let before = FpscrReg(old_fpscr).fr();
        let after = self.fpscr().fr();
        if before != after {
            for i in 0..16 {
                std::mem::swap(&mut self.fr[i], &mut self.xf[i]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sr_write_swaps_bank_only_on_transition() {
        let mut ctx = Sh4Context::default();
        ctx.r[0] = 1;
        ctx.ralt[0] = 2;

        let old = ctx.sr;
        let mut sr = ctx.sr();
        sr.set_md(true);
        sr.set_rb(true);
        ctx.sr = sr.full();
        ctx.sr_updated(old);
        assert_eq!(ctx.r[0], 2);
        assert_eq!(ctx.ralt[0], 1);
    }

    #[test]
    fn repeated_sr_updated_with_unchanged_value_is_idempotent() {
        let mut ctx = Sh4Context::default();
        ctx.r[0] = 1;
        ctx.ralt[0] = 2;
        let x = ctx.sr;
        ctx.sr = x;
        ctx.sr_updated(x);
        let after_first = (ctx.r, ctx.ralt.clone());
        ctx.sr = x;
        ctx.sr_updated(x);
        assert_eq!(ctx.r, after_first.0);
        assert_eq!(ctx.ralt, after_first.1);
    }

    #[test]
    fn fpscr_write_swaps_fr_xf_on_fr_bit_transition() {
        let mut ctx = Sh4Context::default();
        ctx.fr[0] = 1.0;
        ctx.xf[0] = 2.0;

        let old = ctx.fpscr;
        let mut f = ctx.fpscr();
        f.set_fr(true);
        ctx.fpscr = f.full();
        ctx.fpscr_updated(old);
        assert_eq!(ctx.fr[0], 2.0);
        assert_eq!(ctx.xf[0], 1.0);
    }

    #[test]
    fn offsets_are_in_declared_order() {
        assert_eq!(offsets::R, 0);
        assert!(offsets::RALT > offsets::R);
        assert!(offsets::FR > offsets::RALT);
        assert!(offsets::XF > offsets::FR);
        assert!(offsets::PC > offsets::XF);
        assert!(offsets::FPUL > offsets::SR);
    }
}
