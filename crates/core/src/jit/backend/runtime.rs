//! Plain Rust helpers the backend calls into for opcodes with no single-instruction
//! x86-64 encoding: `MacL`/`Div1`/`Div0s` and the `BF_SLOWMEM` checked memory
//! accessors, called the same way the frontend already calls out to
//! [`host_sr_updated`] for bank swaps.
//!
//! Every function here uses the C ABI so the emitted `call` sites need no special
//! calling convention beyond what [`super::x86_64::asm`] already produces for
//! [`crate::jit::ir::Opcode::CallExternal`].

use crate::common::addr::GuestAddr;
use crate::context::Sh4Context;
use crate::memory::AddressSpace;

/// `MAC.L`'s accumulate step. `acc` and the return value pack `MACH` in the upper 32
/// bits and `MACL` in the lower 32, matching the frontend's `pack64`/`unpack64`
/// convention. Saturates the 48-bit accumulator when `SR.S` is set, per the SH4
/// programming manual's MAC.L description.
pub extern "C" fn mac_l_step(ctx: *mut Sh4Context, val_n: u32, val_m: u32, acc: u64) -> u64 {
    // SAFETY: `ctx` is the live guest context pointer reloaded from its fixed stack
    // slot by the caller; the backend never calls this helper except from compiled
    // guest code.
    let saturate = unsafe { (*ctx).sr().s() };
    let product = i64::from(val_n as i32) * i64::from(val_m as i32);
    let sum = (acc as i64).wrapping_add(product);

    let result = if saturate {
        const MAX48: i64 = 0x0000_7FFF_FFFF_FFFF;
        const MIN48: i64 = -0x0000_8000_0000_0000i64;
        sum.clamp(MIN48, MAX48)
    } else {
        sum
    };
    result as u64
}

/// `MAC.W`'s accumulate step. Operands are sign-extended 16-bit loads widened to
/// `u32` by the frontend before this call; saturates to 32 bits under `SR.S`
/// (simplified from the manual's 42-bit unsaturated accumulator, which this port
/// widens to the full 64 bits carried by `acc` — see `DESIGN.md`).
pub extern "C" fn mac_w_step(ctx: *mut Sh4Context, val_n: u32, val_m: u32, acc: u64) -> u64 {
    // SAFETY: see `mac_l_step`.
    let saturate = unsafe { (*ctx).sr().s() };
    let product = i64::from(val_n as i16 as i32) * i64::from(val_m as i16 as i32);
    let sum = (acc as i64).wrapping_add(product);
    let result = if saturate { sum.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) } else { sum };
    result as u64
}

/// `DIV1`'s single-step non-restoring division, per the SH4 manual's pseudocode. `rn`
/// is the dividend's current partial remainder, `rm` the divisor, `sr` the status
/// register carrying `Q`/`M`/`T`. Returns the updated `Rn` packed with the updated
/// `SR` (new `Rn` in the upper 32 bits, new `SR` in the lower, matching `unpack64`).
pub extern "C" fn div1_step(rn: u32, rm: u32, sr: u32) -> u64 {
    let old_q = (sr >> 8) & 1 != 0;
    let m = (sr >> 9) & 1 != 0;
    let t = sr & 1;
    let q = (rn >> 31) & 1 != 0;

    let shifted = (rn << 1) | t;
    let (new_rn, new_q) = match (old_q, m) {
        (false, false) => {
            let result = shifted.wrapping_sub(rm);
            (result, if q { result == 0 || result > shifted } else { result > shifted })
        }
        (false, true) => {
            let result = shifted.wrapping_add(rm);
            (result, if q { result < shifted } else { !(result < shifted) })
        }
        (true, false) => {
            let result = shifted.wrapping_add(rm);
            (result, if q { !(result < shifted) } else { result < shifted })
        }
        (true, true) => {
            let result = shifted.wrapping_sub(rm);
            (result, if q { result > shifted } else { !(result > shifted) })
        }
    };

    let new_t = new_q == m;
    let mut new_sr = sr & !0x0000_0301u32; // clear Q (bit 8), M (bit 9), T (bit 0)
    new_sr |= u32::from(new_q) << 8;
    new_sr |= u32::from(m) << 9;
    new_sr |= u32::from(new_t);
    (u64::from(new_rn) << 32) | u64::from(new_sr)
}

/// `DIV0S`'s setup step: seeds `Q`/`M` from the operands' sign bits and derives `T`
/// from whether they differ, ahead of a following run of `DIV1`s. Returns the
/// updated `SR` alone (unlike `DIV1`/`MAC.L`, nothing else changes).
pub extern "C" fn div0s_step(rn: u32, rm: u32, sr: u32) -> u32 {
    let q = rn >> 31;
    let m = rm >> 31;
    let t = q ^ m;
    let mut new_sr = sr & !0x0000_0301u32;
    new_sr |= q << 8;
    new_sr |= m << 9;
    new_sr |= t;
    new_sr
}

/// A `BF_SLOWMEM` block's load path: called instead of a direct `membase`-relative
/// access. Delegates to the same [`AddressSpace`] methods the frontend's
/// decode-time fetch and the fault handler's single-access recovery both use, so
/// slow and fastmem blocks observe
/// identical MMIO semantics.
macro_rules! slow_accessors {
    ($read_fn:ident, $write_fn:ident, $read_method:ident, $write_method:ident, $ty:ty) => {
        pub extern "C" fn $read_fn(space: *mut AddressSpace, addr: u32) -> $ty {
            // SAFETY: `space` is reloaded from its fixed stack slot by the caller,
            // which is only ever compiled guest code holding the live address space
            // for the duration of `execute`.
            unsafe { (*space).$read_method(GuestAddr::new(addr)) }
        }

        pub extern "C" fn $write_fn(space: *mut AddressSpace, addr: u32, value: $ty) {
            // SAFETY: see the matching read accessor above.
            unsafe { (*space).$write_method(GuestAddr::new(addr), value) }
        }
    };
}

slow_accessors!(slow_read8, slow_write8, read8, write8, u8);
slow_accessors!(slow_read16, slow_write16, read16, write16, u16);
slow_accessors!(slow_read32, slow_write32, read32, write32, u32);
slow_accessors!(slow_read64, slow_write64, read64, write64, u64);

/// `FSIN`'s host implementation, called with the argument and return both in `xmm0`.
pub extern "C" fn host_sinf(x: f32) -> f32 {
    x.sin()
}

/// `FCOS`'s host implementation, called with the argument and return both in `xmm0`.
pub extern "C" fn host_cosf(x: f32) -> f32 {
    x.cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_l_accumulates_without_saturation_when_s_is_clear() {
        let mut ctx = Sh4Context::default();
        ctx.sr = 0; // S bit clear
        let acc = mac_l_step(&mut ctx, 3, 4, 0);
        assert_eq!(acc as i64, 12);
    }

    #[test]
    fn mac_l_saturates_to_48_bits_when_s_is_set() {
        let mut ctx = Sh4Context::default();
        ctx.sr = 0b10; // S bit set
        let huge = 0x0000_7FFF_FFFF_FFFFu64;
        let acc = mac_l_step(&mut ctx, i32::MAX as u32, i32::MAX as u32, huge);
        assert_eq!(acc, 0x0000_7FFF_FFFF_FFFF);
    }

    #[test]
    fn div0s_sets_t_when_signs_differ() {
        let sr = div0s_step(1, 0x8000_0000, 0);
        assert_eq!(sr & 1, 1, "positive/negative operands must set T");
        assert_eq!((sr >> 8) & 1, 0);
        assert_eq!((sr >> 9) & 1, 1);
    }

    #[test]
    fn div0s_clears_t_when_signs_match() {
        let sr = div0s_step(1, 2, 0);
        assert_eq!(sr & 1, 0);
    }

    #[test]
    fn div1_is_deterministic_for_a_fixed_input() {
        let sr = div0s_step(10, 3, 0);
        let r1 = div1_step(10, 3, sr);
        let r2 = div1_step(10, 3, sr);
        assert_eq!(r1, r2);
    }
}
