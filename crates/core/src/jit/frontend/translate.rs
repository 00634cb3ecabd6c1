//! SH4 instruction translators: one function per opcode family, appending IR to the
//! block under construction.
//!
//! Field extraction follows the conventional SH4 encoding: `nnnn` occupies bits 8-11,
//! `mmmm` bits 4-7. Delay-slotted branches (`BRA`, `BSR`, `JMP`, `JSR`, `RTS`) don't
//! emit their terminator immediately — they stash the computed target on the
//! [`Translator`] and the frontend's decode loop finalizes it after translating the
//! delay-slot instruction, so the target is always read before the delay slot can
//! clobber the register it came from.

use crate::context::{offsets, Sh4Context};
use crate::jit::ir::{BlockId, ConstValue, IRBuilder, InstrFlags, Opcode, ValueId, ValueType};

/// A branch target deferred until the delay slot has been translated. Only
/// unconditional delay-slotted branches (`BRA`/`BSR`/`JMP`/`JSR`/`RTS`) appear in this
/// decode table; `BT`/`BF` have no delay slot and terminate immediately, and the
/// delay-slotted `BT/S`/`BF/S` forms aren't covered.
struct PendingBranch(ValueId);

/// Per-compilation translator state: the IR arena, the single block being built, and
/// the address of the instruction currently being translated.
pub struct Translator {
    pub(crate) builder: IRBuilder,
    pub(crate) block: BlockId,
    pub(crate) pc: u32,
    pending_branch: Option<PendingBranch>,
}

impl Translator {
    pub(crate) fn new(builder: IRBuilder, block: BlockId, pc: u32) -> Self {
        Self { builder, block, pc, pending_branch: None }
    }

    pub(crate) fn into_builder(self) -> IRBuilder {
        self.builder
    }

    fn reg_n(word: u16) -> u8 {
        ((word >> 8) & 0xf) as u8
    }

    fn reg_m(word: u16) -> u8 {
        ((word >> 4) & 0xf) as u8
    }

    fn const_i32(&mut self, v: u32) -> ValueId {
        self.builder.const_value(ConstValue::I32(v))
    }

    fn const_i64(&mut self, v: u64) -> ValueId {
        self.builder.const_value(ConstValue::I64(v))
    }

    fn push1(&mut self, op: Opcode, a: ValueId, ty: ValueType) -> ValueId {
        self.builder.push_result(self.block, op, [Some(a), None, None], ty, InstrFlags::NONE)
    }

    fn push2(&mut self, op: Opcode, a: ValueId, b: ValueId, ty: ValueType) -> ValueId {
        self.builder.push_result(self.block, op, [Some(a), Some(b), None], ty, InstrFlags::NONE)
    }

    fn push3(&mut self, op: Opcode, a: ValueId, b: ValueId, c: ValueId, ty: ValueType) -> ValueId {
        self.builder.push_result(self.block, op, [Some(a), Some(b), Some(c)], ty, InstrFlags::NONE)
    }

    fn push_flagged(&mut self, op: Opcode, args: [Option<ValueId>; 3], ty: Option<ValueType>, flags: InstrFlags) -> Option<ValueId> {
        self.builder.push(self.block, op, args, ty, flags)
    }

    fn store(&mut self, op: Opcode, args: [Option<ValueId>; 3]) {
        let _ = self.builder.push(self.block, op, args, None, InstrFlags::NONE);
    }

    fn reg_offset(reg: u8) -> u32 {
        u32::try_from(offsets::R + reg as usize * 4).expect("context offset fits in u32")
    }

    fn fr_offset(reg: u8) -> u32 {
        u32::try_from(offsets::FR + reg as usize * 4).expect("context offset fits in u32")
    }

    fn load_r(&mut self, reg: u8) -> ValueId {
        self.push1_noarg(Opcode::LoadContext(Self::reg_offset(reg)), ValueType::I32)
    }

    fn store_r(&mut self, reg: u8, value: ValueId) {
        self.store(Opcode::StoreContext(Self::reg_offset(reg)), [Some(value), None, None]);
    }

    fn load_rf(&mut self, reg: u8) -> ValueId {
        self.push1_noarg(Opcode::LoadContext(Self::fr_offset(reg)), ValueType::F32)
    }

    fn store_rf(&mut self, reg: u8, value: ValueId) {
        self.store(Opcode::StoreContext(Self::fr_offset(reg)), [Some(value), None, None]);
    }

    fn load_ctx32(&mut self, offset: usize) -> ValueId {
        let offset = u32::try_from(offset).expect("context offset fits in u32");
        self.push1_noarg(Opcode::LoadContext(offset), ValueType::I32)
    }

    /// Like [`Self::push1`], for opcodes that carry their operand in the opcode
    /// itself (`LoadContext`/`LoadLocal`) rather than as an argument `ValueId`.
    fn push1_noarg(&mut self, op: Opcode, ty: ValueType) -> ValueId {
        self.builder.push_result(self.block, op, [None, None, None], ty, InstrFlags::NONE)
    }

    fn store_ctx32(&mut self, offset: usize, value: ValueId) {
        let offset = u32::try_from(offset).expect("context offset fits in u32");
        self.store(Opcode::StoreContext(offset), [Some(value), None, None]);
    }

    fn add_imm(&mut self, v: ValueId, imm: u32) -> ValueId {
        let c = self.const_i32(imm);
        self.push2(Opcode::Add, v, c, ValueType::I32)
    }

    /// Reads the T bit (SR bit 0) as an I32 0/1.
    fn load_t(&mut self) -> ValueId {
        let sr = self.load_ctx32(offsets::SR);
        let mask = self.const_i32(1);
        self.push2(Opcode::And, sr, mask, ValueType::I32)
    }

    /// Writes an I32 0/1 into the T bit without disturbing the rest of SR.
    fn store_t(&mut self, t: ValueId) {
        let sr = self.load_ctx32(offsets::SR);
        let cleared_mask = self.const_i32(!1u32);
        let cleared = self.push2(Opcode::And, sr, cleared_mask, ValueType::I32);
        let merged = self.push2(Opcode::Or, cleared, t, ValueType::I32);
        self.store_ctx32(offsets::SR, merged);
    }

    fn zext64(&mut self, v: ValueId) -> ValueId {
        self.push1(Opcode::ZeroExtend, v, ValueType::I64)
    }

    fn trunc32(&mut self, v: ValueId) -> ValueId {
        self.push1(Opcode::Truncate, v, ValueType::I32)
    }

    /// Packs two 32-bit context fields (e.g. `MACH`/`MACL`) into one I64, `hi` in the
    /// upper word.
    fn pack64(&mut self, hi: ValueId, lo: ValueId) -> ValueId {
        let hi64 = self.zext64(hi);
        let shift32 = self.const_i64(32);
        let hi_shifted = self.push2(Opcode::Shl, hi64, shift32, ValueType::I64);
        let lo64 = self.zext64(lo);
        self.push2(Opcode::Or, hi_shifted, lo64, ValueType::I64)
    }

    fn unpack64(&mut self, v: ValueId) -> (ValueId, ValueId) {
        let shift32 = self.const_i64(32);
        let hi64 = self.push2(Opcode::Lshr, v, shift32, ValueType::I64);
        let hi = self.trunc32(hi64);
        let lo = self.trunc32(v);
        (hi, lo)
    }

    fn terminate_now(&mut self, target: ValueId) {
        self.store(Opcode::Branch, [Some(target), None, None]);
    }

    fn terminate_cond_now(&mut self, cond: ValueId, taken: ValueId, not_taken: ValueId) {
        self.store(Opcode::BranchCond, [Some(cond), Some(taken), Some(not_taken)]);
    }

    fn defer_branch(&mut self, target: ValueId) {
        self.pending_branch = Some(PendingBranch(target));
    }

    /// Whether the instruction just translated deferred its branch to a delay slot.
    pub(crate) fn has_pending_branch(&self) -> bool {
        self.pending_branch.is_some()
    }

    /// Emits the terminator for a branch deferred by [`Self::defer_branch`], once the
    /// delay-slot instruction has been translated.
    ///
    /// # Panics
    ///
    /// Panics if nothing is pending — a frontend bug, since the decode loop only calls
    /// this after observing [`Self::has_pending_branch`].
    pub(crate) fn finish_pending_branch(&mut self) {
        let PendingBranch(target) = self.pending_branch.take().expect("finish_pending_branch called with nothing pending");
        self.terminate_now(target);
    }

    /// Emits an unconditional branch to a known guest address, used by the frontend's
    /// decode loop to close out a block that hit `max_instrs` without encountering a
    /// terminator of its own.
    pub(crate) fn terminate_at(&mut self, target_pc: u32) {
        let target = self.const_i32(target_pc);
        self.terminate_now(target);
    }
}

fn branch_target12(pc: u32, word: u16) -> u32 {
    let raw = word & 0x0fff;
    let signed = if raw & 0x0800 != 0 { i32::from(raw) - 0x1000 } else { i32::from(raw) };
    (pc as i32).wrapping_add(4).wrapping_add(signed * 2) as u32
}

fn branch_target8(pc: u32, word: u16) -> u32 {
    let signed = i32::from((word & 0x00ff) as u8 as i8);
    (pc as i32).wrapping_add(4).wrapping_add(signed * 2) as u32
}

/// Host-side hook invoked (via `Opcode::CallExternal`) whenever guest code overwrites
/// `SR` wholesale, so a bank swap runs if `MD`/`RB` flipped.
extern "C" fn host_sr_updated(ctx: *mut Sh4Context, old_sr: u32) {
    // SAFETY: the backend always passes the live `Sh4Context` pointer reserved for
    // compiled code's context-register ABI slot.
    unsafe { (*ctx).sr_updated(old_sr) }
}

/// Host-side hook invoked whenever guest code overwrites `FPSCR` wholesale.
extern "C" fn host_fpscr_updated(ctx: *mut Sh4Context, old_fpscr: u32) {
    // SAFETY: see `host_sr_updated`.
    unsafe { (*ctx).fpscr_updated(old_fpscr) }
}

/// Host-side hook for `FMOV FRm, FRn`, reading `FPSCR.SZ` at the moment the
/// instruction actually runs rather than baking a mode into the compiled block:
/// `FMOV`'s transfer width can change between two executions of the same block if
/// guest code writes `FPSCR` without the block being recompiled in between (the
/// block only ends at `DecodeFlags::CHANGES_PC`, and `LDS Rm, FPSCR` doesn't carry
/// that flag). `n`/`m` are packed into one word since `CallExternal` passes at most
/// one argument besides `ctx`. Single-precision mode moves one `FR`; paired-single
/// mode moves the enclosing `FR`/`FR+1` pair, rounding both indices down to their
/// pair's even slot per the SH4 manual's `DRn` addressing.
extern "C" fn host_fmov_reg(ctx: *mut Sh4Context, packed: u32) {
    let n = ((packed >> 8) & 0xf) as usize;
    let m = (packed & 0xf) as usize;
    // SAFETY: see `host_sr_updated`.
    let ctx = unsafe { &mut *ctx };
    if ctx.fpscr().sz() {
        let dn = n & !1;
        let dm = m & !1;
        ctx.fr[dn] = ctx.fr[dm];
        ctx.fr[dn + 1] = ctx.fr[dm + 1];
    } else {
        ctx.fr[n] = ctx.fr[m];
    }
}

pub fn invalid_instruction(t: &mut Translator, _word: u16) {
    let pc = t.pc;
    let halt_pc = t.const_i32(pc);
    t.terminate_now(halt_pc);
}

pub fn nop(_t: &mut Translator, _word: u16) {}

pub fn rts(t: &mut Translator, _word: u16) {
    let pr = t.load_ctx32(offsets::PR);
    t.defer_branch(pr);
}

pub fn div0u(t: &mut Translator, _word: u16) {
    let sr = t.load_ctx32(offsets::SR);
    let new_sr = t.push1(Opcode::Div0u, sr, ValueType::I32);
    t.store_ctx32(offsets::SR, new_sr);
}

pub fn clrt(t: &mut Translator, _word: u16) {
    let zero = t.const_i32(0);
    t.store_t(zero);
}

pub fn sett(t: &mut Translator, _word: u16) {
    let one = t.const_i32(1);
    t.store_t(one);
}

/// `MOVT Rn`: `Rn = T`.
pub fn movt_rn(t: &mut Translator, word: u16) {
    let n = Translator::reg_n(word);
    let t_val = t.load_t();
    t.store_r(n, t_val);
}

pub fn add_rm_rn(t: &mut Translator, word: u16) {
    let n = Translator::reg_n(word);
    let m = Translator::reg_m(word);
    let rn = t.load_r(n);
    let rm = t.load_r(m);
    let sum = t.push2(Opcode::Add, rn, rm, ValueType::I32);
    t.store_r(n, sum);
}

pub fn add_imm_rn(t: &mut Translator, word: u16) {
    let n = Translator::reg_n(word);
    let imm = i32::from((word & 0xff) as u8 as i8) as u32;
    let rn = t.load_r(n);
    let sum = t.add_imm(rn, imm);
    t.store_r(n, sum);
}

pub fn sub_rm_rn(t: &mut Translator, word: u16) {
    let n = Translator::reg_n(word);
    let m = Translator::reg_m(word);
    let rn = t.load_r(n);
    let rm = t.load_r(m);
    let diff = t.push2(Opcode::Sub, rn, rm, ValueType::I32);
    t.store_r(n, diff);
}

pub fn and_rm_rn(t: &mut Translator, word: u16) {
    let n = Translator::reg_n(word);
    let m = Translator::reg_m(word);
    let rn = t.load_r(n);
    let rm = t.load_r(m);
    let res = t.push2(Opcode::And, rn, rm, ValueType::I32);
    t.store_r(n, res);
}

pub fn or_rm_rn(t: &mut Translator, word: u16) {
    let n = Translator::reg_n(word);
    let m = Translator::reg_m(word);
    let rn = t.load_r(n);
    let rm = t.load_r(m);
    let res = t.push2(Opcode::Or, rn, rm, ValueType::I32);
    t.store_r(n, res);
}

pub fn xor_rm_rn(t: &mut Translator, word: u16) {
    let n = Translator::reg_n(word);
    let m = Translator::reg_m(word);
    let rn = t.load_r(n);
    let rm = t.load_r(m);
    let res = t.push2(Opcode::Xor, rn, rm, ValueType::I32);
    t.store_r(n, res);
}

pub fn not_rm_rn(t: &mut Translator, word: u16) {
    let n = Translator::reg_n(word);
    let m = Translator::reg_m(word);
    let rm = t.load_r(m);
    let res = t.push1(Opcode::Not, rm, ValueType::I32);
    t.store_r(n, res);
}

pub fn neg_rm_rn(t: &mut Translator, word: u16) {
    let n = Translator::reg_n(word);
    let m = Translator::reg_m(word);
    let rm = t.load_r(m);
    let res = t.push1(Opcode::Neg, rm, ValueType::I32);
    t.store_r(n, res);
}

pub fn mov_imm_rn(t: &mut Translator, word: u16) {
    let n = Translator::reg_n(word);
    let imm = i32::from((word & 0xff) as u8 as i8) as u32;
    let c = t.const_i32(imm);
    t.store_r(n, c);
}

pub fn mov_rm_rn(t: &mut Translator, word: u16) {
    let n = Translator::reg_n(word);
    let m = Translator::reg_m(word);
    let rm = t.load_r(m);
    t.store_r(n, rm);
}

/// `MOV.L Rm, @Rn`.
pub fn mov_l_store(t: &mut Translator, word: u16) {
    let n = Translator::reg_n(word);
    let m = Translator::reg_m(word);
    let addr = t.load_r(n);
    let value = t.load_r(m);
    t.store(Opcode::Store32, [Some(addr), Some(value), None]);
}

/// `MOV.L @Rm, Rn`.
pub fn mov_l_load(t: &mut Translator, word: u16) {
    let n = Translator::reg_n(word);
    let m = Translator::reg_m(word);
    let addr = t.load_r(m);
    let value = t.push1(Opcode::Load32, addr, ValueType::I32);
    t.store_r(n, value);
}

fn cmp_rm_rn(t: &mut Translator, word: u16, op: Opcode) {
    let n = Translator::reg_n(word);
    let m = Translator::reg_m(word);
    let rn = t.load_r(n);
    let rm = t.load_r(m);
    let result = t.push2(op, rn, rm, ValueType::I32);
    t.store_t(result);
}

pub fn cmp_eq_rm_rn(t: &mut Translator, word: u16) {
    cmp_rm_rn(t, word, Opcode::CmpEq);
}

pub fn cmp_ge_rm_rn(t: &mut Translator, word: u16) {
    cmp_rm_rn(t, word, Opcode::CmpSge);
}

pub fn cmp_gt_rm_rn(t: &mut Translator, word: u16) {
    cmp_rm_rn(t, word, Opcode::CmpSgt);
}

pub fn cmp_hs_rm_rn(t: &mut Translator, word: u16) {
    cmp_rm_rn(t, word, Opcode::CmpUge);
}

pub fn cmp_hi_rm_rn(t: &mut Translator, word: u16) {
    cmp_rm_rn(t, word, Opcode::CmpUgt);
}

pub fn cmp_eq_imm_r0(t: &mut Translator, word: u16) {
    let imm = i32::from((word & 0xff) as u8 as i8) as u32;
    let imm_v = t.const_i32(imm);
    let r0 = t.load_r(0);
    let result = t.push2(Opcode::CmpEq, r0, imm_v, ValueType::I32);
    t.store_t(result);
}

pub fn cmp_pl_rn(t: &mut Translator, word: u16) {
    let n = Translator::reg_n(word);
    let rn = t.load_r(n);
    let zero = t.const_i32(0);
    let result = t.push2(Opcode::CmpSgt, rn, zero, ValueType::I32);
    t.store_t(result);
}

pub fn cmp_pz_rn(t: &mut Translator, word: u16) {
    let n = Translator::reg_n(word);
    let rn = t.load_r(n);
    let zero = t.const_i32(0);
    let result = t.push2(Opcode::CmpSge, rn, zero, ValueType::I32);
    t.store_t(result);
}

pub fn rotl_rn(t: &mut Translator, word: u16) {
    let n = Translator::reg_n(word);
    let rn = t.load_r(n);
    let one = t.const_i32(1);
    let rotated = t.push2(Opcode::Rotl, rn, one, ValueType::I32);
    t.store_r(n, rotated);
    let bit0 = t.push2(Opcode::And, rotated, one, ValueType::I32);
    t.store_t(bit0);
}

pub fn shll_rn(t: &mut Translator, word: u16) {
    let n = Translator::reg_n(word);
    let rn = t.load_r(n);
    let shift31 = t.const_i32(31);
    let msb = t.push2(Opcode::Lshr, rn, shift31, ValueType::I32);
    let one = t.const_i32(1);
    let msb_t = t.push2(Opcode::And, msb, one, ValueType::I32);
    t.store_t(msb_t);
    let shifted = t.push2(Opcode::Shl, rn, one, ValueType::I32);
    t.store_r(n, shifted);
}

pub fn shlr_rn(t: &mut Translator, word: u16) {
    let n = Translator::reg_n(word);
    let rn = t.load_r(n);
    let one = t.const_i32(1);
    let lsb = t.push2(Opcode::And, rn, one, ValueType::I32);
    t.store_t(lsb);
    let shifted = t.push2(Opcode::Lshr, rn, one, ValueType::I32);
    t.store_r(n, shifted);
}

pub fn bra(t: &mut Translator, word: u16) {
    let pc = t.pc;
    let target_addr = branch_target12(pc, word);
    let target = t.const_i32(target_addr);
    t.defer_branch(target);
}

pub fn bsr(t: &mut Translator, word: u16) {
    let pc = t.pc;
    let target_addr = branch_target12(pc, word);
    let target = t.const_i32(target_addr);
    let ret = t.const_i32(pc.wrapping_add(4));
    t.store_ctx32(offsets::PR, ret);
    t.defer_branch(target);
}

pub fn bt(t: &mut Translator, word: u16) {
    let pc = t.pc;
    let taken_addr = branch_target8(pc, word);
    let fallthrough_addr = pc.wrapping_add(2);
    let cond = t.load_t();
    let taken = t.const_i32(taken_addr);
    let not_taken = t.const_i32(fallthrough_addr);
    t.terminate_cond_now(cond, taken, not_taken);
}

pub fn bf(t: &mut Translator, word: u16) {
    let pc = t.pc;
    let taken_addr = branch_target8(pc, word);
    let fallthrough_addr = pc.wrapping_add(2);
    let tval = t.load_t();
    let zero = t.const_i32(0);
    let cond = t.push2(Opcode::CmpEq, tval, zero, ValueType::I32);
    let taken = t.const_i32(taken_addr);
    let not_taken = t.const_i32(fallthrough_addr);
    t.terminate_cond_now(cond, taken, not_taken);
}

pub fn jmp_rn(t: &mut Translator, word: u16) {
    let n = Translator::reg_n(word);
    let target = t.load_r(n);
    t.defer_branch(target);
}

pub fn jsr_rn(t: &mut Translator, word: u16) {
    let n = Translator::reg_n(word);
    let target = t.load_r(n);
    let pc = t.pc;
    let ret = t.const_i32(pc.wrapping_add(4));
    t.store_ctx32(offsets::PR, ret);
    t.defer_branch(target);
}

/// `MAC.L @Rm+, @Rn+`: multiplies the longwords at `(Rm)`/`(Rn)`, post-increments both
/// pointers, and accumulates into `MACH:MACL`. Saturation under `SR.S` is a runtime
/// property of [`Opcode::MacL`], not baked in at translate time.
pub fn mac_l(t: &mut Translator, word: u16) {
    let n = Translator::reg_n(word);
    let m = Translator::reg_m(word);
    let addr_n = t.load_r(n);
    let addr_m = t.load_r(m);
    let val_n = t.push1(Opcode::Load32, addr_n, ValueType::I32);
    let val_m = t.push1(Opcode::Load32, addr_m, ValueType::I32);
    let addr_n4 = t.add_imm(addr_n, 4);
    let addr_m4 = t.add_imm(addr_m, 4);
    t.store_r(n, addr_n4);
    t.store_r(m, addr_m4);

    let mach = t.load_ctx32(offsets::MACH);
    let macl = t.load_ctx32(offsets::MACL);
    let acc = t.pack64(mach, macl);

    let new_acc =
        t.builder
            .push_result(t.block, Opcode::MacL, [Some(val_n), Some(val_m), Some(acc)], ValueType::I64, InstrFlags::INVALIDATE_CONTEXT);

    let (new_mach, new_macl) = t.unpack64(new_acc);
    t.store_ctx32(offsets::MACH, new_mach);
    t.store_ctx32(offsets::MACL, new_macl);
}

pub fn div1(t: &mut Translator, word: u16) {
    let n = Translator::reg_n(word);
    let m = Translator::reg_m(word);
    let rn = t.load_r(n);
    let rm = t.load_r(m);
    let sr = t.load_ctx32(offsets::SR);
    let packed = t.push3(Opcode::Div1, rn, rm, sr, ValueType::I64);
    let (new_rn, new_sr) = t.unpack64(packed);
    t.store_r(n, new_rn);
    t.store_ctx32(offsets::SR, new_sr);
}

pub fn div0s(t: &mut Translator, word: u16) {
    let n = Translator::reg_n(word);
    let m = Translator::reg_m(word);
    let rn = t.load_r(n);
    let rm = t.load_r(m);
    let sr = t.load_ctx32(offsets::SR);
    let new_sr = t.push3(Opcode::Div0s, rn, rm, sr, ValueType::I32);
    t.store_ctx32(offsets::SR, new_sr);
}

/// `LDC Rm, SR`: overwrites `SR` wholesale, then calls [`host_sr_updated`] with the
/// pre-write value so a bank swap runs if `MD`/`RB` flipped.
pub fn ldc_sr(t: &mut Translator, word: u16) {
    let src = Translator::reg_n(word);
    let new_sr = t.load_r(src);
    let old_sr = t.load_ctx32(offsets::SR);
    t.store_ctx32(offsets::SR, new_sr);
    let fn_ptr = t.const_i64(host_sr_updated as usize as u64);
    t.push_flagged(Opcode::CallExternal, [Some(fn_ptr), Some(old_sr), None], None, InstrFlags::INVALIDATE_CONTEXT);
}

pub fn stc_sr(t: &mut Translator, word: u16) {
    let n = Translator::reg_n(word);
    let sr = t.load_ctx32(offsets::SR);
    t.store_r(n, sr);
}

/// `LDS Rm, FPSCR`: overwrites `FPSCR` wholesale, then calls [`host_fpscr_updated`]
/// with the pre-write value so the `FR`/`XF` bank swap runs if `FPSCR.FR` flipped.
pub fn lds_fpscr(t: &mut Translator, word: u16) {
    let src = Translator::reg_n(word);
    let new_fpscr = t.load_r(src);
    let old_fpscr = t.load_ctx32(offsets::FPSCR);
    t.store_ctx32(offsets::FPSCR, new_fpscr);
    let fn_ptr = t.const_i64(host_fpscr_updated as usize as u64);
    t.push_flagged(Opcode::CallExternal, [Some(fn_ptr), Some(old_fpscr), None], None, InstrFlags::INVALIDATE_CONTEXT);
}

pub fn sts_fpscr(t: &mut Translator, word: u16) {
    let n = Translator::reg_n(word);
    let fpscr = t.load_ctx32(offsets::FPSCR);
    t.store_r(n, fpscr);
}

fn fbinop(t: &mut Translator, word: u16, op: Opcode) {
    let n = Translator::reg_n(word);
    let m = Translator::reg_m(word);
    let fn_reg = t.load_rf(n);
    let fm_reg = t.load_rf(m);
    let result = t.push2(op, fn_reg, fm_reg, ValueType::F32);
    t.store_rf(n, result);
}

pub fn fadd(t: &mut Translator, word: u16) {
    fbinop(t, word, Opcode::FAdd);
}

pub fn fsub(t: &mut Translator, word: u16) {
    fbinop(t, word, Opcode::FSub);
}

pub fn fmul(t: &mut Translator, word: u16) {
    fbinop(t, word, Opcode::FMul);
}

pub fn fdiv(t: &mut Translator, word: u16) {
    fbinop(t, word, Opcode::FDiv);
}

/// `FMOV FRm, FRn`: a scalar single-precision move, or a paired-single `DRm, DRn`
/// move of the enclosing register pair when `FPSCR.SZ` is set. Routed through
/// [`host_fmov_reg`] since the width depends on `FPSCR.SZ` at
/// the moment this instruction executes, which this core's single-IR-block frontend
/// has no mid-block conditional to express inline.
pub fn fmov_reg(t: &mut Translator, word: u16) {
    let n = Translator::reg_n(word);
    let m = Translator::reg_m(word);
    let fn_ptr = t.const_i64(host_fmov_reg as usize as u64);
    let packed = t.const_i32((u32::from(n) << 8) | u32::from(m));
    t.push_flagged(Opcode::CallExternal, [Some(fn_ptr), Some(packed), None], None, InstrFlags::INVALIDATE_CONTEXT);
}

/// `PREF @Rn`. For an address inside the store-queue aperture
/// (`0xe0000000-0xe3ffffff`), drains the addressed 32-byte write-combining queue to
/// the external destination `QACRn` selects, entirely as generic loads/stores
/// against the store-queue and on-chip register MMIO windows (no dedicated host
/// call needed). For any other address this degrades to copying the addressed
/// 32-byte block back onto itself: the plain "touch this address" meaning `PREF`
/// carries outside the store-queue protocol, with no effect on guest-visible state.
pub fn pref_rn(t: &mut Translator, word: u16) {
    let n = Translator::reg_n(word);
    let addr = t.load_r(n);

    let queue_bit = {
        let five = t.const_i32(5);
        let shifted = t.push2(Opcode::Lshr, addr, five, ValueType::I32);
        let one = t.const_i32(1);
        t.push2(Opcode::And, shifted, one, ValueType::I32)
    };
    let qacr_addr = {
        let two = t.const_i32(2);
        let offset = t.push2(Opcode::Shl, queue_bit, two, ValueType::I32);
        let qacr0 = t.const_i32(0x1f00_0038); // QACR1 sits 4 bytes after QACR0.
        t.push2(Opcode::Add, qacr0, offset, ValueType::I32)
    };
    let qacr_val = t.push1(Opcode::Load32, qacr_addr, ValueType::I32);

    let dest_base = {
        let ext_mask = t.const_i32(0x1c);
        let ext = t.push2(Opcode::And, qacr_val, ext_mask, ValueType::I32);
        let shift24 = t.const_i32(24);
        let ext_hi = t.push2(Opcode::Shl, ext, shift24, ValueType::I32);
        let low_mask = t.const_i32(0x03ff_ffe0);
        let low = t.push2(Opcode::And, addr, low_mask, ValueType::I32);
        t.push2(Opcode::Or, ext_hi, low, ValueType::I32)
    };
    let src_base = {
        let align_mask = t.const_i32(0xffff_ffe0);
        t.push2(Opcode::And, addr, align_mask, ValueType::I32)
    };

    // Only addresses inside 0xe0000000-0xe3ffffff actually route through the store
    // queues; everywhere else `in_range` is 0 and `mask`/`not_mask` fold `dest_base`
    // back down to `src_base`, turning the drain below into a self-copy.
    let in_range = {
        let aperture_mask = t.const_i32(0xfc00_0000);
        let top = t.push2(Opcode::And, addr, aperture_mask, ValueType::I32);
        let sq_base = t.const_i32(0xe000_0000);
        t.push2(Opcode::CmpEq, top, sq_base, ValueType::I32)
    };
    let mask = t.push1(Opcode::Neg, in_range, ValueType::I32);
    let not_mask = t.push1(Opcode::Not, mask, ValueType::I32);
    let effective_dest_base = {
        let dest_masked = t.push2(Opcode::And, dest_base, mask, ValueType::I32);
        let src_masked = t.push2(Opcode::And, src_base, not_mask, ValueType::I32);
        t.push2(Opcode::Or, dest_masked, src_masked, ValueType::I32)
    };

    for i in 0..8u32 {
        let src = t.add_imm(src_base, i * 4);
        let value = t.push1(Opcode::Load32, src, ValueType::I32);
        let dest = t.add_imm(effective_dest_base, i * 4);
        t.store(Opcode::Store32, [Some(dest), Some(value), None]);
    }
}

#[cfg(test)]
mod tests {
    use crate::jit::ir::Opcode;

    use super::*;

    fn new_translator() -> Translator {
        let mut builder = IRBuilder::new();
        let block = builder.new_block();
        Translator::new(builder, block, 0x8c01_0000)
    }

    #[test]
    fn add_rm_rn_reads_both_operands_and_writes_rn() {
        let mut t = new_translator();
        add_rm_rn(&mut t, 0x330c); // ADD R3, R3 style encoding (n=3, m=3)
        let b = &t.builder;
        let live: Vec<_> = b.live_instrs(t.block).collect();
        assert_eq!(live.len(), 3, "two loads and one store");
        let last = b.instr(*live.last().unwrap());
        assert!(matches!(last.opcode, Opcode::StoreContext(_)));
    }

    #[test]
    fn bt_terminates_with_a_conditional_branch_immediately() {
        let mut t = new_translator();
        bt(&mut t, 0x8902); // BT with an 8-bit displacement
        assert!(!t.has_pending_branch());
        let last = t.builder.live_instrs(t.block).last().unwrap();
        assert_eq!(t.builder.instr(last).opcode, Opcode::BranchCond);
    }

    #[test]
    fn bra_defers_its_branch_for_the_delay_slot() {
        let mut t = new_translator();
        bra(&mut t, 0xa010);
        assert!(t.has_pending_branch());
        t.finish_pending_branch();
        assert!(!t.has_pending_branch());
        let last = t.builder.live_instrs(t.block).last().unwrap();
        assert_eq!(t.builder.instr(last).opcode, Opcode::Branch);
    }

    #[test]
    fn mac_l_produces_a_mac_l_instruction_and_updates_both_mac_halves() {
        let mut t = new_translator();
        mac_l(&mut t, 0x000f);
        let has_macl = t
            .builder
            .live_instrs(t.block)
            .any(|id| matches!(t.builder.instr(id).opcode, Opcode::MacL));
        assert!(has_macl);
    }

    #[test]
    fn pref_rn_drains_the_queue_with_eight_loads_and_eight_stores() {
        let mut t = new_translator();
        pref_rn(&mut t, 0x0083); // PREF @R0
        let loads = t.builder.live_instrs(t.block).filter(|&id| matches!(t.builder.instr(id).opcode, Opcode::Load32)).count();
        let stores = t.builder.live_instrs(t.block).filter(|&id| matches!(t.builder.instr(id).opcode, Opcode::Store32)).count();
        // One extra Load32 reads QACRn itself, ahead of the eight queue-word loads.
        assert_eq!(loads, 9);
        assert_eq!(stores, 8);
    }
}
