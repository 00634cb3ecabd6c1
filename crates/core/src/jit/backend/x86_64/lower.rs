//! Lowers one validated, allocated IR block to x86-64 machine code.
//!
//! The frontend never emits more than one live [`crate::jit::ir::Block`] per compiled
//! unit — every `Branch`/`BranchCond` terminator carries a computed address, never a
//! local block reference. That means this lowering pass never needs per-block labels
//! or inter-block jumps: it walks the block's instructions once in order and the
//! epilog simply follows the terminator, reached by falling through rather than by a
//! jump.

use crate::jit::backend::abi;
use crate::jit::backend::runtime;
use crate::jit::ir::value::Location;
use crate::jit::ir::{BlockId, ConstValue, IRBuilder, Opcode, ValueId, ValueType};
use crate::jit::opt::regalloc::Allocation;

use super::asm::{AluOp, Asm, Cond, ShiftOp};

/// Extra named-local stack slots reserved below the allocator's spill area, for
/// [`Opcode::LoadLocal`]/[`Opcode::StoreLocal`]. The current frontend decode table
/// never emits them; the slots exist so the opcode is fully supported regardless.
const EXTRA_LOCAL_SLOTS: i32 = 64;

// Scratch registers the lowering pass threads every operand through, regardless of
// the value's allocated location: simpler and less optimal than direct-operand
// addressing, traded for a uniform lowering scheme.
const GP_A: u8 = abi::RAX;
const GP_B: u8 = abi::RCX;
const GP_TMP: u8 = abi::R8;
const FP_A: u8 = abi::XMM0;
const FP_B: u8 = abi::XMM1;

fn frame_bytes(alloc: &Allocation) -> i32 {
    let fixed = -abi::LOCALS_BASE;
    let variable = 8 * (alloc.num_locals as i32 + EXTRA_LOCAL_SLOTS);
    (fixed + variable + 15) & !15
}

fn local_slot(index: i32) -> i32 {
    abi::LOCALS_BASE - 8 * index
}

fn extra_local_slot(alloc: &Allocation, index: u32) -> i32 {
    abi::LOCALS_BASE - 8 * alloc.num_locals as i32 - 8 * (index as i32 + 1)
}

fn gp_width(ty: ValueType) -> u8 {
    if matches!(ty, ValueType::I64) {
        8
    } else {
        4
    }
}

fn reload_ctx(asm: &mut Asm, dst: u8) {
    asm.load_mem(dst, abi::RBP, abi::CTX_SLOT, 8, false);
}

fn reload_membase(asm: &mut Asm, dst: u8) {
    asm.load_mem(dst, abi::RBP, abi::MEMBASE_SLOT, 8, false);
}

fn reload_space(asm: &mut Asm, dst: u8) {
    asm.load_mem(dst, abi::RBP, abi::SPACE_SLOT, 8, false);
}

fn save_fp_regs(asm: &mut Asm) {
    for (reg, slot) in abi::FP_REGS.iter().zip(abi::FP_SAVE_SLOTS) {
        asm.store_xmm(abi::RBP, slot, *reg, true);
    }
}

fn restore_fp_regs(asm: &mut Asm) {
    for (reg, slot) in abi::FP_REGS.iter().zip(abi::FP_SAVE_SLOTS) {
        asm.load_xmm(*reg, abi::RBP, slot, true);
    }
}

fn load_gp(asm: &mut Asm, builder: &IRBuilder, id: ValueId, dst: u8) {
    let v = builder.value(id);
    if let Some(c) = v.constant {
        match c {
            ConstValue::I8(x) => asm.mov_reg_imm32(dst, u32::from(x)),
            ConstValue::I16(x) => asm.mov_reg_imm32(dst, u32::from(x)),
            ConstValue::I32(x) => asm.mov_reg_imm32(dst, x),
            ConstValue::I64(x) => asm.mov_reg_imm64(dst, x),
            ConstValue::F32(_) | ConstValue::F64(_) => {
                unreachable!("float constants are loaded through load_fp")
            }
            ConstValue::Block(_) => {
                unreachable!("block refs never reach codegen: one IR block per compiled unit")
            }
        }
        return;
    }
    match v.location {
        Location::Register(idx) => asm.mov_reg_reg(dst, abi::GP_REGS[idx as usize], 8),
        Location::Spilled(slot) => asm.load_mem(dst, abi::RBP, local_slot(slot as i32), 8, false),
        Location::Unallocated => unreachable!("register allocation runs before lowering"),
    }
}

fn store_gp_result(asm: &mut Asm, builder: &IRBuilder, result: ValueId, src: u8) {
    match builder.value(result).location {
        Location::Register(idx) => {
            let dst = abi::GP_REGS[idx as usize];
            if dst != src {
                asm.mov_reg_reg(dst, src, 8);
            }
        }
        Location::Spilled(slot) => asm.store_mem(abi::RBP, local_slot(slot as i32), src, 8),
        Location::Unallocated => unreachable!("register allocation runs before lowering"),
    }
}

fn load_fp(asm: &mut Asm, builder: &IRBuilder, id: ValueId, dst: u8) {
    let v = builder.value(id);
    if let Some(c) = v.constant {
        match c {
            ConstValue::F32(x) => {
                asm.mov_reg_imm32(GP_TMP, x.to_bits());
                asm.movd_xmm_gp(dst, GP_TMP);
            }
            ConstValue::F64(x) => {
                asm.mov_reg_imm64(GP_TMP, x.to_bits());
                asm.movq_xmm_gp(dst, GP_TMP);
            }
            _ => unreachable!("non-float constants are loaded through load_gp"),
        }
        return;
    }
    let is_f64 = v.ty == ValueType::F64;
    match v.location {
        Location::Register(idx) => {
            let src = abi::FP_REGS[idx as usize];
            if is_f64 {
                asm.movsd_xmm_xmm(dst, src);
            } else {
                asm.movss_xmm_xmm(dst, src);
            }
        }
        Location::Spilled(slot) => asm.load_xmm(dst, abi::RBP, local_slot(slot as i32), is_f64),
        Location::Unallocated => unreachable!("register allocation runs before lowering"),
    }
}

fn store_fp_result(asm: &mut Asm, builder: &IRBuilder, result: ValueId, src: u8) {
    let is_f64 = builder.value(result).ty == ValueType::F64;
    match builder.value(result).location {
        Location::Register(idx) => {
            let dst = abi::FP_REGS[idx as usize];
            if dst != src {
                if is_f64 {
                    asm.movsd_xmm_xmm(dst, src);
                } else {
                    asm.movss_xmm_xmm(dst, src);
                }
            }
        }
        Location::Spilled(slot) => asm.store_xmm(abi::RBP, local_slot(slot as i32), src, is_f64),
        Location::Unallocated => unreachable!("register allocation runs before lowering"),
    }
}

/// One fastmem access site recorded during lowering, block-relative, so the fault
/// handler can recover a `SIGSEGV` without disassembling the faulting instruction.
/// `BF_SLOWMEM` blocks never populate this list: every access already
/// goes through [`runtime::slow_read8`] and friends, which can't fault on a bad guest
/// address the way a raw `membase`-relative load can.
#[derive(Debug, Clone, Copy)]
pub struct FaultSite {
    /// Byte offset of the faulting instruction from the block's host entry point.
    pub offset: u32,
    /// Byte length of the faulting instruction, to resume past it.
    pub len: u8,
    pub width: u8,
    pub is_store: bool,
}

fn cmp_cond(opcode: Opcode) -> Cond {
    match opcode {
        Opcode::CmpEq => Cond::Eq,
        Opcode::CmpNe => Cond::Ne,
        Opcode::CmpSge => Cond::Ge,
        Opcode::CmpSgt => Cond::Gt,
        Opcode::CmpSle => Cond::Le,
        Opcode::CmpSlt => Cond::Lt,
        Opcode::CmpUge => Cond::Ae,
        Opcode::CmpUgt => Cond::A,
        Opcode::CmpUle => Cond::Be,
        Opcode::CmpUlt => Cond::B,
        _ => unreachable!("not a comparison opcode"),
    }
}

/// Compiles `entry`'s instructions into one function body: prolog, straight-line
/// body, epilog. Returns the raw bytes to hand to
/// [`crate::jit::backend::code_buffer::CodeBuffer::write`], plus the fastmem access
/// sites the fault handler can recover from (empty when `slowmem` is set, since then
/// every guest access already goes through the checked [`runtime`] accessors).
#[must_use]
pub fn lower(builder: &IRBuilder, entry: BlockId, alloc: &Allocation, slowmem: bool) -> (Vec<u8>, Vec<FaultSite>) {
    let mut asm = Asm::new();
    let mut fault_sites = Vec::new();
    let frame = frame_bytes(alloc);

    // --- Prolog -------------------------------------------------
    asm.push_reg(abi::RBP);
    asm.mov_reg_reg(abi::RBP, abi::RSP, 8);
    asm.alu_reg_imm32(AluOp::Sub, abi::RSP, frame, 8);
    for (slot, reg) in abi::GP_SAVE_SLOTS.into_iter().zip(abi::CALLEE_SAVED) {
        asm.store_mem(abi::RBP, slot, reg, 8);
    }
    asm.store_mem(abi::RBP, abi::CTX_SLOT, abi::RDI, 8);
    asm.store_mem(abi::RBP, abi::MEMBASE_SLOT, abi::RSI, 8);
    asm.store_mem(abi::RBP, abi::SPACE_SLOT, abi::RDX, 8);

    // --- Body -------------------------------------------------
    for id in builder.live_instrs(entry) {
        let instr = builder.instr(id).clone();
        lower_instr(&mut asm, builder, alloc, instr.opcode, instr.args, instr.result, slowmem, &mut fault_sites);
    }

    // --- Epilog (reached by fallthrough, never by jump: see module doc) ---
    for (slot, reg) in abi::GP_SAVE_SLOTS.into_iter().zip(abi::CALLEE_SAVED) {
        asm.load_mem(reg, abi::RBP, slot, 8, false);
    }
    asm.mov_reg_reg(abi::RSP, abi::RBP, 8);
    asm.pop_reg(abi::RBP);
    asm.ret();

    (asm.into_bytes(), fault_sites)
}

fn lower_instr(
    asm: &mut Asm,
    builder: &IRBuilder,
    alloc: &Allocation,
    opcode: Opcode,
    args: [Option<ValueId>; 3],
    result: Option<ValueId>,
    slowmem: bool,
    fault_sites: &mut Vec<FaultSite>,
) {
    match opcode {
        Opcode::Nop => {}

        Opcode::LoadContext(offset) => {
            let result = result.expect("LoadContext always produces a value");
            reload_ctx(asm, GP_TMP);
            let ty = builder.value(result).ty;
            if ty.is_float() {
                asm.load_xmm(FP_A, GP_TMP, offset as i32, ty == ValueType::F64);
                store_fp_result(asm, builder, result, FP_A);
            } else {
                asm.load_mem(GP_A, GP_TMP, offset as i32, ty.byte_size() as u8, false);
                store_gp_result(asm, builder, result, GP_A);
            }
        }
        Opcode::StoreContext(offset) => {
            let value = args[0].expect("StoreContext's operand 0 is the value to write");
            reload_ctx(asm, GP_TMP);
            let ty = builder.value(value).ty;
            if ty.is_float() {
                load_fp(asm, builder, value, FP_A);
                asm.store_xmm(GP_TMP, offset as i32, FP_A, ty == ValueType::F64);
            } else {
                load_gp(asm, builder, value, GP_A);
                asm.store_mem(GP_TMP, offset as i32, GP_A, ty.byte_size() as u8);
            }
        }
        Opcode::LoadLocal(index) => {
            let result = result.expect("LoadLocal always produces a value");
            let ty = builder.value(result).ty;
            let slot = extra_local_slot(alloc, index);
            if ty.is_float() {
                asm.load_xmm(FP_A, abi::RBP, slot, ty == ValueType::F64);
                store_fp_result(asm, builder, result, FP_A);
            } else {
                asm.load_mem(GP_A, abi::RBP, slot, 8, false);
                store_gp_result(asm, builder, result, GP_A);
            }
        }
        Opcode::StoreLocal(index) => {
            let value = args[0].expect("StoreLocal's operand 0 is the value to write");
            let ty = builder.value(value).ty;
            let slot = extra_local_slot(alloc, index);
            if ty.is_float() {
                load_fp(asm, builder, value, FP_A);
                asm.store_xmm(abi::RBP, slot, FP_A, ty == ValueType::F64);
            } else {
                load_gp(asm, builder, value, GP_A);
                asm.store_mem(abi::RBP, slot, GP_A, 8);
            }
        }

        Opcode::Load8 | Opcode::Load16 | Opcode::Load32 | Opcode::Load64 => {
            let addr = args[0].expect("guest loads take one address operand");
            let result = result.expect("guest loads always produce a value");
            let width = match opcode {
                Opcode::Load8 => 1,
                Opcode::Load16 => 2,
                Opcode::Load32 => 4,
                Opcode::Load64 => 8,
                _ => unreachable!(),
            };
            if slowmem {
                load_gp(asm, builder, addr, abi::RSI);
                reload_space(asm, abi::RDI);
                let helper = match opcode {
                    Opcode::Load8 => runtime::slow_read8 as usize as u64,
                    Opcode::Load16 => runtime::slow_read16 as usize as u64,
                    Opcode::Load32 => runtime::slow_read32 as usize as u64,
                    Opcode::Load64 => runtime::slow_read64 as usize as u64,
                    _ => unreachable!(),
                };
                asm.mov_reg_imm64(GP_TMP, helper);
                asm.call_reg(GP_TMP);
                store_gp_result(asm, builder, result, abi::RAX);
            } else {
                load_gp(asm, builder, addr, GP_A);
                reload_membase(asm, GP_TMP);
                asm.alu_reg_reg(AluOp::Add, GP_TMP, GP_A, 8);
                let start = asm.pos();
                asm.load_mem(GP_A, GP_TMP, 0, width, false);
                fault_sites.push(FaultSite { offset: start as u32, len: (asm.pos() - start) as u8, width, is_store: false });
                store_gp_result(asm, builder, result, GP_A);
            }
        }
        Opcode::Store8 | Opcode::Store16 | Opcode::Store32 | Opcode::Store64 => {
            let addr = args[0].expect("guest stores take an address operand");
            let value = args[1].expect("guest stores take a value operand");
            let width = match opcode {
                Opcode::Store8 => 1,
                Opcode::Store16 => 2,
                Opcode::Store32 => 4,
                Opcode::Store64 => 8,
                _ => unreachable!(),
            };
            if slowmem {
                load_gp(asm, builder, addr, abi::RSI);
                load_gp(asm, builder, value, abi::RDX);
                reload_space(asm, abi::RDI);
                let helper = match opcode {
                    Opcode::Store8 => runtime::slow_write8 as usize as u64,
                    Opcode::Store16 => runtime::slow_write16 as usize as u64,
                    Opcode::Store32 => runtime::slow_write32 as usize as u64,
                    Opcode::Store64 => runtime::slow_write64 as usize as u64,
                    _ => unreachable!(),
                };
                asm.mov_reg_imm64(GP_TMP, helper);
                asm.call_reg(GP_TMP);
            } else {
                load_gp(asm, builder, addr, GP_A);
                reload_membase(asm, GP_TMP);
                asm.alu_reg_reg(AluOp::Add, GP_TMP, GP_A, 8);
                load_gp(asm, builder, value, GP_B);
                let start = asm.pos();
                asm.store_mem(GP_TMP, 0, GP_B, width);
                fault_sites.push(FaultSite { offset: start as u32, len: (asm.pos() - start) as u8, width, is_store: true });
            }
        }

        Opcode::Add | Opcode::Sub | Opcode::And | Opcode::Or | Opcode::Xor => {
            let result = result.expect("binary ALU ops always produce a value");
            let op0 = args[0].expect("binary ALU op operand 0");
            let op1 = args[1].expect("binary ALU op operand 1");
            let width = gp_width(builder.value(result).ty);
            load_gp(asm, builder, op0, GP_A);
            load_gp(asm, builder, op1, GP_B);
            let aluop = match opcode {
                Opcode::Add => AluOp::Add,
                Opcode::Sub => AluOp::Sub,
                Opcode::And => AluOp::And,
                Opcode::Or => AluOp::Or,
                Opcode::Xor => AluOp::Xor,
                _ => unreachable!(),
            };
            asm.alu_reg_reg(aluop, GP_A, GP_B, width);
            store_gp_result(asm, builder, result, GP_A);
        }
        Opcode::Neg => {
            let result = result.expect("Neg always produces a value");
            let op0 = args[0].expect("Neg operand 0");
            let width = gp_width(builder.value(result).ty);
            load_gp(asm, builder, op0, GP_A);
            asm.neg_reg(GP_A, width);
            store_gp_result(asm, builder, result, GP_A);
        }
        Opcode::Not => {
            let result = result.expect("Not always produces a value");
            let op0 = args[0].expect("Not operand 0");
            let width = gp_width(builder.value(result).ty);
            load_gp(asm, builder, op0, GP_A);
            asm.not_reg(GP_A, width);
            store_gp_result(asm, builder, result, GP_A);
        }
        Opcode::Mul => {
            let result = result.expect("Mul always produces a value");
            let op0 = args[0].expect("Mul operand 0");
            let op1 = args[1].expect("Mul operand 1");
            let width = gp_width(builder.value(result).ty);
            load_gp(asm, builder, op0, GP_A);
            load_gp(asm, builder, op1, GP_B);
            asm.imul_reg_reg(GP_A, GP_B, width);
            store_gp_result(asm, builder, result, GP_A);
        }
        Opcode::Shl | Opcode::Lshr | Opcode::Ashr | Opcode::Rotl | Opcode::Rotr => {
            let result = result.expect("shift ops always produce a value");
            let op0 = args[0].expect("shift operand 0 (value)");
            let op1 = args[1].expect("shift operand 1 (amount)");
            let width = gp_width(builder.value(result).ty);
            load_gp(asm, builder, op0, GP_A);
            load_gp(asm, builder, op1, GP_B); // GP_B is rcx: the hardwired shift-count register
            let shiftop = match opcode {
                Opcode::Shl => ShiftOp::Shl,
                Opcode::Lshr => ShiftOp::Shr,
                Opcode::Ashr => ShiftOp::Sar,
                Opcode::Rotl => ShiftOp::Rol,
                Opcode::Rotr => ShiftOp::Ror,
                _ => unreachable!(),
            };
            asm.shift_reg_cl(shiftop, GP_A, width);
            store_gp_result(asm, builder, result, GP_A);
        }

        Opcode::MacL | Opcode::MacW => {
            let result = result.expect("MacL/MacW always produce a value");
            let val_n = args[0].expect("operand 0: multiplicand");
            let val_m = args[1].expect("operand 1: multiplier");
            let acc = args[2].expect("operand 2: existing accumulator");
            save_fp_regs(asm);
            reload_ctx(asm, abi::RDI);
            load_gp(asm, builder, val_n, abi::RSI);
            load_gp(asm, builder, val_m, abi::RDX);
            load_gp(asm, builder, acc, abi::RCX);
            let helper = if matches!(opcode, Opcode::MacL) {
                runtime::mac_l_step as usize as u64
            } else {
                runtime::mac_w_step as usize as u64
            };
            asm.mov_reg_imm64(GP_TMP, helper);
            asm.call_reg(GP_TMP);
            restore_fp_regs(asm);
            store_gp_result(asm, builder, result, abi::RAX);
        }

        Opcode::Div0u => {
            let result = result.expect("Div0u always produces a value");
            let sr = args[0].expect("Div0u operand 0: SR");
            load_gp(asm, builder, sr, GP_A);
            asm.alu_reg_imm32(AluOp::And, GP_A, !0x0000_0301u32 as i32, 4);
            store_gp_result(asm, builder, result, GP_A);
        }
        Opcode::Div0s => {
            let result = result.expect("Div0s always produces a value");
            let rn = args[0].expect("Div0s operand 0");
            let rm = args[1].expect("Div0s operand 1");
            let sr = args[2].expect("Div0s operand 2");
            save_fp_regs(asm);
            load_gp(asm, builder, rn, abi::RDI);
            load_gp(asm, builder, rm, abi::RSI);
            load_gp(asm, builder, sr, abi::RDX);
            asm.mov_reg_imm64(GP_TMP, runtime::div0s_step as usize as u64);
            asm.call_reg(GP_TMP);
            restore_fp_regs(asm);
            store_gp_result(asm, builder, result, abi::RAX);
        }
        Opcode::Div1 => {
            let result = result.expect("Div1 always produces a value");
            let rn = args[0].expect("Div1 operand 0");
            let rm = args[1].expect("Div1 operand 1");
            let sr = args[2].expect("Div1 operand 2");
            save_fp_regs(asm);
            load_gp(asm, builder, rn, abi::RDI);
            load_gp(asm, builder, rm, abi::RSI);
            load_gp(asm, builder, sr, abi::RDX);
            asm.mov_reg_imm64(GP_TMP, runtime::div1_step as usize as u64);
            asm.call_reg(GP_TMP);
            restore_fp_regs(asm);
            store_gp_result(asm, builder, result, abi::RAX);
        }

        Opcode::CmpEq
        | Opcode::CmpNe
        | Opcode::CmpSge
        | Opcode::CmpSgt
        | Opcode::CmpUge
        | Opcode::CmpUgt
        | Opcode::CmpSle
        | Opcode::CmpSlt
        | Opcode::CmpUle
        | Opcode::CmpUlt => {
            let result = result.expect("comparisons always produce a value");
            let op0 = args[0].expect("comparison operand 0");
            let op1 = args[1].expect("comparison operand 1");
            let width = gp_width(builder.value(op0).ty);
            load_gp(asm, builder, op0, GP_A);
            load_gp(asm, builder, op1, GP_B);
            asm.alu_reg_reg(AluOp::Cmp, GP_A, GP_B, width);
            asm.setcc_zx(cmp_cond(opcode), GP_A);
            store_gp_result(asm, builder, result, GP_A);
        }

        Opcode::FAdd | Opcode::FSub | Opcode::FMul | Opcode::FDiv => {
            let result = result.expect("FP binary ops always produce a value");
            let op0 = args[0].expect("FP binop operand 0");
            let op1 = args[1].expect("FP binop operand 1");
            let is_f64 = builder.value(result).ty == ValueType::F64;
            load_fp(asm, builder, op0, FP_A);
            load_fp(asm, builder, op1, FP_B);
            let sse_opcode = match opcode {
                Opcode::FAdd => 0x58,
                Opcode::FSub => 0x5C,
                Opcode::FMul => 0x59,
                Opcode::FDiv => 0x5E,
                _ => unreachable!(),
            };
            if is_f64 {
                asm.binsd(sse_opcode, FP_A, FP_B);
            } else {
                asm.binss(sse_opcode, FP_A, FP_B);
            }
            store_fp_result(asm, builder, result, FP_A);
        }
        Opcode::FNeg | Opcode::FAbs => {
            let result = result.expect("FNeg/FAbs always produce a value");
            let op0 = args[0].expect("FNeg/FAbs operand 0");
            let is_f64 = builder.value(result).ty == ValueType::F64;
            load_fp(asm, builder, op0, FP_A);
            if matches!(opcode, Opcode::FNeg) {
                if is_f64 {
                    asm.mov_reg_imm64(GP_TMP, 0x8000_0000_0000_0000);
                } else {
                    asm.mov_reg_imm32(GP_TMP, 0x8000_0000);
                }
                asm.movd_xmm_gp(FP_B, GP_TMP);
                asm.xorps(FP_A, FP_B);
            } else {
                if is_f64 {
                    asm.mov_reg_imm64(GP_TMP, 0x7FFF_FFFF_FFFF_FFFF);
                } else {
                    asm.mov_reg_imm32(GP_TMP, 0x7FFF_FFFF);
                }
                asm.movd_xmm_gp(FP_B, GP_TMP);
                asm.andps(FP_A, FP_B);
            }
            store_fp_result(asm, builder, result, FP_A);
        }
        Opcode::FSqrt => {
            let result = result.expect("FSqrt always produces a value");
            let op0 = args[0].expect("FSqrt operand 0");
            let is_f64 = builder.value(result).ty == ValueType::F64;
            load_fp(asm, builder, op0, FP_A);
            if is_f64 {
                asm.sqrtsd(FP_A, FP_A);
            } else {
                asm.sqrtss(FP_A, FP_A);
            }
            store_fp_result(asm, builder, result, FP_A);
        }
        Opcode::FCmpEq | Opcode::FCmpGt => {
            let result = result.expect("FP comparisons always produce a value");
            let op0 = args[0].expect("FP comparison operand 0");
            let op1 = args[1].expect("FP comparison operand 1");
            let is_f64 = builder.value(op0).ty == ValueType::F64;
            load_fp(asm, builder, op0, FP_A);
            load_fp(asm, builder, op1, FP_B);
            if is_f64 {
                asm.comisd(FP_A, FP_B);
            } else {
                asm.comiss(FP_A, FP_B);
            }
            let cond = if matches!(opcode, Opcode::FCmpEq) { Cond::Eq } else { Cond::A };
            asm.setcc_zx(cond, GP_A);
            store_gp_result(asm, builder, result, GP_A);
        }
        Opcode::FSin | Opcode::FCos => {
            let result = result.expect("FSin/FCos always produce a value");
            let op0 = args[0].expect("FSin/FCos operand 0");
            save_fp_regs(asm);
            load_fp(asm, builder, op0, abi::XMM0);
            let helper =
                if matches!(opcode, Opcode::FSin) { runtime::host_sinf as usize as u64 } else { runtime::host_cosf as usize as u64 };
            asm.mov_reg_imm64(GP_TMP, helper);
            asm.call_reg(GP_TMP);
            restore_fp_regs(asm);
            store_fp_result(asm, builder, result, abi::XMM0);
        }
        Opcode::FCvt => {
            let result = result.expect("FCvt always produces a value");
            let src = args[0].expect("FCvt operand 0");
            let src_ty = builder.value(src).ty;
            let dst_ty = builder.value(result).ty;
            match (src_ty.is_float(), dst_ty.is_float()) {
                (true, false) => {
                    load_fp(asm, builder, src, FP_A);
                    if src_ty == ValueType::F64 {
                        asm.cvttsd2si(GP_A, FP_A);
                    } else {
                        asm.cvttss2si(GP_A, FP_A);
                    }
                    store_gp_result(asm, builder, result, GP_A);
                }
                (false, true) => {
                    load_gp(asm, builder, src, GP_A);
                    if dst_ty == ValueType::F64 {
                        asm.cvtsi2sd(FP_A, GP_A);
                    } else {
                        asm.cvtsi2ss(FP_A, GP_A);
                    }
                    store_fp_result(asm, builder, result, FP_A);
                }
                _ => unreachable!("FCvt always crosses the int/float domain"),
            }
        }

        Opcode::ZeroExtend => {
            let result = result.expect("ZeroExtend always produces a value");
            let op0 = args[0].expect("ZeroExtend operand 0");
            let src_ty = builder.value(op0).ty;
            load_gp(asm, builder, op0, GP_A);
            match src_ty {
                ValueType::I8 => asm.alu_reg_imm32(AluOp::And, GP_A, 0xFF, 8),
                ValueType::I16 => asm.alu_reg_imm32(AluOp::And, GP_A, 0xFFFF, 8),
                ValueType::I32 => asm.mov_reg_reg(GP_A, GP_A, 4), // a 32-bit write zero-extends to 64
                ValueType::I64 => {}
                _ => unreachable!("ZeroExtend only applies to integers"),
            }
            store_gp_result(asm, builder, result, GP_A);
        }
        Opcode::SignExtend => {
            let result = result.expect("SignExtend always produces a value");
            let op0 = args[0].expect("SignExtend operand 0");
            let src_ty = builder.value(op0).ty;
            load_gp(asm, builder, op0, GP_A);
            let shift = match src_ty {
                ValueType::I8 => 56,
                ValueType::I16 => 48,
                ValueType::I32 => 32,
                ValueType::I64 => 0,
                _ => unreachable!("SignExtend only applies to integers"),
            };
            if shift > 0 {
                asm.shift_reg_imm8(ShiftOp::Shl, GP_A, 8, shift);
                asm.shift_reg_imm8(ShiftOp::Sar, GP_A, 8, shift);
            }
            store_gp_result(asm, builder, result, GP_A);
        }
        Opcode::Truncate => {
            let result = result.expect("Truncate always produces a value");
            let op0 = args[0].expect("Truncate operand 0");
            load_gp(asm, builder, op0, GP_A);
            store_gp_result(asm, builder, result, GP_A);
        }
        Opcode::Bitcast => {
            let result = result.expect("Bitcast always produces a value");
            let src = args[0].expect("Bitcast operand 0");
            let src_ty = builder.value(src).ty;
            let dst_ty = builder.value(result).ty;
            match (src_ty.is_float(), dst_ty.is_float()) {
                (true, false) => {
                    load_fp(asm, builder, src, FP_A);
                    if src_ty == ValueType::F64 {
                        asm.movq_gp_xmm(GP_A, FP_A);
                    } else {
                        asm.movd_gp_xmm(GP_A, FP_A);
                    }
                    store_gp_result(asm, builder, result, GP_A);
                }
                (false, true) => {
                    load_gp(asm, builder, src, GP_A);
                    if dst_ty == ValueType::F64 {
                        asm.movq_xmm_gp(FP_A, GP_A);
                    } else {
                        asm.movd_xmm_gp(FP_A, GP_A);
                    }
                    store_fp_result(asm, builder, result, FP_A);
                }
                _ => unreachable!("Bitcast always crosses the int/float domain"),
            }
        }

        Opcode::Branch => {
            let target = args[0].expect("Branch always carries a target address");
            load_gp(asm, builder, target, abi::RAX);
            // Falls through into the epilog; see module doc.
        }
        Opcode::BranchCond => {
            let cond = args[0].expect("BranchCond operand 0: condition");
            let taken = args[1].expect("BranchCond operand 1: taken target");
            let not_taken = args[2].expect("BranchCond operand 2: not-taken target");
            load_gp(asm, builder, cond, GP_A);
            asm.test_reg_reg(GP_A, GP_A, 4);
            let else_at = asm.jcc_rel32_placeholder(Cond::Eq);
            load_gp(asm, builder, taken, abi::RAX);
            let end_at = asm.jmp_rel32_placeholder();
            asm.patch_rel32(else_at);
            load_gp(asm, builder, not_taken, abi::RAX);
            asm.patch_rel32(end_at);
            // Falls through into the epilog; see module doc.
        }

        Opcode::CallExternal => {
            let fn_ptr = args[0].expect("CallExternal operand 0: function pointer");
            save_fp_regs(asm);
            reload_ctx(asm, abi::RDI);
            if let Some(arg) = args[1] {
                load_gp(asm, builder, arg, abi::RSI);
            }
            load_gp(asm, builder, fn_ptr, GP_TMP);
            asm.call_reg(GP_TMP);
            restore_fp_regs(asm);
            if let Some(result) = result {
                store_gp_result(asm, builder, result, abi::RAX);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::jit::ir::{ConstValue, InstrFlags, IRBuilder, Opcode, ValueType};
    use crate::jit::opt;

    use super::*;

    fn compile_one_block(build: impl FnOnce(&mut IRBuilder, crate::jit::ir::BlockId)) -> Vec<u8> {
        let mut b = IRBuilder::new();
        let blk = b.new_block();
        build(&mut b, blk);
        let alloc = opt::run(&mut b, blk, abi::NUM_GP, abi::NUM_FP);
        lower(&b, blk, &alloc, false).0
    }

    #[test]
    fn an_empty_block_still_emits_a_well_formed_prolog_and_epilog() {
        let code = compile_one_block(|b, blk| {
            let target = b.const_value(ConstValue::I32(0x8c01_0000));
            let _ = b.push(blk, Opcode::Branch, [Some(target), None, None], None, InstrFlags::NONE);
        });
        assert_eq!(code.first(), Some(&0x55)); // push rbp
        assert_eq!(code.last(), Some(&0xC3)); // ret
    }

    #[test]
    fn add_then_branch_emits_at_least_one_alu_byte() {
        let code = compile_one_block(|b, blk| {
            let c1 = b.const_value(ConstValue::I32(1));
            let c2 = b.const_value(ConstValue::I32(2));
            let sum = b.push(blk, Opcode::Add, [Some(c1), Some(c2), None], Some(ValueType::I32), InstrFlags::NONE).unwrap();
            let _ = b.push(blk, Opcode::Branch, [Some(sum), None, None], None, InstrFlags::NONE);
        });
        assert!(code.contains(&0x01), "expected the Add opcode byte (0x01) somewhere in the stream");
    }

    #[test]
    fn branch_cond_patches_both_placeholders_within_the_buffer() {
        let code = compile_one_block(|b, blk| {
            let cond = b.const_value(ConstValue::I32(1));
            let taken = b.const_value(ConstValue::I32(0x8c00_1000));
            let not_taken = b.const_value(ConstValue::I32(0x8c00_2000));
            let _ = b.push(blk, Opcode::BranchCond, [Some(cond), Some(taken), Some(not_taken)], None, InstrFlags::NONE);
        });
        // jcc (2 bytes) + rel32 must land inside the emitted buffer, not point past it.
        assert!(code.len() > 16);
    }

    #[test]
    fn fastmem_load_records_exactly_one_fault_site() {
        let mut b = IRBuilder::new();
        let blk = b.new_block();
        let addr = b.const_value(ConstValue::I32(0x0c00_0000));
        let loaded =
            b.push(blk, Opcode::Load32, [Some(addr), None, None], Some(ValueType::I32), InstrFlags::NONE).unwrap();
        let _ = b.push(blk, Opcode::Branch, [Some(loaded), None, None], None, InstrFlags::NONE);
        let alloc = opt::run(&mut b, blk, abi::NUM_GP, abi::NUM_FP);
        let (code, sites) = lower(&b, blk, &alloc, false);
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].width, 4);
        assert!(!sites[0].is_store);
        assert!((sites[0].offset as usize) + (sites[0].len as usize) <= code.len());
    }

    #[test]
    fn slowmem_block_records_no_fault_sites() {
        let mut b = IRBuilder::new();
        let blk = b.new_block();
        let addr = b.const_value(ConstValue::I32(0x0c00_0000));
        let loaded =
            b.push(blk, Opcode::Load32, [Some(addr), None, None], Some(ValueType::I32), InstrFlags::NONE).unwrap();
        let _ = b.push(blk, Opcode::Branch, [Some(loaded), None, None], None, InstrFlags::NONE);
        let alloc = opt::run(&mut b, blk, abi::NUM_GP, abi::NUM_FP);
        let (_, sites) = lower(&b, blk, &alloc, true);
        assert!(sites.is_empty());
    }
}
