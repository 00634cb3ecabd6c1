//! Constant folding.
//!
//! Folding is keyed by `(opcode, operand types)` and must match target precision
//! exactly: unsigned shifts treat the left operand as unsigned, arithmetic shifts
//! preserve the sign bit, float ops use plain IEEE-754 `f32`/`f64` arithmetic (which is
//! what Rust's `+`/`-`/`*` on those types already are).

use crate::jit::ir::value::ConstValue;
use crate::jit::ir::{IRBuilder, Instr, Opcode, ValueId};

use super::control_flow::Rpo;

/// Runs constant folding over every block in RPO order.
pub fn run(builder: &mut IRBuilder, rpo: &Rpo) {
    for &block in &rpo.order {
        let ids: Vec<_> = builder.live_instrs(block).collect();
        for id in ids {
            let instr = builder.instr(id).clone();
            if let Some(folded) = try_fold(builder, &instr) {
                let result = instr.result.expect("foldable opcodes always produce a result");
                let new_val = builder.const_value(folded);
                builder.replace_all_uses(result, new_val);
                builder.delete_instr(id);
            }
        }
    }
}

fn const_of(builder: &IRBuilder, v: Option<ValueId>) -> Option<ConstValue> {
    v.and_then(|id| builder.value(id).constant)
}

fn try_fold(builder: &IRBuilder, instr: &Instr) -> Option<ConstValue> {
    let a = const_of(builder, instr.args[0]);
    let b = const_of(builder, instr.args[1]);
    match instr.opcode {
        Opcode::Add => fold_int2(a?, b?, |x, y| x.wrapping_add(y)),
        Opcode::Sub => fold_int2(a?, b?, |x, y| x.wrapping_sub(y)),
        Opcode::And => fold_int2(a?, b?, |x, y| x & y),
        Opcode::Or => fold_int2(a?, b?, |x, y| x | y),
        Opcode::Xor => fold_int2(a?, b?, |x, y| x ^ y),
        Opcode::Mul => fold_int2(a?, b?, |x, y| x.wrapping_mul(y)),
        Opcode::Shl => fold_int2(a?, b?, |x, y| x.wrapping_shl(y as u32 & 0x3f)),
        Opcode::Lshr => fold_lshr(a?, b?),
        Opcode::Ashr => fold_ashr(a?, b?),
        Opcode::Neg => fold_int1(a?, i64::wrapping_neg),
        Opcode::Not => fold_int1(a?, |x| !x),
        Opcode::FAdd => fold_float2(a?, b?, |x, y| x + y),
        Opcode::FSub => fold_float2(a?, b?, |x, y| x - y),
        Opcode::FMul => fold_float2(a?, b?, |x, y| x * y),
        Opcode::FDiv => fold_float2(a?, b?, |x, y| x / y),
        Opcode::FNeg => fold_float1(a?, |x| -x),
        Opcode::FAbs => fold_float1(a?, f64::abs),
        Opcode::CmpEq => fold_cmp_i32(a?, b?, |x, y| x == y),
        Opcode::CmpNe => fold_cmp_i32(a?, b?, |x, y| x != y),
        Opcode::CmpSge => fold_cmp_signed(a?, b?, |x, y| x >= y),
        Opcode::CmpSgt => fold_cmp_signed(a?, b?, |x, y| x > y),
        Opcode::CmpSle => fold_cmp_signed(a?, b?, |x, y| x <= y),
        Opcode::CmpSlt => fold_cmp_signed(a?, b?, |x, y| x < y),
        Opcode::CmpUge => fold_cmp_i32(a?, b?, |x, y| x >= y),
        Opcode::CmpUgt => fold_cmp_i32(a?, b?, |x, y| x > y),
        Opcode::CmpUle => fold_cmp_i32(a?, b?, |x, y| x <= y),
        Opcode::CmpUlt => fold_cmp_i32(a?, b?, |x, y| x < y),
        _ => None,
    }
}

/// Normalizes any integer constant to a zero-extended `i64` plus its original type, so
/// a single generic op can fold `I8`/`I16`/`I32`/`I64` uniformly.
fn int_value(c: ConstValue) -> Option<(ConstValue, i64)> {
    match c {
        ConstValue::I8(v) => Some((c, i64::from(v))),
        ConstValue::I16(v) => Some((c, i64::from(v))),
        ConstValue::I32(v) => Some((c, i64::from(v))),
        ConstValue::I64(v) => Some((c, v as i64)),
        ConstValue::F32(_) | ConstValue::F64(_) | ConstValue::Block(_) => None,
    }
}

fn retype(template: ConstValue, v: i64) -> ConstValue {
    match template {
        ConstValue::I8(_) => ConstValue::I8(v as u8),
        ConstValue::I16(_) => ConstValue::I16(v as u16),
        ConstValue::I32(_) => ConstValue::I32(v as u32),
        ConstValue::I64(_) => ConstValue::I64(v as u64),
        other => other,
    }
}

fn fold_int2(a: ConstValue, b: ConstValue, f: impl Fn(i64, i64) -> i64) -> Option<ConstValue> {
    let (ta, va) = int_value(a)?;
    let (_, vb) = int_value(b)?;
    Some(retype(ta, f(va, vb)))
}

fn fold_int1(a: ConstValue, f: impl Fn(i64) -> i64) -> Option<ConstValue> {
    let (ta, va) = int_value(a)?;
    Some(retype(ta, f(va)))
}

fn fold_lshr(a: ConstValue, b: ConstValue) -> Option<ConstValue> {
    let (_, shift) = int_value(b)?;
    let shift = (shift as u32) & 0x3f;
    match a {
        ConstValue::I32(v) => Some(ConstValue::I32(v >> shift.min(31))),
        ConstValue::I64(v) => Some(ConstValue::I64(v >> shift.min(63))),
        ConstValue::I16(v) => Some(ConstValue::I16(v >> shift.min(15))),
        ConstValue::I8(v) => Some(ConstValue::I8(v >> shift.min(7))),
        _ => None,
    }
}

fn fold_ashr(a: ConstValue, b: ConstValue) -> Option<ConstValue> {
    let (_, shift) = int_value(b)?;
    let shift = (shift as u32) & 0x3f;
    match a {
        ConstValue::I32(v) => Some(ConstValue::I32(((v as i32) >> shift.min(31)) as u32)),
        ConstValue::I64(v) => Some(ConstValue::I64(((v as i64) >> shift.min(63)) as u64)),
        ConstValue::I16(v) => Some(ConstValue::I16(((v as i16) >> shift.min(15)) as u16)),
        ConstValue::I8(v) => Some(ConstValue::I8(((v as i8) >> shift.min(7)) as u8)),
        _ => None,
    }
}

fn fold_cmp_i32(a: ConstValue, b: ConstValue, f: impl Fn(u64, u64) -> bool) -> Option<ConstValue> {
    let ua = unsigned_bits(a)?;
    let ub = unsigned_bits(b)?;
    Some(ConstValue::I32(u32::from(f(ua, ub))))
}

fn fold_cmp_signed(a: ConstValue, b: ConstValue, f: impl Fn(i64, i64) -> bool) -> Option<ConstValue> {
    let (_, va) = int_value(a)?;
    let (_, vb) = int_value(b)?;
    Some(ConstValue::I32(u32::from(f(va, vb))))
}

fn unsigned_bits(c: ConstValue) -> Option<u64> {
    match c {
        ConstValue::I8(v) => Some(u64::from(v)),
        ConstValue::I16(v) => Some(u64::from(v)),
        ConstValue::I32(v) => Some(u64::from(v)),
        ConstValue::I64(v) => Some(v),
        _ => None,
    }
}

fn fold_float2(a: ConstValue, b: ConstValue, f: impl Fn(f64, f64) -> f64) -> Option<ConstValue> {
    match (a, b) {
        (ConstValue::F32(x), ConstValue::F32(y)) => Some(ConstValue::F32(f(f64::from(x), f64::from(y)) as f32)),
        (ConstValue::F64(x), ConstValue::F64(y)) => Some(ConstValue::F64(f(x, y))),
        _ => None,
    }
}

fn fold_float1(a: ConstValue, f: impl Fn(f64) -> f64) -> Option<ConstValue> {
    match a {
        ConstValue::F32(x) => Some(ConstValue::F32(f(f64::from(x)) as f32)),
        ConstValue::F64(x) => Some(ConstValue::F64(f(x))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::jit::ir::{ConstValue, InstrFlags, ValueType};

    use super::*;

    #[test]
    fn add_of_two_constants_folds() {
        let mut b = IRBuilder::new();
        let blk = b.new_block();
        let x = b.const_value(ConstValue::I32(2));
        let y = b.const_value(ConstValue::I32(3));
        let sum = b
            .push(blk, Opcode::Add, [Some(x), Some(y), None], Some(ValueType::I32), InstrFlags::NONE)
            .unwrap();
        let consumer = b
            .push(blk, Opcode::Add, [Some(sum), Some(sum), None], Some(ValueType::I32), InstrFlags::NONE)
            .unwrap();
        let target = b.const_value(ConstValue::Block(blk));
        let _ = b.push(blk, Opcode::Branch, [Some(target), None, None], None, InstrFlags::NONE);

        let rpo = crate::jit::opt::control_flow::run(&mut b, blk);
        run(&mut b, &rpo);

        let add_instr_id = b.value(sum).def.unwrap();
        assert_eq!(b.instr(add_instr_id).opcode, Opcode::Nop);
        let consumer_instr = b.instr(b.value(consumer).def.unwrap()).clone();
        assert_eq!(b.value(consumer_instr.args[0].unwrap()).constant, Some(ConstValue::I32(5)));
    }

    #[test]
    fn arithmetic_shift_preserves_sign() {
        let mut b = IRBuilder::new();
        let blk = b.new_block();
        let x = b.const_value(ConstValue::I32(0xffff_fff0));
        let s = b.const_value(ConstValue::I32(4));
        let shifted = b
            .push(blk, Opcode::Ashr, [Some(x), Some(s), None], Some(ValueType::I32), InstrFlags::NONE)
            .unwrap();
        let consumer = b
            .push(blk, Opcode::Add, [Some(shifted), Some(shifted), None], Some(ValueType::I32), InstrFlags::NONE)
            .unwrap();
        let target = b.const_value(ConstValue::Block(blk));
        let _ = b.push(blk, Opcode::Branch, [Some(target), None, None], None, InstrFlags::NONE);
        let rpo = crate::jit::opt::control_flow::run(&mut b, blk);
        run(&mut b, &rpo);

        let consumer_instr = b.instr(b.value(consumer).def.unwrap()).clone();
        assert_eq!(b.value(consumer_instr.args[0].unwrap()).constant, Some(ConstValue::I32(0xffff_ffff)));
    }
}
