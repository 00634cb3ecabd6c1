//! Linear-scan register allocation.
//!
//! Registers are split into two independent pools (general-purpose, floating-point);
//! SH4 integer and FPU values never compete for the same physical register class on
//! the x86-64 backend. Constants are never allocated: the backend encodes them as
//! immediates or materializes them into a scratch register per use.

use std::collections::HashMap;

use crate::jit::ir::value::Location;
use crate::jit::ir::{IRBuilder, ValueId};

use super::control_flow::Rpo;

/// Frame-sizing output of allocation: how many local stack slots spilled values need.
#[derive(Debug, Clone, Copy)]
pub struct Allocation {
    pub num_locals: u32,
}

struct ActiveInterval {
    value: ValueId,
    end: u32,
    reg: u8,
}

fn expire(active: &mut Vec<ActiveInterval>, free: &mut Vec<u8>, ordinal: u32) {
    let mut still_active = Vec::with_capacity(active.len());
    for interval in active.drain(..) {
        if interval.end < ordinal {
            free.push(interval.reg);
        } else {
            still_active.push(interval);
        }
    }
    *active = still_active;
}

/// Runs linear-scan allocation over the IR in RPO/ordinal order.
pub fn run(builder: &mut IRBuilder, rpo: &Rpo, num_gp: u8, num_fp: u8) -> Allocation {
    let mut ends: HashMap<ValueId, u32> = HashMap::new();
    for &block in &rpo.order {
        for id in builder.live_instrs(block) {
            let instr = builder.instr(id);
            let ordinal = instr.ordinal.expect("control-flow analysis must run before allocation");
            for arg in instr.args.iter().flatten() {
                if builder.value(*arg).constant.is_none() {
                    let entry = ends.entry(*arg).or_insert(ordinal);
                    *entry = (*entry).max(ordinal);
                }
            }
        }
    }

    let mut num_locals = 0u32;
    let mut gp_free: Vec<u8> = (0..num_gp).rev().collect();
    let mut fp_free: Vec<u8> = (0..num_fp).rev().collect();
    let mut gp_active: Vec<ActiveInterval> = Vec::new();
    let mut fp_active: Vec<ActiveInterval> = Vec::new();

    for &block in &rpo.order {
        let ids: Vec<_> = builder.live_instrs(block).collect();
        for id in ids {
            let instr = builder.instr(id).clone();
            let ordinal = instr.ordinal.expect("ordinal assigned by control-flow analysis");
            expire(&mut gp_active, &mut gp_free, ordinal);
            expire(&mut fp_active, &mut fp_free, ordinal);

            let Some(result) = instr.result else { continue };
            let is_float = builder.value(result).ty.is_float();
            let end = *ends.get(&result).unwrap_or(&ordinal);

            let (free, active) = if is_float {
                (&mut fp_free, &mut fp_active)
            } else {
                (&mut gp_free, &mut gp_active)
            };

            // Prefer reusing operand 0's register if this is its last use and the
            // class matches.
            let mut reused = None;
            if let Some(op0) = instr.args[0] {
                let op0_is_float = builder.value(op0).ty.is_float();
                if op0_is_float == is_float && ends.get(&op0) == Some(&ordinal) {
                    if let Some(pos) = active.iter().position(|a| a.value == op0) {
                        reused = Some(active.remove(pos).reg);
                    }
                }
            }

            let reg = reused.or_else(|| free.pop());
            match reg {
                Some(r) => {
                    builder.value_mut(result).location = Location::Register(r);
                    active.push(ActiveInterval { value: result, end, reg: r });
                }
                None => {
                    // Spill the active interval with the latest end that can free up a
                    // register for `result`; if `result` itself ends last, spill it
                    // instead.
                    let latest = active
                        .iter()
                        .enumerate()
                        .max_by_key(|(_, a)| a.end)
                        .map(|(pos, a)| (pos, a.end, a.reg));
                    match latest {
                        Some((pos, latest_end, latest_reg)) if latest_end > end => {
                            let evicted = active.remove(pos);
                            builder.value_mut(evicted.value).location = Location::Spilled(num_locals);
                            num_locals += 1;
                            builder.value_mut(result).location = Location::Register(latest_reg);
                            active.push(ActiveInterval { value: result, end, reg: latest_reg });
                        }
                        _ => {
                            builder.value_mut(result).location = Location::Spilled(num_locals);
                            num_locals += 1;
                        }
                    }
                }
            }
        }
    }

    Allocation { num_locals }
}

#[cfg(test)]
mod tests {
    use crate::jit::ir::{ConstValue, InstrFlags, Opcode, ValueType};

    use super::*;

    #[test]
    fn non_overlapping_intervals_can_share_one_register() {
        let mut b = IRBuilder::new();
        let blk = b.new_block();
        let c = b.const_value(ConstValue::I32(1));
        let v1 = b.push(blk, Opcode::Add, [Some(c), Some(c), None], Some(ValueType::I32), InstrFlags::NONE).unwrap();
        let consumer1 = b.push(blk, Opcode::Neg, [Some(v1), None, None], Some(ValueType::I32), InstrFlags::NONE).unwrap();
        let v2 = b.push(blk, Opcode::Add, [Some(c), Some(c), None], Some(ValueType::I32), InstrFlags::NONE).unwrap();
        let _consumer2 = b.push(blk, Opcode::Neg, [Some(v2), None, None], Some(ValueType::I32), InstrFlags::NONE).unwrap();
        let target = b.const_value(ConstValue::Block(blk));
        let _ = b.push(blk, Opcode::Branch, [Some(target), None, None], None, InstrFlags::NONE);

        let rpo = crate::jit::opt::control_flow::run(&mut b, blk);
        let alloc = run(&mut b, &rpo, 1, 0);
        assert_eq!(alloc.num_locals, 0, "one register suffices for two non-overlapping i32 intervals");
        let _ = consumer1;
    }

    #[test]
    fn overlapping_intervals_force_a_spill_with_an_undersized_pool() {
        let mut b = IRBuilder::new();
        let blk = b.new_block();
        let c = b.const_value(ConstValue::I32(1));
        let v1 = b.push(blk, Opcode::Add, [Some(c), Some(c), None], Some(ValueType::I32), InstrFlags::NONE).unwrap();
        let v2 = b.push(blk, Opcode::Add, [Some(c), Some(c), None], Some(ValueType::I32), InstrFlags::NONE).unwrap();
        let _both = b.push(blk, Opcode::Add, [Some(v1), Some(v2), None], Some(ValueType::I32), InstrFlags::NONE).unwrap();
        let target = b.const_value(ConstValue::Block(blk));
        let _ = b.push(blk, Opcode::Branch, [Some(target), None, None], None, InstrFlags::NONE);

        let rpo = crate::jit::opt::control_flow::run(&mut b, blk);
        let alloc = run(&mut b, &rpo, 1, 0);
        assert_eq!(alloc.num_locals, 1, "v1 and v2 overlap so a 1-register pool must spill one");
    }
}
