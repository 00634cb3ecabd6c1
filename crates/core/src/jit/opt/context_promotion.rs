//! Load/store elimination on the guest context (context promotion).

use std::collections::{HashMap, HashSet};

use crate::jit::ir::{IRBuilder, InstrFlags, Opcode};

use super::control_flow::Rpo;

/// Runs the forward then backward sweep over every block.
pub fn run(builder: &mut IRBuilder, rpo: &Rpo) {
    forward(builder, rpo);
    backward(builder, rpo);
}

fn forward(builder: &mut IRBuilder, rpo: &Rpo) {
    for &block in &rpo.order {
        let mut available: HashMap<u32, crate::jit::ir::ValueId> = HashMap::new();
        let ids: Vec<_> = builder.live_instrs(block).collect();
        for id in ids {
            let instr = builder.instr(id).clone();
            if instr.flags.contains(InstrFlags::INVALIDATE_CONTEXT) {
                available.clear();
            }
            match instr.opcode {
                Opcode::LoadContext(offset) => {
                    let result = instr.result.expect("load_context always has a result");
                    let ty = builder.value(result).ty;
                    if let Some(&existing) = available.get(&offset) {
                        if builder.value(existing).ty == ty {
                            builder.replace_all_uses(result, existing);
                            builder.delete_instr(id);
                            continue;
                        }
                    }
                    available.insert(offset, result);
                }
                Opcode::StoreContext(offset) => {
                    let value = instr.args[0].expect("store_context always has a value operand");
                    available.insert(offset, value);
                }
                _ => {}
            }
        }
    }
}

fn backward(builder: &mut IRBuilder, rpo: &Rpo) {
    for &block in &rpo.order {
        let mut seen_store: HashSet<u32> = HashSet::new();
        let ids: Vec<_> = builder.live_instrs(block).collect();
        for id in ids.into_iter().rev() {
            match builder.instr(id).opcode {
                Opcode::StoreContext(offset) => {
                    if seen_store.contains(&offset) {
                        builder.delete_instr(id);
                    } else {
                        seen_store.insert(offset);
                    }
                }
                Opcode::LoadContext(offset) => {
                    seen_store.remove(&offset);
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::jit::ir::{ConstValue, ValueType};

    use super::*;

    #[test]
    fn redundant_load_is_replaced_with_the_prior_store() {
        let mut b = IRBuilder::new();
        let blk = b.new_block();
        let v = b.const_value(ConstValue::I32(42));
        let _ = b.push(blk, Opcode::StoreContext(16), [Some(v), None, None], None, InstrFlags::NONE);
        let loaded = b
            .push(blk, Opcode::LoadContext(16), [None, None, None], Some(ValueType::I32), InstrFlags::NONE)
            .unwrap();
        let consumer = b
            .push(blk, Opcode::Add, [Some(loaded), Some(loaded), None], Some(ValueType::I32), InstrFlags::NONE)
            .unwrap();
        let term_target = b.const_value(ConstValue::Block(blk));
        let _ = b.push(blk, Opcode::Branch, [Some(term_target), None, None], None, InstrFlags::NONE);

        let rpo = crate::jit::opt::control_flow::run(&mut b, blk);
        run(&mut b, &rpo);

        let consumer_instr = b.instr(b.value(consumer).def.unwrap()).clone();
        assert_eq!(consumer_instr.args[0], Some(v));
        assert_eq!(consumer_instr.args[1], Some(v));
    }

    #[test]
    fn dead_store_shadowed_by_a_later_store_is_removed() {
        let mut b = IRBuilder::new();
        let blk = b.new_block();
        let v1 = b.const_value(ConstValue::I32(1));
        let v2 = b.const_value(ConstValue::I32(2));
        let first_store = b
            .push(blk, Opcode::StoreContext(16), [Some(v1), None, None], None, InstrFlags::NONE)
            .is_none();
        assert!(first_store);
        let first_store_id = crate::jit::ir::InstrId(0);
        let _ = b.push(blk, Opcode::StoreContext(16), [Some(v2), None, None], None, InstrFlags::NONE);
        let term_target = b.const_value(ConstValue::Block(blk));
        let _ = b.push(blk, Opcode::Branch, [Some(term_target), None, None], None, InstrFlags::NONE);

        let rpo = crate::jit::opt::control_flow::run(&mut b, blk);
        run(&mut b, &rpo);

        assert_eq!(b.instr(first_store_id).opcode, Opcode::Nop);
    }
}
