//! Control-flow analysis.
//!
//! Walks every block's terminator to add directed edges, then performs a postorder
//! DFS from the entry block and threads the reverse-postorder order into `rpo_next`,
//! assigning every live instruction a monotonically increasing ordinal consumed by
//! register allocation.

use crate::jit::ir::{BlockId, ConstValue, IRBuilder, Opcode};

/// The reverse-postorder block sequence computed for one compilation.
#[derive(Debug, Clone)]
pub struct Rpo {
    pub order: Vec<BlockId>,
}

fn terminator_targets(builder: &IRBuilder, block: BlockId) -> Vec<BlockId> {
    let Some(term) = builder.live_instrs(block).last() else {
        return Vec::new();
    };
    let instr = builder.instr(term);
    let mut targets = Vec::new();
    if matches!(instr.opcode, Opcode::Branch | Opcode::BranchCond) {
        for arg in instr.args.iter().flatten() {
            let value = builder.value(*arg);
            if let Some(ConstValue::Block(target)) = value.constant {
                targets.push(target);
            }
        }
    }
    targets
}

/// Runs control-flow analysis, returning the reverse-postorder block sequence.
pub fn run(builder: &mut IRBuilder, entry: BlockId) -> Rpo {
    let edges: Vec<(BlockId, Vec<BlockId>)> = builder
        .block_ids()
        .map(|id| (id, terminator_targets(builder, id)))
        .collect();

    for id in builder.block_ids() {
        builder.block_mut(id).preds.clear();
        builder.block_mut(id).succs.clear();
        builder.block_mut(id).rpo_next = None;
    }
    for (from, targets) in &edges {
        for &to in targets {
            builder.block_mut(*from).succs.push(to);
            builder.block_mut(to).preds.push(*from);
        }
    }

    let mut visited = vec![false; builder.blocks_len() as usize];
    let mut postorder = Vec::new();
    let mut stack: Vec<(BlockId, usize)> = vec![(entry, 0)];
    visited[entry.0 as usize] = true;
    while let Some((node, next_child)) = stack.pop() {
        let succs = builder.block(node).succs.clone();
        if next_child < succs.len() {
            stack.push((node, next_child + 1));
            let child = succs[next_child];
            if !visited[child.0 as usize] {
                visited[child.0 as usize] = true;
                stack.push((child, 0));
            }
        } else {
            postorder.push(node);
        }
    }

    let order: Vec<BlockId> = postorder.into_iter().rev().collect();
    for w in order.windows(2) {
        builder.block_mut(w[0]).rpo_next = Some(w[1]);
    }

    let mut ordinal = 0u32;
    for &block in &order {
        let ids: Vec<_> = builder.live_instrs(block).collect();
        for id in ids {
            builder.instr_mut(id).ordinal = Some(ordinal);
            ordinal += 1;
        }
    }

    Rpo { order }
}

#[cfg(test)]
mod tests {
    use crate::jit::ir::{InstrFlags, ValueType};

    use super::*;

    #[test]
    fn diamond_produces_a_valid_reverse_postorder() {
        let mut b = IRBuilder::new();
        let entry = b.new_block();
        let left = b.new_block();
        let right = b.new_block();
        let join = b.new_block();

        let cond = b.const_value(ConstValue::I32(1));
        let left_v = b.const_value(ConstValue::Block(left));
        let right_v = b.const_value(ConstValue::Block(right));
        let _ = b.push(entry, Opcode::BranchCond, [Some(cond), Some(left_v), Some(right_v)], None, InstrFlags::NONE);

        let join_v = b.const_value(ConstValue::Block(join));
        let _ = b.push(left, Opcode::Branch, [Some(join_v), None, None], None, InstrFlags::NONE);
        let _ = b.push(right, Opcode::Branch, [Some(join_v), None, None], None, InstrFlags::NONE);

        let pc = b.const_value(ConstValue::I32(0));
        let _ = b.push(join, Opcode::Branch, [Some(pc), None, None], None, InstrFlags::NONE);

        let rpo = run(&mut b, entry);
        assert_eq!(rpo.order[0], entry);
        assert_eq!(*rpo.order.last().unwrap(), join);
        assert!(rpo.order.len() == 4);

        let a = b.const_value(ConstValue::I32(9));
        let add = b
            .push(entry, Opcode::Add, [Some(a), Some(a), None], Some(ValueType::I32), InstrFlags::NONE)
            .unwrap();
        let _ = add;
    }
}
