//! The per-compilation IR arena.
//!
//! Owns every [`Block`], [`Instr`], and [`Value`] created while translating one guest
//! block. Dropped wholesale once the backend has emitted host code for it.

use std::collections::HashMap;

use super::instr::{Instr, InstrFlags, Opcode};
use super::value::{ConstValue, Value, ValueType};
use super::{Block, BlockId, InstrId, ValueId};

/// Arena owning all IR objects for one compilation.
#[derive(Default)]
pub struct IRBuilder {
    blocks: Vec<Block>,
    instrs: Vec<Instr>,
    values: Vec<Value>,
    /// Caches constants by their bit-exact hash key so equal constants share a
    /// [`Value`].
    const_cache: HashMap<(u8, u64), ValueId>,
    /// Approximate guest cycle count for the block, set by the frontend as it
    /// translates.
    pub guest_cycles: u32,
}

impl IRBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(u32::try_from(self.blocks.len()).expect("block arena overflow"));
        self.blocks.push(Block::new());
        id
    }

    #[must_use]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.0 as usize]
    }

    #[must_use]
    pub fn blocks_len(&self) -> u32 {
        u32::try_from(self.blocks.len()).expect("block arena overflow")
    }

    #[must_use]
    pub fn instr(&self, id: InstrId) -> &Instr {
        &self.instrs[id.0 as usize]
    }

    pub fn instr_mut(&mut self, id: InstrId) -> &mut Instr {
        &mut self.instrs[id.0 as usize]
    }

    #[must_use]
    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id.0 as usize]
    }

    pub fn value_mut(&mut self, id: ValueId) -> &mut Value {
        &mut self.values[id.0 as usize]
    }

    #[must_use]
    pub fn values_len(&self) -> u32 {
        u32::try_from(self.values.len()).expect("value arena overflow")
    }

    /// Returns (creating if needed) the [`Value`] for a constant.
    pub fn const_value(&mut self, c: ConstValue) -> ValueId {
        let key = c.hash_key();
        if let Some(&id) = self.const_cache.get(&key) {
            return id;
        }
        let id = ValueId(u32::try_from(self.values.len()).expect("value arena overflow"));
        self.values.push(Value::new_const(c));
        self.const_cache.insert(key, id);
        id
    }

    /// Appends an instruction to `block`. If `result_ty` is `Some`, allocates a fresh
    /// result [`Value`] and returns its id.
    pub fn push(
        &mut self,
        block: BlockId,
        opcode: Opcode,
        args: [Option<ValueId>; 3],
        result_ty: Option<ValueType>,
        flags: InstrFlags,
    ) -> Option<ValueId> {
        let instr_id = InstrId(u32::try_from(self.instrs.len()).expect("instr arena overflow"));
        let result = result_ty.map(|ty| {
            let vid = ValueId(u32::try_from(self.values.len()).expect("value arena overflow"));
            self.values.push(Value::new_def(ty, instr_id));
            vid
        });
        self.instrs.push(Instr::new(opcode, args, result, flags));
        for (i, arg) in args.iter().enumerate() {
            if let Some(v) = arg {
                self.values[v.0 as usize].uses.push((instr_id, i as u8));
            }
        }
        self.blocks[block.0 as usize].instrs.push(instr_id);
        result
    }

    /// Like [`Self::push`], but for the common case of an instruction that always
    /// produces a result: takes `ty` directly instead of `Option<ValueType>`, so
    /// callers never need to unwrap a `None` that [`Self::push`] can't actually
    /// return for a `Some` result type.
    pub fn push_result(&mut self, block: BlockId, opcode: Opcode, args: [Option<ValueId>; 3], ty: ValueType, flags: InstrFlags) -> ValueId {
        let instr_id = InstrId(u32::try_from(self.instrs.len()).expect("instr arena overflow"));
        let vid = ValueId(u32::try_from(self.values.len()).expect("value arena overflow"));
        self.values.push(Value::new_def(ty, instr_id));
        self.instrs.push(Instr::new(opcode, args, Some(vid), flags));
        for (i, arg) in args.iter().enumerate() {
            if let Some(v) = arg {
                self.values[v.0 as usize].uses.push((instr_id, i as u8));
            }
        }
        self.blocks[block.0 as usize].instrs.push(instr_id);
        vid
    }

    /// Rewrites every recorded use of `old` to instead reference `new`, then clears
    /// `old`'s use-list.
    pub fn replace_all_uses(&mut self, old: ValueId, new: ValueId) {
        if old == new {
            return;
        }
        let uses = std::mem::take(&mut self.values[old.0 as usize].uses);
        for (instr_id, slot) in &uses {
            self.instrs[instr_id.0 as usize].args[*slot as usize] = Some(new);
        }
        self.values[new.0 as usize].uses.extend(uses);
    }

    /// Turns an instruction into a [`Opcode::Nop`], unlinking it from every operand's
    /// use-list. The instruction stays in its block's list as a placeholder so
    /// ordinal/iteration code never needs to splice a linked list.
    pub fn delete_instr(&mut self, id: InstrId) {
        let args = self.instrs[id.0 as usize].args;
        for arg in args.into_iter().flatten() {
            self.values[arg.0 as usize].uses.retain(|&(i, _)| i != id);
        }
        let instr = &mut self.instrs[id.0 as usize];
        instr.opcode = Opcode::Nop;
        instr.args = [None, None, None];
        instr.result = None;
    }

    /// Iterates live (non-`Nop`) instruction ids of `block` in program order.
    pub fn live_instrs(&self, block: BlockId) -> impl Iterator<Item = InstrId> + '_ {
        self.blocks[block.0 as usize]
            .instrs
            .iter()
            .copied()
            .filter(|&id| !matches!(self.instrs[id.0 as usize].opcode, Opcode::Nop))
    }

    /// All block ids in arena order (construction order, not RPO).
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len()).map(|i| BlockId(u32::try_from(i).expect("block arena overflow")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_constants_share_a_value() {
        let mut b = IRBuilder::new();
        let a = b.const_value(ConstValue::I32(7));
        let c = b.const_value(ConstValue::I32(7));
        assert_eq!(a, c);
        let d = b.const_value(ConstValue::I32(8));
        assert_ne!(a, d);
    }

    #[test]
    fn replace_all_uses_rewrites_every_operand() {
        let mut b = IRBuilder::new();
        let blk = b.new_block();
        let c1 = b.const_value(ConstValue::I32(1));
        let r1 = b
            .push(blk, Opcode::Add, [Some(c1), Some(c1), None], Some(ValueType::I32), InstrFlags::NONE)
            .unwrap();
        let r2 = b
            .push(blk, Opcode::Add, [Some(r1), Some(r1), None], Some(ValueType::I32), InstrFlags::NONE)
            .unwrap();
        let folded = b.const_value(ConstValue::I32(2));
        b.replace_all_uses(r1, folded);
        let uses_instr = b.instr(InstrId(1));
        assert_eq!(uses_instr.args[0], Some(folded));
        assert_eq!(uses_instr.args[1], Some(folded));
        let _ = r2;
    }

    #[test]
    fn delete_instr_clears_operand_use_lists() {
        let mut b = IRBuilder::new();
        let blk = b.new_block();
        let c1 = b.const_value(ConstValue::I32(1));
        let add = b
            .push(blk, Opcode::Add, [Some(c1), Some(c1), None], Some(ValueType::I32), InstrFlags::NONE)
            .unwrap();
        let def_instr = b.value(add).def.unwrap();
        b.delete_instr(def_instr);
        assert!(b.value(c1).uses.is_empty());
        assert_eq!(b.instr(def_instr).opcode, Opcode::Nop);
    }
}
