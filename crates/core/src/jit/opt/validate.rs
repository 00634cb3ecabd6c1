//! Validation pass.

use thiserror::Error;

use crate::jit::ir::{IRBuilder, Opcode};

/// An IR invariant the frontend failed to uphold.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("block {0} does not end in a terminator")]
    MissingTerminator(u32),
    #[error("block {0} is empty")]
    EmptyBlock(u32),
}

/// Checks that every block ends in a terminator.
///
/// # Errors
///
/// Returns the first violated invariant found, in arena block order.
pub fn run(builder: &IRBuilder) -> Result<(), ValidationError> {
    for block in builder.block_ids() {
        let last_live = builder.live_instrs(block).last();
        match last_live {
            None => return Err(ValidationError::EmptyBlock(block.0)),
            Some(id) => {
                let opcode = builder.instr(id).opcode;
                if !opcode.is_terminator() && !matches!(opcode, Opcode::CallExternal) {
                    return Err(ValidationError::MissingTerminator(block.0));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::jit::ir::{InstrFlags, Opcode, ValueType};

    use super::*;

    #[test]
    fn block_ending_in_branch_is_valid() {
        let mut b = IRBuilder::new();
        let blk = b.new_block();
        let target = b.const_value(crate::jit::ir::ConstValue::Block(blk));
        let _ = b.push(blk, Opcode::Branch, [Some(target), None, None], None, InstrFlags::NONE);
        assert!(run(&b).is_ok());
    }

    #[test]
    fn empty_block_is_rejected() {
        let mut b = IRBuilder::new();
        b.new_block();
        assert_eq!(run(&b), Err(ValidationError::EmptyBlock(0)));
    }

    #[test]
    fn block_without_terminator_is_rejected() {
        let mut b = IRBuilder::new();
        let blk = b.new_block();
        let c = b.const_value(crate::jit::ir::ConstValue::I32(1));
        let _ = b.push(blk, Opcode::Add, [Some(c), Some(c), None], Some(ValueType::I32), InstrFlags::NONE);
        assert_eq!(run(&b), Err(ValidationError::MissingTerminator(0)));
    }
}
