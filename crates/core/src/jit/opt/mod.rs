//! Optimizer passes, run in a fixed order.

pub mod constant_fold;
pub mod context_promotion;
pub mod control_flow;
pub mod regalloc;
pub mod validate;

use crate::jit::ir::{BlockId, IRBuilder};

/// Runs every pass over `builder` in the fixed pipeline order: validate,
/// control-flow analysis, load/store elimination, constant folding, register
/// allocation.
///
/// # Panics
///
/// Panics if validation fails — building an IR that violates the terminator invariant
/// is a frontend bug, not a guest condition.
pub fn run(builder: &mut IRBuilder, entry: BlockId, num_gp: u8, num_fp: u8) -> regalloc::Allocation {
    validate::run(builder).expect("frontend produced an invalid IR block");
    let rpo = control_flow::run(builder, entry);
    context_promotion::run(builder, &rpo);
    constant_fold::run(builder, &rpo);
    regalloc::run(builder, &rpo, num_gp, num_fp)
}
