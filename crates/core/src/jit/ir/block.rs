//! IR basic blocks.

use super::{BlockId, InstrId};

/// An ordered sequence of instructions plus the edges control-flow analysis derives
/// from its terminator.
#[derive(Debug, Clone, Default)]
pub struct Block {
    /// Instructions in program order; always ends in a terminator once `build_block`
    /// completes.
    pub instrs: Vec<InstrId>,
    pub preds: Vec<BlockId>,
    pub succs: Vec<BlockId>,
    /// Reverse-postorder successor link, populated by control-flow analysis.
    /// `None` until CFA runs or for unreachable blocks.
    pub rpo_next: Option<BlockId>,
    /// Backend-assigned label, set during code emission.
    pub label: Option<u32>,
}

impl Block {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
