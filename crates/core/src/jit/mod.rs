//! The SH4 dynamic recompiler: frontend, optimizer, and backend.
//!
//! Pipeline order: `frontend::build_block` emits one IR block, `opt::run`
//! optimizes and allocates registers over it, then the backend lowers it to host code.

/// Typed three-address IR: values, instructions, blocks, and the per-compilation
/// arena that owns them.
pub mod ir;

/// Optimizer passes run in a fixed order over one compilation's IR.
pub mod opt;

/// Fetch/decode/translate: turns guest code into IR.
pub mod frontend;

/// Lowers optimized, allocated IR into host machine code.
pub mod backend;
