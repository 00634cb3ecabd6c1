//! The typed three-address IR.
//!
//! An intrusive arena of raw pointers (`Value`/`Instr`/`Block` linked directly to each
//! other, with back-pointers for use-lists) would need `unsafe` scattered everywhere
//! it's touched to satisfy Rust's aliasing rules, so this uses index-based arenas
//! instead: every `Value`/`Instr`/`Block` is referenced by a small `Copy` ID into a
//! `Vec` owned by the [`IRBuilder`]. Optimizer passes mutate the arena in place through
//! the builder rather than following pointers.

pub mod block;
pub mod builder;
pub mod instr;
pub mod value;

pub use block::Block;
pub use builder::IRBuilder;
pub use instr::{Instr, InstrFlags, Opcode};
pub use value::{ConstValue, ValueType};

/// Index of a [`Block`] within an [`IRBuilder`]'s arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// Index of an [`instr::Instr`] within an [`IRBuilder`]'s arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(pub u32);

/// Index of a [`value::Value`] within an [`IRBuilder`]'s arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);
