//! x86-64 machine-code emission: a hand-rolled encoder plus the opcode lowering pass
//! built on top of it.

pub mod asm;
pub mod lower;
