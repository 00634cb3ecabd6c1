//! Ties the optimizer's output to executable host code.
//!
//! [`compile`] is the backend's only entry point: everything else in this module is
//! shared machinery the lowering pass needs (register/stack conventions, the
//! executable arena, the runtime helpers called out to for opcodes with no
//! single-instruction encoding).

pub mod abi;
pub mod code_buffer;
pub mod runtime;
pub mod x86_64;

use crate::context::Sh4Context;
use crate::jit::ir::{BlockId, IRBuilder};
use crate::jit::opt;
use crate::memory::AddressSpace;

use code_buffer::CodeBuffer;
pub use x86_64::lower::FaultSite;

/// A compiled block's entry point: takes the guest context, fastmem base, and
/// address space, returns the next guest PC. `space` is
/// unused by ordinary fastmem blocks but every block still spills it in its prolog
/// (see [`abi::SPACE_SLOT`]) so the fault handler can always find it at a fixed
/// offset regardless of which kind of block it caught mid-execution.
pub type CompiledFn = extern "C" fn(ctx: *mut Sh4Context, membase: *mut u8, space: *mut AddressSpace) -> u32;

/// Optimizes, allocates, and lowers `builder`'s block into `code`, returning the
/// compiled entry point and its fastmem fault sites (block-relative; empty when
/// `slowmem` is set). Returns `None` if `code` doesn't have room for the result,
/// leaving `code` unchanged.
pub fn compile(
    mut builder: IRBuilder,
    entry: BlockId,
    code: &mut CodeBuffer,
    slowmem: bool,
) -> Option<(CompiledFn, Vec<FaultSite>)> {
    let alloc = opt::run(&mut builder, entry, abi::NUM_GP, abi::NUM_FP);
    let (bytes, sites) = x86_64::lower::lower(&builder, entry, &alloc, slowmem);
    let at = code.write(&bytes)?;
    // SAFETY: `at` points at a just-written, properly aligned instruction stream
    // matching `CompiledFn`'s signature — every lowered block starts with the fixed
    // prolog and ends with `ret`.
    let func = unsafe { std::mem::transmute::<*const u8, CompiledFn>(at) };
    Some((func, sites))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jit::ir::{ConstValue, InstrFlags, Opcode};

    #[test]
    fn compiling_a_trivial_block_returns_a_callable_pointer_that_yields_its_target() {
        let mut builder = IRBuilder::new();
        let entry = builder.new_block();
        let target = builder.const_value(ConstValue::I32(0x8c01_0010));
        let _ = builder.push(entry, Opcode::Branch, [Some(target), None, None], None, InstrFlags::NONE);

        let mut code = CodeBuffer::new(4096);
        let (f, sites) = compile(builder, entry, &mut code, false).expect("4096 bytes is ample for one trivial block");
        assert!(sites.is_empty(), "a branch-only block touches no memory");

        let mut ctx = Sh4Context::default();
        let mut membase = [0u8; 16];
        let next_pc = f(&mut ctx, membase.as_mut_ptr(), std::ptr::null_mut());
        assert_eq!(next_pc, 0x8c01_0010);
    }
}
