//! x86-64 System V register conventions shared by the emitter and the allocator.
//!
//! Every compiled block has the C signature `extern "C" fn(ctx: *mut Sh4Context,
//! membase: *mut u8, space: *mut AddressSpace) -> u32`, returning the next guest PC.
//! `space` is pinned alongside `ctx`/`membase`: blocks compiled `BF_SLOWMEM` call back
//! into [`crate::memory::AddressSpace`]'s ordinary read/write methods for every guest
//! access rather than touching `membase` directly, and the fault handler reads it
//! straight out of [`SPACE_SLOT`] to drive the same accessors when recovering a
//! fastmem fault (see `fault::handler`). All three arrive in `rdi`/`rsi`/`rdx` and are
//! immediately spilled to fixed stack slots in the prolog, freeing every
//! general-purpose encoding index for the allocator.

/// General-purpose register pool available to [`crate::jit::opt::regalloc`], in
/// allocator-index order. All five are callee-saved, so the prolog/epilog push/pop
/// sequence is the only place that needs to know about them.
pub const GP_REGS: [u8; 5] = [RBX, R12, R13, R14, R15];

/// Floating-point register pool, in allocator-index order. `xmm0-xmm5` are
/// caller-saved and used as call-argument/scratch registers instead.
pub const FP_REGS: [u8; 6] = [6, 7, 8, 9, 10, 11];

pub const NUM_GP: u8 = GP_REGS.len() as u8;
pub const NUM_FP: u8 = FP_REGS.len() as u8;

// Raw x86-64 register encodings (`Reg.W:Reg` nibble, i.e. `0-15`).
pub const RAX: u8 = 0;
pub const RCX: u8 = 1;
pub const RDX: u8 = 2;
pub const RBX: u8 = 3;
pub const RSP: u8 = 4;
pub const RBP: u8 = 5;
pub const RSI: u8 = 6;
pub const RDI: u8 = 7;
pub const R8: u8 = 8;
pub const R9: u8 = 9;
pub const R10: u8 = 10;
pub const R11: u8 = 11;
pub const R12: u8 = 12;
pub const R13: u8 = 13;
pub const R14: u8 = 14;
pub const R15: u8 = 15;

/// `xmm0`/`xmm1`, the lowering pass's float scratch registers — distinct from
/// [`FP_REGS`], which starts at `xmm6`.
pub const XMM0: u8 = 0;
pub const XMM1: u8 = 1;

/// `GP_REGS` entries the prolog saves to [`GP_SAVE_SLOTS`] and the epilog restores.
/// `rbp` itself is handled by a plain `push`/`pop` pair, not a named slot, since it
/// also serves as this frame's frame pointer.
pub const CALLEE_SAVED: [u8; 5] = GP_REGS;

/// Byte offset from `rbp` of the guest context pointer's stack slot.
pub const CTX_SLOT: i32 = -8;
/// Byte offset from `rbp` of the fastmem base pointer's stack slot.
pub const MEMBASE_SLOT: i32 = -16;
/// Byte offset from `rbp` of the `*mut AddressSpace` slot, spilled from `rdx` in
/// every block's prolog regardless of whether that block ends up needing it.
pub const SPACE_SLOT: i32 = -24;

/// Six consecutive qword slots the emitter spills [`FP_REGS`] into before any `call`
/// (`CallExternal`, `FSin`/`FCos`, the `MacL`/`Div1`/`Div0s` runtime helpers),
/// reloading them afterward. System V has no callee-saved XMM registers, so the FP
/// pool would otherwise be clobbered across a call the allocator doesn't know about.
pub const FP_SAVE_SLOTS: [i32; 6] = [-32, -40, -48, -56, -64, -72];

/// Five consecutive qword slots [`GP_REGS`] are saved to in the prolog via plain
/// `mov`, not `push` — keeping every offset in this module `rbp`-relative and fixed
/// regardless of which registers a given block's allocation actually touches.
pub const GP_SAVE_SLOTS: [i32; 5] = [-80, -88, -96, -104, -112];

/// Bytes of fixed `rbp`-relative frame below `rbp` before any spill/local slot.
/// Local slot `i` (spills, then [`super::x86_64::lower::EXTRA_LOCAL_SLOTS`]) sits at
/// `LOCALS_BASE - 8 * i`.
pub const LOCALS_BASE: i32 = -120;
