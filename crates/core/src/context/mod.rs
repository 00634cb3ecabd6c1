//! Guest CPU context (`Sh4Context`).
//!
//! The context is the one struct shared, unsynchronized, between compiled code, the
//! fault handler, and on-chip register MMIO handlers — all of which run on the single
//! execution thread. Compiled code accesses fields by the numeric offsets
//! published in `offsets`; nothing here may change a field's position without also
//! invalidating every already-compiled block (the block cache has no notion of
//! "context layout version", so in practice this layout is fixed at first compile).

/// `SR` status register bitfield view.
pub mod sr;

/// `FPSCR` floating-point status/control register bitfield view.
pub mod fpscr;

mod sh4context;

pub use sh4context::{offsets, Sh4Context};
pub use fpscr::FpscrReg;
pub use sr::SrStatus;
