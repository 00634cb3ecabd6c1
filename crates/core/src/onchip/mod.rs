//! SH4 on-chip peripherals: the area-7 register window, the P4 store queue, the
//! timer unit, and the interrupt controller's shared priority state.

pub mod regs;
pub mod store_queue;
pub mod tmu;

pub use regs::OnchipRegs;
pub use store_queue::{Qacr, StoreQueue};
pub use tmu::Tmu;
