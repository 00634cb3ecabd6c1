//! SH4 interrupt controller.

pub mod controller;
pub mod sources;

pub use controller::InterruptController;
pub use sources::{IprReg, Source, SOURCES};
