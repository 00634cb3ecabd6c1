//! Fastmem fault recovery: turns a host SIGSEGV from a missing guest page into a
//! single emulated access plus a block recompile, instead of crashing the process.

pub mod handler;
mod platform;

pub use handler::{install, on_fault, FaultAction, FaultRegs, Guard};
