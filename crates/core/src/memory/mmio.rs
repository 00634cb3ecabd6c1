//! The MMIO handler contract: every peripheral device model the core treats
//! as an external collaborator (GPU tile accelerator, AICA, GD-ROM, maple, BIOS/flash,
//! holly) implements this trait and is registered against a guest range.
//!
//! A C implementation would use a `{ read(addr, mask) -> u32, write(addr, data, mask)
//! }` function-pointer pair plus a userdata handle. A trait object is the direct,
//! safe translation: the "userdata handle" is simply `self`.

/// A memory-mapped I/O handler for one guest region.
///
/// `mask` is `(1 << (8 * size_in_bytes)) - 1` for the access width being performed;
/// handlers that only care about 32-bit register windows can ignore it.
pub trait MmioHandler: Send {
    /// Reads up to 32 bits of guest-visible register state at `addr`.
    fn read(&mut self, addr: u32, mask: u32) -> u32;

    /// Writes up to 32 bits of guest-visible register state at `addr`.
    fn write(&mut self, addr: u32, data: u32, mask: u32);
}

/// Fallback handler for guest ranges declared MMIO but not claimed by any registered
/// peripheral: logs and returns 0 on read, silently drops writes. Neither case is
/// fatal to the guest.
#[derive(Debug, Default)]
pub struct UnhandledMmio;

impl MmioHandler for UnhandledMmio {
    fn read(&mut self, addr: u32, _mask: u32) -> u32 {
        tracing::debug!(addr = format_args!("{addr:#010x}"), "unhandled MMIO read");
        0
    }

    fn write(&mut self, addr: u32, data: u32, _mask: u32) {
        tracing::debug!(
            addr = format_args!("{addr:#010x}"),
            data = format_args!("{data:#010x}"),
            "unhandled MMIO write"
        );
    }
}
