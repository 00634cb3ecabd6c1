//! Configuration for the SH4 recompiler core.
//!
//! This module defines the single [`Config`] structure used to parameterize a
//! simulator instance: guest memory sizes, the JIT code buffer, and block
//! compilation limits. It provides:
//! 1. **Defaults:** baseline Dreamcast hardware constants (RAM/VRAM/ARAM sizes, boot PC).
//! 2. **Structure:** a flat, `Default`-backed config struct, built directly by the CLI
//!    from `clap` flags rather than parsed from a config file.

/// Default configuration constants for the simulator.
mod defaults {
    /// Main system RAM size (16 MiB), matching the Dreamcast's SH4-side RAM.
    pub const RAM_SIZE: usize = 16 * 1024 * 1024;

    /// PowerVR2 video RAM size (8 MiB).
    pub const VRAM_SIZE: usize = 8 * 1024 * 1024;

    /// AICA sound RAM size (2 MiB).
    pub const ARAM_SIZE: usize = 2 * 1024 * 1024;

    /// JIT code buffer size (16 MiB), shared by every compiled block.
    pub const CODE_BUFFER_SIZE: usize = 16 * 1024 * 1024;

    /// Direct-mapped block cache dispatch table entry count.
    pub const DISPATCH_ENTRIES: usize = 1 << 16;

    /// Maximum guest instructions compiled into a single block before the
    /// frontend stops early.
    pub const MAX_BLOCK_INSTRS: u32 = 64;

    /// Default guest start PC: where a flat binary is loaded and boot begins.
    pub const START_PC: u32 = 0x8c01_0000;
}

/// Root configuration structure for a simulator instance.
///
/// Built directly by the CLI from `clap` flags, or via `Config::default()`
/// for tests and embedders that don't need to override anything.
///
/// # Examples
///
/// ```
/// use sh4_core::config::Config;
///
/// let config = Config::default();
/// assert_eq!(config.start_pc, 0x8c01_0000);
/// assert_eq!(config.max_block_instrs, 64);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Main system RAM size in bytes.
    pub ram_size: usize,
    /// PowerVR2 video RAM size in bytes.
    pub vram_size: usize,
    /// AICA sound RAM size in bytes.
    pub aram_size: usize,
    /// JIT code buffer size in bytes.
    pub code_buffer_size: usize,
    /// Direct-mapped block cache dispatch table entry count.
    pub dispatch_entries: usize,
    /// Maximum guest instructions per compiled block.
    pub max_block_instrs: u32,
    /// Initial guest PC.
    pub start_pc: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ram_size: defaults::RAM_SIZE,
            vram_size: defaults::VRAM_SIZE,
            aram_size: defaults::ARAM_SIZE,
            code_buffer_size: defaults::CODE_BUFFER_SIZE,
            dispatch_entries: defaults::DISPATCH_ENTRIES,
            max_block_instrs: defaults::MAX_BLOCK_INSTRS,
            start_pc: defaults::START_PC,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sizes_match_dreamcast_hardware() {
        let config = Config::default();
        assert_eq!(config.ram_size, 16 * 1024 * 1024);
        assert_eq!(config.vram_size, 8 * 1024 * 1024);
        assert_eq!(config.aram_size, 2 * 1024 * 1024);
    }

    #[test]
    fn default_start_pc_matches_flat_binary_load_base() {
        assert_eq!(Config::default().start_pc, 0x8c01_0000);
    }
}
