//! Image loading: flat binaries load verbatim at a base address; ELF images load each
//! `PT_LOAD` segment at its own address and hand back the entry point.

use object::{Object, ObjectSegment};
use sh4_core::memory::AddressSpace;
use sh4_core::common::GuestAddr;
use std::fs;
use std::process;

/// Reads `path` from disk, exiting the process with a message on failure (there is no
/// guest-visible way to recover from a missing input file).
pub fn read_file(path: &str) -> Vec<u8> {
    fs::read(path).unwrap_or_else(|e| {
        eprintln!("error: could not read '{path}': {e}");
        process::exit(1);
    })
}

/// Loads `data` into `space`, returning the guest PC execution should start at.
///
/// ELF images (`\x7fELF` magic) load each loadable segment at its own address and use
/// the file's entry point. Anything else is treated as a flat binary and loaded
/// verbatim at `base`.
pub fn load_image(space: &mut AddressSpace, data: &[u8], base: u32) -> u32 {
    if data.starts_with(&[0x7f, b'E', b'L', b'F']) {
        load_elf(space, data)
    } else {
        space.memcpy_to_guest(GuestAddr::new(base), data);
        base
    }
}

fn load_elf(space: &mut AddressSpace, data: &[u8]) -> u32 {
    let file = object::File::parse(data).unwrap_or_else(|e| {
        eprintln!("error: malformed ELF image: {e}");
        process::exit(1);
    });

    for segment in file.segments() {
        let addr = segment.address();
        let bytes = segment.data().unwrap_or_else(|e| {
            eprintln!("error: could not read ELF segment data: {e}");
            process::exit(1);
        });
        if bytes.is_empty() {
            continue;
        }
        space.memcpy_to_guest(GuestAddr::new(addr as u32), bytes);
    }

    file.entry() as u32
}
