//! SH4 frontend: fetch, decode, translate.
//!
//! One call to [`build_block`] always produces exactly one IR [`Block`](crate::jit::ir::Block):
//! straight-line guest code compiles to straight-line IR terminated by a single
//! `Branch`/`BranchCond` whose targets are computed addresses, not local block
//! references. Real guest control flow (loops, `if`/`else`) is expressed as distinct
//! compiled units stitched together by the block cache's dispatch trampoline, not as
//! multi-block IR — so control-flow analysis sees a single-node graph for every block
//! this frontend emits (its multi-block handling is still exercised by the optimizer
//! passes' own synthetic unit tests).

pub mod decode;
pub mod translate;

use crate::common::addr::GuestAddr;
use crate::memory::AddressSpace;

use decode::DecodeFlags;
use translate::Translator;

pub use crate::jit::ir::IRBuilder;

/// Translates guest code starting at `start_pc` into a single IR block: fetch via the
/// address space's fast-read path, decode via the table, emit IR, stop at a
/// terminator or `max_instrs`. Returns the populated [`IRBuilder`]; `guest_cycles` on
/// it holds the translated instruction count.
pub fn build_block(mem: &mut AddressSpace, start_pc: u32, max_instrs: u32) -> IRBuilder {
    let mut translator = {
        let mut builder = IRBuilder::new();
        let entry = builder.new_block();
        Translator::new(builder, entry, start_pc)
    };

    let mut pc = start_pc;
    let mut translated = 0u32;
    loop {
        let word = mem.read16(GuestAddr::new(pc));
        let entry = decode::decode(word);
        set_pc(&mut translator, pc);
        (entry.translate)(&mut translator, word);
        translated += 1;

        if entry.flags.contains(DecodeFlags::HAS_DELAY_SLOT) {
            let slot_pc = pc.wrapping_add(2);
            let slot_word = mem.read16(GuestAddr::new(slot_pc));
            let slot_entry = decode::decode(slot_word);
            set_pc(&mut translator, slot_pc);
            (slot_entry.translate)(&mut translator, slot_word);
            translated += 1;
            finish_pending(&mut translator);
            break;
        }

        if entry.flags.contains(DecodeFlags::CHANGES_PC) {
            break;
        }

        pc = pc.wrapping_add(2);
        if translated >= max_instrs {
            terminate_at(&mut translator, pc);
            break;
        }
    }

    let mut builder = translator.into_builder();
    builder.guest_cycles = translated;
    builder
}

fn set_pc(translator: &mut Translator, pc: u32) {
    translator.pc = pc;
}

fn finish_pending(translator: &mut Translator) {
    translator.finish_pending_branch();
}

fn terminate_at(translator: &mut Translator, pc: u32) {
    translator.terminate_at(pc);
}

#[cfg(test)]
mod tests {
    use crate::memory::region::RegionKind;

    use super::*;

    fn mem_with(words: &[u16]) -> AddressSpace {
        let mut space = AddressSpace::new(0x10_0000, 0x1000, 0x1000);
        space.map_direct(GuestAddr::new(0x8c01_0000), 0x10_0000, RegionKind::Ram, 0).unwrap();
        for (i, w) in words.iter().enumerate() {
            space.write16(GuestAddr::new(0x8c01_0000 + (i as u32) * 2), *w);
        }
        space
    }

    #[test]
    fn straight_line_code_stops_at_max_instrs_with_a_synthetic_terminator() {
        let mut mem = mem_with(&[0x0009, 0x0009, 0x0009]); // nop, nop, nop
        let builder = build_block(&mut mem, 0x8c01_0000, 2);
        assert_eq!(builder.guest_cycles, 2);
        let last = builder.live_instrs(crate::jit::ir::BlockId(0)).last().unwrap();
        assert!(matches!(builder.instr(last).opcode, crate::jit::ir::Opcode::Branch));
    }

    #[test]
    fn rts_with_delay_slot_translates_two_instructions_into_one_block() {
        let mut mem = mem_with(&[0x000b, 0x0009]); // rts, delay-slot nop
        let builder = build_block(&mut mem, 0x8c01_0000, 128);
        assert_eq!(builder.guest_cycles, 2);
        let last = builder.live_instrs(crate::jit::ir::BlockId(0)).last().unwrap();
        assert!(matches!(builder.instr(last).opcode, crate::jit::ir::Opcode::Branch));
    }

    #[test]
    fn bt_without_a_delay_slot_stops_the_block_immediately() {
        let mut mem = mem_with(&[0x8900]); // bt with displacement 0
        let builder = build_block(&mut mem, 0x8c01_0000, 128);
        assert_eq!(builder.guest_cycles, 1);
    }
}
