//! The SH4 16-bit opcode decode table.
//!
//! Built once, lazily, indexed by the full 16-bit instruction word. Each entry
//! carries the instruction's static properties plus a translator function pointer that
//! appends IR for one occurrence of that opcode.

use std::sync::OnceLock;

use super::translate::{self, Translator};

/// Per-opcode static flags: delayed-branch, changes-PC, reads/writes FPU bank,
/// invalidates context.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecodeFlags(u8);

impl DecodeFlags {
    pub const NONE: Self = Self(0);
    /// This opcode ends the block.
    pub const CHANGES_PC: Self = Self(1 << 0);
    /// This opcode's successor instruction is a delay slot executed before the branch
    /// takes effect.
    pub const HAS_DELAY_SLOT: Self = Self(1 << 1);
    /// Reads `fr`/`xf` under `FPSCR.SZ`/`FPSCR.PR`.
    pub const READS_FPU_BANK: Self = Self(1 << 2);
    pub const WRITES_FPU_BANK: Self = Self(1 << 3);
    /// Lowers to a `call_external` that the optimizer must not reorder context loads
    /// across (`LDC`/`STC` that touch `SR` or `FPSCR`).
    pub const INVALIDATES_CONTEXT: Self = Self(1 << 4);

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for DecodeFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One decode-table entry.
#[derive(Clone, Copy)]
pub struct DecodeEntry {
    pub mnemonic: &'static str,
    pub flags: DecodeFlags,
    /// Appends this instruction's IR to the translator's current block. Receives the
    /// full instruction word so the translator can extract `nnnn`/`mmmm`/immediate
    /// fields itself (field layout differs per opcode family).
    pub translate: fn(&mut Translator, u16),
}

const UNKNOWN: DecodeEntry = DecodeEntry {
    mnemonic: "unknown",
    flags: DecodeFlags::CHANGES_PC,
    translate: translate::invalid_instruction,
};

/// Classifies one 16-bit instruction word. This is the function the lazily-built table
/// calls once per index at startup; opcode families are matched by masking the
/// relevant nibbles, in the conventional SH4 disassembly order (control, then
/// ALU/logic, then data transfer, then FPU).
fn classify(word: u16) -> DecodeEntry {
    macro_rules! entry {
        ($mnemonic:expr, $flags:expr, $translate:path) => {
            DecodeEntry { mnemonic: $mnemonic, flags: $flags, translate: $translate }
        };
    }

    match word {
        0x0009 => entry!("nop", DecodeFlags::NONE, translate::nop),
        0x000B => entry!("rts", DecodeFlags::CHANGES_PC | DecodeFlags::HAS_DELAY_SLOT, translate::rts),
        0x0019 => entry!("div0u", DecodeFlags::NONE, translate::div0u),
        0x0048 => entry!("clrt", DecodeFlags::NONE, translate::clrt),
        0x0018 => entry!("sett", DecodeFlags::NONE, translate::sett),
        _ => {}
    }

    if word & 0xF0FF == 0x0029 {
        return entry!("movt_rn", DecodeFlags::NONE, translate::movt_rn);
    }

    if word & 0xF00F == 0x300C {
        return entry!("add_rm_rn", DecodeFlags::NONE, translate::add_rm_rn);
    }
    if word & 0xF000 == 0x7000 {
        return entry!("add_imm_rn", DecodeFlags::NONE, translate::add_imm_rn);
    }
    if word & 0xF00F == 0x3008 {
        return entry!("sub_rm_rn", DecodeFlags::NONE, translate::sub_rm_rn);
    }
    if word & 0xF00F == 0x2009 {
        return entry!("and_rm_rn", DecodeFlags::NONE, translate::and_rm_rn);
    }
    if word & 0xF00F == 0x200B {
        return entry!("or_rm_rn", DecodeFlags::NONE, translate::or_rm_rn);
    }
    if word & 0xF00F == 0x200A {
        return entry!("xor_rm_rn", DecodeFlags::NONE, translate::xor_rm_rn);
    }
    if word & 0xF00F == 0x6007 {
        return entry!("not_rm_rn", DecodeFlags::NONE, translate::not_rm_rn);
    }
    if word & 0xF00F == 0x600B {
        return entry!("neg_rm_rn", DecodeFlags::NONE, translate::neg_rm_rn);
    }
    if word & 0xF000 == 0xE000 {
        return entry!("mov_imm_rn", DecodeFlags::NONE, translate::mov_imm_rn);
    }
    if word & 0xF00F == 0x6003 {
        return entry!("mov_rm_rn", DecodeFlags::NONE, translate::mov_rm_rn);
    }
    if word & 0xF00F == 0x2002 {
        return entry!("mov_l_store", DecodeFlags::NONE, translate::mov_l_store);
    }
    if word & 0xF00F == 0x6002 {
        return entry!("mov_l_load", DecodeFlags::NONE, translate::mov_l_load);
    }
    if word & 0xF00F == 0x3000 {
        return entry!("cmp_eq_rm_rn", DecodeFlags::NONE, translate::cmp_eq_rm_rn);
    }
    if word & 0xFF00 == 0x8800 {
        return entry!("cmp_eq_imm_r0", DecodeFlags::NONE, translate::cmp_eq_imm_r0);
    }
    if word & 0xF00F == 0x3003 {
        return entry!("cmp_ge_rm_rn", DecodeFlags::NONE, translate::cmp_ge_rm_rn);
    }
    if word & 0xF00F == 0x3007 {
        return entry!("cmp_gt_rm_rn", DecodeFlags::NONE, translate::cmp_gt_rm_rn);
    }
    if word & 0xF00F == 0x3002 {
        return entry!("cmp_hs_rm_rn", DecodeFlags::NONE, translate::cmp_hs_rm_rn);
    }
    if word & 0xF00F == 0x3006 {
        return entry!("cmp_hi_rm_rn", DecodeFlags::NONE, translate::cmp_hi_rm_rn);
    }
    if word & 0xF0FF == 0x4015 {
        return entry!("cmp_pl_rn", DecodeFlags::NONE, translate::cmp_pl_rn);
    }
    if word & 0xF0FF == 0x4011 {
        return entry!("cmp_pz_rn", DecodeFlags::NONE, translate::cmp_pz_rn);
    }
    if word & 0xF00F == 0x4004 {
        return entry!("rotl_rn", DecodeFlags::NONE, translate::rotl_rn);
    }
    if word & 0xF0FF == 0x4000 {
        return entry!("shll_rn", DecodeFlags::NONE, translate::shll_rn);
    }
    if word & 0xF0FF == 0x4001 {
        return entry!("shlr_rn", DecodeFlags::NONE, translate::shlr_rn);
    }
    if word & 0xF000 == 0xA000 {
        return entry!("bra", DecodeFlags::CHANGES_PC | DecodeFlags::HAS_DELAY_SLOT, translate::bra);
    }
    if word & 0xF000 == 0xB000 {
        return entry!("bsr", DecodeFlags::CHANGES_PC | DecodeFlags::HAS_DELAY_SLOT, translate::bsr);
    }
    if word & 0xFF00 == 0x8900 {
        return entry!("bt", DecodeFlags::CHANGES_PC, translate::bt);
    }
    if word & 0xFF00 == 0x8B00 {
        return entry!("bf", DecodeFlags::CHANGES_PC, translate::bf);
    }
    if word & 0xF0FF == 0x402B {
        return entry!("jmp_rn", DecodeFlags::CHANGES_PC | DecodeFlags::HAS_DELAY_SLOT, translate::jmp_rn);
    }
    if word & 0xF0FF == 0x400B {
        return entry!("jsr_rn", DecodeFlags::CHANGES_PC | DecodeFlags::HAS_DELAY_SLOT, translate::jsr_rn);
    }
    if word & 0xF00F == 0x000F {
        return entry!("mac_l", DecodeFlags::INVALIDATES_CONTEXT, translate::mac_l);
    }
    if word & 0xF00F == 0x4007 {
        return entry!("div1", DecodeFlags::NONE, translate::div1);
    }
    if word & 0xF00F == 0x2007 {
        return entry!("div0s", DecodeFlags::NONE, translate::div0s);
    }
    if word & 0xF0FF == 0x400E {
        return entry!("ldc_sr", DecodeFlags::INVALIDATES_CONTEXT, translate::ldc_sr);
    }
    if word & 0xF0FF == 0x0002 {
        return entry!("stc_sr", DecodeFlags::NONE, translate::stc_sr);
    }
    if word & 0xF0FF == 0x406E {
        return entry!("lds_fpscr", DecodeFlags::INVALIDATES_CONTEXT, translate::lds_fpscr);
    }
    if word & 0xF0FF == 0x006A {
        return entry!("sts_fpscr", DecodeFlags::NONE, translate::sts_fpscr);
    }
    if word & 0xF00F == 0xF000 {
        return entry!("fadd", DecodeFlags::READS_FPU_BANK | DecodeFlags::WRITES_FPU_BANK, translate::fadd);
    }
    if word & 0xF00F == 0xF001 {
        return entry!("fsub", DecodeFlags::READS_FPU_BANK | DecodeFlags::WRITES_FPU_BANK, translate::fsub);
    }
    if word & 0xF00F == 0xF002 {
        return entry!("fmul", DecodeFlags::READS_FPU_BANK | DecodeFlags::WRITES_FPU_BANK, translate::fmul);
    }
    if word & 0xF00F == 0xF003 {
        return entry!("fdiv", DecodeFlags::READS_FPU_BANK | DecodeFlags::WRITES_FPU_BANK, translate::fdiv);
    }
    if word & 0xF00F == 0xF00C {
        return entry!("fmov_reg", DecodeFlags::READS_FPU_BANK | DecodeFlags::WRITES_FPU_BANK, translate::fmov_reg);
    }
    if word & 0xF0FF == 0x0083 {
        return entry!("pref_rn", DecodeFlags::NONE, translate::pref_rn);
    }

    UNKNOWN
}

fn build_table() -> Vec<DecodeEntry> {
    (0u32..=0xFFFF).map(|w| classify(w as u16)).collect()
}

static TABLE: OnceLock<Vec<DecodeEntry>> = OnceLock::new();

/// Looks up the decode-table entry for `word`, building the table on first use.
pub fn decode(word: u16) -> DecodeEntry {
    TABLE.get_or_init(build_table)[word as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nop_decodes_with_no_flags() {
        let e = decode(0x0009);
        assert_eq!(e.mnemonic, "nop");
        assert_eq!(e.flags, DecodeFlags::NONE);
    }

    #[test]
    fn unknown_word_falls_back_to_invalid_instruction() {
        let e = decode(0xFFFF);
        assert_eq!(e.mnemonic, "unknown");
    }

    #[test]
    fn branch_opcodes_carry_delay_slot_flag() {
        assert!(decode(0xA000).flags.contains(DecodeFlags::HAS_DELAY_SLOT));
        assert!(decode(0x000B).flags.contains(DecodeFlags::HAS_DELAY_SLOT));
    }
}
