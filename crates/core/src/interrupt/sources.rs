//! The fixed table of SH4 on-chip interrupt sources. Each source's priority lives in
//! a nibble of `IPRA`/`IPRB`/`IPRC`, except `NMI`, which the hardware wires above
//! every maskable level instead of through an `IPR` field.

/// Which priority register a source's nibble lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IprReg {
    A = 0,
    B = 1,
    C = 2,
}

/// One interrupt source: its `INTEVT` vector code and where its priority comes from.
#[derive(Debug, Clone, Copy)]
pub struct Source {
    pub name: &'static str,
    /// Value latched into the `INTEVT` on-chip register on acceptance.
    pub intevt: u16,
    /// `(register, nibble index counting from bit 0)`, or `None` for `NMI`.
    pub ipr: Option<(IprReg, u8)>,
}

const fn src(name: &'static str, intevt: u16, ipr: Option<(IprReg, u8)>) -> Source {
    Source { name, intevt, ipr }
}

/// Source ids are this table's indices; `request_interrupt`/`unrequest_interrupt`
/// take one of these directly rather than a device name.
pub static SOURCES: &[Source] = &[
    src("NMI", 0x1c0, None),
    src("TMU0_TUNI0", 0x400, Some((IprReg::A, 3))),
    src("TMU1_TUNI1", 0x420, Some((IprReg::A, 2))),
    src("TMU2_TUNI2", 0x440, Some((IprReg::A, 1))),
    src("TMU2_TICPI2", 0x460, Some((IprReg::A, 1))),
    src("RTC_ATI", 0x480, Some((IprReg::A, 0))),
    src("RTC_PRI", 0x4a0, Some((IprReg::A, 0))),
    src("RTC_CUI", 0x4c0, Some((IprReg::A, 0))),
    src("SCI_ERI", 0x4e0, Some((IprReg::B, 1))),
    src("SCI_RXI", 0x500, Some((IprReg::B, 1))),
    src("SCI_TXI", 0x520, Some((IprReg::B, 1))),
    src("SCI_TEI", 0x540, Some((IprReg::B, 1))),
    src("WDT_ITI", 0x560, Some((IprReg::B, 3))),
    src("REF_RCMI", 0x580, Some((IprReg::B, 2))),
    src("REF_ROVI", 0x5a0, Some((IprReg::B, 2))),
    src("GPIO", 0x620, Some((IprReg::C, 3))),
    src("DMAC_DMTE0", 0x640, Some((IprReg::C, 2))),
    src("DMAC_DMTE1", 0x660, Some((IprReg::C, 2))),
    src("DMAC_DMTE2", 0x680, Some((IprReg::C, 2))),
    src("DMAC_DMTE3", 0x6a0, Some((IprReg::C, 2))),
    src("DMAC_DMAE", 0x6c0, Some((IprReg::C, 2))),
    src("SCIF_ERI", 0x700, Some((IprReg::C, 1))),
    src("SCIF_RXI", 0x720, Some((IprReg::C, 1))),
    src("SCIF_BRI", 0x740, Some((IprReg::C, 1))),
    src("SCIF_TXI", 0x760, Some((IprReg::C, 1))),
    src("HUDI", 0x600, Some((IprReg::C, 0))),
];

/// Source id of `TMU0_TUNI0`, used by the timer unit to raise its underflow interrupt.
pub const TMU0_TUNI0: usize = 1;
/// Source id of `TMU1_TUNI1`.
pub const TMU1_TUNI1: usize = 2;
/// Source id of `TMU2_TUNI2`.
pub const TMU2_TUNI2: usize = 3;
/// Source id of `DMAC_DMTE2`, raised by channel-2 DDT completion.
pub const DMAC_DMTE2: usize = 18;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_ids_match_declared_constants() {
        assert_eq!(SOURCES[TMU0_TUNI0].name, "TMU0_TUNI0");
        assert_eq!(SOURCES[TMU1_TUNI1].name, "TMU1_TUNI1");
        assert_eq!(SOURCES[TMU2_TUNI2].name, "TMU2_TUNI2");
        assert_eq!(SOURCES[DMAC_DMTE2].name, "DMAC_DMTE2");
    }

    #[test]
    fn table_fits_in_a_64_bit_request_mask() {
        assert!(SOURCES.len() <= 64);
    }
}
