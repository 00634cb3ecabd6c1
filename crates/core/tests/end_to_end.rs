//! End-to-end scenarios exercising the recompiler core through its public API: decode
//! a handful of real SH4 instruction words, run them, and check guest-visible state
//! afterward. Each scenario is a single compiled block (or two, where a branch crosses
//! a block boundary), built the same way `sim::execute`'s own unit tests build theirs,
//! just through `Simulator`'s public surface instead of its crate-internal fields.

mod common;

use common::harness::TestContext;
use sh4_core::common::GuestAddr;
use sh4_core::interrupt::sources::{TMU0_TUNI0, TMU1_TUNI1};
use sh4_core::interrupt::SOURCES;

/// `BRA -2` (branch to self) with its `NOP` delay slot: closes out a program with an
/// infinite loop so `execute` never runs off the end of the loaded words.
const SELF_LOOP: [u16; 2] = [0xaffe, 0x0009];

#[test]
fn add_does_not_touch_the_t_flag() {
    // ADD R1, R2 ; MOVT R3 ; <self-loop>
    let mut tc = TestContext::new();
    tc.load_program(&[0x321c, 0x0329, SELF_LOOP[0], SELF_LOOP[1]]);
    tc.set_reg(1, 0x7fff_ffff);
    tc.set_reg(2, 1);

    tc.run(100);

    assert_eq!(tc.get_reg(2), 0x8000_0000, "R2 overflows to the expected wrapped sum");
    assert_eq!(tc.get_reg(3), 0, "ADD never writes T; MOVT reads back the reset value (T=0)");
}

#[test]
fn delayed_branch_runs_its_slot_exactly_once_before_the_target() {
    // BRA <target> ; ADD #1, R0 (delay slot) ; <target>: ADD #10, R0 ; <self-loop>
    let mut tc = TestContext::new();
    tc.load_program(&[0xa000, 0x7001, 0x700a, SELF_LOOP[0], SELF_LOOP[1]]);
    tc.set_reg(0, 1);

    tc.run(100);

    assert_eq!(tc.get_reg(0), 12, "1 (initial) + 1 (delay slot) + 10 (target), each exactly once");
}

#[test]
fn paired_single_fmov_moves_the_enclosing_register_pair() {
    // FMOV FR0, FR2 ; <self-loop>
    let mut tc = TestContext::new();
    tc.load_program(&[0xf20c, SELF_LOOP[0], SELF_LOOP[1]]);
    {
        let ctx = tc.context_mut();
        let mut fpscr = ctx.fpscr();
        fpscr.set_sz(true);
        ctx.fpscr = fpscr.full();
        ctx.fr[0] = 1.0;
        ctx.fr[1] = 2.0;
    }

    tc.run(100);

    let ctx = tc.sim.context();
    assert_eq!(ctx.fr[2], 1.0, "FPSCR.SZ=1 moves the DRn pair, not just FRn");
    assert_eq!(ctx.fr[3], 2.0);
}

#[test]
fn fastmem_miss_recovers_through_slowmem_and_keeps_running() {
    // MOV.L @R0, R1 ; BRA <self, back to the load> ; NOP (delay slot)
    let mut tc = TestContext::new();
    let base = tc.base();
    tc.load_program(&[0x6102, 0xaffd, 0x0009]);
    // PVR ID register: declared MMIO (area 0) but not backed by fastmem, so the first
    // pass through this block takes a host page fault.
    tc.set_reg(0, 0x005f_8000);

    tc.run(50);

    assert_eq!(tc.get_reg(1), 0, "unclaimed area-0 MMIO reads as 0");
    assert!(tc.sim.stats.slowmem_faults >= 1, "the fastmem miss must have gone through the fault handler");
    assert_eq!(tc.sim.context().pc, base, "the self-branch keeps re-entering the same block");
}

#[test]
fn self_modifying_code_is_invalidated_and_recompiled() {
    // MOV #5, R0 ; BRA <self, back to the MOV> ; NOP (delay slot)
    let mut tc = TestContext::new();
    let base = tc.base();
    tc.load_program(&[0xe005, 0xaffd, 0x0009]);

    tc.run(10);
    assert_eq!(tc.get_reg(0), 5, "the original block runs a few times before we touch it");

    // MOV #10, R0: overwrite the first instruction while the old translation is cached.
    tc.sim.address_space().write16(GuestAddr::new(base), 0xe00a);
    tc.sim.invalidate_code(base);

    tc.run(10);
    assert_eq!(tc.get_reg(0), 10, "the invalidated block was recompiled against the new bytes");
}

#[test]
fn equal_priority_interrupts_break_toward_the_lower_source_id() {
    let mut tc = TestContext::new();
    let base = tc.base();
    tc.load_program(&SELF_LOOP);

    // IPRA: TMU0 and TMU1 both at priority 8.
    tc.sim.address_space().write32(GuestAddr::new(0x1fd0_0004), 0x8800);
    {
        let ctx = tc.context_mut();
        let mut sr = ctx.sr();
        sr.set_bl(false);
        sr.set_imask(0);
        ctx.sr = sr.full();
    }
    tc.sim.request_interrupt(TMU1_TUNI1);
    tc.sim.request_interrupt(TMU0_TUNI0);

    // One block boundary is enough for `execute` to accept the pending interrupt.
    tc.run(1);

    let ctx = tc.sim.context();
    assert!(ctx.sr().bl(), "acceptance sets SR.BL so a second interrupt can't preempt this one");
    assert_eq!(ctx.spc, base, "SPC saves the PC the self-loop branched to (its own address)");
    assert_eq!(ctx.pc, 0x600, "VBR (0) + 0x600, the general exception/interrupt vector");

    let intevt = tc.sim.address_space().read32(GuestAddr::new(0x1f00_0028));
    assert_eq!(intevt, u32::from(SOURCES[TMU0_TUNI0].intevt), "lower source id wins the tie");
}
