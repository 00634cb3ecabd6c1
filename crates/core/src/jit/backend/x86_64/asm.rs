//! A minimal x86-64 byte-level encoder covering exactly the instruction forms the
//! lowering pass in [`super::lower`] needs. Hand-rolled, register-table and
//! REX-prefix driven, since this workspace carries no assembler crate.

/// Growable instruction stream for one compiled block. Committed to the
/// [`super::super::code_buffer::CodeBuffer`] in one `write()` once the whole block
/// (prolog, body, epilog) has been encoded, so intra-block jumps patch local `Vec`
/// offsets rather than live executable memory.
#[derive(Default)]
pub struct Asm {
    bytes: Vec<u8>,
}

/// Condition codes used by `setcc`/`jcc` (the nibble that follows the `0F 9x`/`0F 8x`
/// opcode byte).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cond {
    Eq = 0x4,
    Ne = 0x5,
    Lt = 0xC,
    Ge = 0xD,
    Le = 0xE,
    Gt = 0xF,
    B = 0x2,
    Ae = 0x3,
    Be = 0x6,
    A = 0x7,
}

fn rex(w: bool, r: u8, x: u8, b: u8) -> Option<u8> {
    let rr = u8::from(r >= 8);
    let xx = u8::from(x >= 8);
    let bb = u8::from(b >= 8);
    if w || rr != 0 || xx != 0 || bb != 0 {
        Some(0x40 | (u8::from(w) << 3) | (rr << 2) | (xx << 1) | bb)
    } else {
        None
    }
}

impl Asm {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn pos(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    fn push_rex(&mut self, w: bool, r: u8, x: u8, b: u8) {
        if let Some(p) = rex(w, r, x, b) {
            self.bytes.push(p);
        }
    }

    fn modrm_reg(&mut self, reg: u8, rm: u8) {
        self.bytes.push(0xC0 | ((reg & 7) << 3) | (rm & 7));
    }

    /// `[base + disp32]`, emitting the SIB byte `rsp`/`r12` bases require.
    fn modrm_mem(&mut self, reg: u8, base: u8, disp: i32) {
        let rm = base & 7;
        if rm == 4 {
            self.bytes.push(0x80 | ((reg & 7) << 3) | 0b100);
            self.bytes.push(0x24); // SIB: scale=0, index=none, base=rsp/r12
        } else {
            self.bytes.push(0x80 | ((reg & 7) << 3) | rm);
        }
        self.bytes.extend_from_slice(&disp.to_le_bytes());
    }

    // --- Data movement -------------------------------------------------

    pub fn mov_reg_reg(&mut self, dst: u8, src: u8, width: u8) {
        self.push_rex(width == 8, src, 0, dst);
        self.bytes.push(if width == 1 { 0x88 } else { 0x89 });
        self.modrm_reg(src, dst);
    }

    pub fn mov_reg_imm64(&mut self, dst: u8, imm: u64) {
        self.push_rex(true, 0, 0, dst);
        self.bytes.push(0xB8 | (dst & 7));
        self.bytes.extend_from_slice(&imm.to_le_bytes());
    }

    pub fn mov_reg_imm32(&mut self, dst: u8, imm: u32) {
        // The 32-bit form zero-extends into the full 64-bit register.
        self.push_rex(false, 0, 0, dst);
        self.bytes.push(0xB8 | (dst & 7));
        self.bytes.extend_from_slice(&imm.to_le_bytes());
    }

    /// Loads `[base + disp]` into `dst`, sign- or zero-extending per `width`.
    pub fn load_mem(&mut self, dst: u8, base: u8, disp: i32, width: u8, sign_extend: bool) {
        match width {
            8 => {
                self.push_rex(true, dst, 0, base);
                self.bytes.push(0x8B);
                self.modrm_mem(dst, base, disp);
            }
            4 if !sign_extend => {
                self.push_rex(false, dst, 0, base);
                self.bytes.push(0x8B);
                self.modrm_mem(dst, base, disp);
            }
            4 => {
                self.push_rex(true, dst, 0, base);
                self.bytes.push(0x63); // movsxd
                self.modrm_mem(dst, base, disp);
            }
            2 => {
                self.push_rex(true, dst, 0, base);
                self.bytes.push(0x0F);
                self.bytes.push(if sign_extend { 0xBF } else { 0xB7 });
                self.modrm_mem(dst, base, disp);
            }
            1 => {
                self.push_rex(true, dst, 0, base);
                self.bytes.push(0x0F);
                self.bytes.push(if sign_extend { 0xBE } else { 0xB6 });
                self.modrm_mem(dst, base, disp);
            }
            _ => unreachable!("unsupported load width {width}"),
        }
    }

    /// Stores `src` to `[base + disp]`, truncated to `width` bytes.
    pub fn store_mem(&mut self, base: u8, disp: i32, src: u8, width: u8) {
        match width {
            1 => {
                self.push_rex(false, src, 0, base);
                self.bytes.push(0x88);
            }
            2 => {
                self.bytes.push(0x66);
                self.push_rex(false, src, 0, base);
                self.bytes.push(0x89);
            }
            4 => {
                self.push_rex(false, src, 0, base);
                self.bytes.push(0x89);
            }
            8 => {
                self.push_rex(true, src, 0, base);
                self.bytes.push(0x89);
            }
            _ => unreachable!("unsupported store width {width}"),
        }
        self.modrm_mem(src, base, disp);
    }

    pub fn lea(&mut self, dst: u8, base: u8, disp: i32) {
        self.push_rex(true, dst, 0, base);
        self.bytes.push(0x8D);
        self.modrm_mem(dst, base, disp);
    }

    // --- ALU -------------------------------------------------

    fn alu_opcode(op: AluOp) -> u8 {
        match op {
            AluOp::Add => 0x01,
            AluOp::Sub => 0x29,
            AluOp::And => 0x21,
            AluOp::Or => 0x09,
            AluOp::Xor => 0x31,
            AluOp::Cmp => 0x39,
        }
    }

    pub fn alu_reg_reg(&mut self, op: AluOp, dst: u8, src: u8, width: u8) {
        self.push_rex(width == 8, src, 0, dst);
        self.bytes.push(Self::alu_opcode(op));
        self.modrm_reg(src, dst);
    }

    /// `op dst, imm32` (group-1 `/r` form), used by the prolog/epilog to grow and
    /// shrink the stack frame by a constant the allocator only knows after the fact.
    pub fn alu_reg_imm32(&mut self, op: AluOp, dst: u8, imm: i32, width: u8) {
        self.push_rex(width == 8, 0, 0, dst);
        self.bytes.push(0x81);
        let ext = match op {
            AluOp::Add => 0,
            AluOp::Or => 1,
            AluOp::And => 4,
            AluOp::Sub => 5,
            AluOp::Xor => 6,
            AluOp::Cmp => 7,
        };
        self.bytes.push(0xC0 | (ext << 3) | (dst & 7));
        self.bytes.extend_from_slice(&imm.to_le_bytes());
    }

    pub fn not_reg(&mut self, dst: u8, width: u8) {
        self.push_rex(width == 8, 0, 0, dst);
        self.bytes.push(0xF7);
        self.bytes.push(0xD0 | (dst & 7));
    }

    pub fn neg_reg(&mut self, dst: u8, width: u8) {
        self.push_rex(width == 8, 0, 0, dst);
        self.bytes.push(0xF7);
        self.bytes.push(0xD8 | (dst & 7));
    }

    pub fn imul_reg_reg(&mut self, dst: u8, src: u8, width: u8) {
        self.push_rex(width == 8, dst, 0, src);
        self.bytes.push(0x0F);
        self.bytes.push(0xAF);
        self.modrm_reg(dst, src);
    }

    /// `shl`/`shr`/`sar dst, cl` — the shift amount must already be in `rcx`.
    pub fn shift_reg_cl(&mut self, op: ShiftOp, dst: u8, width: u8) {
        self.push_rex(width == 8, 0, 0, dst);
        self.bytes.push(0xD3);
        let ext = match op {
            ShiftOp::Shl => 4,
            ShiftOp::Shr => 5,
            ShiftOp::Sar => 7,
            ShiftOp::Rol => 0,
            ShiftOp::Ror => 1,
        };
        self.bytes.push(0xC0 | (ext << 3) | (dst & 7));
    }

    /// `shl`/`shr`/`sar dst, imm8` — used for the shift-pair that implements
    /// sign-extension from a narrower-than-32-bit width.
    pub fn shift_reg_imm8(&mut self, op: ShiftOp, dst: u8, width: u8, imm: u8) {
        self.push_rex(width == 8, 0, 0, dst);
        self.bytes.push(0xC1);
        let ext = match op {
            ShiftOp::Shl => 4,
            ShiftOp::Shr => 5,
            ShiftOp::Sar => 7,
            ShiftOp::Rol => 0,
            ShiftOp::Ror => 1,
        };
        self.bytes.push(0xC0 | (ext << 3) | (dst & 7));
        self.bytes.push(imm);
    }

    pub fn test_reg_reg(&mut self, a: u8, b: u8, width: u8) {
        self.push_rex(width == 8, b, 0, a);
        self.bytes.push(0x85);
        self.modrm_reg(b, a);
    }

    /// `setcc dst8`, then zero-extends `dst8` into the full register.
    pub fn setcc_zx(&mut self, cond: Cond, dst: u8) {
        self.push_rex(false, 0, 0, dst);
        self.bytes.push(0x0F);
        self.bytes.push(0x90 | cond as u8);
        self.bytes.push(0xC0 | (dst & 7));
        self.push_rex(false, dst, 0, dst);
        self.bytes.push(0x0F);
        self.bytes.push(0xB6);
        self.modrm_reg(dst, dst);
    }

    // --- Control flow -------------------------------------------------

    pub fn push_reg(&mut self, reg: u8) {
        self.push_rex(false, 0, 0, reg);
        self.bytes.push(0x50 | (reg & 7));
    }

    pub fn pop_reg(&mut self, reg: u8) {
        self.push_rex(false, 0, 0, reg);
        self.bytes.push(0x58 | (reg & 7));
    }

    pub fn ret(&mut self) {
        self.bytes.push(0xC3);
    }

    pub fn call_reg(&mut self, reg: u8) {
        self.push_rex(false, 0, 0, reg);
        self.bytes.push(0xFF);
        self.bytes.push(0xD0 | (reg & 7));
    }

    /// Emits a near unconditional jump with a placeholder `rel32`; returns the byte
    /// offset of the `rel32` field for [`Self::patch_rel32`].
    pub fn jmp_rel32_placeholder(&mut self) -> usize {
        self.bytes.push(0xE9);
        let at = self.bytes.len();
        self.bytes.extend_from_slice(&0i32.to_le_bytes());
        at
    }

    /// Emits a near conditional jump with a placeholder `rel32`.
    pub fn jcc_rel32_placeholder(&mut self, cond: Cond) -> usize {
        self.bytes.push(0x0F);
        self.bytes.push(0x80 | cond as u8);
        let at = self.bytes.len();
        self.bytes.extend_from_slice(&0i32.to_le_bytes());
        at
    }

    /// Back-patches a `rel32` placeholder returned by one of the `*_placeholder`
    /// methods so it targets the current position.
    pub fn patch_rel32(&mut self, placeholder_at: usize) {
        let rel = i32::try_from(self.bytes.len() as i64 - (placeholder_at as i64 + 4))
            .expect("intra-block jump further than 2GiB");
        self.bytes[placeholder_at..placeholder_at + 4].copy_from_slice(&rel.to_le_bytes());
    }

    // --- SSE -------------------------------------------------

    /// Registers are raw 0-15 encodings throughout this module, the same space GP
    /// registers use — `xmm6` is encoding `6`, just like `rsi` is encoding `6`.
    fn xmm_op(&mut self, prefix: Option<u8>, opcode: &[u8], dst: u8, src: u8) {
        if let Some(p) = prefix {
            self.bytes.push(p);
        }
        self.push_rex(false, dst, 0, src);
        self.bytes.extend_from_slice(&opcode[..opcode.len() - 1]);
        self.bytes.push(opcode[opcode.len() - 1]);
        self.modrm_reg(dst, src);
    }

    pub fn movd_xmm_gp(&mut self, dst_xmm: u8, src_gp: u8) {
        self.bytes.push(0x66);
        self.push_rex(false, dst_xmm, 0, src_gp);
        self.bytes.push(0x0F);
        self.bytes.push(0x6E);
        self.modrm_reg(dst_xmm, src_gp);
    }

    pub fn movq_xmm_gp(&mut self, dst_xmm: u8, src_gp: u8) {
        self.bytes.push(0x66);
        self.push_rex(true, dst_xmm, 0, src_gp);
        self.bytes.push(0x0F);
        self.bytes.push(0x6E);
        self.modrm_reg(dst_xmm, src_gp);
    }

    /// `movd r/m32, xmm` — the reverse direction of [`Self::movd_xmm_gp`].
    pub fn movd_gp_xmm(&mut self, dst_gp: u8, src_xmm: u8) {
        self.bytes.push(0x66);
        self.push_rex(false, src_xmm, 0, dst_gp);
        self.bytes.push(0x0F);
        self.bytes.push(0x7E);
        self.modrm_reg(src_xmm, dst_gp);
    }

    /// `movq r/m64, xmm` — the reverse direction of [`Self::movq_xmm_gp`].
    pub fn movq_gp_xmm(&mut self, dst_gp: u8, src_xmm: u8) {
        self.bytes.push(0x66);
        self.push_rex(true, src_xmm, 0, dst_gp);
        self.bytes.push(0x0F);
        self.bytes.push(0x7E);
        self.modrm_reg(src_xmm, dst_gp);
    }

    pub fn movss_xmm_xmm(&mut self, dst: u8, src: u8) {
        self.xmm_op(Some(0xF3), &[0x0F, 0x10], dst, src);
    }

    pub fn movsd_xmm_xmm(&mut self, dst: u8, src: u8) {
        self.xmm_op(Some(0xF2), &[0x0F, 0x10], dst, src);
    }

    pub fn binss(&mut self, opcode: u8, dst: u8, src: u8) {
        self.xmm_op(Some(0xF3), &[0x0F, opcode], dst, src);
    }

    pub fn binsd(&mut self, opcode: u8, dst: u8, src: u8) {
        self.xmm_op(Some(0xF2), &[0x0F, opcode], dst, src);
    }

    pub fn xorps(&mut self, dst: u8, src: u8) {
        self.xmm_op(None, &[0x0F, 0x57], dst, src);
    }

    pub fn andps(&mut self, dst: u8, src: u8) {
        self.xmm_op(None, &[0x0F, 0x54], dst, src);
    }

    pub fn comiss(&mut self, a: u8, b: u8) {
        self.xmm_op(None, &[0x0F, 0x2F], a, b);
    }

    pub fn comisd(&mut self, a: u8, b: u8) {
        self.xmm_op(Some(0x66), &[0x0F, 0x2F], a, b);
    }

    pub fn cvttss2si(&mut self, dst_gp: u8, src_xmm: u8) {
        self.bytes.push(0xF3);
        self.push_rex(true, dst_gp, 0, src_xmm);
        self.bytes.push(0x0F);
        self.bytes.push(0x2C);
        self.modrm_reg(dst_gp, src_xmm);
    }

    pub fn cvttsd2si(&mut self, dst_gp: u8, src_xmm: u8) {
        self.bytes.push(0xF2);
        self.push_rex(true, dst_gp, 0, src_xmm);
        self.bytes.push(0x0F);
        self.bytes.push(0x2C);
        self.modrm_reg(dst_gp, src_xmm);
    }

    pub fn cvtsi2ss(&mut self, dst_xmm: u8, src_gp: u8) {
        self.bytes.push(0xF3);
        self.push_rex(true, dst_xmm, 0, src_gp);
        self.bytes.push(0x0F);
        self.bytes.push(0x2A);
        self.modrm_reg(dst_xmm, src_gp);
    }

    pub fn cvtsi2sd(&mut self, dst_xmm: u8, src_gp: u8) {
        self.bytes.push(0xF2);
        self.push_rex(true, dst_xmm, 0, src_gp);
        self.bytes.push(0x0F);
        self.bytes.push(0x2A);
        self.modrm_reg(dst_xmm, src_gp);
    }

    pub fn sqrtss(&mut self, dst: u8, src: u8) {
        self.xmm_op(Some(0xF3), &[0x0F, 0x51], dst, src);
    }

    pub fn sqrtsd(&mut self, dst: u8, src: u8) {
        self.xmm_op(Some(0xF2), &[0x0F, 0x51], dst, src);
    }

    pub fn load_xmm(&mut self, dst_xmm: u8, base: u8, disp: i32, is_f64: bool) {
        self.bytes.push(if is_f64 { 0xF2 } else { 0xF3 });
        self.push_rex(false, dst_xmm, 0, base);
        self.bytes.push(0x0F);
        self.bytes.push(0x10);
        self.modrm_mem(dst_xmm, base, disp);
    }

    pub fn store_xmm(&mut self, base: u8, disp: i32, src_xmm: u8, is_f64: bool) {
        self.bytes.push(if is_f64 { 0xF2 } else { 0xF3 });
        self.push_rex(false, src_xmm, 0, base);
        self.bytes.push(0x0F);
        self.bytes.push(0x11);
        self.modrm_mem(src_xmm, base, disp);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
    Cmp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShiftOp {
    Shl,
    Shr,
    Sar,
    Rol,
    Ror,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jit::backend::abi;

    #[test]
    fn ret_is_a_single_byte() {
        let mut a = Asm::new();
        a.ret();
        assert_eq!(a.into_bytes(), vec![0xC3]);
    }

    #[test]
    fn mov_reg_imm64_into_a_high_register_sets_rex_b() {
        let mut a = Asm::new();
        a.mov_reg_imm64(abi::R15, 0x1122_3344_5566_7788);
        let bytes = a.into_bytes();
        assert_eq!(bytes[0], 0x49); // REX.W + REX.B
        assert_eq!(bytes[1], 0xB8 | 7);
    }

    #[test]
    fn jmp_placeholder_patches_to_the_current_position() {
        let mut a = Asm::new();
        let at = a.jmp_rel32_placeholder();
        a.mov_reg_imm32(abi::RAX, 0);
        a.patch_rel32(at);
        let bytes = a.into_bytes();
        let rel = i32::from_le_bytes(bytes[at..at + 4].try_into().unwrap());
        assert_eq!(rel, bytes.len() as i32 - (at as i32 + 4));
    }

    #[test]
    fn alu_reg_reg_add_uses_opcode_0x01() {
        let mut a = Asm::new();
        a.alu_reg_reg(AluOp::Add, abi::RBX, abi::R12, 4);
        let bytes = a.into_bytes();
        assert!(bytes.contains(&0x01));
    }

    #[test]
    fn alu_reg_imm32_sub_rsp_sets_rex_w_and_ext5() {
        let mut a = Asm::new();
        a.alu_reg_imm32(AluOp::Sub, abi::RSP, 128, 8);
        let bytes = a.into_bytes();
        assert_eq!(bytes[0], 0x48); // REX.W, no extension bits for rsp
        assert_eq!(bytes[1], 0x81);
        assert_eq!(bytes[2], 0xC0 | (5 << 3) | (abi::RSP & 7));
    }
}
