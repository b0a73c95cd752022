use crate::arch_trait::ArchPlugin;
use crate::error::{Error, Result};
use crate::valuegen::{Instruction, MachineOperand, ValueGenProgram};
use crate::{Architecture, CalleeSaved};

/// DWARF register numbering for x86-64: 0=rax, 1=rdx, 2=rcx, 3=rbx, 4=rsi,
/// 5=rdi, 6=rbp, 7=rsp, 8..15=r8..r15, 16=rip.
const RBX: u16 = 3;
const RBP: u16 = 6;
const RSP: u16 = 7;
const RIP: u16 = 16;
const R12: u16 = 12;
const R15: u16 = 15;

/// RBX, RBP, R12-R15 are callee-saved; RIP is "implicit" (spec §4.1) in
/// that it is never itself spilled via an unwind entry, it's recovered by
/// reading the return-address slot instead, so it's excluded from the
/// iteration table even though [`Regs::is_callee_saved`] reports it true.
const CALLEE_SAVED: &[CalleeSaved] = &[
    CalleeSaved { reg: RBX, size: 8 },
    CalleeSaved { reg: RBP, size: 8 },
    CalleeSaved { reg: R12, size: 8 },
    CalleeSaved { reg: 13, size: 8 },
    CalleeSaved { reg: 14, size: 8 },
    CalleeSaved { reg: R15, size: 8 },
];

const NUM_GPR: usize = 16; // rax..r15, DWARF 0..15
const NUM_FPR: usize = 16; // xmm0..xmm15

#[derive(Debug, Clone)]
pub struct Regs {
    gpr: [[u8; 8]; NUM_GPR],
    fpr: [[u8; 16]; NUM_FPR],
    pc: u64,
}

impl Regs {
    fn gpr_idx(number: u16) -> Option<usize> {
        ((number as usize) < NUM_GPR).then_some(number as usize)
    }
}

impl ArchPlugin for Regs {
    const ARCH: Architecture = Architecture::X86_64;

    fn new() -> Self {
        Self {
            gpr: [[0; 8]; NUM_GPR],
            fpr: [[0; 16]; NUM_FPR],
            pc: 0,
        }
    }

    fn copy_in(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::byte_len() {
            return Err(Error::BadBinary("x86_64 regset truncated"));
        }
        let mut regs = Self::new();
        let mut off = 0;
        for slot in &mut regs.gpr {
            slot.copy_from_slice(&bytes[off..off + 8]);
            off += 8;
        }
        for slot in &mut regs.fpr {
            slot.copy_from_slice(&bytes[off..off + 16]);
            off += 16;
        }
        regs.pc = u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap());
        Ok(regs)
    }

    fn copy_out(&self, out: &mut [u8]) {
        let mut off = 0;
        for slot in &self.gpr {
            out[off..off + 8].copy_from_slice(slot);
            off += 8;
        }
        for slot in &self.fpr {
            out[off..off + 16].copy_from_slice(slot);
            off += 16;
        }
        out[off..off + 8].copy_from_slice(&self.pc.to_le_bytes());
    }

    fn byte_len() -> usize {
        NUM_GPR * 8 + NUM_FPR * 16 + 8
    }

    fn pc(&self) -> u64 {
        self.pc
    }
    fn set_pc(&mut self, value: u64) {
        self.pc = value;
    }
    fn sp(&self) -> u64 {
        u64::from_le_bytes(self.gpr[RSP as usize])
    }
    fn set_sp(&mut self, value: u64) {
        self.gpr[RSP as usize] = value.to_le_bytes();
    }
    fn fbp(&self) -> u64 {
        u64::from_le_bytes(self.gpr[RBP as usize])
    }
    fn set_fbp(&mut self, value: u64) {
        self.gpr[RBP as usize] = value.to_le_bytes();
    }
    fn link(&self) -> Option<u64> {
        // x86-64 keeps the return address on the stack, not in a register.
        None
    }
    fn set_link(&mut self, _value: u64) {
        // No-op: see `link`. The return address is written to the stack
        // slot by the frame rewriter directly (spec §4.4 step 8).
    }

    fn reg(&self, number: u16) -> Result<&[u8]> {
        if let Some(idx) = Self::gpr_idx(number) {
            Ok(&self.gpr[idx])
        } else if number == RIP {
            // Expose RIP through the register accessor too, backed by `pc`.
            Err(Error::UnknownRegister {
                arch: Architecture::X86_64,
                reg: number,
            })
        } else if (17..17 + NUM_FPR as u16).contains(&number) {
            Ok(&self.fpr[(number - 17) as usize])
        } else {
            Err(Error::UnknownRegister {
                arch: Architecture::X86_64,
                reg: number,
            })
        }
    }

    fn reg_mut(&mut self, number: u16) -> Result<&mut [u8]> {
        if let Some(idx) = Self::gpr_idx(number) {
            Ok(&mut self.gpr[idx])
        } else if (17..17 + NUM_FPR as u16).contains(&number) {
            Ok(&mut self.fpr[(number - 17) as usize])
        } else {
            Err(Error::UnknownRegister {
                arch: Architecture::X86_64,
                reg: number,
            })
        }
    }

    fn reg_size(number: u16) -> Result<usize> {
        if Self::gpr_idx(number).is_some() {
            Ok(8)
        } else if (17..17 + NUM_FPR as u16).contains(&number) {
            Ok(16)
        } else {
            Err(Error::UnknownRegister {
                arch: Architecture::X86_64,
                reg: number,
            })
        }
    }

    fn is_callee_saved(number: u16) -> bool {
        number == RIP || CALLEE_SAVED.iter().any(|cs| cs.reg == number)
    }

    fn callee_saved() -> &'static [CalleeSaved] {
        CALLEE_SAVED
    }

    fn align_sp(sp: u64) -> u64 {
        // At a call site, SP+8 must be a multiple of 16 (the `call`
        // instruction's pushed return address accounts for the missing 8).
        let aligned = sp & !0xf;
        if aligned % 16 == 8 {
            aligned
        } else {
            aligned.wrapping_sub(8)
        }
    }

    fn ra_offset() -> i64 {
        -8
    }

    fn cfa_offset_funcentry() -> i64 {
        // `call` pushes the return address, so the CFA is 8 bytes above SP
        // at function entry.
        8
    }

    fn setup_fbp(&mut self, _cfa: u64) {
        // No dedicated FBP-from-CFA rule on x86-64 (spec §4.1): RBP is
        // whatever the destination unwind/live-value data says it should
        // be, restored by steps 3/6 of the frame rewriter, not derived here.
    }

    fn value_from_instruction(mi: MachineOperand) -> Option<ValueGenProgram> {
        let mut prog = ValueGenProgram::new();
        match mi {
            MachineOperand::LoadEffectiveAddress { base_reg, offset } => {
                prog.push(Instruction::SetReg { reg: base_reg });
                prog.push(Instruction::AddImm(offset as i64));
            }
            MachineOperand::MovAddress { symbol_idx } => {
                prog.push(Instruction::SetSymbol { symbol_idx });
            }
            MachineOperand::MovImmediate { size, value } => {
                prog.push(Instruction::SetImm { size, value });
            }
            MachineOperand::FpMove { src_reg } => {
                prog.push(Instruction::SetReg { reg: src_reg });
            }
            MachineOperand::BitFieldExtract { shift, mask } => {
                prog.push(Instruction::RightShiftLog(shift));
                prog.push(Instruction::Mask(mask));
            }
        }
        Some(prog)
    }
}

