use crate::arch_trait::ArchPlugin;
use crate::error::{Error, Result};
use crate::valuegen::{Instruction, MachineOperand, ValueGenProgram};
use crate::{Architecture, CalleeSaved};

/// x19-x30 are callee-saved GPRs; v8-v15 are callee-saved FP/SIMD (only the
/// low 8 bytes of each, per AAPCS64, but we save/restore the full 16).
const CALLEE_SAVED: &[CalleeSaved] = &[
    CalleeSaved { reg: 19, size: 8 },
    CalleeSaved { reg: 20, size: 8 },
    CalleeSaved { reg: 21, size: 8 },
    CalleeSaved { reg: 22, size: 8 },
    CalleeSaved { reg: 23, size: 8 },
    CalleeSaved { reg: 24, size: 8 },
    CalleeSaved { reg: 25, size: 8 },
    CalleeSaved { reg: 26, size: 8 },
    CalleeSaved { reg: 27, size: 8 },
    CalleeSaved { reg: 28, size: 8 },
    CalleeSaved { reg: 29, size: 8 }, // x29 / FP
    CalleeSaved { reg: 30, size: 8 }, // x30 / LR
    CalleeSaved { reg: 72, size: 16 }, // v8
    CalleeSaved { reg: 73, size: 16 },
    CalleeSaved { reg: 74, size: 16 },
    CalleeSaved { reg: 75, size: 16 },
    CalleeSaved { reg: 76, size: 16 },
    CalleeSaved { reg: 77, size: 16 },
    CalleeSaved { reg: 78, size: 16 },
    CalleeSaved { reg: 79, size: 16 }, // v15
];

const NUM_GPR: usize = 31; // x0-x30
const NUM_FPR: usize = 32; // v0-v31
/// DWARF register number where the V/FP registers start (64 + n, per the
/// AArch64 DWARF register mapping).
const FPR_BASE: u16 = 64;

#[derive(Debug, Clone)]
pub struct Regs {
    gpr: [[u8; 8]; NUM_GPR],
    fpr: [[u8; 16]; NUM_FPR],
    sp: u64,
    pc: u64,
}

impl ArchPlugin for Regs {
    const ARCH: Architecture = Architecture::AArch64;

    fn new() -> Self {
        Self {
            gpr: [[0; 8]; NUM_GPR],
            fpr: [[0; 16]; NUM_FPR],
            sp: 0,
            pc: 0,
        }
    }

    fn copy_in(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::byte_len() {
            return Err(Error::BadBinary("aarch64 regset truncated"));
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
        regs.sp = u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap());
        off += 8;
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
        out[off..off + 8].copy_from_slice(&self.sp.to_le_bytes());
        off += 8;
        out[off..off + 8].copy_from_slice(&self.pc.to_le_bytes());
    }

    fn byte_len() -> usize {
        NUM_GPR * 8 + NUM_FPR * 16 + 8 + 8
    }

    fn pc(&self) -> u64 {
        self.pc
    }
    fn set_pc(&mut self, value: u64) {
        self.pc = value;
    }
    fn sp(&self) -> u64 {
        self.sp
    }
    fn set_sp(&mut self, value: u64) {
        self.sp = value;
    }
    fn fbp(&self) -> u64 {
        u64::from_le_bytes(self.gpr[29])
    }
    fn set_fbp(&mut self, value: u64) {
        self.gpr[29] = value.to_le_bytes();
    }
    fn link(&self) -> Option<u64> {
        Some(u64::from_le_bytes(self.gpr[30]))
    }
    fn set_link(&mut self, value: u64) {
        self.gpr[30] = value.to_le_bytes();
    }

    fn reg(&self, number: u16) -> Result<&[u8]> {
        if (number as usize) < NUM_GPR {
            Ok(&self.gpr[number as usize])
        } else if number >= FPR_BASE && (number - FPR_BASE) as usize < NUM_FPR {
            Ok(&self.fpr[(number - FPR_BASE) as usize])
        } else {
            Err(Error::UnknownRegister {
                arch: Architecture::AArch64,
                reg: number,
            })
        }
    }

    fn reg_mut(&mut self, number: u16) -> Result<&mut [u8]> {
        if (number as usize) < NUM_GPR {
            Ok(&mut self.gpr[number as usize])
        } else if number >= FPR_BASE && (number - FPR_BASE) as usize < NUM_FPR {
            Ok(&mut self.fpr[(number - FPR_BASE) as usize])
        } else {
            Err(Error::UnknownRegister {
                arch: Architecture::AArch64,
                reg: number,
            })
        }
    }

    fn reg_size(number: u16) -> Result<usize> {
        if (number as usize) < NUM_GPR {
            Ok(8)
        } else if number >= FPR_BASE && (number - FPR_BASE) as usize < NUM_FPR {
            Ok(16)
        } else {
            Err(Error::UnknownRegister {
                arch: Architecture::AArch64,
                reg: number,
            })
        }
    }

    fn is_callee_saved(number: u16) -> bool {
        CALLEE_SAVED.iter().any(|cs| cs.reg == number)
    }

    fn callee_saved() -> &'static [CalleeSaved] {
        CALLEE_SAVED
    }

    fn align_sp(sp: u64) -> u64 {
        // Already 16-byte aligned by the AAPCS64 call convention; no-op.
        sp & !0xf
    }

    fn ra_offset() -> i64 {
        -8
    }

    fn cfa_offset_funcentry() -> i64 {
        0
    }

    fn setup_fbp(&mut self, cfa: u64) {
        // x29 = CFA - 16 (frame record sits just below the CFA: saved
        // FP/LR pair).
        self.set_fbp(cfa.wrapping_sub(16));
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
