use crate::arch_trait::ArchPlugin;
use crate::error::{Error, Result};
use crate::valuegen::{Instruction, MachineOperand, ValueGenProgram};
use crate::{Architecture, CalleeSaved};

/// x1, x8-x9, x18-x27, f8-f9, f18-f27 are callee-saved (spec §4.1). DWARF
/// numbering: x0-x31 are 0-31, f0-f31 are 32-63.
const FPR_BASE: u16 = 32;

const CALLEE_SAVED: &[CalleeSaved] = &[
    CalleeSaved { reg: 1, size: 8 }, // ra
    CalleeSaved { reg: 8, size: 8 }, // s0/fp
    CalleeSaved { reg: 9, size: 8 }, // s1
    CalleeSaved { reg: 18, size: 8 },
    CalleeSaved { reg: 19, size: 8 },
    CalleeSaved { reg: 20, size: 8 },
    CalleeSaved { reg: 21, size: 8 },
    CalleeSaved { reg: 22, size: 8 },
    CalleeSaved { reg: 23, size: 8 },
    CalleeSaved { reg: 24, size: 8 },
    CalleeSaved { reg: 25, size: 8 },
    CalleeSaved { reg: 26, size: 8 },
    CalleeSaved { reg: 27, size: 8 },
    CalleeSaved { reg: FPR_BASE + 8, size: 8 }, // f8/fs0
    CalleeSaved { reg: FPR_BASE + 9, size: 8 }, // f9/fs1
    CalleeSaved { reg: FPR_BASE + 18, size: 8 },
    CalleeSaved { reg: FPR_BASE + 19, size: 8 },
    CalleeSaved { reg: FPR_BASE + 20, size: 8 },
    CalleeSaved { reg: FPR_BASE + 21, size: 8 },
    CalleeSaved { reg: FPR_BASE + 22, size: 8 },
    CalleeSaved { reg: FPR_BASE + 23, size: 8 },
    CalleeSaved { reg: FPR_BASE + 24, size: 8 },
    CalleeSaved { reg: FPR_BASE + 25, size: 8 },
    CalleeSaved { reg: FPR_BASE + 26, size: 8 },
    CalleeSaved { reg: FPR_BASE + 27, size: 8 },
];

const NUM_GPR: usize = 32; // x0-x31
const NUM_FPR: usize = 32; // f0-f31

#[derive(Debug, Clone)]
pub struct Regs {
    gpr: [[u8; 8]; NUM_GPR],
    fpr: [[u8; 16]; NUM_FPR],
    pc: u64,
}

impl ArchPlugin for Regs {
    const ARCH: Architecture = Architecture::RiscV64;

    fn new() -> Self {
        Self {
            gpr: [[0; 8]; NUM_GPR],
            fpr: [[0; 16]; NUM_FPR],
            pc: 0,
        }
    }

    fn copy_in(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::byte_len() {
            return Err(Error::BadBinary("riscv64 regset truncated"));
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
        u64::from_le_bytes(self.gpr[2])
    }
    fn set_sp(&mut self, value: u64) {
        self.gpr[2] = value.to_le_bytes();
    }
    fn fbp(&self) -> u64 {
        u64::from_le_bytes(self.gpr[8])
    }
    fn set_fbp(&mut self, value: u64) {
        self.gpr[8] = value.to_le_bytes();
    }
    fn link(&self) -> Option<u64> {
        Some(u64::from_le_bytes(self.gpr[1]))
    }
    fn set_link(&mut self, value: u64) {
        self.gpr[1] = value.to_le_bytes();
    }

    fn reg(&self, number: u16) -> Result<&[u8]> {
        if (number as usize) < NUM_GPR {
            Ok(&self.gpr[number as usize])
        } else if number >= FPR_BASE && (number - FPR_BASE) as usize < NUM_FPR {
            Ok(&self.fpr[(number - FPR_BASE) as usize])
        } else {
            Err(Error::UnknownRegister {
                arch: Architecture::RiscV64,
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
                arch: Architecture::RiscV64,
                reg: number,
            })
        }
    }

    fn reg_size(number: u16) -> Result<usize> {
        if (number as usize) < NUM_GPR {
            Ok(8)
        } else if number >= FPR_BASE && (number - FPR_BASE) as usize < NUM_FPR {
            Ok(8)
        } else {
            Err(Error::UnknownRegister {
                arch: Architecture::RiscV64,
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
        sp & !0xf
    }

    fn ra_offset() -> i64 {
        -8
    }

    fn cfa_offset_funcentry() -> i64 {
        0
    }

    fn setup_fbp(&mut self, cfa: u64) {
        // s0/fp = CFA - 16, mirroring AArch64's saved-pair convention.
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
