use crate::arch_trait::ArchPlugin;
use crate::error::{Error, Result};
use crate::valuegen::{Instruction, MachineOperand, ValueGenProgram};
use crate::{Architecture, CalleeSaved};

/// r1, r2, r14-r31, LR, f14-f31 are callee-saved (spec §4.1). LR is
/// represented with DWARF number 65 (the ELFv2 PowerPC64 convention) and
/// stored outside the r0-r31 GPR file since it isn't one of them.
const LR_DWARF: u16 = 65;

const CALLEE_SAVED: &[CalleeSaved] = &[
    CalleeSaved { reg: 1, size: 8 },
    CalleeSaved { reg: 2, size: 8 },
    CalleeSaved { reg: 14, size: 8 },
    CalleeSaved { reg: 15, size: 8 },
    CalleeSaved { reg: 16, size: 8 },
    CalleeSaved { reg: 17, size: 8 },
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
    CalleeSaved { reg: 28, size: 8 },
    CalleeSaved { reg: 29, size: 8 },
    CalleeSaved { reg: 30, size: 8 },
    CalleeSaved { reg: 31, size: 8 },
    CalleeSaved { reg: LR_DWARF, size: 8 },
    CalleeSaved { reg: 46, size: 8 }, // f14
    CalleeSaved { reg: 47, size: 8 },
    CalleeSaved { reg: 48, size: 8 },
    CalleeSaved { reg: 49, size: 8 },
    CalleeSaved { reg: 50, size: 8 },
    CalleeSaved { reg: 51, size: 8 },
    CalleeSaved { reg: 52, size: 8 },
    CalleeSaved { reg: 53, size: 8 },
    CalleeSaved { reg: 54, size: 8 },
    CalleeSaved { reg: 55, size: 8 },
    CalleeSaved { reg: 56, size: 8 },
    CalleeSaved { reg: 57, size: 8 },
    CalleeSaved { reg: 58, size: 8 },
    CalleeSaved { reg: 59, size: 8 },
    CalleeSaved { reg: 60, size: 8 },
    CalleeSaved { reg: 61, size: 8 },
    CalleeSaved { reg: 62, size: 8 },
    CalleeSaved { reg: 63, size: 8 }, // f31
];

const NUM_GPR: usize = 32; // r0-r31
const NUM_FPR: usize = 32; // f0-f31
/// DWARF base for the f0-f31 register file on PowerPC64.
const FPR_BASE: u16 = 32;

#[derive(Debug, Clone)]
pub struct Regs {
    gpr: [[u8; 8]; NUM_GPR],
    fpr: [[u8; 16]; NUM_FPR],
    lr: [u8; 8],
    pc: u64,
}

impl ArchPlugin for Regs {
    const ARCH: Architecture = Architecture::PowerPc64;

    fn new() -> Self {
        Self {
            gpr: [[0; 8]; NUM_GPR],
            fpr: [[0; 16]; NUM_FPR],
            lr: [0; 8],
            pc: 0,
        }
    }

    fn copy_in(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::byte_len() {
            return Err(Error::BadBinary("powerpc64 regset truncated"));
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
        regs.lr.copy_from_slice(&bytes[off..off + 8]);
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
        out[off..off + 8].copy_from_slice(&self.lr);
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
        u64::from_le_bytes(self.gpr[1])
    }
    fn set_sp(&mut self, value: u64) {
        self.gpr[1] = value.to_le_bytes();
    }
    fn fbp(&self) -> u64 {
        u64::from_le_bytes(self.gpr[31])
    }
    fn set_fbp(&mut self, value: u64) {
        self.gpr[31] = value.to_le_bytes();
    }
    fn link(&self) -> Option<u64> {
        Some(u64::from_le_bytes(self.lr))
    }
    fn set_link(&mut self, value: u64) {
        self.lr = value.to_le_bytes();
    }

    fn reg(&self, number: u16) -> Result<&[u8]> {
        if (number as usize) < NUM_GPR {
            Ok(&self.gpr[number as usize])
        } else if number == LR_DWARF {
            Ok(&self.lr)
        } else if number >= FPR_BASE && (number - FPR_BASE) as usize < NUM_FPR {
            Ok(&self.fpr[(number - FPR_BASE) as usize])
        } else {
            Err(Error::UnknownRegister {
                arch: Architecture::PowerPc64,
                reg: number,
            })
        }
    }

    fn reg_mut(&mut self, number: u16) -> Result<&mut [u8]> {
        if (number as usize) < NUM_GPR {
            Ok(&mut self.gpr[number as usize])
        } else if number == LR_DWARF {
            Ok(&mut self.lr)
        } else if number >= FPR_BASE && (number - FPR_BASE) as usize < NUM_FPR {
            Ok(&mut self.fpr[(number - FPR_BASE) as usize])
        } else {
            Err(Error::UnknownRegister {
                arch: Architecture::PowerPc64,
                reg: number,
            })
        }
    }

    fn reg_size(number: u16) -> Result<usize> {
        if (number as usize) < NUM_GPR || number == LR_DWARF {
            Ok(8)
        } else if number >= FPR_BASE && (number - FPR_BASE) as usize < NUM_FPR {
            Ok(8)
        } else {
            Err(Error::UnknownRegister {
                arch: Architecture::PowerPc64,
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
        let masked = sp & !0x7;
        if masked % 16 == 0 {
            masked
        } else {
            masked.wrapping_sub(8)
        }
    }

    fn ra_offset() -> i64 {
        16
    }

    fn cfa_offset_funcentry() -> i64 {
        0
    }

    fn setup_fbp(&mut self, _cfa: u64) {
        // r31 := r1 (the ELFv2 convention copies the current SP into the
        // frame pointer register rather than deriving it from the CFA).
        let sp = self.sp();
        self.set_fbp(sp);
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
