//! [`RegisterSet`]: the tagged union over the four arch plugins.

use crate::arch::{aarch64, powerpc64, riscv64, x86_64};
use crate::arch_trait::ArchPlugin;
use crate::error::Result;
use crate::valuegen::{MachineOperand, ValueGenProgram};
use crate::{Architecture, CalleeSaved};

/// A polymorphic container holding all general-purpose, floating-point, and
/// special (PC, SP, FBP, link) registers for one architecture (spec §3).
///
/// All operations are a single `match` over the four variants; there is no
/// dynamic dispatch. Methods that are hot during per-frame live-value
/// transfer (`reg`, `reg_mut`, `reg_size`) are small enough to inline at
/// their call site inside `frame_rewrite`.
#[derive(Debug, Clone)]
pub enum RegisterSet {
    AArch64(aarch64::Regs),
    X86_64(x86_64::Regs),
    PowerPc64(powerpc64::Regs),
    RiscV64(riscv64::Regs),
}

macro_rules! dispatch {
    ($self:expr, $inner:ident => $body:expr) => {
        match $self {
            RegisterSet::AArch64($inner) => $body,
            RegisterSet::X86_64($inner) => $body,
            RegisterSet::PowerPc64($inner) => $body,
            RegisterSet::RiscV64($inner) => $body,
        }
    };
}

impl RegisterSet {
    pub fn default_for(arch: Architecture) -> Self {
        match arch {
            Architecture::AArch64 => Self::AArch64(aarch64::Regs::new()),
            Architecture::X86_64 => Self::X86_64(x86_64::Regs::new()),
            Architecture::PowerPc64 => Self::PowerPc64(powerpc64::Regs::new()),
            Architecture::RiscV64 => Self::RiscV64(riscv64::Regs::new()),
        }
    }

    pub fn copy_in(arch: Architecture, bytes: &[u8]) -> Result<Self> {
        Ok(match arch {
            Architecture::AArch64 => Self::AArch64(aarch64::Regs::copy_in(bytes)?),
            Architecture::X86_64 => Self::X86_64(x86_64::Regs::copy_in(bytes)?),
            Architecture::PowerPc64 => Self::PowerPc64(powerpc64::Regs::copy_in(bytes)?),
            Architecture::RiscV64 => Self::RiscV64(riscv64::Regs::copy_in(bytes)?),
        })
    }

    pub fn copy_out(&self, out: &mut [u8]) {
        dispatch!(self, r => r.copy_out(out))
    }

    pub fn byte_len(&self) -> usize {
        match self {
            Self::AArch64(_) => aarch64::Regs::byte_len(),
            Self::X86_64(_) => x86_64::Regs::byte_len(),
            Self::PowerPc64(_) => powerpc64::Regs::byte_len(),
            Self::RiscV64(_) => riscv64::Regs::byte_len(),
        }
    }

    pub fn architecture(&self) -> Architecture {
        match self {
            Self::AArch64(_) => Architecture::AArch64,
            Self::X86_64(_) => Architecture::X86_64,
            Self::PowerPc64(_) => Architecture::PowerPc64,
            Self::RiscV64(_) => Architecture::RiscV64,
        }
    }

    pub fn pc(&self) -> u64 {
        dispatch!(self, r => r.pc())
    }
    pub fn set_pc(&mut self, v: u64) {
        dispatch!(self, r => r.set_pc(v))
    }
    pub fn sp(&self) -> u64 {
        dispatch!(self, r => r.sp())
    }
    pub fn set_sp(&mut self, v: u64) {
        dispatch!(self, r => r.set_sp(v))
    }
    pub fn fbp(&self) -> u64 {
        dispatch!(self, r => r.fbp())
    }
    pub fn set_fbp(&mut self, v: u64) {
        dispatch!(self, r => r.set_fbp(v))
    }
    pub fn link(&self) -> Option<u64> {
        dispatch!(self, r => r.link())
    }
    pub fn set_link(&mut self, v: u64) {
        dispatch!(self, r => r.set_link(v))
    }

    pub fn reg(&self, number: u16) -> Result<&[u8]> {
        dispatch!(self, r => r.reg(number))
    }
    pub fn reg_mut(&mut self, number: u16) -> Result<&mut [u8]> {
        dispatch!(self, r => r.reg_mut(number))
    }
    pub fn reg_size(&self, number: u16) -> Result<usize> {
        match self {
            Self::AArch64(_) => aarch64::Regs::reg_size(number),
            Self::X86_64(_) => x86_64::Regs::reg_size(number),
            Self::PowerPc64(_) => powerpc64::Regs::reg_size(number),
            Self::RiscV64(_) => riscv64::Regs::reg_size(number),
        }
    }

    pub fn is_callee_saved(&self, number: u16) -> bool {
        match self {
            Self::AArch64(_) => aarch64::Regs::is_callee_saved(number),
            Self::X86_64(_) => x86_64::Regs::is_callee_saved(number),
            Self::PowerPc64(_) => powerpc64::Regs::is_callee_saved(number),
            Self::RiscV64(_) => riscv64::Regs::is_callee_saved(number),
        }
    }

    pub fn callee_saved(&self) -> &'static [CalleeSaved] {
        match self {
            Self::AArch64(_) => aarch64::Regs::callee_saved(),
            Self::X86_64(_) => x86_64::Regs::callee_saved(),
            Self::PowerPc64(_) => powerpc64::Regs::callee_saved(),
            Self::RiscV64(_) => riscv64::Regs::callee_saved(),
        }
    }

    pub fn align_sp(arch: Architecture, sp: u64) -> u64 {
        match arch {
            Architecture::AArch64 => aarch64::Regs::align_sp(sp),
            Architecture::X86_64 => x86_64::Regs::align_sp(sp),
            Architecture::PowerPc64 => powerpc64::Regs::align_sp(sp),
            Architecture::RiscV64 => riscv64::Regs::align_sp(sp),
        }
    }

    pub fn ra_offset(arch: Architecture) -> i64 {
        match arch {
            Architecture::AArch64 => aarch64::Regs::ra_offset(),
            Architecture::X86_64 => x86_64::Regs::ra_offset(),
            Architecture::PowerPc64 => powerpc64::Regs::ra_offset(),
            Architecture::RiscV64 => riscv64::Regs::ra_offset(),
        }
    }

    pub fn cfa_offset_funcentry(arch: Architecture) -> i64 {
        match arch {
            Architecture::AArch64 => aarch64::Regs::cfa_offset_funcentry(),
            Architecture::X86_64 => x86_64::Regs::cfa_offset_funcentry(),
            Architecture::PowerPc64 => powerpc64::Regs::cfa_offset_funcentry(),
            Architecture::RiscV64 => riscv64::Regs::cfa_offset_funcentry(),
        }
    }

    pub fn setup_fbp(&mut self, cfa: u64) {
        dispatch!(self, r => r.setup_fbp(cfa))
    }

    pub fn value_from_instruction(arch: Architecture, mi: MachineOperand) -> Option<ValueGenProgram> {
        match arch {
            Architecture::AArch64 => aarch64::Regs::value_from_instruction(mi),
            Architecture::X86_64 => x86_64::Regs::value_from_instruction(mi),
            Architecture::PowerPc64 => powerpc64::Regs::value_from_instruction(mi),
            Architecture::RiscV64 => riscv64::Regs::value_from_instruction(mi),
        }
    }
}
