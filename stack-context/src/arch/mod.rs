//! Per-architecture register-file plugins.
//!
//! Each submodule is a leaf: it knows nothing about metadata, call sites, or
//! rewriting, only about one architecture's register file and a handful of
//! ABI conventions (spec §4.1). [`crate::RegisterSet`] is the tagged union
//! that dispatches a single `match` on [`Architecture`] to the right one,
//! per the "Dynamic dispatch over arch" design note.

pub mod aarch64;
pub mod powerpc64;
pub mod riscv64;
pub mod x86_64;

use crate::error::{Error, Result};
use std::fmt;

/// Identifies one of the four instruction set architectures this engine
/// knows how to rewrite stacks between.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Architecture {
    AArch64 = 0,
    X86_64 = 1,
    PowerPc64 = 2,
    RiscV64 = 3,
}

impl Architecture {
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Self::AArch64),
            1 => Ok(Self::X86_64),
            2 => Ok(Self::PowerPc64),
            3 => Ok(Self::RiscV64),
            _ => Err(Error::BadBinary("unrecognized architecture tag")),
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Stack alignment, in bytes, required at a call site's return address
    /// by this architecture's ABI. Informative; [`RegisterSet::align_sp`]
    /// is the authoritative operation.
    pub fn call_alignment(self) -> u64 {
        match self {
            Self::AArch64 | Self::X86_64 | Self::PowerPc64 | Self::RiscV64 => 16,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AArch64 => "aarch64",
            Self::X86_64 => "x86_64",
            Self::PowerPc64 => "powerpc64",
            Self::RiscV64 => "riscv64",
        })
    }
}

/// A register slot: either a general-purpose/integer register or a
/// floating-point/SIMD one, named by the architecture's DWARF-style number.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RegClass {
    Gpr,
    Fpr,
}

/// One callee-saved register, as returned by [`RegisterSet::callee_saved`].
#[derive(Debug, Copy, Clone)]
pub struct CalleeSaved {
    pub reg: u16,
    pub size: u8,
}
