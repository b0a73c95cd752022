//! The value-generation program vocabulary (spec §4.5).
//!
//! These types are the *data* produced by an arch plugin's
//! [`crate::arch_trait::ArchPlugin::value_from_instruction`] hook and stored
//! alongside arch-specific live values. The tiny stack-machine that
//! *executes* a [`ValueGenProgram`] against a live register set and frame
//! lives in the `stack-transform` crate, since running one needs the
//! rewrite context's view of stack slots and constant pools, not just the
//! arch plugin.

/// A single instruction in a value-generation program. `size` fields are in
/// bytes and apply to the immediate's sign/zero-extension width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    SetImm { size: u8, value: i64 },
    SetReg { reg: u16 },
    SetStackSlot { idx: u16 },
    SetConstPool { idx: u16 },
    SetSymbol { symbol_idx: u32 },
    AddImm(i64),
    AddReg(u16),
    MulImm(i64),
    LeftShift(u8),
    RightShiftLog(u8),
    Mask(u64),
}

impl Instruction {
    /// The opcode byte used in the on-disk encoding (spec §6's
    /// `arch-live-values` section embeds an operand descriptor plus an
    /// "inst-type" byte, which is this opcode).
    pub fn opcode(self) -> u8 {
        match self {
            Self::SetImm { .. } => 0,
            Self::SetReg { .. } => 1,
            Self::SetStackSlot { .. } => 2,
            Self::SetConstPool { .. } => 3,
            Self::SetSymbol { .. } => 4,
            Self::AddImm(_) => 5,
            Self::AddReg(_) => 6,
            Self::MulImm(_) => 7,
            Self::LeftShift(_) => 8,
            Self::RightShiftLog(_) => 9,
            Self::Mask(_) => 10,
        }
    }
}

/// Programs are short (spec §4.5: typically <= 8 instructions); the inline
/// capacity avoids a heap allocation for the common case while still
/// allowing longer ones to spill onto the heap.
pub type ValueGenProgram = smallvec::SmallVec<[Instruction; 8]>;

/// The small set of machine instructions a compiler emitter can describe
/// and that [`crate::arch_trait::ArchPlugin::value_from_instruction`]
/// understands (spec §4.1, §9 open question (b)). Anything outside this set
/// is rejected at *metadata-build* time, not at rewrite time — by the time
/// the engine sees a [`ValueGenProgram`] it is already known-good.
#[derive(Debug, Clone, Copy)]
pub enum MachineOperand {
    /// `LEA dst, [base + offset]` and architecture equivalents.
    LoadEffectiveAddress { base_reg: u16, offset: i32 },
    /// Load of an absolute address materialized across one or more
    /// instructions (`MOVaddr`, `adrp`+`add`, etc.).
    MovAddress { symbol_idx: u32 },
    /// Move of a known immediate into a register.
    MovImmediate { size: u8, value: i64 },
    /// A floating-point register-to-register move.
    FpMove { src_reg: u16 },
    /// A bit-field extract (`UBFX`/`rlwinm`-style), producing `(value >>
    /// shift) & mask`.
    BitFieldExtract { shift: u8, mask: u64 },
}
