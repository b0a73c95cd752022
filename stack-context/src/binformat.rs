//! On-disk section layouts (spec §6), bit-exact with the compiler emitter.
//!
//! Every record here is read out of a memory-mapped binary with `scroll`'s
//! `Pread` derive rather than by hand-rolled offset arithmetic, the same
//! way `minidumper`'s Windows/macOS backends use `scroll` to read packed
//! FFI structures off the wire.

use scroll::{Pread, Pwrite};

/// Sentinel `name_off`/`cu_off` value meaning "no name available" (spec
/// §4.2's function records are emitted even for functions the compiler
/// stripped debug info from).
pub const NO_NAME: u64 = u64::MAX;

/// `function-records` entry.
#[derive(Debug, Clone, Copy, Pread, Pwrite)]
pub struct FunctionRecord {
    pub addr: u64,
    pub code_size: u32,
    pub frame_size: u32,
    pub n_unwind: u16,
    pub unwind_off: u64,
    pub n_slots: u16,
    pub slots_off: u64,
    /// Offset into the `strtab` section of this function's
    /// nul-terminated name, or [`NO_NAME`].
    pub name_off: u64,
    /// Offset into `strtab` of the owning compilation unit's name, or
    /// [`NO_NAME`].
    pub cu_off: u64,
}

/// `unwind` entry (entsize = 4).
#[derive(Debug, Clone, Copy, Pread, Pwrite)]
pub struct UnwindEntryRaw {
    pub reg: u16,
    pub offset_from_fbp: i16,
}

/// `unwind-arange` entry (entsize = 16).
#[derive(Debug, Clone, Copy, Pread, Pwrite)]
pub struct UnwindArange {
    pub fn_addr: u64,
    pub unwind_slice_off: u64,
}

/// `call-sites-by-id` / `call-sites-by-addr` entry (identical layout, the
/// two sections just differ in sort order).
#[derive(Debug, Clone, Copy, Pread, Pwrite)]
pub struct CallSiteRaw {
    pub id: u64,
    pub function_index: u32,
    pub return_address: u64,
    pub n_live: u16,
    pub live_off: u64,
    pub n_arch: u16,
    pub arch_off: u64,
}

/// Location-kind tag embedded in a live-value descriptor's `type` nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LocationKind {
    Register = 1,
    Direct = 2,
    Indirect = 3,
    Constant = 4,
    ConstIndex = 5,
}

impl LocationKind {
    pub fn from_nibble(n: u8) -> Option<Self> {
        match n {
            1 => Some(Self::Register),
            2 => Some(Self::Direct),
            3 => Some(Self::Indirect),
            4 => Some(Self::Constant),
            5 => Some(Self::ConstIndex),
            _ => None,
        }
    }
}

/// `live-values` entry.
#[derive(Debug, Clone, Copy, Pread, Pwrite)]
pub struct LiveValueRaw {
    pub flags: u8,
    pub size: u8,
    pub regnum: u16,
    pub offset_or_constant: i32,
    pub alloca_size: u32,
}

impl LiveValueRaw {
    pub const IS_POINTER: u8 = 1 << 0;
    pub const IS_ALLOCA: u8 = 1 << 1;
    pub const IS_DUPLICATE: u8 = 1 << 2;
    pub const IS_TEMPORARY: u8 = 1 << 3;

    pub fn is_pointer(&self) -> bool {
        self.flags & Self::IS_POINTER != 0
    }
    pub fn is_alloca(&self) -> bool {
        self.flags & Self::IS_ALLOCA != 0
    }
    pub fn location_kind(&self) -> Option<LocationKind> {
        LocationKind::from_nibble(self.flags >> 4)
    }
}

/// `arch-live-values` entry: the same fields as a live value, plus an
/// operand descriptor (opcode + up to two encoded operands) describing the
/// value-generation program to run (spec §4.5, §6).
#[derive(Debug, Clone, Copy, Pread, Pwrite)]
pub struct ArchLiveValueRaw {
    pub base: LiveValueRaw,
    pub n_instructions: u16,
    pub instructions_off: u64,
}

/// A single encoded value-generation instruction, as stored in the
/// `instructions_off` slice referenced by [`ArchLiveValueRaw`].
#[derive(Debug, Clone, Copy, Pread, Pwrite)]
pub struct EncodedInstruction {
    pub opcode: u8,
    pub operand_size: u8,
    pub operand_a: u32,
    pub operand_b: i64,
}
