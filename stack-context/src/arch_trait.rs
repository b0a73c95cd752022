//! The uniform interface every arch plugin implements (spec §4.1).
//!
//! [`crate::RegisterSet`] is a tagged union over the four concrete types
//! that implement this trait; its own methods are a single `match` that
//! forwards to whichever variant is active. No virtual dispatch, no
//! function-pointer vtable: the match is resolved and (for the hot,
//! per-frame-register-access paths) inlined at each call site, per spec §9.

use crate::error::Result;
use crate::valuegen::{MachineOperand, ValueGenProgram};
use crate::{Architecture, CalleeSaved};

pub trait ArchPlugin: Sized + Clone {
    const ARCH: Architecture;

    fn new() -> Self;

    /// Build a register set from the architecture's fixed raw byte layout
    /// (spec §3: "the raw byte layout of a regset is fixed per architecture
    /// and is what the OS migration primitive consumes").
    fn copy_in(bytes: &[u8]) -> Result<Self>;

    /// Serialize back to that same fixed raw byte layout.
    fn copy_out(&self, out: &mut [u8]);

    /// Size in bytes of the raw layout produced by [`Self::copy_out`].
    fn byte_len() -> usize;

    fn pc(&self) -> u64;
    fn set_pc(&mut self, value: u64);
    fn sp(&self) -> u64;
    fn set_sp(&mut self, value: u64);
    fn fbp(&self) -> u64;
    fn set_fbp(&mut self, value: u64);
    /// Not every architecture has a dedicated link register (x86-64 keeps
    /// the return address on the stack instead), hence `Option`.
    fn link(&self) -> Option<u64>;
    fn set_link(&mut self, value: u64);

    fn reg(&self, number: u16) -> Result<&[u8]>;
    fn reg_mut(&mut self, number: u16) -> Result<&mut [u8]>;
    fn reg_size(number: u16) -> Result<usize>;

    fn is_callee_saved(number: u16) -> bool;
    fn callee_saved() -> &'static [CalleeSaved];

    /// Round `sp` up/down to this architecture's incoming-call-site
    /// alignment (spec §4.1).
    fn align_sp(sp: u64) -> u64;

    /// Byte offset from the CFA where the return address slot lives.
    fn ra_offset() -> i64;

    /// Offset of the CFA from SP at function entry.
    fn cfa_offset_funcentry() -> i64;

    /// Set this register set's frame-base register from a known CFA, per
    /// this architecture's convention (spec §4.1, listed per-arch).
    fn setup_fbp(&mut self, cfa: u64);

    /// Only ever called while metadata is being *built*, never during a
    /// rewrite; translates a machine operand into a portable
    /// value-generation program, or `None` if this plugin doesn't (yet)
    /// know how to derive a value from that shape of operand.
    fn value_from_instruction(mi: MachineOperand) -> Option<ValueGenProgram>;
}
