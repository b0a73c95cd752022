//! Value-generation program interpreter (spec §4.5): a branchless,
//! allocation-free stack machine over a single 64-bit accumulator,
//! executed once per arch-specific live value during step 4 of
//! [`crate::frame::frame_rewrite`].
//!
//! Every operand the programs reference — registers, stack slots, the
//! constant pool, symbols — resolves against the *destination* side, since
//! these programs exist to rematerialize a value that only makes sense on
//! the architecture being rewritten onto (a TOC pointer, a recomputed
//! frame-internal address, and so on).

use crate::context::RewriteContext;
use crate::error::{Result, RewriteError};
use stack_context::{Instruction, ValueGenProgram};

/// Bytes occupied by one stack slot when resolving `SetStackSlot`. The
/// on-disk format doesn't carry per-slot widths, so slots are addressed as
/// a dense array of 8-byte words below the frame's CFA; this matches every
/// arch plugin's GPR width and is the same convention the frame rewriter
/// uses for its own spill-slot bookkeeping.
const STACK_SLOT_WIDTH: u64 = 8;

pub fn run(ctx: &RewriteContext, program: &ValueGenProgram) -> Result<u64> {
    let mut acc: u64 = 0;
    for inst in program.iter() {
        acc = step(ctx, acc, *inst)?;
    }
    Ok(acc)
}

fn step(ctx: &RewriteContext, acc: u64, inst: Instruction) -> Result<u64> {
    Ok(match inst {
        Instruction::SetImm { value, .. } => value as u64,
        Instruction::SetReg { reg } => {
            let bytes = ctx.dst_regset.reg(reg).map_err(RewriteError::BadBinary)?;
            read_le(bytes)
        }
        Instruction::SetStackSlot { idx } => ctx.dst_cfa - (u64::from(idx) + 1) * STACK_SLOT_WIDTH,
        Instruction::SetConstPool { idx } => {
            ctx.dst_handle
                .constant(u32::from(idx))
                .ok_or(RewriteError::BadArgument("constant-pool index out of range"))?
        }
        Instruction::SetSymbol { symbol_idx } => {
            // The on-disk format doesn't carry a separate symbol table
            // distinct from the constant pool (spec §6 names only
            // `constants`); symbol addresses are folded into the same
            // per-binary pool, indexed the same way (documented decision,
            // see DESIGN.md).
            ctx.dst_handle
                .constant(symbol_idx)
                .ok_or(RewriteError::BadArgument("symbol index out of range"))?
        }
        Instruction::AddImm(v) => acc.wrapping_add(v as u64),
        Instruction::AddReg(reg) => {
            let bytes = ctx.dst_regset.reg(reg).map_err(RewriteError::BadBinary)?;
            acc.wrapping_add(read_le(bytes))
        }
        Instruction::MulImm(v) => acc.wrapping_mul(v as u64),
        Instruction::LeftShift(n) => acc.wrapping_shl(u32::from(n)),
        Instruction::RightShiftLog(n) => acc.wrapping_shr(u32::from(n)),
        Instruction::Mask(m) => acc & m,
    })
}

fn read_le(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    u64::from_le_bytes(buf)
}
