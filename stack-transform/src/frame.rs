//! The frame-by-frame rewriter: the core algorithm (spec §4.4). Each call
//! to [`frame_rewrite`] advances the rewrite by exactly one stack frame and
//! either hands back the caller's call-site pair to keep unwinding or
//! signals that the outermost frame has been reached.
//!
//! Location semantics (spec §3's live-value descriptor, filled in the way
//! LLVM's stackmap format does it, which the compiler pass this engine
//! consumes metadata from is modeled on): `Direct` computes an address and
//! that address *is* the value — this is how the address of a
//! stack-allocated object becomes a live pointer value. `Indirect` loads
//! the scalar stored *at* that address. `Register` and the two constant
//! kinds need no address at all. Both `Direct` and `Indirect` resolve their
//! offset against the frame's own CFA rather than the `base_register`
//! field's literal register (see `cfa_relative` below) — the same
//! convention already used for unwind-entry offsets, and one that holds up
//! regardless of which step in `frame_rewrite` runs first.

use crate::context::RewriteContext;
use crate::error::{Result, RewriteError};
use stack_context::{
    is_sentinel, CallSite, Location, RegisterSet,
};

/// What happened at the end of one [`frame_rewrite`] call.
pub enum FrameOutcome {
    /// Unwinding continues into the caller described by this pair.
    Continue(CallSite, CallSite),
    /// The outermost frame (the process or thread entry point) has been
    /// reached; the destination register set's PC and SP are already set.
    Done,
}

pub fn frame_rewrite(
    ctx: &mut RewriteContext,
    src_cs: &CallSite,
    dst_cs: &CallSite,
) -> Result<FrameOutcome> {
    stack_context::cheap_trace!("frame_rewrite: start src_cs={} dst_cs={}", src_cs.id, dst_cs.id);

    let src_arch = ctx.src_regset.architecture();
    let dst_arch = ctx.dst_regset.architecture();

    // --- Step 1: source frame geometry. ---
    let src_fn = ctx
        .src_handle
        .lookup_function(src_cs.return_address)
        .ok_or(RewriteError::BadArgument("no function for source return address"))?
        .clone();
    let src_sp_frame = ctx.src_sp;
    let src_cfa =
        src_sp_frame + u64::from(src_fn.frame_size) + cfa_correction(src_arch);
    ctx.src_cfa = src_cfa;

    // --- Step 2: destination frame geometry. ---
    // Mirrors step 1 exactly: `dst_stack_top` (threaded in via `ctx.dst_sp`)
    // is this frame's own entry SP, the same role `src_regset.sp()` plays
    // for the first source frame. Both cursors grow the same direction
    // (toward the caller, i.e. numerically upward) one frame at a time.
    let dst_fn = ctx
        .dst_handle
        .lookup_function(dst_cs.return_address)
        .ok_or(RewriteError::BadArgument("no function for destination return address"))?
        .clone();
    let dst_sp_frame = RegisterSet::align_sp(dst_arch, ctx.dst_sp);
    let dst_cfa = dst_sp_frame + u64::from(dst_fn.frame_size) + cfa_correction(dst_arch);
    if dst_cfa > ctx.dst_region().high {
        return Err(RewriteError::DestOverflow(dst_cfa));
    }
    ctx.dst_cfa = dst_cfa;

    // --- Step 3: transfer live values. ---
    if src_cs.live_values.len() != dst_cs.live_values.len() {
        return Err(RewriteError::LiveCountMismatch {
            id: src_cs.id,
            src: src_cs.live_values.len(),
            dst: dst_cs.live_values.len(),
        });
    }
    for (src_lv, dst_lv) in src_cs.live_values.iter().zip(dst_cs.live_values.iter()) {
        if src_lv.is_alloca {
            let src_addr = block_address(src_cfa, src_lv.location)?;
            let dst_addr = block_address(dst_cfa, dst_lv.location)?;
            let bytes = ctx.read_src_bytes(src_addr, src_lv.alloca_size as usize)?.to_vec();
            ctx.write_dst_bytes(dst_addr, &bytes)?;
        } else {
            let value = read_value(ctx, &ctx.src_regset, src_cfa, src_lv.location, src_lv.size)?;
            let value = if src_lv.is_pointer {
                match ctx.map_stack_addr(value) {
                    Some(translated) => translated,
                    None => {
                        let dst_write = write_location_addr(dst_cfa, dst_lv.location)?;
                        if let Some(dst_addr) = dst_write {
                            ctx.note_fixup(dst_addr, dst_lv.size, value);
                        }
                        value
                    }
                }
            } else {
                value
            };
            write_value(ctx, dst_cfa, dst_lv.location, dst_lv.size, value)?;
        }
    }
    stack_context::cheap_trace!("frame_rewrite: live values transferred");

    // --- Step 4: transfer arch-specific live values. ---
    for alv in &dst_cs.arch_live_values {
        let value = crate::interpreter::run(ctx, &alv.program)?;
        write_value(ctx, dst_cfa, alv.base.location, alv.base.size, value)?;
    }
    stack_context::cheap_trace!("frame_rewrite: arch live values transferred");

    // --- Step 5: callee-saved restore from source unwind data. ---
    for entry in &src_fn.unwind {
        let size = ctx
            .src_regset
            .reg_size(entry.reg)
            .map_err(RewriteError::BadBinary)?
            .min(8) as u8;
        let addr = (src_cfa as i64 + i64::from(entry.offset_from_fbp)) as u64;
        let value = ctx.read_src(addr, size)?;
        let bytes = ctx
            .src_regset
            .reg_mut(entry.reg)
            .map_err(RewriteError::BadBinary)?;
        bytes[..size as usize].copy_from_slice(&value.to_le_bytes()[..size as usize]);
    }

    // --- Step 6: callee-saved spill into destination unwind slots. ---
    for entry in &dst_fn.unwind {
        let size = ctx
            .dst_regset
            .reg_size(entry.reg)
            .map_err(RewriteError::BadBinary)?
            .min(8) as u8;
        let bytes = ctx
            .dst_regset
            .reg(entry.reg)
            .map_err(RewriteError::BadBinary)?;
        let mut buf = [0u8; 8];
        buf[..size as usize].copy_from_slice(&bytes[..size as usize]);
        let value = u64::from_le_bytes(buf);
        let addr = (dst_cfa as i64 + i64::from(entry.offset_from_fbp)) as u64;
        ctx.write_dst(addr, size, value)?;
    }

    // --- Step 7: set destination FBP. ---
    // PowerPC64's `setup_fbp` convention is `r31 := r1` (the ELFv2 ABI
    // copies the *current* SP into the frame pointer, not a CFA-derived
    // offset like AArch64/RISC-V do), so the destination SP register has to
    // reflect this frame's own entry SP before `setup_fbp` runs, not just
    // whatever was last written into it (the caller-supplied initial value,
    // or a previous frame's SP).
    ctx.dst_regset.set_sp(dst_sp_frame);
    ctx.dst_regset.setup_fbp(dst_cfa);

    // --- Step 8: find the caller's call site. ---
    // The RA slot this frame will get (step 9 below) has to hold the
    // *caller's* resume point, not this frame's own `dst_cs.return_address`
    // — that's this frame's call site, already spent identifying which
    // function `src_fn`/`dst_fn` are. The caller is only identifiable by
    // reading the value the compiler actually put in the source RA slot,
    // so that lookup has to happen before it can be mirrored onto the
    // destination side.
    if src_cfa > ctx.src_region().high {
        return Err(RewriteError::SrcOverflow(src_cfa));
    }
    let ra_read_addr = (src_cfa as i64 + RegisterSet::ra_offset(src_arch)) as u64;
    let caller_ret_addr = ctx.read_src(ra_read_addr, 8)?;
    let next_src_cs = ctx
        .src_handle
        .lookup_cs_by_ret_addr(caller_ret_addr)
        .ok_or(RewriteError::NoCallSite(caller_ret_addr))?
        .clone();

    if is_sentinel(next_src_cs.id) {
        // Bottom of the unwindable stack: this frame has no real caller, so
        // there's nothing meaningful to write into its RA slot.
        ctx.record_frame(src_sp_frame, src_cfa, dst_sp_frame, dst_cfa);
        ctx.src_sp = src_cfa;
        ctx.dst_sp = dst_cfa;
        ctx.dst_regset.set_pc(dst_fn.address);
        ctx.dst_regset
            .set_sp(RegisterSet::align_sp(dst_arch, ctx.dst_sp));
        stack_context::cheap_trace!("frame_rewrite: done at outermost fn {:#x}", dst_fn.address);
        return Ok(FrameOutcome::Done);
    }

    let next_dst_cs = ctx
        .dst_handle
        .lookup_cs_by_id(next_src_cs.id)
        .ok_or(RewriteError::IdMissing(next_src_cs.id))?
        .clone();

    // --- Step 9: write the return-address slot and advance cursors. ---
    let ra_addr = (dst_cfa as i64 + RegisterSet::ra_offset(dst_arch)) as u64;
    ctx.write_dst(ra_addr, 8, next_dst_cs.return_address)?;
    ctx.record_frame(src_sp_frame, src_cfa, dst_sp_frame, dst_cfa);
    ctx.src_sp = src_cfa;
    ctx.dst_sp = dst_cfa;

    Ok(FrameOutcome::Continue(next_src_cs, next_dst_cs))
}

fn cfa_correction(arch: stack_context::Architecture) -> u64 {
    RegisterSet::cfa_offset_funcentry(arch) as u64
}

fn reg_u64(regset: &RegisterSet, reg: u16) -> Result<u64> {
    let bytes = regset.reg(reg).map_err(RewriteError::BadBinary)?;
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    Ok(u64::from_le_bytes(buf))
}

/// `Direct`/`Indirect` descriptors carry a `base_register` field for
/// documentation purposes (it identifies which frame-base register the
/// compiler emitted the offset against), but this engine resolves both
/// exclusively against the frame's own CFA — the same convention already
/// used for unwind-entry offsets. This sidesteps the ordering problem a
/// literal register read would have on the destination side: a frame's own
/// FBP isn't written into `dst_regset` until step 7, which runs after step
/// 3 transfers that same frame's live values.
fn cfa_relative(cfa: u64, offset: i32) -> u64 {
    (cfa as i64).wrapping_add(i64::from(offset)) as u64
}

/// Resolves the address of an alloca block, regardless of whether its
/// descriptor is `Direct` (the block's own address) or `Indirect` (a
/// pointer to the block stored in a stack slot).
fn block_address(cfa: u64, loc: Location) -> Result<u64> {
    match loc {
        Location::Direct { offset, .. } => Ok(cfa_relative(cfa, offset)),
        Location::Indirect { .. } => Err(RewriteError::BadArgument(
            "indirect alloca descriptors are not supported",
        )),
        _ => Err(RewriteError::BadArgument(
            "alloca live value must be a stack location",
        )),
    }
}

/// Reads a non-alloca live value out of the *source* side (the only side
/// `read_value` is ever called against — destination values are produced
/// by `write_value` and the interpreter, never read back during a rewrite).
fn read_value(
    ctx: &RewriteContext,
    regset: &RegisterSet,
    cfa: u64,
    loc: Location,
    size: u8,
) -> Result<u64> {
    match loc {
        Location::Register { regnum } => reg_u64(regset, regnum),
        Location::Direct { offset, .. } => Ok(cfa_relative(cfa, offset)),
        Location::Indirect { offset, .. } => ctx.read_src(cfa_relative(cfa, offset), size),
        Location::Constant(c) => Ok(c as i64 as u64),
        Location::ConstIndex(idx) => ctx
            .src_handle
            .constant(idx)
            .ok_or(RewriteError::BadArgument("constant index out of range")),
    }
}

fn write_value(ctx: &mut RewriteContext, cfa: u64, loc: Location, size: u8, value: u64) -> Result<()> {
    match loc {
        Location::Register { regnum } => {
            let bytes = ctx.dst_regset.reg_mut(regnum).map_err(RewriteError::BadBinary)?;
            let n = (size as usize).min(bytes.len());
            bytes[..n].copy_from_slice(&value.to_le_bytes()[..n]);
            Ok(())
        }
        Location::Direct { .. } => Ok(()),
        Location::Indirect { offset, .. } => ctx.write_dst(cfa_relative(cfa, offset), size, value),
        Location::Constant(_) | Location::ConstIndex(_) => Ok(()),
    }
}

/// Returns the address a fixup should eventually be written to, for
/// `Indirect` destination locations; `Direct`/`Register`/constant
/// destinations don't have a deferred-write address (see `write_value`).
fn write_location_addr(cfa: u64, loc: Location) -> Result<Option<u64>> {
    match loc {
        Location::Indirect { offset, .. } => Ok(Some(cfa_relative(cfa, offset))),
        _ => Ok(None),
    }
}
