//! Top-level driver (spec §4.6): wires [`crate::frame::frame_rewrite`] into
//! the full stack walk, and exposes the userspace entry points callers use
//! to invoke one.

use crate::context::{RewriteContext, StackRegion};
use crate::error::{Result, RewriteError};
use crate::frame::{self, FrameOutcome};
use stack_context::{Architecture, Handle, RegisterSet};

/// Rewrites an entire suspended stack from `src_regset`'s architecture onto
/// `dst_regset`'s, frame by frame, until a sentinel call site is reached.
///
/// On success, `dst_regset`'s PC and SP are set to resume execution at the
/// outermost frame, and every destination byte below `dst_stack_top` down
/// to the final `dst_regset.sp()` has been written. On failure the source
/// thread's state is untouched; the destination half must be treated as
/// garbage by the caller.
pub fn rewrite_stack(
    src_handle: Handle,
    src_regset: RegisterSet,
    src_region: StackRegion,
    dst_handle: Handle,
    dst_regset: RegisterSet,
    dst_region: StackRegion,
    dst_stack_top: u64,
) -> Result<RegisterSet> {
    let src_pc = src_regset.pc();
    let mut src_cs = src_handle
        .lookup_cs_by_ret_addr(src_pc)
        .ok_or(RewriteError::NoCallSite(src_pc))?
        .clone();
    let mut dst_cs = dst_handle
        .lookup_cs_by_id(src_cs.id)
        .ok_or(RewriteError::IdMissing(src_cs.id))?
        .clone();

    let mut ctx = RewriteContext::new(
        src_handle,
        dst_handle,
        src_regset,
        dst_regset,
        src_region,
        dst_region,
        dst_stack_top,
    );

    loop {
        match frame::frame_rewrite(&mut ctx, &src_cs, &dst_cs) {
            Ok(FrameOutcome::Continue(next_src, next_dst)) => {
                log::debug!(
                    "rewrote frame cs={} src_cfa={:#x} dst_cfa={:#x}",
                    src_cs.id,
                    ctx.src_cfa,
                    ctx.dst_cfa
                );
                src_cs = next_src;
                dst_cs = next_dst;
            }
            Ok(FrameOutcome::Done) => {
                log::debug!(
                    "rewrote frame cs={} src_cfa={:#x} dst_cfa={:#x} (outermost)",
                    src_cs.id,
                    ctx.src_cfa,
                    ctx.dst_cfa
                );
                break;
            }
            Err(e) => {
                log::error!("frame rewrite failed at cs={}: {e}", src_cs.id);
                return Err(e);
            }
        }
    }

    ctx.resolve_fixups()?;
    Ok(ctx.dst_regset)
}

/// Rewrites only the top frame, per spec §4.6's `rewrite_ondemand`. Declared
/// for future use; deeper frames are left untouched and a caller-supplied
/// trampoline must re-invoke the rewriter as the thread unwinds further.
/// Not required for conformance — `rewrite_stack` is the baseline.
pub fn rewrite_ondemand(
    src_handle: Handle,
    src_regset: RegisterSet,
    src_region: StackRegion,
    dst_handle: Handle,
    dst_regset: RegisterSet,
    dst_region: StackRegion,
    dst_stack_top: u64,
) -> Result<RegisterSet> {
    let src_pc = src_regset.pc();
    let src_cs = src_handle
        .lookup_cs_by_ret_addr(src_pc)
        .ok_or(RewriteError::NoCallSite(src_pc))?
        .clone();
    let dst_cs = dst_handle
        .lookup_cs_by_id(src_cs.id)
        .ok_or(RewriteError::IdMissing(src_cs.id))?
        .clone();

    let mut ctx = RewriteContext::new(
        src_handle,
        dst_handle,
        src_regset,
        dst_regset,
        src_region,
        dst_region,
        dst_stack_top,
    );
    if let Err(e) = frame::frame_rewrite(&mut ctx, &src_cs, &dst_cs) {
        log::error!("frame rewrite failed at cs={}: {e}", src_cs.id);
        return Err(e);
    }
    log::debug!(
        "rewrote frame cs={} src_cfa={:#x} dst_cfa={:#x}",
        src_cs.id,
        ctx.src_cfa,
        ctx.dst_cfa
    );
    ctx.resolve_fixups()?;
    Ok(ctx.dst_regset)
}

/// Userspace entry point (spec §6): copies the source register bytes in,
/// rewrites the stack, and copies the destination register bytes back out.
/// Returns 0 on success, a nonzero code on failure so callers without
/// access to `RewriteError` can still branch on it.
pub fn userspace_rewrite(
    src_handle: Handle,
    src_stack: StackRegion,
    src_arch: Architecture,
    src_regs: &[u8],
    dst_handle: Handle,
    dst_stack: StackRegion,
    dst_arch: Architecture,
    dst_regs: &mut [u8],
) -> i32 {
    match userspace_rewrite_inner(
        src_handle, src_stack, src_arch, src_regs, dst_handle, dst_stack, dst_arch, dst_regs,
    ) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

fn userspace_rewrite_inner(
    src_handle: Handle,
    src_stack: StackRegion,
    src_arch: Architecture,
    src_regs: &[u8],
    dst_handle: Handle,
    dst_stack: StackRegion,
    dst_arch: Architecture,
    dst_regs: &mut [u8],
) -> Result<()> {
    let src_regset = RegisterSet::copy_in(src_arch, src_regs).map_err(RewriteError::BadBinary)?;
    let dst_regset = RegisterSet::copy_in(dst_arch, dst_regs).map_err(RewriteError::BadBinary)?;
    let dst_stack_top = dst_stack.high;
    let result = rewrite_stack(
        src_handle,
        src_regset,
        src_stack,
        dst_handle,
        dst_regset,
        dst_stack,
        dst_stack_top,
    )?;
    result.copy_out(dst_regs);
    Ok(())
}

macro_rules! homogeneous_entry {
    ($name:ident, $arch:expr) => {
        /// Homogeneous-architecture debugging variant of
        /// [`userspace_rewrite`], for exercising the rewriter without a
        /// cross-ISA sibling binary.
        pub fn $name(
            src_handle: Handle,
            src_stack: StackRegion,
            src_regs: &[u8],
            dst_handle: Handle,
            dst_stack: StackRegion,
            dst_regs: &mut [u8],
        ) -> i32 {
            userspace_rewrite(
                src_handle, src_stack, $arch, src_regs, dst_handle, dst_stack, $arch, dst_regs,
            )
        }
    };
}

homogeneous_entry!(userspace_rewrite_aarch64, Architecture::AArch64);
homogeneous_entry!(userspace_rewrite_x86_64, Architecture::X86_64);
homogeneous_entry!(userspace_rewrite_powerpc64, Architecture::PowerPc64);
homogeneous_entry!(userspace_rewrite_riscv64, Architecture::RiscV64);
