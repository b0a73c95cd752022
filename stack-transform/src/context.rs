//! [`RewriteContext`]: the per-call heap the frame rewriter operates on
//! (spec §3, §4.3). Owns both register sets, both stack cursors, the
//! pointer-fixup worklist, and the frame-geometry history used to translate
//! intra-stack pointers.

use crate::error::{Result, RewriteError};
use stack_context::{Handle, RegisterSet};

/// A `[low, high)` byte range backing one side of a rewrite: the live
/// source stack being unwound, or the destination stack half being built.
#[derive(Debug, Clone, Copy)]
pub struct StackRegion {
    pub low: u64,
    pub high: u64,
}

impl StackRegion {
    pub fn new(low: u64, high: u64) -> Self {
        Self { low, high }
    }

    fn contains(&self, addr: u64, size: usize) -> bool {
        addr >= self.low
            && addr
                .checked_add(size as u64)
                .is_some_and(|end| end <= self.high)
    }
}

/// The address range a single frame occupied on each side, recorded once
/// that frame's destination geometry is known, so later frames' pointers
/// into it can be translated without walking a per-byte map.
#[derive(Debug, Clone, Copy)]
struct FrameGeometry {
    src_lo: u64,
    src_hi: u64,
    dst_lo: u64,
    dst_hi: u64,
}

impl FrameGeometry {
    fn translate(&self, src_addr: u64) -> Option<u64> {
        if src_addr >= self.src_lo && src_addr < self.src_hi {
            Some(self.dst_lo + (src_addr - self.src_lo))
        } else {
            None
        }
    }
}

/// A deferred write: `value` (the translated address, once known) must
/// land at `dst_addr` before the rewrite can be considered complete.
#[derive(Debug, Clone, Copy)]
struct Fixup {
    dst_addr: u64,
    size: u8,
    src_addr: u64,
}

pub struct RewriteContext {
    pub src_handle: Handle,
    pub dst_handle: Handle,
    pub src_regset: RegisterSet,
    pub dst_regset: RegisterSet,
    src_region: StackRegion,
    dst_region: StackRegion,
    pub src_sp: u64,
    pub dst_sp: u64,
    pub src_cfa: u64,
    pub dst_cfa: u64,
    frames: Vec<FrameGeometry>,
    fixups: Vec<Fixup>,
}

impl RewriteContext {
    pub fn new(
        src_handle: Handle,
        dst_handle: Handle,
        src_regset: RegisterSet,
        dst_regset: RegisterSet,
        src_region: StackRegion,
        dst_region: StackRegion,
        dst_stack_top: u64,
    ) -> Self {
        let src_sp = src_regset.sp();
        Self {
            src_handle,
            dst_handle,
            src_regset,
            dst_regset,
            src_region,
            dst_region,
            src_sp,
            dst_sp: dst_stack_top,
            src_cfa: 0,
            dst_cfa: 0,
            frames: Vec::new(),
            fixups: Vec::new(),
        }
    }

    pub fn src_region(&self) -> StackRegion {
        self.src_region
    }

    pub fn dst_region(&self) -> StackRegion {
        self.dst_region
    }

    /// Reads `size` (1/2/4/8) little-endian bytes from the source stack at
    /// `addr`, zero-extended into a `u64`.
    pub fn read_src(&self, addr: u64, size: u8) -> Result<u64> {
        let bytes = self.read_src_bytes(addr, size as usize)?;
        let mut buf = [0u8; 8];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_src_bytes(&self, addr: u64, len: usize) -> Result<&[u8]> {
        if !self.src_region.contains(addr, len) {
            return Err(RewriteError::OutOfBounds {
                addr,
                size: len,
                low: self.src_region.low,
                high: self.src_region.high,
            });
        }
        // Safety: `addr` was just bounds-checked against the source stack
        // region, which the caller guarantees is a live, readable mapping
        // for the duration of this rewrite (spec §5: all reads of the
        // source stack happen-before any destination write).
        Ok(unsafe { std::slice::from_raw_parts(addr as *const u8, len) })
    }

    pub fn write_dst(&mut self, addr: u64, size: u8, value: u64) -> Result<()> {
        self.write_dst_bytes(addr, &value.to_le_bytes()[..size as usize])
    }

    pub fn write_dst_bytes(&mut self, addr: u64, bytes: &[u8]) -> Result<()> {
        if !self.dst_region.contains(addr, bytes.len()) {
            return Err(RewriteError::OutOfBounds {
                addr,
                size: bytes.len(),
                low: self.dst_region.low,
                high: self.dst_region.high,
            });
        }
        // Safety: bounds-checked above; the destination half is owned
        // exclusively by this rewrite until it returns successfully.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), addr as *mut u8, bytes.len());
        }
        Ok(())
    }

    /// Records that the frame spanning `[src_lo, src_hi)` on the source
    /// side now occupies `[dst_lo, dst_hi)` on the destination side, making
    /// pointers into it translatable.
    pub fn record_frame(&mut self, src_lo: u64, src_hi: u64, dst_lo: u64, dst_hi: u64) {
        self.frames.push(FrameGeometry {
            src_lo,
            src_hi,
            dst_lo,
            dst_hi,
        });
    }

    /// Translates a source-stack pointer to its destination-stack
    /// counterpart, if the frame it points into has already been laid out.
    pub fn map_stack_addr(&self, src_addr: u64) -> Option<u64> {
        self.frames.iter().find_map(|f| f.translate(src_addr))
    }

    /// Defers a pointer translation until the frame owning `src_addr` has
    /// been laid out.
    pub fn note_fixup(&mut self, dst_addr: u64, size: u8, src_addr: u64) {
        self.fixups.push(Fixup {
            dst_addr,
            size,
            src_addr,
        });
    }

    /// Resolves every pending fixup. Must be called once, after the whole
    /// stack has been rewritten; any entry that still can't be translated
    /// fails the entire rewrite with `DanglingFixup`.
    pub fn resolve_fixups(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.fixups);
        for fixup in pending {
            let dst_addr = self
                .map_stack_addr(fixup.src_addr)
                .ok_or(RewriteError::DanglingFixup {
                    dst_addr: fixup.dst_addr,
                })?;
            self.write_dst(fixup.dst_addr, fixup.size, dst_addr)?;
        }
        Ok(())
    }
}
