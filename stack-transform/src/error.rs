//! The rewriter's failure taxonomy (spec §7), built on `thiserror` the way
//! `minidumper`'s richer, cross-process error type is — as opposed to
//! `stack-context`'s lower-level, hand-written `Error`, which this type
//! wraps via `#[from]`.

use stack_context::Architecture;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("bad argument: {0}")]
    BadArgument(&'static str),

    #[error(transparent)]
    BadBinary(#[from] stack_context::Error),

    #[error("no call site registered at return address {0:#x}")]
    NoCallSite(u64),

    #[error("call site {0} has no twin in the destination binary")]
    IdMissing(u64),

    #[error("live-value count mismatch at call site {id}: source has {src}, destination has {dst}")]
    LiveCountMismatch { id: u64, src: usize, dst: usize },

    #[error("register {reg} does not exist on {arch}")]
    UnknownRegister { arch: Architecture, reg: u16 },

    #[error("unknown live-value location kind {0}")]
    UnknownValueKind(u8),

    #[error("unknown value-generation instruction opcode {0}")]
    UnknownInstruction(u8),

    #[error("fixup for destination address {dst_addr:#x} was never resolved")]
    DanglingFixup { dst_addr: u64 },

    #[error("source cursor at {0:#x} walked past the stack base without hitting a sentinel call site")]
    SrcOverflow(u64),

    #[error("destination stack pointer {0:#x} crossed out of its half")]
    DestOverflow(u64),

    #[error("out-of-bounds stack access at {addr:#x} (size {size}), valid range is [{low:#x}, {high:#x})")]
    OutOfBounds {
        addr: u64,
        size: usize,
        low: u64,
        high: u64,
    },

    #[error("failed to query stack bounds: {0}")]
    StackBounds(&'static str),
}

pub type Result<T> = std::result::Result<T, RewriteError>;
