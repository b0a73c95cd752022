//! Portable per-architecture register sets and call-site metadata for
//! cross-ISA stack transformation.
//!
//! This crate owns the data model shared by every piece of the engine: the
//! four architecture plugins and the [`RegisterSet`] tagged union over them,
//! the value-generation program vocabulary, the on-disk binary layout, and
//! the in-memory [`metadata::MetadataStore`] built from it. It has no
//! opinion about live threads, process memory, or the actual rewrite
//! algorithm — that's `stack-transform`.

mod arch;
mod arch_trait;
mod binformat;
mod error;
mod metadata;
mod regset;
mod valuegen;

pub mod introspect;

pub use arch::{Architecture, CalleeSaved, RegClass};
pub use arch_trait::ArchPlugin;
pub use error::{Error, Result};
pub use metadata::{
    is_sentinel, ArchLiveValue, CallSite, Function, Handle, Location, LiveValueDescriptor,
    MetadataStore, UnwindEntry, SENTINEL_C11_THREAD_ENTRY, SENTINEL_PROCESS_ENTRY,
    SENTINEL_PTHREAD_ENTRY,
};
pub use regset::RegisterSet;
pub use valuegen::{Instruction, MachineOperand, ValueGenProgram};

/// Emits a trace-level log line only when the `trace-frames` feature is on.
///
/// Per-frame rewriting runs in a hot path during live migration; this keeps
/// the formatting and `log::log!` call itself compiled out entirely in
/// release builds that don't opt into per-frame tracing, the same way
/// `crash-handler`'s `debug_print!` is gated behind its `debug-print`
/// feature.
#[macro_export]
macro_rules! cheap_trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "trace-frames")]
        {
            log::trace!($($arg)*);
        }
    };
}
