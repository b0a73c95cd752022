//! Reads the sibling-binary paths a real heterogeneous run needs (spec §6):
//! one `<ARCH>_BIN` environment variable per architecture, each pointing at
//! a binary built with this engine's metadata emitted into it. The seed
//! scenarios never consult this — they build their own synthetic binaries
//! in-process — but `main.rs`'s `migrate` subcommand does, the same way a
//! real caller would load the two binaries from the migration destination
//! pair before invoking `userspace_rewrite`.

use anyhow::{Context, Result};
use stack_context::{Architecture, Handle, MetadataStore};
use std::path::PathBuf;

fn env_var(arch: Architecture) -> &'static str {
    match arch {
        Architecture::AArch64 => "AARCH64_BIN",
        Architecture::X86_64 => "X86_64_BIN",
        Architecture::PowerPc64 => "POWERPC64_BIN",
        Architecture::RiscV64 => "RISCV64_BIN",
    }
}

/// Looks up and loads the binary registered for `arch` via its `<ARCH>_BIN`
/// environment variable.
pub fn load_binary(arch: Architecture) -> Result<Handle> {
    let var = env_var(arch);
    let path = std::env::var_os(var)
        .map(PathBuf::from)
        .with_context(|| format!("{var} is not set"))?;
    MetadataStore::load(&path).with_context(|| format!("failed to load {} from {var}", path.display()))
}
