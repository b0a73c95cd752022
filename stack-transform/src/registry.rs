//! Process-wide registered-binary table (spec §9's "per-process registered
//! arch binaries table", one of the two pieces of allowed global mutable
//! state). Read-mostly: binaries are registered once at process start and
//! looked up by architecture on every rewrite thereafter, mirroring
//! `crash-handler`'s use of a single process-global mutex for its one piece
//! of shared state, the saved sigaltstack.

use stack_context::{Architecture, Handle};
use std::collections::HashMap;
use std::sync::OnceLock;

static REGISTRY: OnceLock<parking_lot::RwLock<HashMap<Architecture, Handle>>> = OnceLock::new();

fn table() -> &'static parking_lot::RwLock<HashMap<Architecture, Handle>> {
    REGISTRY.get_or_init(|| parking_lot::RwLock::new(HashMap::new()))
}

/// Registers `handle` as the binary for `arch`, replacing any prior entry.
pub fn register(arch: Architecture, handle: Handle) {
    table().write().insert(arch, handle);
}

/// Looks up a previously registered binary by architecture.
pub fn lookup(arch: Architecture) -> Option<Handle> {
    table().read().get(&arch).cloned()
}

/// Removes a registered binary, if any. Mainly useful for tests, which
/// otherwise leak entries into this process-global table across cases.
pub fn unregister(arch: Architecture) {
    table().write().remove(&arch);
}
