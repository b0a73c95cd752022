//! Hand-assembles an in-memory binary for a chain of synthetic frames, so
//! the seed scenarios (spec §8) can run against a homogeneous pair of
//! binaries when no real cross-compiled sibling is available (the
//! `<ARCH>_BIN` environment variables of spec §6 are still honored by
//! [`crate::config::BinaryPaths`] for a real heterogeneous run).
//!
//! Mirrors `stack_context::binformat`'s on-disk record layouts by hand,
//! the same way `stack-transform/tests/rewrite.rs` does for its single
//! scenario, generalized here into a builder that lays out an arbitrary
//! chain of frames so the six scenarios don't each hand-roll byte offsets.

use scroll::Pwrite;
use stack_context::{Architecture, Handle, MetadataStore};

const NO_NAME: u64 = u64::MAX;
pub const SENTINEL_PROCESS_ENTRY: u64 = u64::MAX;
/// Arbitrary return-address value used only as the key that steers
/// `lookup_cs_by_ret_addr` to the sentinel call site; never dereferenced.
pub const SENTINEL_MARKER: u64 = 0x9999_9999_9999_9999;

#[derive(scroll::Pwrite)]
struct Dir {
    magic: [u8; 4],
    version: u16,
    arch_tag: u8,
    _pad: u8,
    function_records_off: u64,
    n_functions: u32,
    unwind_arange_off: u64,
    n_unwind_aranges: u32,
    call_sites_by_id_off: u64,
    call_sites_by_addr_off: u64,
    n_call_sites: u32,
    live_values_off: u64,
    arch_live_values_off: u64,
    instructions_off: u64,
    constants_off: u64,
    n_constants: u32,
    strtab_off: u64,
    strtab_len: u32,
}

#[derive(scroll::Pwrite)]
struct FunctionRecord {
    addr: u64,
    code_size: u32,
    frame_size: u32,
    n_unwind: u16,
    unwind_off: u64,
    n_slots: u16,
    slots_off: u64,
    name_off: u64,
    cu_off: u64,
}

#[derive(scroll::Pwrite)]
struct UnwindEntryRaw {
    reg: u16,
    offset_from_fbp: i16,
}

#[derive(scroll::Pwrite)]
struct CallSiteRaw {
    id: u64,
    function_index: u32,
    return_address: u64,
    n_live: u16,
    live_off: u64,
    n_arch: u16,
    arch_off: u64,
}

#[derive(Clone, Copy, scroll::Pwrite)]
struct LiveValueRaw {
    flags: u8,
    size: u8,
    regnum: u16,
    offset_or_constant: i32,
    alloca_size: u32,
}

const IS_POINTER: u8 = 1 << 0;

/// Where one live value in a frame lives, mirroring
/// `stack_context::metadata::Location`'s on-disk encoding.
#[derive(Clone, Copy)]
pub enum LiveKind {
    /// A plain register-propagated value.
    Register(u16),
    /// A pointer into another frame, CFA-relative, that must be translated
    /// through the rewriter's fixup machinery (spec §8's `stack_pointer`).
    Pointer { offset: i32 },
}

#[derive(Clone, Copy)]
pub struct LiveSpec {
    pub kind: LiveKind,
    pub size: u8,
}

impl LiveSpec {
    pub fn register(regnum: u16) -> Self {
        Self { kind: LiveKind::Register(regnum), size: 8 }
    }

    pub fn pointer(offset: i32) -> Self {
        Self { kind: LiveKind::Pointer { offset }, size: 8 }
    }

    fn encode(self) -> LiveValueRaw {
        match self.kind {
            LiveKind::Register(regnum) => LiveValueRaw {
                flags: 1 << 4, // Register
                size: self.size,
                regnum,
                offset_or_constant: 0,
                alloca_size: 0,
            },
            LiveKind::Pointer { offset } => LiveValueRaw {
                flags: (3 << 4) | IS_POINTER, // Indirect, is_pointer
                size: self.size,
                regnum: 0,
                offset_or_constant: offset,
                alloca_size: 0,
            },
        }
    }
}

/// One frame in the synthetic call chain: a function plus the single call
/// site sitting inside it (spec §4.2's "one call site identifies one
/// function" convention, the same simplification `stack-transform`'s own
/// integration test makes).
pub struct FrameSpec {
    pub frame_size: u32,
    pub live: Vec<LiveSpec>,
    /// `(register, offset_from_fbp)` callee-saved spill slots this
    /// function's prologue would have saved (spec §8's `callee_saved`).
    pub unwind: Vec<(u16, i16)>,
}

impl FrameSpec {
    pub fn new(frame_size: u32) -> Self {
        Self { frame_size, live: Vec::new(), unwind: Vec::new() }
    }

    pub fn with_live(mut self, live: LiveSpec) -> Self {
        self.live.push(live);
        self
    }

    pub fn with_unwind(mut self, reg: u16, offset_from_fbp: i16) -> Self {
        self.unwind.push((reg, offset_from_fbp));
        self
    }
}

/// The function address range and call-site return address chosen for
/// frame `i`; frames never overlap and each is comfortably larger than any
/// `frame_size` used by the scenarios.
const FRAME_SLOT: u64 = 0x1000;

fn frame_addr(i: usize) -> u64 {
    0x1000 + (i as u64) * FRAME_SLOT
}

fn frame_ret_addr(i: usize) -> u64 {
    frame_addr(i) + 0x50
}

/// Builds an in-memory binary for `frames`, loads it via
/// [`stack_context::MetadataStore::load`], and returns the resulting
/// handle. Every frame's call site carries id `i + 1`; the chain always
/// terminates in a sentinel call site with id [`SENTINEL_PROCESS_ENTRY`]
/// keyed on [`SENTINEL_MARKER`].
pub fn build(arch: Architecture, frames: &[FrameSpec]) -> anyhow::Result<Handle> {
    const HEADER_LEN: usize = 100;
    let function_records_off = HEADER_LEN;
    let n_functions = frames.len();

    let unwind_off = function_records_off + n_functions * 52;
    let n_unwind_total: usize = frames.iter().map(|f| f.unwind.len()).sum();
    let call_sites_off = unwind_off + n_unwind_total * 4;
    let n_call_sites = n_functions + 1; // + sentinel
    let live_values_off = call_sites_off + n_call_sites * 40;
    let n_live_total: usize = frames.iter().map(|f| f.live.len()).sum();
    let total = live_values_off + n_live_total * 12;

    let mut buf = vec![0u8; total];

    let dir = Dir {
        magic: *b"STXM",
        version: 1,
        arch_tag: arch.tag(),
        _pad: 0,
        function_records_off: function_records_off as u64,
        n_functions: n_functions as u32,
        unwind_arange_off: 0,
        n_unwind_aranges: 0,
        call_sites_by_id_off: call_sites_off as u64,
        call_sites_by_addr_off: call_sites_off as u64,
        n_call_sites: n_call_sites as u32,
        live_values_off: live_values_off as u64,
        arch_live_values_off: 0,
        instructions_off: 0,
        constants_off: 0,
        n_constants: 0,
        strtab_off: 0,
        strtab_len: 0,
    };
    buf.pwrite_with(dir, 0, scroll::LE)?;

    let mut unwind_cursor = unwind_off;
    let mut live_cursor = live_values_off;

    for (i, frame) in frames.iter().enumerate() {
        let rec = FunctionRecord {
            addr: frame_addr(i),
            code_size: 0x100,
            frame_size: frame.frame_size,
            n_unwind: frame.unwind.len() as u16,
            unwind_off: unwind_cursor as u64,
            n_slots: 0,
            slots_off: 0,
            name_off: NO_NAME,
            cu_off: NO_NAME,
        };
        buf.pwrite_with(rec, function_records_off + i * 52, scroll::LE)?;

        for &(reg, offset_from_fbp) in &frame.unwind {
            buf.pwrite_with(UnwindEntryRaw { reg, offset_from_fbp }, unwind_cursor, scroll::LE)?;
            unwind_cursor += 4;
        }

        let cs = CallSiteRaw {
            id: (i + 1) as u64,
            function_index: i as u32,
            return_address: frame_ret_addr(i),
            n_live: frame.live.len() as u16,
            live_off: (live_cursor - live_values_off) as u64,
            n_arch: 0,
            arch_off: 0,
        };
        buf.pwrite_with(cs, call_sites_off + i * 40, scroll::LE)?;

        for &live in &frame.live {
            buf.pwrite_with(live.encode(), live_cursor, scroll::LE)?;
            live_cursor += 12;
        }
    }

    let sentinel = CallSiteRaw {
        id: SENTINEL_PROCESS_ENTRY,
        function_index: 0,
        return_address: SENTINEL_MARKER,
        n_live: 0,
        live_off: 0,
        n_arch: 0,
        arch_off: 0,
    };
    buf.pwrite_with(sentinel, call_sites_off + n_functions * 40, scroll::LE)?;

    let path = std::env::temp_dir().join(format!(
        "stack-transform-harness-{}-{}-{}.bin",
        std::process::id(),
        arch.tag(),
        total
    ));
    std::fs::write(&path, &buf)?;
    let handle = MetadataStore::load(&path)?;
    std::fs::remove_file(&path).ok();
    Ok(handle)
}

/// Given the entry stack pointer of the innermost frame, returns each
/// frame's CFA in the same order the rewriter computes them: `cfa_i =
/// sp_i + frame_size_i`, `sp_{i+1} = cfa_i` (spec §4.4 steps 1/2, no
/// architecture adds an entry-CFA correction on aarch64).
pub fn frame_cfas(entry_sp: u64, frames: &[FrameSpec]) -> Vec<u64> {
    let mut sp = entry_sp;
    let mut cfas = Vec::with_capacity(frames.len());
    for frame in frames {
        let cfa = sp + u64::from(frame.frame_size);
        cfas.push(cfa);
        sp = cfa;
    }
    cfas
}

/// Writes `ra`, the synthetic return address chain, and each frame's
/// callee-saved spill slots into `stack`, relative to `base` (the address
/// `stack.as_mut_ptr()` maps to). `entry_sp`/`cfas` must come from
/// [`frame_cfas`] for the same `frames`.
pub fn write_return_chain(
    stack: &mut [u8],
    base: u64,
    frames: &[FrameSpec],
    cfas: &[u64],
    ra_offset: i64,
) {
    let write_u64 = |stack: &mut [u8], addr: u64, value: u64| {
        let off = (addr - base) as usize;
        stack[off..off + 8].copy_from_slice(&value.to_le_bytes());
    };
    for (i, cfa) in cfas.iter().enumerate() {
        let ra_addr = (*cfa as i64 + ra_offset) as u64;
        let target = if i + 1 < frames.len() {
            frame_ret_addr(i + 1)
        } else {
            SENTINEL_MARKER
        };
        write_u64(stack, ra_addr, target);
    }
}
