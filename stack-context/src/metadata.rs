//! The metadata store (spec §4.2): loads a binary's call-site, function,
//! live-value, arch-live-value, and unwind sections into sorted arrays
//! indexed by call-site ID, by return address, and by function address
//! range.

use crate::binformat::{
    ArchLiveValueRaw, CallSiteRaw, EncodedInstruction, FunctionRecord, LiveValueRaw, LocationKind,
    UnwindArange, UnwindEntryRaw, NO_NAME,
};
use crate::error::{Error, Result};
use crate::valuegen::{Instruction, ValueGenProgram};
use crate::Architecture;
use scroll::Pread;
use std::path::Path;

/// Reserved call-site IDs marking the bottom of the unwindable stack (spec
/// §4.2). The rewriter stops when it sees one of these as the *next*
/// source call site rather than trying to look up a twin for it.
pub const SENTINEL_PROCESS_ENTRY: u64 = u64::MAX;
pub const SENTINEL_PTHREAD_ENTRY: u64 = u64::MAX - 1;
pub const SENTINEL_C11_THREAD_ENTRY: u64 = u64::MAX - 2;

pub fn is_sentinel(id: u64) -> bool {
    matches!(
        id,
        SENTINEL_PROCESS_ENTRY | SENTINEL_PTHREAD_ENTRY | SENTINEL_C11_THREAD_ENTRY
    )
}

const MAGIC: &[u8; 4] = b"STXM";
const VERSION: u16 = 1;

#[derive(Debug, Clone, Copy, scroll::Pread, scroll::Pwrite)]
struct SectionDirectory {
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

/// Where a single live value resides, decoded from a [`LiveValueRaw`]'s
/// flags/regnum/offset fields (spec §3's "Live-value descriptor").
#[derive(Debug, Clone, Copy)]
pub enum Location {
    Register { regnum: u16 },
    Direct { base_register: u16, offset: i32 },
    Indirect { base_register: u16, offset: i32 },
    Constant(i32),
    ConstIndex(u32),
}

#[derive(Debug, Clone, Copy)]
pub struct LiveValueDescriptor {
    pub size: u8,
    pub is_pointer: bool,
    pub is_alloca: bool,
    pub alloca_size: u32,
    pub location: Location,
}

impl LiveValueDescriptor {
    fn decode(raw: LiveValueRaw) -> Result<Self> {
        let kind = raw
            .location_kind()
            .ok_or(Error::UnknownValueKind(raw.flags >> 4))?;
        let location = match kind {
            LocationKind::Register => Location::Register { regnum: raw.regnum },
            LocationKind::Direct => Location::Direct {
                base_register: raw.regnum,
                offset: raw.offset_or_constant,
            },
            LocationKind::Indirect => Location::Indirect {
                base_register: raw.regnum,
                offset: raw.offset_or_constant,
            },
            LocationKind::Constant => Location::Constant(raw.offset_or_constant),
            LocationKind::ConstIndex => Location::ConstIndex(raw.offset_or_constant as u32),
        };
        Ok(Self {
            size: raw.size,
            is_pointer: raw.is_pointer(),
            is_alloca: raw.is_alloca(),
            alloca_size: raw.alloca_size,
            location,
        })
    }
}

/// A live value whose destination side is derived via a value-generation
/// program rather than copied/translated directly (spec §3's "Arch-specific
/// live value").
#[derive(Debug, Clone)]
pub struct ArchLiveValue {
    pub base: LiveValueDescriptor,
    pub program: ValueGenProgram,
}

#[derive(Debug, Clone)]
pub struct CallSite {
    pub id: u64,
    pub function_index: u32,
    pub return_address: u64,
    pub live_values: Vec<LiveValueDescriptor>,
    pub arch_live_values: Vec<ArchLiveValue>,
}

#[derive(Debug, Clone, Copy)]
pub struct UnwindEntry {
    pub reg: u16,
    pub offset_from_fbp: i32,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub address: u64,
    pub code_size: u32,
    pub frame_size: u32,
    /// Sorted by `offset_from_fbp` ascending magnitude (spec §4.2 invariant)
    /// so the frame rewriter lays out spill slots deterministically.
    pub unwind: Vec<UnwindEntry>,
    pub name: Option<String>,
    pub compilation_unit: Option<String>,
}

impl Function {
    pub fn contains(&self, pc: u64) -> bool {
        pc >= self.address && pc < self.address + u64::from(self.code_size)
    }
}

/// A loaded binary's metadata, shared read-only across threads after
/// [`MetadataStore::load`] (spec §3 "Lifecycles").
pub struct MetadataStore {
    arch: Architecture,
    // Keeps the mapping alive for the lifetime of the store; sections are
    // parsed eagerly into owned `Vec`s below so lookups don't re-walk the
    // mmap, but dropping this would be unsound if anything still borrowed
    // from it (nothing does).
    _mmap: memmap2::Mmap,
    constants: Vec<u64>,
    functions: Vec<Function>,
    /// Indices into `functions`, permuted into ascending `address` order.
    functions_by_addr: Vec<usize>,
    call_sites_by_id: Vec<CallSite>,
    /// Indices into `call_sites_by_id`, permuted into ascending
    /// `return_address` order.
    by_addr: Vec<usize>,
}

/// An opaque handle to a loaded binary, analogous to the original's
/// `st_handle` (spec §6).
pub type Handle = std::sync::Arc<MetadataStore>;

impl MetadataStore {
    pub fn load(path: impl AsRef<Path>) -> Result<Handle> {
        let file = std::fs::File::open(path)?;
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        let bytes: &[u8] = &mmap;

        let dir: SectionDirectory = bytes
            .pread_with(0, scroll::LE)
            .map_err(|_| Error::BadBinary("truncated section directory"))?;
        if &dir.magic != MAGIC {
            return Err(Error::BadBinary("bad magic"));
        }
        if dir.version != VERSION {
            return Err(Error::BadBinary("unsupported version"));
        }
        let arch = Architecture::from_tag(dir.arch_tag)?;
        let strtab = bytes
            .get(dir.strtab_off as usize..dir.strtab_off as usize + dir.strtab_len as usize)
            .ok_or(Error::BadBinary("truncated strtab section"))?;
        let read_str = |off: u64| -> Option<String> {
            if off == NO_NAME {
                return None;
            }
            let start = off as usize;
            let end = strtab[start..].iter().position(|&b| b == 0)? + start;
            std::str::from_utf8(&strtab[start..end]).ok().map(String::from)
        };

        let constants = (0..dir.n_constants as usize)
            .map(|i| {
                bytes
                    .pread_with::<u64>(dir.constants_off as usize + i * 8, scroll::LE)
                    .map_err(|_| Error::BadBinary("truncated constants section"))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut arange: Vec<(u64, u64)> = (0..dir.n_unwind_aranges as usize)
            .map(|i| {
                let e: UnwindArange = bytes
                    .pread_with(
                        dir.unwind_arange_off as usize + i * 16,
                        scroll::LE,
                    )
                    .map_err(|_| Error::BadBinary("truncated unwind-arange section"))?;
                Ok((e.fn_addr, e.unwind_slice_off))
            })
            .collect::<Result<Vec<_>>>()?;
        arange.sort_by_key(|(addr, _)| *addr);

        let mut functions = Vec::with_capacity(dir.n_functions as usize);
        for i in 0..dir.n_functions as usize {
            let rec: FunctionRecord = bytes
                .pread_with(dir.function_records_off as usize + i * 52, scroll::LE)
                .map_err(|_| Error::BadBinary("truncated function-records section"))?;
            let mut unwind = Vec::with_capacity(rec.n_unwind as usize);
            for j in 0..rec.n_unwind as usize {
                let raw: UnwindEntryRaw = bytes
                    .pread_with(rec.unwind_off as usize + j * 4, scroll::LE)
                    .map_err(|_| Error::BadBinary("truncated unwind section"))?;
                unwind.push(UnwindEntry {
                    reg: raw.reg,
                    offset_from_fbp: i32::from(raw.offset_from_fbp),
                });
            }
            unwind.sort_by_key(|e| e.offset_from_fbp.unsigned_abs());
            functions.push(Function {
                address: rec.addr,
                code_size: rec.code_size,
                frame_size: rec.frame_size,
                unwind,
                name: read_str(rec.name_off),
                compilation_unit: read_str(rec.cu_off),
            });
        }
        // `function_index` in a call-site record addresses `functions` in
        // file order, so that order is preserved; range lookups by PC go
        // through a separate address-sorted permutation instead.
        let mut functions_by_addr: Vec<usize> = (0..functions.len()).collect();
        functions_by_addr.sort_by_key(|&i| functions[i].address);

        let mut call_sites_by_id = Vec::with_capacity(dir.n_call_sites as usize);
        for i in 0..dir.n_call_sites as usize {
            let raw: CallSiteRaw = bytes
                .pread_with(dir.call_sites_by_id_off as usize + i * 40, scroll::LE)
                .map_err(|_| Error::BadBinary("truncated call-sites-by-id section"))?;

            let mut live_values = Vec::with_capacity(raw.n_live as usize);
            for j in 0..raw.n_live as usize {
                let lv: LiveValueRaw = bytes
                    .pread_with(
                        dir.live_values_off as usize + raw.live_off as usize + j * 12,
                        scroll::LE,
                    )
                    .map_err(|_| Error::BadBinary("truncated live-values section"))?;
                live_values.push(LiveValueDescriptor::decode(lv)?);
            }

            let mut arch_live_values = Vec::with_capacity(raw.n_arch as usize);
            for j in 0..raw.n_arch as usize {
                let alv: ArchLiveValueRaw = bytes
                    .pread_with(
                        dir.arch_live_values_off as usize + raw.arch_off as usize + j * 22,
                        scroll::LE,
                    )
                    .map_err(|_| Error::BadBinary("truncated arch-live-values section"))?;
                let mut program = ValueGenProgram::new();
                for k in 0..alv.n_instructions as usize {
                    let enc: EncodedInstruction = bytes
                        .pread_with(
                            dir.instructions_off as usize
                                + alv.instructions_off as usize
                                + k * 14,
                            scroll::LE,
                        )
                        .map_err(|_| Error::BadBinary("truncated instructions section"))?;
                    program.push(decode_instruction(enc)?);
                }
                arch_live_values.push(ArchLiveValue {
                    base: LiveValueDescriptor::decode(alv.base)?,
                    program,
                });
            }

            call_sites_by_id.push(CallSite {
                id: raw.id,
                function_index: raw.function_index,
                return_address: raw.return_address,
                live_values,
                arch_live_values,
            });
        }
        call_sites_by_id.sort_by_key(|cs| cs.id);

        let mut by_addr: Vec<usize> = (0..call_sites_by_id.len()).collect();
        by_addr.sort_by_key(|&i| call_sites_by_id[i].return_address);

        log::debug!(
            "loaded {arch} metadata: {} functions, {} call sites",
            functions.len(),
            call_sites_by_id.len()
        );

        Ok(std::sync::Arc::new(MetadataStore {
            arch,
            _mmap: mmap,
            constants,
            functions,
            functions_by_addr,
            call_sites_by_id,
            by_addr,
        }))
    }

    pub fn architecture(&self) -> Architecture {
        self.arch
    }

    pub fn constant(&self, idx: u32) -> Option<u64> {
        self.constants.get(idx as usize).copied()
    }

    pub fn lookup_cs_by_id(&self, id: u64) -> Option<&CallSite> {
        self.call_sites_by_id
            .binary_search_by_key(&id, |cs| cs.id)
            .ok()
            .map(|i| &self.call_sites_by_id[i])
    }

    pub fn lookup_cs_by_ret_addr(&self, pc: u64) -> Option<&CallSite> {
        self.by_addr
            .binary_search_by_key(&pc, |&i| self.call_sites_by_id[i].return_address)
            .ok()
            .map(|pos| &self.call_sites_by_id[self.by_addr[pos]])
    }

    pub fn lookup_function(&self, pc: u64) -> Option<&Function> {
        let pos = match self
            .functions_by_addr
            .binary_search_by_key(&pc, |&i| self.functions[i].address)
        {
            Ok(i) => i,
            Err(0) => return None,
            Err(i) => i - 1,
        };
        self.functions
            .get(self.functions_by_addr[pos])
            .filter(|f| f.contains(pc))
    }

    pub fn function_by_index(&self, index: u32) -> Option<&Function> {
        self.functions.get(index as usize)
    }
}

fn decode_instruction(enc: EncodedInstruction) -> Result<Instruction> {
    Ok(match enc.opcode {
        0 => Instruction::SetImm {
            size: enc.operand_size,
            value: enc.operand_b,
        },
        1 => Instruction::SetReg {
            reg: enc.operand_a as u16,
        },
        2 => Instruction::SetStackSlot {
            idx: enc.operand_a as u16,
        },
        3 => Instruction::SetConstPool {
            idx: enc.operand_a as u16,
        },
        4 => Instruction::SetSymbol {
            symbol_idx: enc.operand_a,
        },
        5 => Instruction::AddImm(enc.operand_b),
        6 => Instruction::AddReg(enc.operand_a as u16),
        7 => Instruction::MulImm(enc.operand_b),
        8 => Instruction::LeftShift(enc.operand_a as u8),
        9 => Instruction::RightShiftLog(enc.operand_a as u8),
        10 => Instruction::Mask(enc.operand_b as u64),
        other => return Err(Error::UnknownInstruction(other)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use scroll::Pwrite;

    // Hand-assembles a minimal on-disk blob with one function, one call
    // site, one plain live value, and one arch-specific live value driven
    // by a two-instruction program, then round-trips it through `load`.
    fn synthetic_binary() -> Vec<u8> {
        const HEADER_LEN: usize = 100;
        const FUNCTION_RECORDS_OFF: usize = HEADER_LEN;
        const UNWIND_OFF: usize = FUNCTION_RECORDS_OFF + 52;
        const UNWIND_ARANGE_OFF: usize = UNWIND_OFF + 4;
        const CALL_SITES_OFF: usize = UNWIND_ARANGE_OFF + 16;
        const LIVE_VALUES_OFF: usize = CALL_SITES_OFF + 40;
        const ARCH_LIVE_VALUES_OFF: usize = LIVE_VALUES_OFF + 12;
        const INSTRUCTIONS_OFF: usize = ARCH_LIVE_VALUES_OFF + 22;
        const CONSTANTS_OFF: usize = INSTRUCTIONS_OFF + 2 * 14;
        const STRTAB_OFF: usize = CONSTANTS_OFF + 8;
        const STRTAB: &[u8] = b"main\0unit\0";
        let total = STRTAB_OFF + STRTAB.len();

        let mut buf = vec![0u8; total];

        let dir = SectionDirectory {
            magic: *MAGIC,
            version: VERSION,
            arch_tag: Architecture::X86_64.tag(),
            _pad: 0,
            function_records_off: FUNCTION_RECORDS_OFF as u64,
            n_functions: 1,
            unwind_arange_off: UNWIND_ARANGE_OFF as u64,
            n_unwind_aranges: 1,
            call_sites_by_id_off: CALL_SITES_OFF as u64,
            call_sites_by_addr_off: CALL_SITES_OFF as u64,
            n_call_sites: 1,
            live_values_off: LIVE_VALUES_OFF as u64,
            arch_live_values_off: ARCH_LIVE_VALUES_OFF as u64,
            instructions_off: INSTRUCTIONS_OFF as u64,
            constants_off: CONSTANTS_OFF as u64,
            n_constants: 1,
            strtab_off: STRTAB_OFF as u64,
            strtab_len: STRTAB.len() as u32,
        };
        buf.pwrite_with(dir, 0, scroll::LE).unwrap();

        let function = FunctionRecord {
            addr: 0x1000,
            code_size: 0x100,
            frame_size: 64,
            n_unwind: 1,
            unwind_off: UNWIND_OFF as u64,
            n_slots: 0,
            slots_off: 0,
            name_off: 0,
            cu_off: 5,
        };
        buf.pwrite_with(function, FUNCTION_RECORDS_OFF, scroll::LE)
            .unwrap();

        let unwind = UnwindEntryRaw {
            reg: 19,
            offset_from_fbp: -8,
        };
        buf.pwrite_with(unwind, UNWIND_OFF, scroll::LE).unwrap();

        let arange = UnwindArange {
            fn_addr: 0x1000,
            unwind_slice_off: UNWIND_OFF as u64,
        };
        buf.pwrite_with(arange, UNWIND_ARANGE_OFF, scroll::LE)
            .unwrap();

        let call_site = CallSiteRaw {
            id: 42,
            function_index: 0,
            return_address: 0x1050,
            n_live: 1,
            live_off: 0,
            n_arch: 1,
            arch_off: 0,
        };
        buf.pwrite_with(call_site, CALL_SITES_OFF, scroll::LE)
            .unwrap();

        let live = LiveValueRaw {
            flags: 1 << 4, // Register
            size: 8,
            regnum: 5,
            offset_or_constant: 0,
            alloca_size: 0,
        };
        buf.pwrite_with(live, LIVE_VALUES_OFF, scroll::LE).unwrap();

        let arch_live = ArchLiveValueRaw {
            base: LiveValueRaw {
                flags: 2 << 4, // Direct
                size: 8,
                regnum: 6,
                offset_or_constant: 16,
                alloca_size: 0,
            },
            n_instructions: 2,
            instructions_off: 0,
        };
        buf.pwrite_with(arch_live, ARCH_LIVE_VALUES_OFF, scroll::LE)
            .unwrap();

        let set_imm = EncodedInstruction {
            opcode: 0,
            operand_size: 8,
            operand_a: 0,
            operand_b: 7,
        };
        buf.pwrite_with(set_imm, INSTRUCTIONS_OFF, scroll::LE)
            .unwrap();
        let add_imm = EncodedInstruction {
            opcode: 5,
            operand_size: 0,
            operand_a: 0,
            operand_b: 3,
        };
        buf.pwrite_with(add_imm, INSTRUCTIONS_OFF + 14, scroll::LE)
            .unwrap();

        buf.pwrite_with(0xdead_beefu64, CONSTANTS_OFF, scroll::LE)
            .unwrap();

        buf[STRTAB_OFF..STRTAB_OFF + STRTAB.len()].copy_from_slice(STRTAB);

        buf
    }

    fn write_temp(bytes: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "stack-context-test-{}-{}.bin",
            std::process::id(),
            bytes.len()
        ));
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn loads_and_resolves_function_and_call_site() {
        let path = write_temp(&synthetic_binary());
        let handle = MetadataStore::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(handle.architecture(), Architecture::X86_64);

        let func = handle.lookup_function(0x1050).expect("function at pc");
        assert_eq!(func.address, 0x1000);
        assert_eq!(func.name.as_deref(), Some("main"));
        assert_eq!(func.compilation_unit.as_deref(), Some("unit"));
        assert_eq!(func.unwind.len(), 1);
        assert_eq!(func.unwind[0].reg, 19);
        assert_eq!(func.unwind[0].offset_from_fbp, -8);

        assert!(handle.lookup_function(0x2000).is_none());

        let cs = handle.lookup_cs_by_id(42).expect("call site by id");
        assert_eq!(cs.return_address, 0x1050);
        assert_eq!(cs.live_values.len(), 1);
        assert!(matches!(
            cs.live_values[0].location,
            Location::Register { regnum: 5 }
        ));
        assert_eq!(cs.arch_live_values.len(), 1);
        let program: Vec<_> = cs.arch_live_values[0].program.iter().copied().collect();
        assert_eq!(
            program,
            vec![
                Instruction::SetImm { size: 8, value: 7 },
                Instruction::AddImm(3),
            ]
        );

        let by_addr = handle.lookup_cs_by_ret_addr(0x1050).expect("call site by addr");
        assert_eq!(by_addr.id, 42);

        assert_eq!(handle.constant(0), Some(0xdead_beef));
        assert_eq!(handle.constant(1), None);
    }

    #[test]
    fn sentinel_ids_are_recognized() {
        assert!(is_sentinel(SENTINEL_PROCESS_ENTRY));
        assert!(is_sentinel(SENTINEL_PTHREAD_ENTRY));
        assert!(is_sentinel(SENTINEL_C11_THREAD_ENTRY));
        assert!(!is_sentinel(42));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = synthetic_binary();
        bytes[0] = b'X';
        let path = write_temp(&bytes);
        let result = MetadataStore::load(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(Error::BadBinary(_))));
    }
}
