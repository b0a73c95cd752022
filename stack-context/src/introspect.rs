//! Debugging introspection over a loaded binary's metadata: name lookups
//! and a structured per-function summary, replacing the original
//! implementation's `st_get_cu_name`/`st_get_func_name`/`st_print_func_info`
//! direct-to-stdout printing. There's no `st_free_str` counterpart here —
//! the strings below are owned by the `Function` they came from, not leased
//! out of some global table that needs a matching free call.

use crate::metadata::MetadataStore;

/// The name of the function containing `pc`, if the binary carries debug
/// info for it.
pub fn function_name(handle: &MetadataStore, pc: u64) -> Option<&str> {
    handle.lookup_function(pc)?.name.as_deref()
}

/// The name of the compilation unit that contains `pc`, if known.
pub fn compilation_unit(handle: &MetadataStore, pc: u64) -> Option<&str> {
    handle.lookup_function(pc)?.compilation_unit.as_deref()
}

/// A structured summary of the function containing `pc`, for a caller to
/// format however it likes (the harness binary prints these to a terminal).
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub name: Option<String>,
    pub compilation_unit: Option<String>,
    pub address: u64,
    pub code_size: u32,
    pub frame_size: u32,
    pub unwind_entry_count: usize,
}

pub fn describe_function(handle: &MetadataStore, pc: u64) -> Option<FunctionInfo> {
    let f = handle.lookup_function(pc)?;
    Some(FunctionInfo {
        name: f.name.clone(),
        compilation_unit: f.compilation_unit.clone(),
        address: f.address,
        code_size: f.code_size,
        frame_size: f.frame_size,
        unwind_entry_count: f.unwind.len(),
    })
}
