//! Stack-bounds acquisition (spec §4.3, §5): query the bounds of the
//! calling thread's own stack once, cache them, and pre-touch every page so
//! the rewriter never incurs a page fault mid-rewrite.

use crate::context::StackRegion;
use crate::error::{Result, RewriteError};
use std::cell::Cell;
use std::mem::MaybeUninit;

thread_local! {
    static CACHED: Cell<Option<StackRegion>> = const { Cell::new(None) };
}

/// Returns `[low, high)` for the calling thread's stack, querying the OS
/// only on the first call per thread.
pub fn get_stack_bounds() -> Result<StackRegion> {
    if let Some(region) = CACHED.with(|c| c.get()) {
        return Ok(region);
    }
    let region = query_stack_bounds()?;
    CACHED.with(|c| c.set(Some(region)));
    Ok(region)
}

#[cfg(target_os = "linux")]
fn query_stack_bounds() -> Result<StackRegion> {
    unsafe {
        let mut attr = MaybeUninit::<libc::pthread_attr_t>::uninit();
        if libc::pthread_getattr_np(libc::pthread_self(), attr.as_mut_ptr()) != 0 {
            return main_thread_fallback();
        }
        let mut attr = attr.assume_init();

        let mut stack_addr: *mut libc::c_void = std::ptr::null_mut();
        let mut stack_size: libc::size_t = 0;
        let rc = libc::pthread_attr_getstack(&attr, &mut stack_addr, &mut stack_size);
        libc::pthread_attr_destroy(&mut attr);
        if rc != 0 || stack_addr.is_null() || stack_size == 0 {
            return main_thread_fallback();
        }

        let low = stack_addr as u64;
        let high = low + stack_size as u64;
        Ok(StackRegion::new(low, high))
    }
}

#[cfg(not(target_os = "linux"))]
fn query_stack_bounds() -> Result<StackRegion> {
    main_thread_fallback()
}

/// `pthread_getattr_np` doesn't describe the main thread's stack on every
/// libc (and is entirely absent off Linux); fall back to `RLIMIT_STACK`
/// sized down from the current stack pointer, with a floor if the OS is
/// uncooperative about the limit, the same shape of fallback
/// `install_sigaltstack` uses when sizing its altstack.
fn main_thread_fallback() -> Result<StackRegion> {
    const FLOOR: u64 = 8 * 1024 * 1024;

    let limit = unsafe {
        let mut rl = MaybeUninit::<libc::rlimit>::uninit();
        if libc::getrlimit(libc::RLIMIT_STACK, rl.as_mut_ptr()) == 0 {
            let rl = rl.assume_init();
            if rl.rlim_cur == libc::RLIM_INFINITY || rl.rlim_cur == 0 {
                FLOOR
            } else {
                rl.rlim_cur as u64
            }
        } else {
            FLOOR
        }
    };

    let approx_sp = &limit as *const u64 as u64;
    let high = (approx_sp + 0xffff) & !0xffff;
    let low = high
        .checked_sub(limit)
        .ok_or(RewriteError::StackBounds("stack limit underflows current address"))?;
    Ok(StackRegion::new(low, high))
}

/// Touches every page in `region` from `high` down to `low`, forcing the OS
/// to back them before the rewrite begins so no page fault can interrupt
/// the non-preemptive rewrite loop (spec §5).
pub fn pretouch(region: StackRegion) {
    const PAGE_SIZE: u64 = 4096;
    let mut addr = region.high.saturating_sub(1) & !(PAGE_SIZE - 1);
    while addr >= region.low {
        unsafe {
            std::ptr::read_volatile(addr as *const u8);
        }
        match addr.checked_sub(PAGE_SIZE) {
            Some(next) => addr = next,
            None => break,
        }
    }
}
