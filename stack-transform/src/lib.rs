//! Frame-by-frame stack rewriter: unwinds a suspended thread's stack on one
//! architecture and re-materializes it for another, driven by the call-site
//! metadata [`stack_context`] reads out of each architecture's sibling
//! binary.

mod bounds;
mod context;
mod driver;
mod error;
mod frame;
mod interpreter;
mod registry;

pub use bounds::{get_stack_bounds, pretouch};
pub use context::{RewriteContext, StackRegion};
pub use driver::{
    rewrite_ondemand, rewrite_stack, userspace_rewrite, userspace_rewrite_aarch64,
    userspace_rewrite_powerpc64, userspace_rewrite_riscv64, userspace_rewrite_x86_64,
};
pub use error::{Result, RewriteError};
pub use frame::{frame_rewrite, FrameOutcome};
pub use registry::{lookup as registry_lookup, register as registry_register, unregister as registry_unregister};
