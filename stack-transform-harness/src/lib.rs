//! CLI and scenario library exercising `stack-transform`'s `userspace_rewrite`
//! family against the seed end-to-end scenarios (spec §8) and, given real
//! sibling binaries via the `<ARCH>_BIN` environment variables (spec §6), a
//! genuine heterogeneous migration.

pub mod config;
pub mod scenarios;
pub mod synthetic;

/// Every seed scenario this harness knows how to run, in spec §8 order.
pub const SCENARIO_NAMES: &[&str] = &[
    "rewrite_double",
    "rewrite_copy",
    "callee_saved",
    "stack_pointer",
    "rewrite_many",
    "rewrite_thread",
];

/// Runs the named scenario. Returns an error if `name` isn't one of
/// [`SCENARIO_NAMES`] or if the scenario itself fails.
pub fn run_scenario(name: &str) -> anyhow::Result<()> {
    match name {
        "rewrite_double" => scenarios::rewrite_double(),
        "rewrite_copy" => scenarios::rewrite_copy(),
        "callee_saved" => scenarios::callee_saved(),
        "stack_pointer" => scenarios::stack_pointer(),
        "rewrite_many" => scenarios::rewrite_many(),
        "rewrite_thread" => scenarios::rewrite_thread(),
        other => anyhow::bail!("unknown scenario {other:?}, see --list"),
    }
}
