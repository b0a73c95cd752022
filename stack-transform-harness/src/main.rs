//! CLI front-end for `stack-transform-harness`, grounded on
//! `minidumper-test`'s `clap::Parser` + subcommand-enum shape: a `run`
//! subcommand exercises one seed scenario, `list` enumerates them, and
//! `migrate` drives a real heterogeneous rewrite off the `<ARCH>_BIN`
//! binaries (spec §6) when the caller has them.

use clap::{Parser, Subcommand, ValueEnum};
use stack_context::{Architecture, RegisterSet};
use stack_transform_harness::config;

#[derive(Parser)]
#[command(about = "Exercises the stack-transform rewriter against seed scenarios")]
struct Command {
    #[command(subcommand)]
    sub: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs one seed scenario from spec §8.
    Run {
        /// Scenario to run; see `list` for the full set.
        scenario: String,
    },
    /// Lists the scenarios `run` accepts.
    List,
    /// Rewrites a stack between two real sibling binaries loaded from the
    /// `<ARCH>_BIN` environment variables, given a source register dump.
    Migrate {
        #[arg(value_enum)]
        src_arch: ArchArg,
        #[arg(value_enum)]
        dst_arch: ArchArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ArchArg {
    Aarch64,
    X86_64,
    Powerpc64,
    Riscv64,
}

impl From<ArchArg> for Architecture {
    fn from(a: ArchArg) -> Self {
        match a {
            ArchArg::Aarch64 => Architecture::AArch64,
            ArchArg::X86_64 => Architecture::X86_64,
            ArchArg::Powerpc64 => Architecture::PowerPc64,
            ArchArg::Riscv64 => Architecture::RiscV64,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cmd = Command::parse();

    match cmd.sub {
        Commands::List => {
            for name in stack_transform_harness::SCENARIO_NAMES {
                println!("{name}");
            }
            Ok(())
        }
        Commands::Run { scenario } => {
            stack_transform_harness::run_scenario(&scenario)?;
            log::info!("{scenario}: ok");
            Ok(())
        }
        Commands::Migrate { src_arch, dst_arch } => migrate(src_arch.into(), dst_arch.into()),
    }
}

/// Loads both sibling binaries and the current thread's own suspended
/// state, then rewrites it from `src_arch` onto `dst_arch`. Only meaningful
/// when the calling process is itself `src_arch`; this is a demonstration
/// of the wiring spec §6 describes, not a real migration trampoline (which
/// would suspend some *other* thread, not read its own unwindable frame).
fn migrate(src_arch: Architecture, dst_arch: Architecture) -> anyhow::Result<()> {
    let src_handle = config::load_binary(src_arch)?;
    let dst_handle = config::load_binary(dst_arch)?;

    let src_regset = RegisterSet::default_for(src_arch);
    let mut src_regs = vec![0u8; src_regset.byte_len()];
    src_regset.copy_out(&mut src_regs);

    let src_bounds = stack_transform::get_stack_bounds()?;
    let dst_bounds = src_bounds;

    let mut dst_regs = vec![0u8; RegisterSet::default_for(dst_arch).byte_len()];
    let rc = stack_transform::userspace_rewrite(
        src_handle,
        src_bounds,
        src_arch,
        &src_regs,
        dst_handle,
        dst_bounds,
        dst_arch,
        &mut dst_regs,
    );

    anyhow::ensure!(rc == 0, "userspace_rewrite failed with code {rc}");
    log::info!("migrated {src_arch} -> {dst_arch}");
    Ok(())
}
