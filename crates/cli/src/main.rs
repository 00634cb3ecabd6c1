//! `dcrun`: drives the recompiler core outside of a full emulator.
//!
//! 1. **Load:** read a flat binary or ELF image into the guest address space.
//! 2. **Run:** call `Simulator::execute` in a loop until the guest reaches the
//!    `0xdeadbeef` sentinel PC used by the end-to-end test scenarios, or the step
//!    budget is exhausted.
//! 3. **Report:** print simulation statistics on exit.

mod loader;

use clap::Parser;
use std::process;

use sh4_core::config::Config;
use sh4_core::Simulator;

/// Exit PC the end-to-end scenarios branch to once they're done; `dcrun` stops the
/// loop when the guest reaches it instead of running forever.
const EXIT_PC: u32 = 0xdead_beef;

#[derive(Parser, Debug)]
#[command(
    name = "dcrun",
    author,
    version,
    about = "Run a flat binary or ELF image against the SH4 recompiler core",
    long_about = "Loads a flat binary (at --base) or ELF image (at its own segment \
addresses) and executes it until the guest branches to 0xdeadbeef or --max-steps \
block-boundaries have run.\n\nExamples:\n  dcrun image.bin\n  dcrun --base 0x8c010000 image.bin\n  dcrun kernel.elf"
)]
struct Cli {
    /// Path to the binary or ELF image to run.
    image: String,

    /// Load address for flat binaries (ignored for ELF images, which use their own
    /// segment addresses).
    #[arg(long, default_value_t = 0x8c01_0000)]
    base: u32,

    /// Cycles to request from `execute` per iteration of the run loop.
    #[arg(long, default_value_t = 1_000_000)]
    cycles_per_step: u32,

    /// Upper bound on run-loop iterations, as a backstop against images that never
    /// reach the exit sentinel.
    #[arg(long, default_value_t = 10_000)]
    max_steps: u64,

    /// Which statistics sections to print on exit (see `sh4_core::stats::STATS_SECTIONS`);
    /// empty means all of them.
    #[arg(long)]
    stats: Vec<String>,
}

fn main() {
    tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let data = loader::read_file(&cli.image);

    let config = Config::default();
    let mut sim = Simulator::new(&config);
    let entry = loader::load_image(sim.address_space(), &data, cli.base);
    sim.set_pc(entry);

    println!("[*] Loaded {} ({} bytes), entry {:#010x}", cli.image, data.len(), entry);

    let mut steps = 0u64;
    loop {
        let _ = sim.execute(cli.cycles_per_step);
        if sim.context().pc == EXIT_PC {
            println!("[*] Reached exit sentinel after {steps} step(s)");
            break;
        }
        steps += 1;
        if steps >= cli.max_steps {
            eprintln!("[!] Stopped after {steps} step(s) without reaching the exit sentinel");
            sim.stats.print_sections(&cli.stats);
            process::exit(1);
        }
    }

    sim.stats.print_sections(&cli.stats);
}
