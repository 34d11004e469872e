//! # mirror: loopback tool for the mapped signal transport
//!
//! Polls the signal files, steps a counter on channel 0, and mirrors
//! every peer output back to the matching input so the other side can
//! watch its own signals bounce.
//!
//! ## Usage
//!
//! ```bash
//! # Poll the system temp directory for one minute (default)
//! mirror
//!
//! # Poll for five seconds
//! mirror 5000
//!
//! # Exchange signals through a specific directory
//! mirror --dir /dev/shm/signals 5000
//! ```

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use mmap_ipc::hex::word_to_hex;
use mmap_ipc::{ChannelAdapter, TickClock};

/// Poll interval between transport reads.
const TICK_INTERVAL: Duration = Duration::from_millis(10);
/// Ticks between counter steps on channel 0 (about four per second).
const COUNTER_PERIOD: u64 = 25;
/// Input word nybbles owned by the counter, excluded from mirroring.
const COUNTER_MASK: u64 = 0x0f;
const DEFAULT_RUN_TIME_MS: u64 = 60_000;

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let mut run_time_ms = DEFAULT_RUN_TIME_MS;
    let mut dir: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            "--version" | "-v" => {
                println!("mirror {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--dir" | "-d" => {
                i += 1;
                let value = args.get(i).context("--dir needs a directory path")?;
                dir = Some(PathBuf::from(value));
            }
            arg if arg.starts_with('-') => {
                bail!("Unknown option: {arg}");
            }
            arg => {
                run_time_ms = arg.parse().with_context(|| {
                    format!("run time must be a millisecond count, got '{arg}'")
                })?;
            }
        }
        i += 1;
    }

    let mut adapter = match dir {
        Some(dir) => ChannelAdapter::new(dir),
        None => ChannelAdapter::in_temp_dir(),
    };
    adapter.open().context("cannot open the signal transport")?;
    println!(
        "mirroring '{}' -> '{}' for {run_time_ms} ms",
        adapter.output_path().display(),
        adapter.input_path().display()
    );
    adapter.set_inputs(0);

    let clock = TickClock::start();
    let mut last_outputs = adapter.outputs();
    let mut tick: u64 = 0;
    while adapter.is_open() && clock.elapsed_ms() < run_time_ms {
        thread::sleep(TICK_INTERVAL);

        // Free-running counter so the peer sees traffic even when idle.
        if tick % COUNTER_PERIOD == 0 {
            let next = (adapter.input(0) + 1) & 0x0f;
            adapter.set_input(0, next);
        }

        let outputs = adapter.outputs();
        if outputs != last_outputs {
            last_outputs = outputs;
            adapter.set_inputs_masked(outputs, COUNTER_MASK);
            println!(
                "tick {tick:>6}  outputs 0x{}  inputs 0x{}",
                word_to_hex(outputs),
                word_to_hex(adapter.inputs())
            );
        }
        tick += 1;
    }

    println!("exit.");
    Ok(())
}

fn print_usage() {
    println!("mirror - loopback tool for the mapped signal transport");
    println!();
    println!("USAGE:");
    println!("    mirror [OPTIONS] [RUN_TIME_MS]");
    println!();
    println!("ARGS:");
    println!("    [RUN_TIME_MS]    How long to poll, in milliseconds (default 60000)");
    println!();
    println!("OPTIONS:");
    println!("    -d, --dir <DIR>    Directory holding the signal files (default: system temp)");
    println!("    -h, --help         Print help information");
    println!("    -v, --version      Print version information");
    println!();
    println!("EXAMPLES:");
    println!("    mirror 5000             Mirror signals in the temp dir for 5 s");
    println!("    mirror -d /dev/shm 500  Use /dev/shm and exit after half a second");
}
