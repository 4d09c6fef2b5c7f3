#![forbid(unsafe_code)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use fcrash_harness::{explore, load_trace_fixture, summarize_epochs};
use fcrash_permute::EpochBuilder;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fcrash", about = "Crash-state exploration for recorded write traces")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the epoch structure of a trace fixture.
    Epochs {
        /// Path to the trace fixture (JSON).
        trace: PathBuf,
        /// Output in JSON format.
        #[arg(long)]
        json: bool,
    },
    /// Generate unique crash states from a trace fixture.
    Generate {
        /// Path to the trace fixture (JSON).
        trace: PathBuf,
        /// Stop after this many unique states.
        #[arg(long, default_value_t = 100)]
        limit: usize,
        /// Output in JSON format.
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Epochs { trace, json } => {
            let writes = load_trace_fixture(&trace)?;
            let epochs = EpochBuilder::new().build(&writes);
            let summaries = summarize_epochs(&epochs);

            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else {
                for summary in &summaries {
                    println!(
                        "epoch {}: {} ops {:?} barrier={} overlaps={} meta={} checkpoint={}",
                        summary.index,
                        summary.ops,
                        summary.abs_indexes,
                        summary.has_barrier,
                        summary.overlaps,
                        summary.num_meta,
                        summary.checkpoint_epoch
                    );
                }
            }
            Ok(())
        }
        Command::Generate { trace, limit, json } => {
            let writes = load_trace_fixture(&trace)?;
            let report = explore(&writes, limit);

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for (i, state) in report.states.iter().enumerate() {
                    println!(
                        "state {}: {:?} last_checkpoint={}",
                        i, state.crash_state, state.last_checkpoint
                    );
                }
                println!(
                    "{} unique states, exhausted={}",
                    report.unique_states, report.exhausted
                );
            }
            Ok(())
        }
    }
}
