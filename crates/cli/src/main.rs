// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use clap::{Parser, Subcommand};
use tamperseal_cli::commands::{decode, demo, inspect, status, verify};
use tamperseal_kernel::forensic::{DEFAULT_CONTEXT, DEFAULT_TAIL};

#[derive(Parser)]
#[command(name = "tamperseal")]
#[command(about = "TamperSeal Forensic CLI - offline checks for device log chains", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a block history (JSON) and show the forensic window
    Verify {
        history_path: String,

        /// Device id, to print the report id the collector would assign
        #[arg(long)]
        device: Option<String>,

        /// Healthy blocks shown before the first break
        #[arg(long, default_value_t = DEFAULT_CONTEXT)]
        context: usize,

        /// Blocks shown for an intact chain
        #[arg(long, default_value_t = DEFAULT_TAIL)]
        tail: usize,
    },
    /// Decode the data pushes of an OP_RETURN output script (hex)
    Decode {
        script_hex: String,
    },
    /// Classify a reported fingerprint against a committed one
    Status {
        #[arg(long)]
        current: Option<String>,

        #[arg(long)]
        committed: Option<String>,
    },
    /// Summarise a collector snapshot file
    Inspect {
        snapshot_path: String,
    },
    /// Write a demo block history, optionally tampered
    Demo {
        #[arg(long, short, default_value = "demo_history.json")]
        out: String,

        #[arg(long, default_value_t = 40)]
        blocks: usize,

        /// Block whose prev_hash gets forged
        #[arg(long)]
        break_at: Option<usize>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Verify {
            history_path,
            device,
            context,
            tail,
        } => verify::run(&history_path, device.as_deref(), context, tail).map(|_| ()),
        Commands::Decode { script_hex } => decode::run(&script_hex).map(|_| ()),
        Commands::Status { current, committed } => {
            status::run(current.as_deref(), committed.as_deref()).map(|_| ())
        }
        Commands::Inspect { snapshot_path } => inspect::run(&snapshot_path),
        Commands::Demo {
            out,
            blocks,
            break_at,
        } => demo::run(&out, blocks, break_at),
    }
}
