//! Splits the bytes of a file around their middle element using a group of ranks.
//!
//! Usage:
//!   parsplit --input numbers --ranks 4
//!
//! Prints the smaller, equal and larger bytes as `L:`, `E:` and `G:` lines. Set `RUST_LOG=debug`
//! to follow the stages on every rank.

use std::path::PathBuf;

use clap::Parser;
use log::warn;

use parsplit::{split_file, ClassifierKind, RemainderPolicy, SplitConfig};

#[derive(Parser, Debug)]
#[command(name = "parsplit")]
#[command(about = "Distributed three-way split of a byte file around a pivot")]
#[command(version)]
struct Args {
    /// Raw input bytes, no header or delimiters
    #[arg(short, long, default_value = "numbers")]
    input: PathBuf,

    /// Number of ranks, defaults to the available parallelism
    #[arg(short = 'n', long)]
    ranks: Option<usize>,

    /// Trailing bytes that do not fill a whole job: drop|last-rank
    #[arg(long, default_value = "drop")]
    remainder: String,

    /// Local classification kernel: branchy|branchless
    #[arg(long, default_value = "branchy")]
    classifier: String,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();

    let config = SplitConfig::default()
        .remainder(args.remainder.parse::<RemainderPolicy>()?)
        .classifier(args.classifier.parse::<ClassifierKind>()?);
    let config = match args.ranks {
        Some(n) => config.with_ranks(n),
        None => config,
    };

    let report = split_file(&args.input, &config)?;
    if report.dropped != 0 {
        warn!(
            "{} trailing bytes were not assigned to any rank, use --remainder last-rank to keep them",
            report.dropped
        );
    }

    print!("{}", report.partition);

    Ok(())
}
