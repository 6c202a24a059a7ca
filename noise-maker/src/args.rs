use std::path::PathBuf;

use chrono::{DateTime, FixedOffset};
use clap::Parser;
use derive_getters::Getters;

#[derive(Parser, Debug, Getters)]
#[command(name = "noise-maker")]
#[command(about = "Generate rotated access logs for testing dlcounter", long_about = None)]
pub struct CliArgs {
    /// Directory to write the logs into
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    #[arg(long, default_value = "access.log")]
    base_name: String,

    /// Number of files, including the live log
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u32).range(1..))]
    generations: u32,

    /// Lines per file
    #[arg(long, default_value_t = 1000)]
    lines: usize,

    #[arg(long, default_value = "/wp-content/uploads/")]
    prefix: String,

    #[arg(long = "suffix", num_args = 1.., default_values_t = [".zip".to_string(), ".exe".to_string()])]
    suffixes: Vec<String>,

    /// Seed for reproducible output
    #[arg(long)]
    seed: Option<u64>,

    /// Time of the first line (RFC 3339); defaults to far enough in the past
    /// for the last line to land near now
    #[arg(long)]
    start: Option<DateTime<FixedOffset>>,
}
