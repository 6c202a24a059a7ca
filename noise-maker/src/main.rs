mod args;
mod generator;
mod stream;

use std::process::ExitCode;

use args::CliArgs;
use chrono::Local;
use clap::Parser;
use rand::{SeedableRng, rngs::StdRng};
use stream::{Plan, default_start, write_generations};

fn main() -> ExitCode {
    let args = CliArgs::parse();
    let mut rng = match args.seed() {
        Some(seed) => StdRng::seed_from_u64(*seed),
        None => StdRng::from_os_rng(),
    };
    let start = (*args.start()).unwrap_or_else(|| {
        default_start(Local::now().fixed_offset(), *args.generations(), *args.lines())
    });
    let plan = Plan {
        dir: args.dir(),
        base_name: args.base_name(),
        generations: *args.generations(),
        lines: *args.lines(),
        prefix: args.prefix(),
        suffixes: args.suffixes(),
        start,
    };

    match write_generations(&mut rng, &plan) {
        Ok(written) => {
            for log in &written {
                println!(
                    "{}: {} lines, {} downloads",
                    log.path.display(),
                    log.lines,
                    log.downloads
                );
            }
            let total: usize = written.iter().map(|l| l.downloads).sum();
            println!("expected downloads: {total}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("failed to write logs: {e}");
            ExitCode::FAILURE
        }
    }
}
