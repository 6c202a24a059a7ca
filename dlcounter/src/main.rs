mod analytics;
mod config;
mod error;
mod ingest;
mod invariants;
mod matcher;
mod models;
mod report;
mod store;
mod watermark;
mod worker;

use std::{path::PathBuf, process::ExitCode};

use chrono::{Local, Utc};
use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use crate::{
    config::{Requirement, Settings},
    error::RunError,
    matcher::Matcher,
    store::{DownloadStore, SqliteStore},
    worker::{run_init, run_update},
};

const DOCS: &str = include_str!("../README.md");

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Rebuild every total from all rotations of this log, e.g. /var/log/nginx/access.log
    #[arg(short, long, value_name = "BASE")]
    init: Option<PathBuf>,

    /// Configuration file [default: dlcounter.toml next to the executable]
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// SQLite database, overriding `store` from the configuration
    #[arg(short, long, value_name = "FILE")]
    sqlite: Option<PathBuf>,

    /// Report progress and print the download table
    #[arg(short, long)]
    verbose: bool,

    /// Report every skipped line and file
    #[arg(short = 'D', long)]
    debug: bool,

    /// Show the documentation and exit
    #[arg(short, long)]
    docs: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    if args.docs {
        print!("{DOCS}");
        return ExitCode::SUCCESS;
    }
    init_tracing(&args);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "download count failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(args: &Args) {
    let level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "error"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("dlcounter={level}"))),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &Args) -> Result<(), RunError> {
    let config_path = args.config.clone().unwrap_or_else(crate::config::default_path);
    let requirement = if args.init.is_some() {
        Requirement::DiscoveredLogs
    } else {
        Requirement::ConfiguredLogs
    };
    let mut settings = Settings::load(&config_path)?.validate(requirement)?;
    if let Some(db) = &args.sqlite {
        settings.store = db.clone();
    }
    info!(config = %config_path.display(), ?settings, "loaded configuration");

    let matcher = Matcher::new(settings.match_config());
    let mut store = SqliteStore::open(&settings.store)?;
    let summary = match &args.init {
        Some(base) => run_init(&mut store, &matcher, base)?,
        None => run_update(&mut store, &matcher, &settings.access_logs)?,
    };
    info!(
        logs = summary.files_opened,
        unreadable = summary.files_failed,
        lines = summary.lines,
        malformed = summary.malformed,
        matched = summary.matched,
        out_of_order = summary.out_of_order,
        admitted = summary.admitted,
        already_counted = summary.stale,
        counted = summary.counted,
        watermark = ?summary.watermark,
        "run finished"
    );

    match &settings.webpage {
        Some(page) => {
            let html = report::render_html(
                &store.records()?,
                &settings.datetime.write,
                &Local,
                Utc::now(),
            );
            report::write_html(page, &html).map_err(|source| RunError::Report {
                path: page.clone(),
                source,
            })?;
            debug!(path = %page.display(), "wrote report");
        }
        None => debug!("no path for HTML output"),
    }

    if args.verbose {
        let counts = store.counts()?;
        info!(
            files = counts.len(),
            downloads = counts.values().sum::<u64>(),
            "stored totals"
        );
        print!("{}", report::format_table(&store.records()?));
    }
    Ok(())
}
