use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::{
    analytics::Tally,
    error::{RunError, StoreError},
    ingest::{LogReader, ReadStats, discover_rotations},
    invariants::Timestamp,
    matcher::Matcher,
    store::DownloadStore,
    watermark::WatermarkTracker,
};

const MAX_COMMIT_ATTEMPTS: usize = 3;

#[derive(Debug, Default)]
pub struct RunSummary {
    pub files_opened: usize,
    pub files_failed: usize,
    pub lines: usize,
    pub malformed: usize,
    pub matched: usize,
    pub out_of_order: usize,
    pub admitted: usize,
    pub stale: usize,
    pub counted: u64,
    pub watermark: Option<Timestamp>,
}

/// What one pass over the logs collected.
struct Scan {
    tally: Tally,
    tracker: WatermarkTracker,
    stats: ReadStats,
    malformed: usize,
    matched: usize,
    out_of_order: usize,
}

impl Scan {
    fn summary(&self) -> RunSummary {
        RunSummary {
            files_opened: self.stats.files_opened,
            files_failed: self.stats.failures.len(),
            lines: self.stats.lines,
            malformed: self.malformed + self.stats.undecodable,
            matched: self.matched,
            out_of_order: self.out_of_order,
            admitted: self.tracker.admitted(),
            stale: self.tracker.stale(),
            counted: 0,
            watermark: self.tracker.prior(),
        }
    }
}

fn scan_logs(paths: Vec<PathBuf>, matcher: &Matcher, mut tracker: WatermarkTracker) -> Scan {
    let mut reader = LogReader::new(paths);
    let mut tally = Tally::default();
    let mut latest: Option<Timestamp> = None;
    let (mut malformed, mut matched, mut out_of_order) = (0, 0, 0);

    while let Some(line) = reader.next() {
        let event = match matcher.classify(&line) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(e) => {
                malformed += 1;
                debug!(error = %e, line = %line, "skipping line");
                continue;
            }
        };
        matched += 1;
        if latest.is_some_and(|l| event.timestamp < l) {
            out_of_order += 1;
            warn!(
                path = ?reader.current_path(),
                timestamp = %event.timestamp,
                "download older than an earlier one; are the logs listed oldest first?"
            );
        }
        latest = latest.max(Some(event.timestamp));
        if tracker.admit(&event) {
            tally.record(event);
        }
    }

    Scan {
        tally,
        tracker,
        stats: reader.into_stats(),
        malformed,
        matched,
        out_of_order,
    }
}

/// Counts downloads newer than the stored watermark from `logs` (oldest
/// first) and commits them. Unreadable logs are skipped; what was read from
/// the others is still counted.
pub fn run_update<S: DownloadStore>(
    store: &mut S,
    matcher: &Matcher,
    logs: &[PathBuf],
) -> Result<RunSummary, RunError> {
    let prior = store.watermark()?;
    info!(logs = logs.len(), watermark = ?prior, "counting new downloads");

    let scan = scan_logs(logs.to_vec(), matcher, WatermarkTracker::new(prior));
    if scan.stats.nothing_read() {
        return Err(RunError::NoReadableLogs);
    }
    let mut summary = scan.summary();
    if scan.tally.is_empty() {
        info!("no new downloads");
        return Ok(summary);
    }

    debug!(counts = ?scan.tally.counts(), "tallied new downloads");

    let mut expected = prior;
    let mut attempt = 1;
    loop {
        let increments = scan.tally.increments_after(expected);
        if increments.is_empty() {
            info!("downloads already counted by a concurrent run");
            summary.watermark = expected;
            return Ok(summary);
        }
        match store.apply_increments(&increments, expected) {
            Ok(()) => {
                summary.counted = increments.total();
                summary.watermark = increments.watermark;
                return Ok(summary);
            }
            Err(StoreError::Conflict { found, .. }) if attempt < MAX_COMMIT_ATTEMPTS => {
                warn!(expected = ?expected, found = ?found, attempt, "watermark moved, recounting");
                expected = found;
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Recounts every rotation generation of `base` and replaces the stored
/// totals and watermark.
pub fn run_init<S: DownloadStore>(
    store: &mut S,
    matcher: &Matcher,
    base: &Path,
) -> Result<RunSummary, RunError> {
    let logs = discover_rotations(base)?;
    info!(base = %base.display(), generations = logs.len(), "rebuilding totals");
    for log in &logs {
        info!(path = %log.display(), "using log");
    }

    let scan = scan_logs(logs, matcher, WatermarkTracker::new(None));
    if scan.stats.nothing_read() {
        return Err(RunError::NoReadableLogs);
    }
    let totals = scan.tally.increments_after(None);
    store.rebuild_all(&totals)?;

    let mut summary = scan.summary();
    summary.counted = totals.total();
    summary.watermark = totals.watermark;
    Ok(summary)
}
