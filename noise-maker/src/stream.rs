use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Duration, FixedOffset};
use flate2::{Compression, write::GzEncoder};
use rand::Rng;

use crate::generator::generate_access_log;

/// Generations from this index on are gzipped, like logrotate's
/// `compress` + `delaycompress`.
const FIRST_COMPRESSED: u32 = 2;
const MAX_GAP_SECS: i64 = 30;

pub struct Plan<'a> {
    pub dir: &'a Path,
    pub base_name: &'a str,
    pub generations: u32,
    pub lines: usize,
    pub prefix: &'a str,
    pub suffixes: &'a [String],
    pub start: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenLog {
    pub path: PathBuf,
    pub lines: usize,
    pub downloads: usize,
}

pub fn generation_path(dir: &Path, base_name: &str, index: u32) -> PathBuf {
    match index {
        0 => dir.join(base_name),
        i if i < FIRST_COMPRESSED => dir.join(format!("{base_name}.{i}")),
        i => dir.join(format!("{base_name}.{i}.gz")),
    }
}

/// Writes the oldest generation first; timestamps strictly increase across
/// all files.
pub fn write_generations<R: Rng + ?Sized>(
    rng: &mut R,
    plan: &Plan<'_>,
) -> io::Result<Vec<WrittenLog>> {
    let mut clock = plan.start;
    let mut written = Vec::with_capacity(plan.generations as usize);
    for index in (0..plan.generations).rev() {
        let path = generation_path(plan.dir, plan.base_name, index);
        let file = BufWriter::new(File::create(&path)?);
        let downloads = if index >= FIRST_COMPRESSED {
            let mut out = GzEncoder::new(file, Compression::default());
            let downloads = write_lines(&mut out, rng, plan, &mut clock)?;
            out.finish()?.flush()?;
            downloads
        } else {
            let mut out = file;
            let downloads = write_lines(&mut out, rng, plan, &mut clock)?;
            out.flush()?;
            downloads
        };
        written.push(WrittenLog {
            path,
            lines: plan.lines,
            downloads,
        });
    }
    Ok(written)
}

fn write_lines<W: Write, R: Rng + ?Sized>(
    out: &mut W,
    rng: &mut R,
    plan: &Plan<'_>,
    clock: &mut DateTime<FixedOffset>,
) -> io::Result<usize> {
    let mut downloads = 0;
    for _ in 0..plan.lines {
        *clock += Duration::seconds(rng.random_range(1..=MAX_GAP_SECS));
        let line = generate_access_log(rng, *clock, plan.prefix, plan.suffixes);
        downloads += usize::from(line.download);
        writeln!(out, "{}", line.text)?;
    }
    Ok(downloads)
}

/// A start time that puts the last generated line close to `now`.
pub fn default_start(now: DateTime<FixedOffset>, generations: u32, lines: usize) -> DateTime<FixedOffset> {
    let total = i64::from(generations) * lines as i64;
    now - Duration::seconds(total * MAX_GAP_SECS)
}
